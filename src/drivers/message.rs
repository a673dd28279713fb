//! Call and result payloads exchanged with drivers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Textual result a driver reports when the call ran but returned nothing.
pub const VOID_RESULT: &str = "void";

/// Textual result a driver reports when the call failed inside the driver.
pub const ERROR_RESULT: &str = "error";

/// One API invocation, either as a call (`args`) or as its outcome
/// (`return_values`). Trace records carry the same schema for both halves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionMessage {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub return_values: Vec<Value>,
}

/// A function message viewed as the arguments of a call.
pub type FunctionCallMessage = FunctionMessage;

/// A function message viewed as the return values of a call.
pub type FunctionResultMessage = FunctionMessage;

impl FunctionMessage {
    pub fn call(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
            return_values: Vec::new(),
        }
    }

    pub fn result(name: impl Into<String>, return_values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            return_values,
        }
    }

    /// Encode as the textual result form drivers hand back.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| ERROR_RESULT.to_string())
    }

    /// Parse the textual result form.
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Classification of a driver's textual result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutput<'a> {
    Void,
    Error,
    Text(&'a str),
}

impl<'a> CallOutput<'a> {
    pub fn classify(text: &'a str) -> Self {
        match text {
            VOID_RESULT => CallOutput::Void,
            ERROR_RESULT => CallOutput::Error,
            other => CallOutput::Text(other),
        }
    }
}
