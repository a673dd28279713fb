//! Trace record schema.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::drivers::{format_version, fq_name, FunctionMessage};

/// Where a call was intercepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallSide {
    Server,
    Client,
    SyncCallback,
    AsyncCallback,
    Passthrough,
}

/// Event kind of one record: a call side crossed with ENTRY or EXIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceEvent {
    ServerApiEntry,
    ServerApiExit,
    ClientApiEntry,
    ClientApiExit,
    SyncCallbackEntry,
    SyncCallbackExit,
    AsyncCallbackEntry,
    AsyncCallbackExit,
    PassthroughEntry,
    PassthroughExit,
}

impl TraceEvent {
    pub fn is_entry(self) -> bool {
        matches!(
            self,
            TraceEvent::ServerApiEntry
                | TraceEvent::ClientApiEntry
                | TraceEvent::SyncCallbackEntry
                | TraceEvent::AsyncCallbackEntry
                | TraceEvent::PassthroughEntry
        )
    }

    pub fn is_exit(self) -> bool {
        !self.is_entry()
    }

    /// The EXIT kind that closes this ENTRY kind. `None` for EXIT kinds.
    pub fn matching_exit(self) -> Option<TraceEvent> {
        match self {
            TraceEvent::ServerApiEntry => Some(TraceEvent::ServerApiExit),
            TraceEvent::ClientApiEntry => Some(TraceEvent::ClientApiExit),
            TraceEvent::SyncCallbackEntry => Some(TraceEvent::SyncCallbackExit),
            TraceEvent::AsyncCallbackEntry => Some(TraceEvent::AsyncCallbackExit),
            TraceEvent::PassthroughEntry => Some(TraceEvent::PassthroughExit),
            _ => None,
        }
    }

    pub fn side(self) -> CallSide {
        match self {
            TraceEvent::ServerApiEntry | TraceEvent::ServerApiExit => CallSide::Server,
            TraceEvent::ClientApiEntry | TraceEvent::ClientApiExit => CallSide::Client,
            TraceEvent::SyncCallbackEntry | TraceEvent::SyncCallbackExit => CallSide::SyncCallback,
            TraceEvent::AsyncCallbackEntry | TraceEvent::AsyncCallbackExit => CallSide::AsyncCallback,
            TraceEvent::PassthroughEntry | TraceEvent::PassthroughExit => CallSide::Passthrough,
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TraceEvent::ServerApiEntry => "SERVER_API_ENTRY",
            TraceEvent::ServerApiExit => "SERVER_API_EXIT",
            TraceEvent::ClientApiEntry => "CLIENT_API_ENTRY",
            TraceEvent::ClientApiExit => "CLIENT_API_EXIT",
            TraceEvent::SyncCallbackEntry => "SYNC_CALLBACK_ENTRY",
            TraceEvent::SyncCallbackExit => "SYNC_CALLBACK_EXIT",
            TraceEvent::AsyncCallbackEntry => "ASYNC_CALLBACK_ENTRY",
            TraceEvent::AsyncCallbackExit => "ASYNC_CALLBACK_EXIT",
            TraceEvent::PassthroughEntry => "PASSTHROUGH_ENTRY",
            TraceEvent::PassthroughExit => "PASSTHROUGH_EXIT",
        };
        f.write_str(name)
    }
}

/// One half of a recorded API invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub event: TraceEvent,
    pub package: String,
    /// `major.minor` as a float. Rendered with one decimal by
    /// [`version_string`](Self::version_string), so a two-digit minor such as
    /// `1.10` reads back as `1.1`.
    pub version: f32,
    pub interface: String,
    pub func_msg: FunctionMessage,
    /// Microseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
}

impl TraceRecord {
    /// Build a record stamped with the current time.
    pub fn new(
        event: TraceEvent,
        package: impl Into<String>,
        version: f32,
        interface: impl Into<String>,
        func_msg: FunctionMessage,
    ) -> Self {
        Self {
            event,
            package: package.into(),
            version,
            interface: interface.into(),
            func_msg,
            timestamp: chrono::Utc::now().timestamp_micros(),
        }
    }

    pub fn version_string(&self) -> String {
        format_version(self.version)
    }

    /// `package@version::interface`
    pub fn fq_name(&self) -> String {
        fq_name(&self.package, &self.version_string(), &self.interface)
    }
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.timestamp,
            self.event,
            self.fq_name(),
            self.func_msg.to_text()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_exit_pairing() {
        assert_eq!(TraceEvent::ServerApiEntry.matching_exit(), Some(TraceEvent::ServerApiExit));
        assert_eq!(TraceEvent::PassthroughEntry.matching_exit(), Some(TraceEvent::PassthroughExit));
        assert_eq!(TraceEvent::ClientApiExit.matching_exit(), None);
        assert!(TraceEvent::AsyncCallbackEntry.is_entry());
        assert!(TraceEvent::SyncCallbackExit.is_exit());
    }

    #[test]
    fn event_serializes_screaming_case() {
        let text = serde_json::to_string(&TraceEvent::SyncCallbackEntry).unwrap();
        assert_eq!(text, "\"SYNC_CALLBACK_ENTRY\"");
        assert_eq!(TraceEvent::SyncCallbackEntry.to_string(), "SYNC_CALLBACK_ENTRY");
    }

    #[test]
    fn fq_name_uses_one_decimal_version() {
        let record = TraceRecord::new(
            TraceEvent::ServerApiEntry,
            "android.hardware.nfc",
            1.0,
            "INfc",
            FunctionMessage::call("open", vec![]),
        );
        assert_eq!(record.fq_name(), "android.hardware.nfc@1.0::INfc");
        assert!(record.timestamp > 0);
    }

    #[test]
    fn two_digit_minor_version_is_truncated_to_one_decimal() {
        let json = r#"{"event":"SERVER_API_ENTRY","package":"android.hardware.nfc","version":1.10,"interface":"INfc","func_msg":{"name":"open"}}"#;
        let record: TraceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.version_string(), "1.1");
        assert_eq!(record.fq_name(), "android.hardware.nfc@1.1::INfc");
    }
}
