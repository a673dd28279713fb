//! Interface spec catalog.
//!
//! A spec directory holds one TOML file per interface:
//!
//! ```toml
//! package = "android.hardware.light"
//! version = "2.0"
//! interface = "ILight"
//! category = "hidl"
//! apis = ["setLight", "getSupportedTypes"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::registry::{fq_name, HalCategory};

/// File extension of interface spec files.
pub const SPEC_EXTENSION: &str = "toml";

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Spec directory not readable: {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Spec file not readable: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid spec file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// One interface description.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InterfaceSpec {
    pub package: String,
    pub version: String,
    pub interface: String,
    #[serde(default)]
    pub category: HalCategory,
    #[serde(default)]
    pub apis: Vec<String>,
}

impl InterfaceSpec {
    pub fn fq_name(&self) -> String {
        fq_name(&self.package, &self.version, &self.interface)
    }
}

/// Interface specs loaded from one or more directories.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    specs: Vec<InterfaceSpec>,
}

impl Catalog {
    /// Load every spec file in `dir`. Unparseable files are skipped with a warning.
    pub fn load_dir(dir: &Path) -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        catalog.add_dir(dir)?;
        Ok(catalog)
    }

    pub fn add_dir(&mut self, dir: &Path) -> Result<(), CatalogError> {
        let entries = fs::read_dir(dir).map_err(|source| CatalogError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(SPEC_EXTENSION))
            .collect();
        paths.sort();

        for path in paths {
            match read_spec(&path) {
                Ok(spec) => {
                    debug!(path = %path.display(), interface = %spec.fq_name(), "loaded interface spec");
                    self.specs.push(spec);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping interface spec"),
            }
        }
        Ok(())
    }

    pub fn specs(&self) -> &[InterfaceSpec] {
        &self.specs
    }

    /// Sorted, deduplicated fully-qualified interface names.
    pub fn hal_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.specs.iter().map(InterfaceSpec::fq_name).collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn find(&self, package: &str, version: &str, interface: &str) -> Option<&InterfaceSpec> {
        self.specs
            .iter()
            .find(|s| s.package == package && s.version == version && s.interface == interface)
    }
}

fn read_spec(path: &Path) -> Result<InterfaceSpec, CatalogError> {
    let text = fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| CatalogError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
