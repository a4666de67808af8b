//! `plume.toml`: evaluator limits and host variables
//!
//! ```toml
//! [limits]
//! max_frames = 64
//!
//! [vars]
//! client_ip = "10.0.0.1"
//! tenant = { id = 7, plan = "pro" }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use plume_core::{Limits, Val};
use serde::Deserialize;

/// Settings file contents; every table is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub limits: Limits,
    pub vars: toml::Table,
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings '{}'", path.display()))?;
        Self::parse(&source).with_context(|| format!("Invalid settings in '{}'", path.display()))
    }

    /// Parse settings from TOML text
    pub fn parse(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Host variables as script values
    pub fn host_vars(&self) -> Result<Vec<(String, Val)>> {
        self.vars
            .iter()
            .map(|(name, value)| {
                let json = serde_json::to_value(value)
                    .with_context(|| format!("Unsupported value for variable '{name}'"))?;
                Ok((name.clone(), Val::from_json(&json)))
            })
            .collect()
    }
}

/// Parse a `NAME=VALUE` command-line assignment
///
/// The value is read as JSON when it parses, otherwise as a plain string.
pub fn parse_assignment(assignment: &str) -> Result<(String, Val)> {
    let (name, raw) = assignment
        .split_once('=')
        .with_context(|| format!("Expected NAME=VALUE, got '{assignment}'"))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Missing variable name in '{assignment}'");
    }
    let value = match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => Val::from_json(&json),
        Err(_) => Val::string(raw),
    };
    Ok((name.to_string(), value))
}
