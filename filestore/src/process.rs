// Process-wide protocol tuning, applied once before any client is created
//
// Some SMB engines only expose global knobs. They are collected here from the
// `extra_system_properties` setting and frozen on first initialization; every
// later call is ignored. This is a process-wide side effect.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

use crate::errors::FilestoreError;

static PROCESS_PROPERTIES: OnceLock<BTreeMap<String, String>> = OnceLock::new();

pub const SMB_RESPONSE_TIMEOUT_MS: &str = "smb.client.responseTimeout";
pub const SMB_SO_TIMEOUT_MS: &str = "smb.client.soTimeout";
pub const SMB_CONNECT_TIMEOUT_MS: &str = "smb.client.connTimeout";

/// Parse a comma-separated `key=value` list. Blank items are skipped.
pub fn parse_properties(raw: &str) -> Result<BTreeMap<String, String>, FilestoreError> {
    let mut properties = BTreeMap::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (key, value) = item.split_once('=').ok_or_else(|| {
            FilestoreError::configuration(format!(
                "Expected key=value in system properties, got '{}'",
                item
            ))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(FilestoreError::configuration(format!(
                "Empty property name in '{}'",
                item
            )));
        }
        properties.insert(key.to_string(), value.trim().to_string());
    }
    Ok(properties)
}

/// Freeze the process properties. Returns `false` when they were already set.
pub fn init_process_properties(raw: &str) -> Result<bool, FilestoreError> {
    let properties = parse_properties(raw)?;
    let count = properties.len();
    match PROCESS_PROPERTIES.set(properties) {
        Ok(()) => {
            info!(count = count, "Process-wide filestore properties applied");
            Ok(true)
        }
        Err(_) => {
            warn!("Process-wide filestore properties already applied, ignoring");
            Ok(false)
        }
    }
}

pub fn process_property(key: &str) -> Option<&'static str> {
    PROCESS_PROPERTIES
        .get()
        .and_then(|p| p.get(key))
        .map(String::as_str)
}

/// Milliseconds property as a duration, or `default` when unset or unparsable
pub fn duration_property(key: &str, default: Duration) -> Duration {
    match process_property(key) {
        Some(raw) => match raw.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(key = key, value = raw, "Ignoring non-numeric timeout property");
                default
            }
        },
        None => default,
    }
}
