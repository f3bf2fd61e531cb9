// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::LimiterError;

/// Current schema version of the state file.
pub(crate) const STATE_VERSION: u32 = 1;

/// The shared limiter state as persisted on disk.
///
/// Timestamps are fractional UNIX seconds, `0.0` meaning unset. The file is always written as a
/// whole: `{"version":1,"windowCount":3,"windowStartTimestamp":..,"panicUntilTimestamp":..,"lastActionTimestamp":..}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LimiterState {
    #[serde(default = "legacy_version")]
    pub(crate) version: u32,

    #[serde(default)]
    pub(crate) window_count: u32,

    #[serde(default, rename = "windowStartTimestamp")]
    pub(crate) window_start: f64,

    #[serde(default, rename = "panicUntilTimestamp")]
    pub(crate) panic_until: f64,

    #[serde(default, rename = "lastActionTimestamp")]
    pub(crate) last_action: f64,
}

impl Default for LimiterState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            window_count: 0,
            window_start: 0.0,
            panic_until: 0.0,
            last_action: 0.0,
        }
    }
}

// Files written before the schema carried a version are version 1.
const fn legacy_version() -> u32 {
    1
}

/// Loads the state file.
///
/// A missing file is a fresh state. A file that cannot be parsed is logged and replaced by a
/// fresh state, so one torn or hand-edited file cannot wedge every process.
pub(crate) fn load(path: &Path) -> Result<LimiterState, LimiterError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(LimiterState::default()),
        Err(error) => return Err(LimiterError::io(path, error)),
    };

    let state = match serde_json::from_slice::<LimiterState>(&bytes) {
        Ok(state) => state,
        Err(error) => {
            tracing::event!(
                name: "tollgate.limiter.state_reset",
                tracing::Level::WARN,
                limiter.state_path = %path.display(),
                error = %error,
            );
            return Ok(LimiterState::default());
        }
    };

    if state.version > STATE_VERSION {
        return Err(LimiterError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: state.version,
        });
    }

    Ok(LimiterState {
        version: STATE_VERSION,
        ..state
    })
}

/// Replaces the state file atomically: the state is written to a temporary file in the same
/// directory, synced, and renamed over the old file.
pub(crate) fn save(path: &Path, state: &LimiterState) -> Result<(), LimiterError> {
    let dir = parent_dir(path);
    let file_name = path.file_name().map_or_else(|| "state".into(), |name| name.to_string_lossy());

    let temp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|error| LimiterError::io(dir, error))?;

    {
        let mut writer = BufWriter::new(temp.as_file());
        serde_json::to_writer(&mut writer, state).map_err(|error| LimiterError::io(temp.path(), error.into()))?;
        writer.flush().map_err(|error| LimiterError::io(temp.path(), error))?;
    }

    temp.as_file().sync_all().map_err(|error| LimiterError::io(temp.path(), error))?;
    temp.persist(path).map_err(|error| LimiterError::io(path, error.error))?;

    Ok(())
}

pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_fresh_state() {
        let dir = tempfile::tempdir().unwrap();

        let state = load(&dir.path().join("state.json")).unwrap();

        assert_eq!(state, LimiterState::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = LimiterState {
            window_count: 3,
            window_start: 1_700_000_000.5,
            panic_until: 1_700_003_600.0,
            last_action: 1_700_000_100.25,
            ..LimiterState::default()
        };

        save(&path, &state).unwrap();

        assert_eq!(load(&path).unwrap(), state);
    }

    #[test]
    fn save_uses_camel_case_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        save(&path, &LimiterState::default()).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["windowCount"], 0);
        assert!(json.get("windowStartTimestamp").is_some());
        assert!(json.get("panicUntilTimestamp").is_some());
        assert!(json.get("lastActionTimestamp").is_some());
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        save(&path, &LimiterState::default()).unwrap();
        save(&path, &LimiterState::default()).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn unversioned_file_loads_as_version_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, br#"{"windowCount": 2, "windowStartTimestamp": 10.0}"#).unwrap();

        let state = load(&path).unwrap();

        assert_eq!(state.version, 1);
        assert_eq!(state.window_count, 2);
        assert!((state.window_start - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn corrupt_file_resets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"{\"windowCount\": 2, \"windowSt").unwrap();

        assert_eq!(load(&path).unwrap(), LimiterState::default());
    }

    #[test]
    fn newer_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, br#"{"version": 2}"#).unwrap();

        let error = load(&path).unwrap_err();

        assert!(matches!(error, LimiterError::UnsupportedVersion { found: 2, .. }));
    }

    #[test]
    fn parent_dir_of_bare_file_is_current_dir() {
        assert_eq!(parent_dir(Path::new("state.json")), Path::new("."));
        assert_eq!(parent_dir(Path::new("/var/lib/state.json")), Path::new("/var/lib"));
    }
}
