// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Converts a wall-clock time into fractional seconds since the UNIX epoch.
///
/// Times before the epoch collapse to `0.0`, which every persisted timestamp treats as "unset".
pub(crate) fn unix_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH).map_or(0.0, |elapsed| elapsed.as_secs_f64())
}

/// Converts fractional UNIX seconds back into a wall-clock time.
///
/// Negative, non-finite or out-of-range values yield `None`.
pub(crate) fn from_unix_seconds(seconds: f64) -> Option<SystemTime> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }

    Duration::try_from_secs_f64(seconds).ok().and_then(|offset| UNIX_EPOCH.checked_add(offset))
}

/// Serializes a wall-clock time as fractional UNIX seconds.
pub(crate) fn serialize_unix_seconds<S: serde::Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(unix_seconds(*time))
}

/// Rounds a duration up to whole seconds, the granularity used in user-facing hints.
pub(crate) fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 { secs.saturating_add(1) } else { secs }
}
