//! Run model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A unique identifier for a run.
///
/// Provisional ids are UUID v7 generated on this device; once a run is
/// synced it carries the id assigned by the server instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new provisional run ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an id received from the server
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Where a run stands relative to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Exists locally, not confirmed on the remote
    Pending,
    /// Id confirmed equal on both sides
    Synced,
    /// Deleted locally, remote delete not yet confirmed
    TombstonePending,
}

impl SyncStatus {
    /// Storage/display label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::TombstonePending => "tombstone_pending",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "tombstone_pending" => Ok(Self::TombstonePending),
            other => Err(Error::InvalidInput(format!("Unknown sync status: {other}"))),
        }
    }
}

/// Identity of a logical run when ids are not yet shared by both sides.
///
/// Fields are quantized (whole seconds, whole metres) so that values which
/// round-trip through the server's decimal representation still compare
/// equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentKey {
    date_secs: i64,
    distance_m: i64,
    time_secs: i64,
}

impl ContentKey {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(date: DateTime<Utc>, distance_km: f64, time_minutes: f64) -> Self {
        Self {
            date_secs: date.timestamp(),
            distance_m: (distance_km * 1000.0).round() as i64,
            time_secs: (time_minutes * 60.0).round() as i64,
        }
    }

    /// Stable text form used for the UNIQUE column in the local store
    #[must_use]
    pub fn to_storage_key(&self) -> String {
        format!("{}:{}:{}", self.date_secs, self.distance_m, self.time_secs)
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_storage_key())
    }
}

/// A single logged run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Provisional or canonical identifier
    pub id: RunId,
    /// When the run happened
    pub date: DateTime<Utc>,
    /// Distance in kilometres
    pub distance_km: f64,
    /// Duration in minutes
    pub time_minutes: f64,
    /// Local sync bookkeeping
    pub status: SyncStatus,
}

impl Run {
    /// Create a new pending run with a provisional id
    pub fn new(date: DateTime<Utc>, distance_km: f64, time_minutes: f64) -> Result<Self> {
        let run = Self {
            id: RunId::new(),
            date,
            distance_km,
            time_minutes,
            status: SyncStatus::Pending,
        };
        run.validate()?;
        Ok(run)
    }

    /// Check distance and duration are finite and positive
    pub fn validate(&self) -> Result<()> {
        if !(self.distance_km.is_finite() && self.distance_km > 0.0) {
            return Err(Error::InvalidInput(format!(
                "distance must be greater than zero (got {})",
                self.distance_km
            )));
        }
        if !(self.time_minutes.is_finite() && self.time_minutes > 0.0) {
            return Err(Error::InvalidInput(format!(
                "time must be greater than zero (got {})",
                self.time_minutes
            )));
        }
        Ok(())
    }

    /// Minutes per kilometre, always derived from distance and time
    #[must_use]
    pub fn pace(&self) -> f64 {
        self.time_minutes / self.distance_km
    }

    #[must_use]
    pub fn content_key(&self) -> ContentKey {
        ContentKey::new(self.date, self.distance_km, self.time_minutes)
    }

    #[must_use]
    pub const fn with_status(mut self, status: SyncStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.status == SyncStatus::Synced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn new_year() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_run_id_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn test_run_id_parse() {
        let id = RunId::new();
        let parsed: RunId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_new_run_is_pending_with_derived_pace() {
        let run = Run::new(new_year(), 5.0, 30.0).unwrap();
        assert_eq!(run.status, SyncStatus::Pending);
        assert!((run.pace() - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pace_is_idempotent() {
        let run = Run::new(new_year(), 10.0, 55.0).unwrap();
        assert_eq!(run.pace().to_bits(), run.clone().pace().to_bits());
    }

    #[test]
    fn test_rejects_non_positive_values() {
        assert!(Run::new(new_year(), 0.0, 30.0).is_err());
        assert!(Run::new(new_year(), 5.0, -1.0).is_err());
        assert!(Run::new(new_year(), f64::NAN, 30.0).is_err());
        assert!(Run::new(new_year(), 5.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_content_key_tolerates_decimal_roundtrip() {
        let local = ContentKey::new(new_year(), 5.0, 30.0);
        let from_server = ContentKey::new(
            new_year() + chrono::Duration::milliseconds(300),
            "5.0001".parse().unwrap(),
            "30.00".parse().unwrap(),
        );
        assert_eq!(local, from_server);
    }

    #[test]
    fn test_content_key_distinguishes_different_runs() {
        let a = ContentKey::new(new_year(), 5.0, 30.0);
        assert_ne!(a, ContentKey::new(new_year(), 5.1, 30.0));
        assert_ne!(a, ContentKey::new(new_year(), 5.0, 31.0));
        assert_ne!(
            a,
            ContentKey::new(new_year() + chrono::Duration::hours(1), 5.0, 30.0)
        );
    }

    #[test]
    fn test_status_roundtrip_labels() {
        for status in [
            SyncStatus::Pending,
            SyncStatus::Synced,
            SyncStatus::TombstonePending,
        ] {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<SyncStatus>().is_err());
    }
}
