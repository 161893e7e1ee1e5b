//! Remote runs API: wire types, error taxonomy, and the client contract.

mod http;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::Credential;
use crate::models::{ContentKey, Run, RunId, SyncStatus};

pub use http::{parse_list_page, status_error, HttpRunsClient, ListPage};

/// Failures of a single remote call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Connection refused, DNS failure, reset, ...
    #[error("Network error: {0}")]
    Network(String),
    /// The request exceeded its timeout
    #[error("Request timed out")]
    Timeout,
    /// Credential missing, invalid or expired
    #[error("Unauthorized: sign in again to sync")]
    Unauthorized,
    /// The server does not know the requested run
    #[error("Not found on server")]
    NotFound,
    /// Any other non-success status
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },
    /// The server answered with a payload we cannot interpret
    #[error("Malformed server payload: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether the caller should prompt for re-authentication
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Failures that may succeed on a later attempt without user action
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Server { status, .. } => *status >= 500,
            Self::Unauthorized | Self::NotFound | Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

/// A run as the server returns it.
///
/// The server's `pace` field is not read; pace is always derived locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRun {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    /// Sent as a decimal string by the server; plain numbers are accepted too
    #[serde(deserialize_with = "deserialize_decimal")]
    pub distance_km: f64,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub time_minutes: f64,
}

impl RemoteRun {
    /// Convert into a synced local run, rejecting impossible values
    pub fn into_run(self) -> Result<Run, RemoteError> {
        let run = Run {
            id: RunId::from_uuid(self.id),
            date: self.date,
            distance_km: self.distance_km,
            time_minutes: self.time_minutes,
            status: SyncStatus::Synced,
        };
        run.validate()
            .map_err(|error| RemoteError::Decode(format!("run {}: {error}", self.id)))?;
        Ok(run)
    }

    #[must_use]
    pub fn content_key(&self) -> ContentKey {
        ContentKey::new(self.date, self.distance_km, self.time_minutes)
    }
}

/// Body of `POST /api/runs/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRun {
    pub date: String,
    pub distance_km: f64,
    pub time_minutes: f64,
}

impl From<&Run> for NewRun {
    fn from(run: &Run) -> Self {
        Self {
            date: run.date.to_rfc3339_opts(SecondsFormat::Secs, true),
            distance_km: run.distance_km,
            time_minutes: run.time_minutes,
        }
    }
}

fn deserialize_decimal<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Decimal {
        Number(f64),
        Text(String),
    }

    match Decimal::deserialize(deserializer)? {
        Decimal::Number(value) => Ok(value),
        Decimal::Text(raw) => raw
            .trim()
            .parse::<f64>()
            .map_err(|error| serde::de::Error::custom(format!("invalid decimal '{raw}': {error}"))),
    }
}

/// Operations against the authoritative runs service.
///
/// Implementations apply their own request timeout and report it as
/// [`RemoteError::Timeout`].
#[async_trait]
pub trait RemoteClient: Send + Sync + 'static {
    /// Fetch every run the account owns
    async fn list(&self, credential: &Credential) -> Result<Vec<RemoteRun>, RemoteError>;

    /// Create a run, returning the canonical record with its server id
    async fn create(&self, credential: &Credential, run: &NewRun)
        -> Result<RemoteRun, RemoteError>;

    /// Delete a run by id
    async fn delete(&self, credential: &Credential, id: &RunId) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn remote_run_accepts_decimal_strings() {
        let payload = r#"{
            "id": "0b6f7a3e-3a7b-4b59-9d1c-2f0e6f3e2a10",
            "date": "2025-01-01T07:00:00Z",
            "distance_km": "5.00",
            "time_minutes": "30.00",
            "pace": 6.0
        }"#;
        let run: RemoteRun = serde_json::from_str(payload).unwrap();
        assert!((run.distance_km - 5.0).abs() < f64::EPSILON);
        assert!((run.time_minutes - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn remote_run_ignores_server_pace_in_any_shape() {
        for pace in [r#""6.00""#, "6", "null", r#""n/a""#] {
            let payload = format!(
                r#"{{
                    "id": "0b6f7a3e-3a7b-4b59-9d1c-2f0e6f3e2a10",
                    "date": "2025-01-01T07:00:00Z",
                    "distance_km": "5.00",
                    "time_minutes": "30.00",
                    "pace": {pace}
                }}"#
            );
            let run: RemoteRun = serde_json::from_str(&payload).unwrap();
            assert!((run.into_run().unwrap().pace() - 6.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn remote_run_accepts_numbers_and_offsets() {
        let payload = r#"{
            "id": "0b6f7a3e-3a7b-4b59-9d1c-2f0e6f3e2a10",
            "date": "2025-01-01T09:00:00+02:00",
            "distance_km": 5,
            "time_minutes": 30.5
        }"#;
        let run: RemoteRun = serde_json::from_str(payload).unwrap();
        assert_eq!(run.date, Utc.with_ymd_and_hms(2025, 1, 1, 7, 0, 0).unwrap());
    }

    #[test]
    fn remote_run_rejects_garbage_decimal() {
        let payload = r#"{
            "id": "0b6f7a3e-3a7b-4b59-9d1c-2f0e6f3e2a10",
            "date": "2025-01-01T07:00:00Z",
            "distance_km": "five",
            "time_minutes": "30"
        }"#;
        assert!(serde_json::from_str::<RemoteRun>(payload).is_err());
    }

    #[test]
    fn into_run_is_synced_and_validated() {
        let remote = RemoteRun {
            id: Uuid::now_v7(),
            date: Utc.with_ymd_and_hms(2025, 1, 1, 7, 0, 0).unwrap(),
            distance_km: 5.0,
            time_minutes: 30.0,
        };
        let run = remote.clone().into_run().unwrap();
        assert_eq!(run.status, SyncStatus::Synced);
        assert_eq!(run.id, RunId::from_uuid(remote.id));
        assert!((run.pace() - 6.0).abs() < f64::EPSILON);

        let broken = RemoteRun {
            distance_km: 0.0,
            ..remote
        };
        assert!(matches!(broken.into_run(), Err(RemoteError::Decode(_))));
    }

    #[test]
    fn new_run_formats_date_as_rfc3339() {
        let run = Run::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(), 5.0, 30.0).unwrap();
        let body = NewRun::from(&run);
        assert_eq!(body.date, "2025-01-01T00:00:00Z");
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "date": "2025-01-01T00:00:00Z",
                "distance_km": 5.0,
                "time_minutes": 30.0
            })
        );
    }

    #[test]
    fn transient_classification() {
        assert!(RemoteError::Timeout.is_transient());
        assert!(RemoteError::Network("reset".into()).is_transient());
        assert!(RemoteError::Server {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(!RemoteError::Server {
            status: 400,
            message: String::new()
        }
        .is_transient());
        assert!(!RemoteError::Unauthorized.is_transient());
        assert!(RemoteError::Unauthorized.is_unauthorized());
    }
}
