//! # Session expiry evaluation.
//!
//! A session is a window of related activity persisted in a
//! [`SyncedStore`](crate::store::SyncedStore) record: an identity, the
//! time of the last interaction, and an explicit expired flag. The store
//! itself has no concept of expiry — it is pure storage — so this
//! evaluator must be consulted before trusting any session-scoped value.
//!
//! ## Rules
//! - Expired when the elapsed time since the last interaction **strictly**
//!   exceeds the timeout (exactly at the threshold is not expired).
//! - With a time zone configured, a calendar-date change in that zone also
//!   expires the session, even if the timeout has not elapsed.
//! - An unrecognized zone or out-of-range timestamp skips the calendar
//!   rule; evaluation never fails.

use std::str::FromStr;
use std::time::SystemTime;

use chrono::{TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::clock::unix_millis;
use crate::store::Record;

/// Store namespace conventionally holding session state.
pub const SESSION_NAMESPACE: &str = "session";

/// Record field ordering session writes (last interaction time).
pub const HIT_TIME_KEY: &str = "hitTime";

/// Session-scoped state, as persisted in a store record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Session {
    /// Session identity; changes only when a new session starts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Milliseconds since the Unix epoch of the last interaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_time: Option<i64>,
    /// Explicitly ended (e.g. a session-control hit in another context).
    pub is_expired: bool,
}

impl Session {
    /// Reads session fields out of a store record; unknown fields are
    /// ignored, malformed ones fall back to defaults.
    pub fn from_record(record: &Record) -> Self {
        serde_json::from_value(Value::Object(record.clone())).unwrap_or_default()
    }

    /// Renders the session as a store record (omitting unset fields).
    pub fn to_record(&self) -> Record {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Record::new(),
        }
    }
}

/// Decides whether a session's accumulated state must be discarded.
///
/// Pure function over the record contents and `now`; see the module rules
/// for the exact semantics.
///
/// # Example
/// ```
/// use std::time::{Duration, UNIX_EPOCH};
/// use idlesync::session::{is_expired, Session};
///
/// let now = UNIX_EPOCH + Duration::from_secs(10_000);
/// let session = Session {
///     hit_time: Some(10_000_000 - 30 * 60_000),
///     ..Session::default()
/// };
/// assert!(!is_expired(&session, now, 30, None)); // exactly at threshold
/// ```
pub fn is_expired(
    session: &Session,
    now: SystemTime,
    timeout_minutes: u32,
    time_zone: Option<&str>,
) -> bool {
    if session.is_expired {
        return true;
    }
    let Some(hit_time) = session.hit_time else {
        return false;
    };

    let now_millis = unix_millis(now);
    if now_millis - hit_time > i64::from(timeout_minutes) * 60_000 {
        return true;
    }

    match time_zone {
        Some(zone) => calendar_date_changed(hit_time, now_millis, zone),
        None => false,
    }
}

/// True if `hit_millis` and `now_millis` fall on different calendar dates
/// in `zone`. Unrecognized zones and unrepresentable timestamps yield
/// false (the elapsed-time rule alone decides).
fn calendar_date_changed(hit_millis: i64, now_millis: i64, zone: &str) -> bool {
    let Ok(tz) = Tz::from_str(zone) else {
        trace!(zone, "unrecognized time zone; skipping calendar rule");
        return false;
    };
    let (Some(hit), Some(now)) = (
        Utc.timestamp_millis_opt(hit_millis).single(),
        Utc.timestamp_millis_opt(now_millis).single(),
    ) else {
        return false;
    };

    hit.with_timezone(&tz).date_naive() != now.with_timezone(&tz).date_naive()
}
