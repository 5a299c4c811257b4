//! # Global coordinator configuration.
//!
//! Provides [`Config`], centralized settings for the coordinator and the
//! resources it creates.
//!
//! Config is used in two ways:
//! 1. **Coordinator creation**: `Coordinator::new(config, ...)`
//! 2. **Resource defaults**: queue drain thresholds, storage key layout,
//!    and session expiry parameters all derive from it.

use std::time::Duration;

/// Global configuration for the coordinator.
///
/// Defines:
/// - **Storage layout**: key prefix and schema tag for durable entries
/// - **Scheduling**: minimum idle budget a queued task is allowed to use
/// - **Notifications**: change-bus ring buffer capacity
/// - **Sessions**: expiry timeout and optional IANA time zone
///
/// ## Field semantics
/// - `key_prefix`: prepended to every durable storage key
/// - `schema_version`: tag written alongside persisted records (no
///   negotiation happens on read)
/// - `min_task_time`: drains yield back to the host once the remaining
///   idle budget is at or below this value; deliberately larger than a
///   typical per-frame idle slice so queued work never competes with
///   rendering
/// - `change_capacity`: change-notification ring buffer size (min 1)
/// - `session_timeout_minutes`: elapsed time after which a session expires
/// - `time_zone`: optional IANA zone; when set, a calendar-day change in
///   that zone also expires the session
#[derive(Clone, Debug)]
pub struct Config {
    /// Prefix for durable storage keys.
    pub key_prefix: String,

    /// Schema tag written into persisted records.
    pub schema_version: u32,

    /// Minimum remaining idle budget required to start another task.
    pub min_task_time: Duration,

    /// Capacity of the change-notification ring buffer.
    ///
    /// Slow listeners that lag behind more than `change_capacity` events
    /// will skip the missed items (they are coalesced away).
    pub change_capacity: usize,

    /// Session expiry threshold in minutes.
    pub session_timeout_minutes: u32,

    /// Optional IANA time zone for the calendar-day expiry rule.
    pub time_zone: Option<String>,
}

impl Config {
    /// Returns the change-bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn change_capacity_clamped(&self) -> usize {
        self.change_capacity.max(1)
    }

    /// Builds the durable storage key for a `(tracking_id, namespace)` pair.
    ///
    /// # Example
    /// ```
    /// use idlesync::Config;
    ///
    /// let cfg = Config::default();
    /// assert_eq!(cfg.storage_key("UA-12345-1", "session"), "idlesync:UA-12345-1:session");
    /// ```
    pub fn storage_key(&self, tracking_id: &str, namespace: &str) -> String {
        format!("{}:{}:{}", self.key_prefix, tracking_id, namespace)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `key_prefix = "idlesync"`
    /// - `schema_version = 1`
    /// - `min_task_time = 25ms` (above typical per-frame idle slices)
    /// - `change_capacity = 64`
    /// - `session_timeout_minutes = 30`
    /// - `time_zone = None` (elapsed-time rule only)
    fn default() -> Self {
        Self {
            key_prefix: "idlesync".to_string(),
            schema_version: 1,
            min_task_time: Duration::from_millis(25),
            change_capacity: 64,
            session_timeout_minutes: 30,
            time_zone: None,
        }
    }
}
