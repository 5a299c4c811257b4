//! # Record model for synchronized state.
//!
//! A record is a flat JSON object; writes merge shallowly and an optional
//! designated timestamp field orders them. The guard rejects writes whose
//! timestamp is numerically **smaller** than the cached one (equal is
//! accepted), so a deferred stale write can never clobber newer data.

use serde_json::Value;

/// A flat mapping of string keys to JSON values.
pub type Record = serde_json::Map<String, Value>;

/// Parses raw persisted JSON into a record.
///
/// Absent, malformed, or non-object payloads all read as the empty record;
/// corrupt durable data is never an error.
pub fn parse(raw: Option<&str>) -> Record {
    match raw {
        Some(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            _ => Record::new(),
        },
        None => Record::new(),
    }
}

/// Shallow-merges `src` into `dst`, replacing colliding keys.
pub fn merge(dst: &mut Record, src: &Record) {
    for (key, value) in src {
        dst.insert(key.clone(), value.clone());
    }
}

/// Returns `base` overlaid with `over` (shallow).
pub fn merged(base: &Record, over: &Record) -> Record {
    let mut out = base.clone();
    merge(&mut out, over);
    out
}

/// True if `incoming` carries a timestamp older than `current`'s.
///
/// Both sides must hold a numeric value under `ts_key` for the comparison
/// to apply; otherwise the write is not considered stale. Equal timestamps
/// are accepted.
pub fn is_stale(current: &Record, incoming: &Record, ts_key: &str) -> bool {
    match (
        incoming.get(ts_key).and_then(Value::as_f64),
        current.get(ts_key).and_then(Value::as_f64),
    ) {
        (Some(new_ts), Some(cached_ts)) => new_ts < cached_ts,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: Value) -> Record {
        v.as_object().expect("object literal").clone()
    }

    #[test]
    fn test_parse_malformed_reads_as_empty() {
        assert!(parse(None).is_empty());
        assert!(parse(Some("not json")).is_empty());
        assert!(parse(Some("[1,2,3]")).is_empty());
        assert_eq!(parse(Some("{\"a\":1}")), rec(json!({"a": 1})));
    }

    #[test]
    fn test_merge_is_shallow_and_replacing() {
        let mut dst = rec(json!({"a": 1, "b": {"x": 1}}));
        merge(&mut dst, &rec(json!({"b": {"y": 2}, "c": 3})));
        assert_eq!(dst, rec(json!({"a": 1, "b": {"y": 2}, "c": 3})));
    }

    #[test]
    fn test_stale_comparison_is_strict() {
        let current = rec(json!({"ts": 5}));
        assert!(is_stale(&current, &rec(json!({"ts": 3})), "ts"));
        assert!(!is_stale(&current, &rec(json!({"ts": 5})), "ts"));
        assert!(!is_stale(&current, &rec(json!({"ts": 6})), "ts"));
    }

    #[test]
    fn test_missing_or_non_numeric_timestamps_never_stale() {
        let current = rec(json!({"ts": 5}));
        assert!(!is_stale(&current, &rec(json!({"v": "a"})), "ts"));
        assert!(!is_stale(&rec(json!({})), &rec(json!({"ts": 1})), "ts"));
        assert!(!is_stale(&current, &rec(json!({"ts": "late"})), "ts"));
    }

    #[test]
    fn test_stale_comparison_mixes_int_and_float() {
        let current = rec(json!({"ts": 5.5}));
        assert!(is_stale(&current, &rec(json!({"ts": 5})), "ts"));
        assert!(!is_stale(&current, &rec(json!({"ts": 6})), "ts"));
    }
}
