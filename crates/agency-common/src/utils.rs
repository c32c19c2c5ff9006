//! Common utility functions used across Agency components

use crate::error::{AgencyError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// Generate a unique ID for various entities
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current UTC time as a fixed-width RFC 3339 string (sorts chronologically)
pub fn now_rfc3339() -> String {
    to_rfc3339(&Utc::now())
}

/// Fixed-width RFC 3339 rendering with microsecond precision
pub fn to_rfc3339(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 timestamp, falling back to now on garbage
pub fn parse_rfc3339_or_now(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Check that `address` is an absolute http or https URL
pub fn validate_http_address(address: &str) -> Result<Url> {
    if !address.starts_with("http://") && !address.starts_with("https://") {
        return Err(AgencyError::InvalidInput(format!(
            "Invalid agent_service_url '{}'. Must be http or https.",
            address
        )));
    }
    let url = Url::parse(address).map_err(|e| {
        AgencyError::InvalidInput(format!("Invalid agent_service_url '{}': {}", address, e))
    })?;
    if url.host_str().is_none() {
        return Err(AgencyError::InvalidInput(format!(
            "Invalid agent_service_url '{}': missing host",
            address
        )));
    }
    Ok(url)
}

/// Join a base address and a relative path without doubling or dropping slashes
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Duration in milliseconds, rounded to two decimals
pub fn duration_to_millis_2dp(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}

/// Truncate string to specified length with ellipsis
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ids() {
        let id1 = generate_id();
        let id2 = generate_id();
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 36); // UUID length
    }

    #[test]
    fn test_validate_http_address() {
        assert!(validate_http_address("http://localhost:10010").is_ok());
        assert!(validate_http_address("https://agent.example.com/base").is_ok());

        let err = validate_http_address("ftp://agent.example.com").unwrap_err();
        assert!(matches!(err, AgencyError::InvalidInput(_)));
        assert!(validate_http_address("agent.example.com").is_err());
        assert!(validate_http_address("http://").is_err());
    }

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://a:1/", "/.well-known/agent.json"),
            "http://a:1/.well-known/agent.json"
        );
        assert_eq!(join_url("http://a:1", "register_agent/"), "http://a:1/register_agent/");
    }

    #[test]
    fn test_duration_rounding() {
        assert_eq!(duration_to_millis_2dp(Duration::from_micros(12_345)), 12.35);
        assert_eq!(duration_to_millis_2dp(Duration::ZERO), 0.0);
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("hi", 1), "...");
    }

    #[test]
    fn test_rfc3339_is_fixed_width() {
        let a = now_rfc3339();
        let b = now_rfc3339();
        assert_eq!(a.len(), b.len());
        assert!(a <= b);
        assert!(a.ends_with('Z'));
    }

    #[test]
    fn test_parse_rfc3339_or_now() {
        let parsed = parse_rfc3339_or_now("2024-05-01T10:00:00+00:00");
        assert_eq!(parsed.timestamp(), 1714557600);
        let fallback = parse_rfc3339_or_now("not a date");
        assert!(fallback.timestamp() > 1714557600);
    }
}
