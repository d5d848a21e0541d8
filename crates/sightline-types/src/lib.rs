//! Wire model shared by the sightline runtime, facade, and CLI.
//!
//! Everything in here is exchanged with the control plane as JSON through
//! `facet-json`. Field names are the snake_case names the control plane
//! expects; optional fields are omitted from output when empty.

use chrono::{DateTime, SecondsFormat, Utc};
use facet::Facet;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

/// Name → dynamic value map used for captured variables, request context,
/// and breakpoint metadata.
pub type ValueMap = BTreeMap<String, facet_value::Value>;

/// Replacement text for any redacted variable.
pub const REDACTED: &str = "[REDACTED]";

// ── Breakpoint configuration ────────────────────────────

/// A remotely authored breakpoint, as returned by the control plane.
///
/// The local cache only ever reflects the latest poll; nothing here is
/// authoritative on the client side.
#[derive(Facet, Debug, Clone, Default)]
pub struct BreakpointConfig {
    /// Opaque backend-assigned identifier.
    pub id: String,

    #[facet(default)]
    pub service_name: String,

    #[facet(default)]
    pub file_path: String,

    #[facet(default)]
    pub function_name: String,

    /// Stable human identifier; survives line drift from code edits.
    #[facet(default)]
    #[facet(skip_unless_truthy)]
    pub label: Option<String>,

    #[facet(default)]
    pub line_number: u32,

    /// Opaque condition expression. Forwarded, never evaluated.
    #[facet(default)]
    #[facet(skip_unless_truthy)]
    pub condition: Option<String>,

    /// Upper bound on captures; 0 means unlimited.
    #[facet(default)]
    pub max_captures: u32,

    /// Capture count as of the last poll.
    #[facet(default)]
    pub capture_count: u32,

    /// RFC 3339 expiry timestamp.
    #[facet(default)]
    #[facet(skip_unless_truthy)]
    pub expire_at: Option<String>,

    #[facet(default)]
    pub enabled: bool,

    /// Free-form metadata. The control plane may send `null`.
    #[facet(default)]
    #[facet(skip_unless_truthy)]
    pub metadata: Option<ValueMap>,
}

impl BreakpointConfig {
    /// The label, if present and non-empty.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref().filter(|label| !label.is_empty())
    }

    /// Cache key by location: `{file_path}:{line_number}`.
    pub fn location_key(&self) -> String {
        location_key(&self.file_path, self.line_number)
    }

    /// Cache key by stable label, present only when both the function name
    /// and the label are non-empty.
    pub fn label_key(&self) -> Option<String> {
        let label = self.label()?;
        if self.function_name.is_empty() {
            return None;
        }
        Some(label_key(&self.function_name, label))
    }

    /// Parses `expire_at`.
    pub fn expires_at(&self) -> Result<Option<DateTime<Utc>>, TimestampError> {
        match self.expire_at.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => parse_timestamp(raw).map(Some),
        }
    }
}

/// Response body of `GET /sdk/snapshots/active/{service}`.
///
/// A service with no breakpoints may come back as `{"breakpoints":null}`;
/// that is an empty list, not a malformed response.
#[derive(Facet, Debug, Clone, Default)]
pub struct ActiveBreakpoints {
    #[facet(default)]
    pub breakpoints: Option<Vec<BreakpointConfig>>,
}

impl ActiveBreakpoints {
    pub fn new(breakpoints: Vec<BreakpointConfig>) -> Self {
        Self {
            breakpoints: Some(breakpoints),
        }
    }

    /// The served breakpoints, with a missing or `null` list read as empty.
    pub fn into_breakpoints(self) -> Vec<BreakpointConfig> {
        self.breakpoints.unwrap_or_default()
    }
}

/// Request body of `POST /sdk/snapshots/auto-register`.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct AutoRegistration {
    pub service_name: String,
    pub file_path: String,
    pub line_number: u32,
    pub function_name: String,
    pub label: String,
}

pub fn location_key(file_path: &str, line_number: u32) -> String {
    format!("{file_path}:{line_number}")
}

pub fn label_key(function_name: &str, label: &str) -> String {
    format!("{function_name}:{label}")
}

// ── Security findings ───────────────────────────────────

#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sensitive-content finding produced while sanitizing variables.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct SecurityFlag {
    /// Taxonomy tag, e.g. `sensitive_variable_name` or `sensitive_data_jwt`.
    #[facet(rename = "type")]
    pub kind: String,

    pub severity: Severity,

    /// Name of the flagged variable.
    pub variable: String,
}

// ── Snapshot ────────────────────────────────────────────

/// Captured, sanitized program state at a breakpoint hit.
#[derive(Facet, Debug, Clone, Default)]
pub struct Snapshot {
    pub breakpoint_id: String,
    pub service_name: String,
    pub file_path: String,
    pub line_number: u32,

    /// Variables after redaction.
    pub variables: ValueMap,

    #[facet(default)]
    #[facet(skip_unless_truthy)]
    pub security_flags: Vec<SecurityFlag>,

    pub stack_trace: String,

    #[facet(default)]
    #[facet(skip_unless_truthy)]
    pub trace_id: Option<String>,

    #[facet(default)]
    #[facet(skip_unless_truthy)]
    pub span_id: Option<String>,

    /// Opaque payload installed by an instrumentation adapter.
    #[facet(default)]
    #[facet(skip_unless_truthy)]
    pub request_context: Option<ValueMap>,

    /// RFC 3339 capture time.
    pub captured_at: String,
}

// ── Timestamps ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampError {
    pub raw: String,
    pub reason: String,
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid RFC 3339 timestamp {:?}: {}", self.raw, self.reason)
    }
}

impl Error for TimestampError {}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TimestampError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| TimestampError {
            raw: raw.to_string(),
            reason: e.to_string(),
        })
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_active_breakpoints_with_omitted_fields() {
        let body = r#"{"breakpoints":[
            {"id":"bp-1","service_name":"checkout","file_path":"payment.go","function_name":"main.charge",
             "label":"charge","line_number":42,"max_captures":5,"capture_count":1,
             "expire_at":"2030-01-01T00:00:00Z","enabled":true,"metadata":{"owner":"payments"}},
            {"id":"bp-2","file_path":"cart.go","line_number":7,"max_captures":0,"capture_count":0,"enabled":false}
        ]}"#;

        let breakpoints = facet_json::from_str::<ActiveBreakpoints>(body)
            .expect("decode")
            .into_breakpoints();
        assert_eq!(breakpoints.len(), 2);

        let first = &breakpoints[0];
        assert_eq!(first.label(), Some("charge"));
        assert_eq!(first.label_key().as_deref(), Some("main.charge:charge"));
        assert_eq!(first.location_key(), "payment.go:42");
        assert!(first.expires_at().expect("timestamp").is_some());
        assert!(first.metadata.as_ref().is_some_and(|m| m.contains_key("owner")));

        let second = &breakpoints[1];
        assert_eq!(second.label(), None);
        assert_eq!(second.label_key(), None);
        assert_eq!(second.expires_at().expect("timestamp"), None);
        assert!(!second.enabled);
    }

    #[test]
    fn null_list_and_null_fields_decode_as_empty() {
        let empty: ActiveBreakpoints = facet_json::from_str(r#"{"breakpoints":null}"#).expect("null list");
        assert!(empty.into_breakpoints().is_empty());

        let missing: ActiveBreakpoints = facet_json::from_str("{}").expect("missing list");
        assert!(missing.into_breakpoints().is_empty());

        let body = r#"{"breakpoints":[
            {"id":"bp-3","file_path":"cart.go","line_number":7,"label":null,"condition":null,
             "expire_at":null,"metadata":null,"enabled":true}
        ]}"#;
        let breakpoints = facet_json::from_str::<ActiveBreakpoints>(body)
            .expect("null fields")
            .into_breakpoints();
        assert_eq!(breakpoints.len(), 1);
        assert_eq!(breakpoints[0].label(), None);
        assert!(breakpoints[0].metadata.is_none());
        assert_eq!(breakpoints[0].expires_at().expect("timestamp"), None);
        assert!(breakpoints[0].enabled);
    }

    #[test]
    fn label_key_requires_function_name() {
        let config = BreakpointConfig {
            id: "bp".into(),
            label: Some("checkout".into()),
            ..Default::default()
        };
        assert_eq!(config.label_key(), None);

        let empty_label = BreakpointConfig {
            id: "bp".into(),
            function_name: "main.run".into(),
            label: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(empty_label.label_key(), None);
    }

    #[test]
    fn malformed_expiry_is_reported() {
        let config = BreakpointConfig {
            id: "bp".into(),
            expire_at: Some("next tuesday".into()),
            ..Default::default()
        };
        let err = config.expires_at().expect_err("should not parse");
        assert_eq!(err.raw, "next tuesday");
    }

    #[test]
    fn security_flag_uses_type_on_the_wire() {
        let flag = SecurityFlag {
            kind: "sensitive_variable_name".into(),
            severity: Severity::Medium,
            variable: "password".into(),
        };
        let json = facet_json::to_string(&flag).expect("encode");
        assert!(json.contains(r#""type":"sensitive_variable_name""#), "{json}");
        assert!(json.contains(r#""severity":"medium""#), "{json}");
    }

    #[test]
    fn snapshot_omits_empty_optional_fields() {
        let snapshot = Snapshot {
            breakpoint_id: "bp-1".into(),
            service_name: "checkout".into(),
            file_path: "payment.go".into(),
            line_number: 42,
            variables: ValueMap::new(),
            security_flags: Vec::new(),
            stack_trace: String::new(),
            trace_id: None,
            span_id: None,
            request_context: None,
            captured_at: "2030-01-01T00:00:00Z".into(),
        };
        let json = facet_json::to_string(&snapshot).expect("encode");
        assert!(!json.contains("trace_id"), "{json}");
        assert!(!json.contains("security_flags"), "{json}");
        assert!(json.contains(r#""line_number":42"#), "{json}");
    }

    #[test]
    fn timestamps_round_trip_through_rfc3339() {
        let at = parse_timestamp("2031-05-06T07:08:09.5+02:00").expect("parse");
        assert_eq!(format_timestamp(at), "2031-05-06T05:08:09.500Z");
    }
}
