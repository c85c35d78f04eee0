//! Path segment matching.
//!
//! # Responsibilities
//! - Parse route paths into literal and parameter segments
//! - Match one request path segment against a route segment
//!
//! # Design Decisions
//! - Literal matching is case-sensitive
//! - `{name}` captures exactly one segment
//! - Empty segments are ignored, so `/a//b/` equals `/a/b`

use crate::routing::RoutingError;

/// One segment of a route path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Matches the same text only.
    Literal(String),
    /// Matches any single segment and captures it under the name.
    Parameter(String),
}

impl Segment {
    /// Parse one raw segment.
    pub fn parse(raw: &str) -> Result<Self, RoutingError> {
        if let Some(name) = raw.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
            if name.is_empty() || name.contains(['{', '}']) {
                return Err(RoutingError::InvalidPath(raw.to_string()));
            }
            return Ok(Segment::Parameter(name.to_string()));
        }
        if raw.contains(['{', '}']) {
            return Err(RoutingError::InvalidPath(raw.to_string()));
        }
        Ok(Segment::Literal(raw.to_string()))
    }

    /// True if `value` satisfies this segment.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Segment::Literal(text) => text == value,
            Segment::Parameter(_) => !value.is_empty(),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Segment::Literal(_))
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Segment::Literal(text) => f.write_str(text),
            Segment::Parameter(name) => write!(f, "{{{}}}", name),
        }
    }
}

/// Non-empty segments of `path`.
pub fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Parse every segment of a route path.
pub fn parse_path(path: &str) -> Result<Vec<Segment>, RoutingError> {
    split_path(path).map(Segment::parse).collect()
}
