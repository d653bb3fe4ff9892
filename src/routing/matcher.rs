//! Path pattern matching for task routes.
//!
//! # Responsibilities
//! - Parse configured patterns such as `/api/v1/tasks/{type}/execute`
//! - Capture the task type segment from a request path
//!
//! # Design Decisions
//! - Segment-wise comparison, no regex, O(segments) per pattern
//! - Exactly one `{type}` placeholder per pattern
//! - A trailing `*` matches one or more remaining segments
//! - Captured types are restricted to `[A-Za-z0-9_-]`

/// Placeholder that captures the task type.
pub const TYPE_PLACEHOLDER: &str = "{type}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Type,
}

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
    trailing_wildcard: bool,
}

impl PathPattern {
    /// Compile a pattern. Fails when the shape is not usable for routing.
    pub fn parse(pattern: &str) -> Result<Self, String> {
        let body = pattern
            .strip_prefix('/')
            .ok_or_else(|| format!("pattern '{}' must start with '/'", pattern))?;

        let mut parts: Vec<&str> = body.split('/').collect();
        let trailing_wildcard = parts.last() == Some(&"*");
        if trailing_wildcard {
            parts.pop();
        }

        let mut segments = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                "" => return Err(format!("pattern '{}' has an empty segment", pattern)),
                "*" => return Err(format!("pattern '{}': '*' is only allowed last", pattern)),
                TYPE_PLACEHOLDER => segments.push(Segment::Type),
                p if p.contains('{') || p.contains('}') => {
                    return Err(format!("pattern '{}': unknown placeholder '{}'", pattern, p))
                }
                p => segments.push(Segment::Literal(p.to_string())),
            }
        }

        match segments.iter().filter(|s| **s == Segment::Type).count() {
            1 => Ok(Self {
                segments,
                trailing_wildcard,
            }),
            0 => Err(format!("pattern '{}' has no {} segment", pattern, TYPE_PLACEHOLDER)),
            _ => Err(format!("pattern '{}' has more than one {} segment", pattern, TYPE_PLACEHOLDER)),
        }
    }

    /// Returns the task type if `path` matches.
    pub fn captures(&self, path: &str) -> Option<String> {
        let rest = path.strip_prefix('/')?;
        let mut parts = rest.split('/');
        let mut captured = None;

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Type if is_valid_type(part) => captured = Some(part.to_string()),
                Segment::Type => return None,
            }
        }

        let remaining: Vec<&str> = parts.collect();
        if self.trailing_wildcard {
            // `/tasks/{type}/*` needs at least one non-empty segment after the type.
            if remaining.is_empty() || remaining.iter().all(|p| p.is_empty()) {
                return None;
            }
        } else if !(remaining.is_empty() || remaining == [""]) {
            return None;
        }

        captured
    }
}

fn is_valid_type(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
