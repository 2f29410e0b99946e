//! Query filter model: per-property match tokens combined with AND/OR

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A single match token against one property.
///
/// The default reading of a token is substring containment; wrapping a
/// token in `eq(...)` requests exact equality instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchToken {
    Contains(String),
    Equals(String),
}

impl MatchToken {
    /// Parse one raw token. `eq(beta)` becomes an equality token with
    /// payload `beta`; anything else is a containment token.
    pub fn parse(raw: &str) -> MatchToken {
        if let Some(inner) = raw.strip_prefix("eq(").and_then(|rest| rest.strip_suffix(')')) {
            MatchToken::Equals(inner.to_string())
        } else {
            MatchToken::Contains(raw.to_string())
        }
    }

    /// The token payload without the operator wrapper.
    pub fn payload(&self) -> &str {
        match self {
            MatchToken::Contains(s) | MatchToken::Equals(s) => s,
        }
    }

    pub fn is_equality(&self) -> bool {
        matches!(self, MatchToken::Equals(_))
    }
}

impl fmt::Display for MatchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchToken::Contains(s) => write!(f, "{}", s),
            MatchToken::Equals(s) => write!(f, "eq({})", s),
        }
    }
}

/// Page ordering for query results. Ties on the timestamp break on id
/// so pagination stays stable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    CreatedDesc,
    CreatedAsc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "desc" | "newest" => Ok(SortOrder::CreatedDesc),
            "asc" | "oldest" => Ok(SortOrder::CreatedAsc),
            _ => Err(format!("unknown sort order: '{}' (valid: asc, desc)", s)),
        }
    }
}

/// A filter over the instances of one task.
///
/// Terms are keyed by property name; tokens for the same property are
/// OR-ed together and distinct properties are AND-ed.
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    pub terms: BTreeMap<String, Vec<MatchToken>>,
    pub limit: Option<i64>,
    pub offset: i64,
    pub order: SortOrder,
}

impl InstanceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one token for a property, creating the term if needed.
    pub fn add_token(&mut self, property: &str, token: MatchToken) {
        self.terms
            .entry(property.to_string())
            .or_default()
            .push(token);
    }

    /// Parse a `property=token` pair as passed on the command line.
    pub fn parse_term(&mut self, raw: &str) -> Result<(), String> {
        let (name, token) = raw
            .split_once('=')
            .ok_or_else(|| format!("expected property=token, got '{}'", raw))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("expected property=token, got '{}'", raw));
        }
        self.add_token(name, MatchToken::parse(token));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}
