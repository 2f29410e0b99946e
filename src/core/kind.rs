//! Property data kinds and typed property values

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declared data kind of a property.
///
/// Scalar kinds occupy one slot column in the canonical wide row; the
/// list kind lives entirely in the list-value store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Text,
    Integer,
    Real,
    Boolean,
    TextList,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Text => "text",
            DataKind::Integer => "integer",
            DataKind::Real => "real",
            DataKind::Boolean => "boolean",
            DataKind::TextList => "text_list",
        }
    }

    /// Get all supported kinds
    pub fn all() -> &'static [DataKind] {
        &[
            DataKind::Text,
            DataKind::Integer,
            DataKind::Real,
            DataKind::Boolean,
            DataKind::TextList,
        ]
    }

    /// Whether properties of this kind may join a secondary index.
    ///
    /// Booleans are cheap to scan in the wide row and never get index
    /// rows; everything else maps to one of the typed value tables.
    pub fn is_indexable(&self) -> bool {
        !matches!(self, DataKind::Boolean)
    }

    /// Whether values of this kind are ordered element lists.
    pub fn is_listable(&self) -> bool {
        matches!(self, DataKind::TextList)
    }

    /// Typed index-value table backing this kind, if indexable.
    pub fn index_table(&self) -> Option<&'static str> {
        match self {
            DataKind::Text | DataKind::TextList => Some("index_text_values"),
            DataKind::Integer => Some("index_integer_values"),
            DataKind::Real => Some("index_real_values"),
            DataKind::Boolean => None,
        }
    }

    /// Wide-row column family for scalar kinds (list values have no slot).
    pub fn column_family(&self) -> Option<&'static str> {
        match self {
            DataKind::Text => Some("text_value"),
            DataKind::Integer => Some("integer_value"),
            DataKind::Real => Some("real_value"),
            DataKind::Boolean => Some("boolean_value"),
            DataKind::TextList => None,
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(DataKind::Text),
            "integer" | "int" => Ok(DataKind::Integer),
            "real" | "float" => Ok(DataKind::Real),
            "boolean" | "bool" => Ok(DataKind::Boolean),
            "text_list" | "text-list" | "list" => Ok(DataKind::TextList),
            _ => Err(format!(
                "unknown data kind: '{}' (valid: text, integer, real, boolean, text_list)",
                s
            )),
        }
    }
}

/// Visibility scope of a property. Stored and reported as-is; the
/// engine itself never filters on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Internal,
    Hidden,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Internal => "internal",
            Visibility::Hidden => "hidden",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "internal" => Ok(Visibility::Internal),
            "hidden" => Ok(Visibility::Hidden),
            _ => Err(format!(
                "unknown visibility: '{}' (valid: public, internal, hidden)",
                s
            )),
        }
    }
}

/// A typed property value carried through create/patch payloads and
/// returned by reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    TextList(Vec<String>),
}

impl PropertyValue {
    /// The kind this value naturally belongs to.
    pub fn kind(&self) -> DataKind {
        match self {
            PropertyValue::Text(_) => DataKind::Text,
            PropertyValue::Integer(_) => DataKind::Integer,
            PropertyValue::Real(_) => DataKind::Real,
            PropertyValue::Boolean(_) => DataKind::Boolean,
            PropertyValue::TextList(_) => DataKind::TextList,
        }
    }

    /// Conform this value to a declared kind, widening integers to
    /// reals where needed. Returns `None` on a genuine mismatch.
    pub fn conform(self, kind: DataKind) -> Option<PropertyValue> {
        match (self, kind) {
            (v @ PropertyValue::Text(_), DataKind::Text) => Some(v),
            (v @ PropertyValue::Integer(_), DataKind::Integer) => Some(v),
            (PropertyValue::Integer(i), DataKind::Real) => Some(PropertyValue::Real(i as f64)),
            (v @ PropertyValue::Real(_), DataKind::Real) => Some(v),
            (v @ PropertyValue::Boolean(_), DataKind::Boolean) => Some(v),
            (v @ PropertyValue::TextList(_), DataKind::TextList) => Some(v),
            _ => None,
        }
    }

    /// Build a value from a loosely typed JSON node (CLI `--set`,
    /// import files). `null` maps to `None`.
    pub fn from_json(value: serde_json::Value) -> Option<PropertyValue> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(PropertyValue::Boolean(b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(PropertyValue::Integer(i))
                } else {
                    n.as_f64().map(PropertyValue::Real)
                }
            }
            serde_json::Value::String(s) => Some(PropertyValue::Text(s)),
            serde_json::Value::Array(items) => {
                let mut elements = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        serde_json::Value::String(s) => elements.push(s),
                        other => elements.push(other.to_string()),
                    }
                }
                Some(PropertyValue::TextList(elements))
            }
            serde_json::Value::Object(_) => None,
        }
    }

    /// Render for tables and terse output.
    pub fn render(&self) -> String {
        match self {
            PropertyValue::Text(s) => s.clone(),
            PropertyValue::Integer(i) => i.to_string(),
            PropertyValue::Real(f) => f.to_string(),
            PropertyValue::Boolean(b) => b.to_string(),
            PropertyValue::TextList(items) => items.join(", "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_string_roundtrip() {
        for kind in DataKind::all() {
            let parsed: DataKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, *kind);
        }
    }

    #[test]
    fn test_kind_aliases() {
        assert_eq!("int".parse::<DataKind>().unwrap(), DataKind::Integer);
        assert_eq!("bool".parse::<DataKind>().unwrap(), DataKind::Boolean);
        assert_eq!("list".parse::<DataKind>().unwrap(), DataKind::TextList);
        assert!("blob".parse::<DataKind>().is_err());
    }

    #[test]
    fn test_boolean_is_not_indexable() {
        assert!(!DataKind::Boolean.is_indexable());
        assert!(DataKind::Boolean.index_table().is_none());
        for kind in [DataKind::Text, DataKind::Integer, DataKind::Real, DataKind::TextList] {
            assert!(kind.is_indexable());
            assert!(kind.index_table().is_some());
        }
    }

    #[test]
    fn test_list_kind_has_no_slot_family() {
        assert!(DataKind::TextList.column_family().is_none());
        assert_eq!(DataKind::Integer.column_family(), Some("integer_value"));
    }

    #[test]
    fn test_text_list_shares_text_index_table() {
        assert_eq!(
            DataKind::TextList.index_table(),
            DataKind::Text.index_table()
        );
    }

    #[test]
    fn test_value_conform() {
        assert_eq!(
            PropertyValue::Integer(3).conform(DataKind::Real),
            Some(PropertyValue::Real(3.0))
        );
        assert_eq!(
            PropertyValue::Text("x".into()).conform(DataKind::Text),
            Some(PropertyValue::Text("x".into()))
        );
        assert!(PropertyValue::Text("x".into())
            .conform(DataKind::Integer)
            .is_none());
        assert!(PropertyValue::Real(1.5)
            .conform(DataKind::Integer)
            .is_none());
    }

    #[test]
    fn test_value_untagged_json() {
        let v: PropertyValue = serde_json::from_str("5").unwrap();
        assert_eq!(v, PropertyValue::Integer(5));
        let v: PropertyValue = serde_json::from_str("5.5").unwrap();
        assert_eq!(v, PropertyValue::Real(5.5));
        let v: PropertyValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, PropertyValue::Boolean(true));
        let v: PropertyValue = serde_json::from_str("\"hi\"").unwrap();
        assert_eq!(v, PropertyValue::Text("hi".into()));
        let v: PropertyValue = serde_json::from_str("[\"a\",\"b\"]").unwrap();
        assert_eq!(v, PropertyValue::TextList(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn test_value_from_json_null_clears() {
        assert!(PropertyValue::from_json(serde_json::Value::Null).is_none());
    }
}
