use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A node in a state tree: named fields, nested compounds, typed arrays,
/// primitive leaves.
///
/// Compounds use `BTreeMap` so field iteration is deterministic across
/// platforms, which in turn makes the encoded form byte-stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tag {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Bytes(Vec<u8>),
    IntArray(Vec<i32>),
    List(Vec<Tag>),
    Compound(BTreeMap<String, Tag>),
}

impl Tag {
    /// Build a compound from `(name, value)` pairs.
    pub fn compound<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Tag)>,
        K: Into<String>,
    {
        Self::Compound(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, Self::Compound(_))
    }

    pub fn as_compound(&self) -> Option<&BTreeMap<String, Tag>> {
        match self {
            Self::Compound(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Tag]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> Option<i8> {
        match self {
            Self::Byte(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Fetch a named field from a compound; `None` for non-compounds.
    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.as_compound().and_then(|map| map.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_builder_and_get() {
        let tree = Tag::compound([
            ("id", Tag::Int(54)),
            ("variant", Tag::Byte(2)),
            ("label", Tag::Str("chest".into())),
        ]);
        assert_eq!(tree.get("id").and_then(Tag::as_int), Some(54));
        assert_eq!(tree.get("variant").and_then(Tag::as_byte), Some(2));
        assert_eq!(tree.get("label").and_then(Tag::as_str), Some("chest"));
        assert!(tree.get("missing").is_none());
    }

    #[test]
    fn compound_field_order_is_canonical() {
        let a = Tag::compound([("b", Tag::Int(2)), ("a", Tag::Int(1))]);
        let b = Tag::compound([("a", Tag::Int(1)), ("b", Tag::Int(2))]);
        assert_eq!(a, b);
    }

    #[test]
    fn non_compound_get_is_none() {
        assert!(Tag::Int(1).get("x").is_none());
        assert!(!Tag::List(vec![]).is_compound());
    }
}
