// src/build/identity.rs

//! Reproducible build identity
//!
//! A build's inputs are collected into a nested [`IdentityItem`] and hashed
//! into the package version. The hash depends only on content, never on
//! insertion order:
//!
//! - strings hash their UTF-8 bytes
//! - integers hash their decimal string form
//! - lists hash the comma-joined, sorted hashes of their elements
//! - maps hash the comma-joined `key=hash(value)` entries in key order

use crate::hash::hash_str;
use std::collections::BTreeMap;

/// One node of a build's input description
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityItem {
    Str(String),
    Int(i64),
    List(Vec<IdentityItem>),
    Map(BTreeMap<String, IdentityItem>),
}

impl IdentityItem {
    pub fn hash(&self) -> String {
        match self {
            Self::Str(s) => hash_str(s),
            Self::Int(i) => hash_str(&i.to_string()),
            Self::List(items) => {
                let mut hashes: Vec<String> = items.iter().map(IdentityItem::hash).collect();
                hashes.sort();
                hash_str(&hashes.join(","))
            }
            Self::Map(map) => {
                let entries: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v.hash()))
                    .collect();
                hash_str(&entries.join(","))
            }
        }
    }

    /// Plain JSON rendering, written next to a build for auditing
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::List(items) => {
                serde_json::Value::Array(items.iter().map(IdentityItem::to_json).collect())
            }
            Self::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<&str> for IdentityItem {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for IdentityItem {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for IdentityItem {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl<T: Into<IdentityItem>> From<Vec<T>> for IdentityItem {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<IdentityItem>> From<BTreeMap<String, T>> for IdentityItem {
    fn from(map: BTreeMap<String, T>) -> Self {
        Self::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, IdentityItem)]) -> IdentityItem {
        IdentityItem::Map(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_string_and_int() {
        assert_eq!(IdentityItem::from("abc").hash(), hash_str("abc"));
        assert_eq!(IdentityItem::Int(42).hash(), hash_str("42"));
    }

    #[test]
    fn test_map_layout() {
        let item = map(&[("b", "2".into()), ("a", "1".into())]);
        let expected = hash_str(&format!("a={},b={}", hash_str("1"), hash_str("2")));
        assert_eq!(item.hash(), expected);
    }

    #[test]
    fn test_list_is_order_independent() {
        let forward = IdentityItem::from(vec!["mesos--1", "zk--2", "java--8"]);
        let backward = IdentityItem::from(vec!["java--8", "zk--2", "mesos--1"]);
        assert_eq!(forward.hash(), backward.hash());
        assert_ne!(forward.hash(), IdentityItem::from(vec!["mesos--1"]).hash());
    }

    #[test]
    fn test_nested_changes_propagate() {
        let build = |commit: &str| {
            map(&[
                ("sources", map(&[("mesos", map(&[("commit", commit.into())]))])),
                ("requires", IdentityItem::from(vec!["java--8"])),
            ])
        };
        assert_eq!(build("aaaa").hash(), build("aaaa").hash());
        assert_ne!(build("aaaa").hash(), build("bbbb").hash());
    }

    #[test]
    fn test_to_json() {
        let item = map(&[("n", IdentityItem::Int(1)), ("l", vec!["x"].into())]);
        assert_eq!(item.to_json(), serde_json::json!({"n": 1, "l": ["x"]}));
    }
}
