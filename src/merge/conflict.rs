//! Conflict records and the pattern-based lookup used to resolve them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    ConcurrentUpdate,
    DeleteUpdate,
    CreateCreate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Ours,
    Theirs,
    Newest,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub entity_id: String,
    pub collection: String,
    pub fields: Vec<String>,
    #[serde(rename = "type")]
    pub kind: ConflictType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub our_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub their_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_value: Option<Value>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_value: Option<Value>,
}

impl Conflict {
    /// `collection/entity_id`, used as the pattern-matching key.
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.entity_id)
    }
}

/// Bounded matcher for conflict selection: exact `collection/id`, a
/// single-level wildcard `collection/*`, or the global wildcard `*`.
/// Deliberately not a regex engine.
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return path
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(|rest| !rest.contains('/'))
            .unwrap_or(false);
    }
    pattern == path
}

/// Select conflicts whose path matches `pattern`.
pub fn conflicts_by_pattern<'a>(conflicts: &'a [Conflict], pattern: &str) -> Vec<&'a Conflict> {
    conflicts
        .iter()
        .filter(|c| pattern_matches(pattern, &c.path()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict(collection: &str, id: &str) -> Conflict {
        Conflict {
            entity_id: id.into(),
            collection: collection.into(),
            fields: vec!["name".into()],
            kind: ConflictType::ConcurrentUpdate,
            our_value: None,
            their_value: None,
            base_value: None,
            resolved: false,
            resolution: None,
            resolved_value: None,
        }
    }

    #[test]
    fn exact_match() {
        assert!(pattern_matches("posts/1", "posts/1"));
        assert!(!pattern_matches("posts/1", "posts/2"));
    }

    #[test]
    fn single_level_wildcard() {
        assert!(pattern_matches("posts/*", "posts/1"));
        assert!(!pattern_matches("posts/*", "users/1"));
        assert!(!pattern_matches("posts/*", "posts/1/nested"));
    }

    #[test]
    fn global_wildcard() {
        assert!(pattern_matches("*", "anything/at/all"));
    }

    #[test]
    fn selection_filters_correctly() {
        let conflicts = vec![conflict("posts", "1"), conflict("users", "2")];
        let selected = conflicts_by_pattern(&conflicts, "posts/*");
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].collection, "posts");
    }
}
