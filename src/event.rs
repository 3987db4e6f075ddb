//! Per-entity change records and their NDJSON segment encoding.

use crate::error::{DbError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// A document: arbitrary JSON fields keyed by name.
pub type Entity = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Op {
    Create,
    Update,
    Delete,
}

/// Field-level update operations. The closed set is `$set`/`$inc`; their
/// commutativity properties feed the merge engine's classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateOp {
    #[serde(rename = "$set", default, skip_serializing_if = "Map::is_empty")]
    pub set: Map<String, Value>,
    #[serde(rename = "$inc", default, skip_serializing_if = "Map::is_empty")]
    pub inc: Map<String, Value>,
}

impl UpdateOp {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.inc.is_empty()
    }

    /// Field names touched by this update, from either operation map.
    pub fn touched_fields(&self) -> BTreeSet<String> {
        self.set.keys().chain(self.inc.keys()).cloned().collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<UpdateOp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub ts: i64,
    pub op: Op,
    /// `"<collection>:<id>"`.
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
}

impl Event {
    /// Validate the op-specific before/after invariants.
    pub fn validate(&self) -> Result<()> {
        match self.op {
            Op::Create => {
                if self.after.is_none() || self.before.is_some() {
                    return Err(DbError::InvalidArgument(
                        "CREATE event must have `after` and no `before`".into(),
                    ));
                }
            }
            Op::Delete => {
                if self.before.is_none() || self.after.is_some() {
                    return Err(DbError::InvalidArgument(
                        "DELETE event must have `before` and no `after`".into(),
                    ));
                }
            }
            Op::Update => {
                if self.before.is_none() || self.after.is_none() {
                    return Err(DbError::InvalidArgument(
                        "UPDATE event must have both `before` and `after`".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn collection(&self) -> &str {
        self.target.split(':').next().unwrap_or("")
    }

    pub fn entity_id(&self) -> &str {
        self.target.splitn(2, ':').nth(1).unwrap_or("")
    }

    /// Fields this event touches, used by the merge engine's update-update
    /// classification. Prefers `metadata.update`; falls back to diffing
    /// `before`/`after` and treating every differing or removed key as an
    /// implicit `$set`.
    pub fn modified_fields(&self) -> BTreeSet<String> {
        if let Some(meta) = &self.metadata {
            if let Some(update) = &meta.update {
                if !update.is_empty() {
                    return update.touched_fields();
                }
            }
        }
        let mut fields = BTreeSet::new();
        if let (Some(before), Some(after)) = (&self.before, &self.after) {
            for (k, v) in after {
                if before.get(k) != Some(v) {
                    fields.insert(k.clone());
                }
            }
            for k in before.keys() {
                if !after.contains_key(k) {
                    fields.insert(k.clone());
                }
            }
        }
        fields
    }

    /// Treat `modified_fields` as an implicit `$set` when no explicit
    /// update metadata is present.
    pub fn effective_update(&self) -> UpdateOp {
        if let Some(meta) = &self.metadata {
            if let Some(update) = &meta.update {
                if !update.is_empty() {
                    return update.clone();
                }
            }
        }
        let mut set = Map::new();
        if let Some(after) = &self.after {
            for field in self.modified_fields() {
                if let Some(v) = after.get(&field) {
                    set.insert(field, v.clone());
                }
            }
        }
        UpdateOp {
            set,
            inc: Map::new(),
        }
    }
}

/// Header line of an NDJSON event segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentHeader {
    pub source_id: String,
    pub created_at: i64,
    pub batch_seq: u64,
}

/// Encode a segment: header line followed by one JSON line per event.
/// Tolerates (and produces) zero-event segments — header only, no body.
pub fn encode_segment(header: &SegmentHeader, events: &[Event]) -> Result<Vec<u8>> {
    let mut out = serde_json::to_vec(header)?;
    out.push(b'\n');
    for event in events {
        let mut line = serde_json::to_vec(event)?;
        out.append(&mut line);
        out.push(b'\n');
    }
    Ok(out)
}

/// Decode a segment, tolerating trailing blank lines.
pub fn decode_segment(data: &[u8]) -> Result<(SegmentHeader, Vec<Event>)> {
    let text = std::str::from_utf8(data)
        .map_err(|e| DbError::Corruption(format!("event segment is not UTF-8: {e}")))?;
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header_line = lines
        .next()
        .ok_or_else(|| DbError::Corruption("event segment missing header".into()))?;
    let header: SegmentHeader = serde_json::from_str(header_line)?;
    let mut events = Vec::new();
    for line in lines {
        let event: Event = serde_json::from_str(line)?;
        events.push(event);
    }
    Ok((header, events))
}
