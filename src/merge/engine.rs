//! Three-way merge of two event streams since their common ancestor:
//! classifies per-entity changes, auto-merges what commutes, and
//! synthesizes conflicts for the rest.

use super::conflict::{Conflict, ConflictType, Resolution};
use super::state::Strategy;
use crate::event::{Event, Op, UpdateOp};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy)]
pub struct MergeOptions {
    pub strategy: Strategy,
    pub auto_merge_commutative: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::Manual,
            auto_merge_commutative: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeStats {
    pub from_ours: usize,
    pub from_theirs: usize,
    pub auto_merged: usize,
    pub entities_processed: usize,
}

#[derive(Debug, Clone)]
pub struct MergeResult {
    pub success: bool,
    pub merged_events: Vec<Event>,
    pub auto_merged: Vec<Event>,
    pub resolved: Vec<Event>,
    pub conflicts: Vec<Conflict>,
    pub stats: MergeStats,
}

pub struct MergeEngine {
    options: MergeOptions,
}

impl MergeEngine {
    pub fn new(options: MergeOptions) -> Self {
        Self { options }
    }

    pub fn merge(&self, ours: &[Event], theirs: &[Event]) -> MergeResult {
        let our_last = last_event_per_target(ours);
        let their_last = last_event_per_target(theirs);

        let mut targets: BTreeSet<&String> = our_last.keys().collect();
        targets.extend(their_last.keys());

        let mut merged_events = Vec::new();
        let mut auto_merged = Vec::new();
        let mut resolved = Vec::new();
        let mut conflicts = Vec::new();
        let mut stats = MergeStats::default();

        for target in targets {
            stats.entities_processed += 1;
            let our_event = our_last.get(target);
            let their_event = their_last.get(target);

            match (our_event, their_event) {
                (Some(e), None) => {
                    merged_events.push((*e).clone());
                    stats.from_ours += 1;
                }
                (None, Some(e)) => {
                    merged_events.push((*e).clone());
                    stats.from_theirs += 1;
                }
                (Some(o), Some(t)) => {
                    self.classify_and_resolve(
                        o,
                        t,
                        &mut merged_events,
                        &mut auto_merged,
                        &mut resolved,
                        &mut conflicts,
                        &mut stats,
                    );
                }
                (None, None) => unreachable!("target collected from a non-empty side"),
            }
        }

        MergeResult {
            success: conflicts.is_empty(),
            merged_events,
            auto_merged,
            resolved,
            conflicts,
            stats,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn classify_and_resolve(
        &self,
        ours: &Event,
        theirs: &Event,
        merged_events: &mut Vec<Event>,
        auto_merged: &mut Vec<Event>,
        resolved: &mut Vec<Event>,
        conflicts: &mut Vec<Conflict>,
        stats: &mut MergeStats,
    ) {
        match (ours.op, theirs.op) {
            (Op::Create, Op::Create) => {
                if ours.after == theirs.after {
                    merged_events.push(ours.clone());
                } else if let Some(event) = self.auto_resolve(ours, theirs) {
                    resolved.push(event.clone());
                    merged_events.push(event);
                } else {
                    conflicts.push(self.new_conflict(
                        ours,
                        theirs,
                        ConflictType::CreateCreate,
                        all_fields(ours, theirs),
                        None,
                    ));
                }
            }
            (Op::Delete, Op::Update) | (Op::Update, Op::Delete) => {
                if let Some(event) = self.auto_resolve(ours, theirs) {
                    resolved.push(event.clone());
                    merged_events.push(event);
                } else {
                    conflicts.push(self.new_conflict(
                        ours,
                        theirs,
                        ConflictType::DeleteUpdate,
                        all_fields(ours, theirs),
                        base_value(ours, theirs),
                    ));
                }
            }
            (Op::Update, Op::Update) => {
                let our_fields = ours.modified_fields();
                let their_fields = theirs.modified_fields();
                let overlap: BTreeSet<String> =
                    our_fields.intersection(&their_fields).cloned().collect();

                if overlap.is_empty() {
                    let merged = merge_disjoint(ours, theirs, &our_fields, &their_fields);
                    auto_merged.push(merged.clone());
                    merged_events.push(merged);
                    stats.auto_merged += 1;
                } else if self.options.auto_merge_commutative
                    && overlap
                        .iter()
                        .all(|f| is_inc_only(ours, f) && is_inc_only(theirs, f))
                {
                    let merged = merge_commutative_inc(ours, theirs, &our_fields, &their_fields);
                    auto_merged.push(merged.clone());
                    merged_events.push(merged);
                    stats.auto_merged += 1;
                } else if let Some(event) = self.auto_resolve(ours, theirs) {
                    resolved.push(event.clone());
                    merged_events.push(event);
                } else {
                    conflicts.push(self.new_conflict(
                        ours,
                        theirs,
                        ConflictType::ConcurrentUpdate,
                        overlap.into_iter().collect(),
                        base_value(ours, theirs),
                    ));
                }
            }
            // A create paired with an update/delete of the same target across
            // histories that otherwise never met is treated like a
            // concurrent update over the full field set: there is no shared
            // base to diff against.
            _ => {
                if let Some(event) = self.auto_resolve(ours, theirs) {
                    resolved.push(event.clone());
                    merged_events.push(event);
                } else {
                    conflicts.push(self.new_conflict(
                        ours,
                        theirs,
                        ConflictType::ConcurrentUpdate,
                        all_fields(ours, theirs),
                        None,
                    ));
                }
            }
        }
    }

    /// Auto-resolve a would-be conflict under a non-manual strategy. Returns
    /// `None` under `manual`, leaving the conflict for the caller.
    fn auto_resolve(&self, ours: &Event, theirs: &Event) -> Option<Event> {
        match self.options.strategy {
            Strategy::Manual => None,
            Strategy::Ours => Some(ours.clone()),
            Strategy::Theirs => Some(theirs.clone()),
            Strategy::Newest => {
                if event_timestamp(theirs) > event_timestamp(ours) {
                    Some(theirs.clone())
                } else {
                    Some(ours.clone())
                }
            }
        }
    }

    fn new_conflict(
        &self,
        ours: &Event,
        theirs: &Event,
        kind: ConflictType,
        fields: Vec<String>,
        base_value: Option<Value>,
    ) -> Conflict {
        Conflict {
            entity_id: ours.entity_id().to_string(),
            collection: ours.collection().to_string(),
            fields,
            kind,
            our_value: ours.after.clone().map(Value::Object),
            their_value: theirs.after.clone().map(Value::Object),
            base_value,
            resolved: false,
            resolution: None,
            resolved_value: None,
        }
    }
}

/// The effective value selected once a conflict's `resolution` is set,
/// mirroring the rule `ApplyMerge` uses: ours/theirs pick a recorded value,
/// manual uses the caller-supplied value, newest compares `value.ts` (or
/// falls back to the originating event's `ts`, tracked by the caller).
pub fn effective_value(conflict: &Conflict) -> Option<&Value> {
    match conflict.resolution {
        Some(Resolution::Ours) => conflict.our_value.as_ref(),
        Some(Resolution::Theirs) => conflict.their_value.as_ref(),
        Some(Resolution::Manual) => conflict.resolved_value.as_ref(),
        Some(Resolution::Newest) => {
            let our_ts = value_timestamp(conflict.our_value.as_ref());
            let their_ts = value_timestamp(conflict.their_value.as_ref());
            if their_ts > our_ts {
                conflict.their_value.as_ref()
            } else {
                conflict.our_value.as_ref()
            }
        }
        None => None,
    }
}

fn value_timestamp(value: Option<&Value>) -> i64 {
    value
        .and_then(|v| v.get("ts"))
        .and_then(Value::as_i64)
        .unwrap_or(i64::MIN)
}

fn event_timestamp(event: &Event) -> i64 {
    let from_value = event
        .after
        .as_ref()
        .and_then(|a| a.get("ts"))
        .and_then(Value::as_i64);
    from_value.unwrap_or(event.ts)
}

fn last_event_per_target(events: &[Event]) -> BTreeMap<String, &Event> {
    let mut out: BTreeMap<String, &Event> = BTreeMap::new();
    for event in events {
        out.entry(event.target.clone())
            .and_modify(|existing| {
                if event.ts >= existing.ts {
                    *existing = event;
                }
            })
            .or_insert(event);
    }
    out
}

fn all_fields(ours: &Event, theirs: &Event) -> Vec<String> {
    let mut fields: BTreeSet<String> = ours.modified_fields();
    fields.extend(theirs.modified_fields());
    fields.into_iter().collect()
}

fn base_value(ours: &Event, theirs: &Event) -> Option<Value> {
    ours.before
        .clone()
        .or_else(|| theirs.before.clone())
        .map(Value::Object)
}

fn is_inc_only(event: &Event, field: &str) -> bool {
    let update = event.effective_update();
    update.inc.contains_key(field) && !update.set.contains_key(field)
}

fn merge_disjoint(
    ours: &Event,
    theirs: &Event,
    our_fields: &BTreeSet<String>,
    their_fields: &BTreeSet<String>,
) -> Event {
    let our_update = ours.effective_update();
    let their_update = theirs.effective_update();
    let mut set = Map::new();
    let mut inc = Map::new();
    for field in our_fields {
        if let Some(v) = our_update.set.get(field) {
            set.insert(field.clone(), v.clone());
        }
        if let Some(v) = our_update.inc.get(field) {
            inc.insert(field.clone(), v.clone());
        }
    }
    for field in their_fields {
        if let Some(v) = their_update.set.get(field) {
            set.insert(field.clone(), v.clone());
        }
        if let Some(v) = their_update.inc.get(field) {
            inc.insert(field.clone(), v.clone());
        }
    }
    synthesized_update(ours, theirs, set, inc)
}

fn merge_commutative_inc(
    ours: &Event,
    theirs: &Event,
    our_fields: &BTreeSet<String>,
    their_fields: &BTreeSet<String>,
) -> Event {
    let our_update = ours.effective_update();
    let their_update = theirs.effective_update();
    let mut set = Map::new();
    let mut inc = Map::new();

    let mut all = our_fields.clone();
    all.extend(their_fields.iter().cloned());
    for field in all {
        let our_inc = our_update.inc.get(&field).and_then(Value::as_f64);
        let their_inc = their_update.inc.get(&field).and_then(Value::as_f64);
        match (our_inc, their_inc) {
            (Some(a), Some(b)) => {
                inc.insert(field, sum_as_json(a + b));
            }
            (Some(a), None) => {
                inc.insert(field, sum_as_json(a));
            }
            (None, Some(b)) => {
                inc.insert(field, sum_as_json(b));
            }
            (None, None) => {
                if let Some(v) = our_update.set.get(&field) {
                    set.insert(field, v.clone());
                } else if let Some(v) = their_update.set.get(&field) {
                    set.insert(field, v.clone());
                }
            }
        }
    }
    synthesized_update(ours, theirs, set, inc)
}

fn sum_as_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn synthesized_update(ours: &Event, theirs: &Event, set: Map<String, Value>, inc: Map<String, Value>) -> Event {
    let mut after = ours.after.clone().unwrap_or_default();
    for (k, v) in &set {
        after.insert(k.clone(), v.clone());
    }
    for (k, delta) in &inc {
        let base = after
            .get(k)
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let delta_v = delta.as_f64().unwrap_or(0.0);
        after.insert(k.clone(), sum_as_json(base + delta_v));
    }
    Event {
        id: format!("merge:{}", ours.id),
        ts: ours.ts.max(theirs.ts),
        op: Op::Update,
        target: ours.target.clone(),
        before: ours.before.clone(),
        after: Some(after),
        metadata: Some(crate::event::EventMetadata {
            update: Some(UpdateOp { set, inc }),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap as Map2;

    fn entity(fields: &[(&str, Value)]) -> Map<String, Value> {
        let mut m = Map::new();
        for (k, v) in fields {
            m.insert((*k).to_string(), v.clone());
        }
        m
    }

    fn update_event(id: &str, ts: i64, before: Map<String, Value>, set: &[(&str, Value)]) -> Event {
        let mut set_map = Map::new();
        for (k, v) in set {
            set_map.insert((*k).to_string(), v.clone());
        }
        let mut after = before.clone();
        for (k, v) in &set_map {
            after.insert(k.clone(), v.clone());
        }
        Event {
            id: id.into(),
            ts,
            op: Op::Update,
            target: "users:user1".into(),
            before: Some(before),
            after: Some(after),
            metadata: Some(crate::event::EventMetadata {
                update: Some(UpdateOp {
                    set: set_map,
                    inc: Map::new(),
                }),
            }),
        }
    }

    fn inc_event(id: &str, ts: i64, before: Map<String, Value>, field: &str, delta: i64) -> Event {
        let mut inc_map = Map::new();
        inc_map.insert(field.to_string(), json!(delta));
        let base = before.get(field).and_then(Value::as_i64).unwrap_or(0);
        let mut after = before.clone();
        after.insert(field.to_string(), json!(base + delta));
        Event {
            id: id.into(),
            ts,
            op: Op::Update,
            target: "counters:c1".into(),
            before: Some(before),
            after: Some(after),
            metadata: Some(crate::event::EventMetadata {
                update: Some(UpdateOp {
                    set: Map::new(),
                    inc: inc_map,
                }),
            }),
        }
    }

    #[test]
    fn empty_both_sides_merges_cleanly() {
        let engine = MergeEngine::new(MergeOptions::default());
        let result = engine.merge(&[], &[]);
        assert!(result.success);
        assert!(result.merged_events.is_empty());
        assert_eq!(result.stats.entities_processed, 0);
    }

    #[test]
    fn disjoint_fields_auto_merge() {
        let base = entity(&[
            ("name", json!("User")),
            ("email", json!("old@x")),
            ("role", json!("user")),
        ]);
        let ours = update_event("o1", 1, base.clone(), &[("email", json!("new@x"))]);
        let theirs = update_event("t1", 2, base, &[("role", json!("admin"))]);

        let engine = MergeEngine::new(MergeOptions::default());
        let result = engine.merge(&[ours], &[theirs]);
        assert!(result.success);
        assert_eq!(result.auto_merged.len(), 1);
        let after = result.auto_merged[0].after.as_ref().unwrap();
        assert_eq!(after.get("email"), Some(&json!("new@x")));
        assert_eq!(after.get("role"), Some(&json!("admin")));
    }

    #[test]
    fn commutative_inc_sums_both_sides() {
        let base = {
            let mut m = Map2::new();
            m.insert("counter", json!(0));
            let mut map = Map::new();
            for (k, v) in m {
                map.insert(k.to_string(), v);
            }
            map
        };
        let ours = inc_event("o1", 1, base.clone(), "counter", 5);
        let theirs = inc_event("t1", 2, base, "counter", 3);

        let engine = MergeEngine::new(MergeOptions::default());
        let result = engine.merge(&[ours], &[theirs]);
        assert!(result.success);
        assert_eq!(result.auto_merged.len(), 1);
        assert_eq!(
            result.auto_merged[0].after.as_ref().unwrap().get("counter"),
            Some(&json!(8))
        );
    }

    #[test]
    fn same_field_concurrent_update_conflicts_under_manual() {
        let base = entity(&[("name", json!("Original"))]);
        let ours = update_event("o1", 1, base.clone(), &[("name", json!("A"))]);
        let theirs = update_event("t1", 2, base, &[("name", json!("B"))]);

        let engine = MergeEngine::new(MergeOptions {
            strategy: Strategy::Manual,
            auto_merge_commutative: true,
        });
        let result = engine.merge(&[ours], &[theirs]);
        assert!(!result.success);
        assert_eq!(result.conflicts.len(), 1);
        let c = &result.conflicts[0];
        assert_eq!(c.kind, ConflictType::ConcurrentUpdate);
        assert_eq!(c.fields, vec!["name".to_string()]);
        assert_eq!(c.our_value.as_ref().unwrap().get("name"), Some(&json!("A")));
        assert_eq!(c.their_value.as_ref().unwrap().get("name"), Some(&json!("B")));
    }

    #[test]
    fn ours_strategy_auto_resolves_conflicts() {
        let base = entity(&[("name", json!("Original"))]);
        let ours = update_event("o1", 1, base.clone(), &[("name", json!("A"))]);
        let theirs = update_event("t1", 2, base, &[("name", json!("B"))]);

        let engine = MergeEngine::new(MergeOptions {
            strategy: Strategy::Ours,
            auto_merge_commutative: true,
        });
        let result = engine.merge(&[ours], &[theirs]);
        assert!(result.success);
        assert_eq!(result.resolved.len(), 1);
        assert_eq!(
            result.resolved[0].after.as_ref().unwrap().get("name"),
            Some(&json!("A"))
        );
    }

    #[test]
    fn one_sided_changes_pass_through() {
        let base = entity(&[("name", json!("Original"))]);
        let ours = update_event("o1", 1, base, &[("name", json!("A"))]);
        let engine = MergeEngine::new(MergeOptions::default());
        let result = engine.merge(&[ours], &[]);
        assert!(result.success);
        assert_eq!(result.merged_events.len(), 1);
        assert_eq!(result.stats.from_ours, 1);
    }
}
