//! `Repository`: the write/query surface that wires the commit graph (C1),
//! the storage backend (C2) and columnar shredding/pushdown (C3) together.
//! Every other module in this crate is usable standalone; this is where
//! they compose into the thing a caller actually opens.

use crate::branch::BranchManager;
use crate::commit::{Commit, CollectionState, DatabaseState, EventLogPosition};
use crate::commit_store::CommitStore;
use crate::config::ShredPolicy;
use crate::error::{DbError, Result};
use crate::event::{decode_segment, encode_segment, Entity, Event, Op, SegmentHeader};
use crate::filter::{evaluate, Filter};
use crate::hash::{content_hash, Hash};
use crate::merge::{
    ApplyMerge, Conflict, MergeEngine, MergeOptions, MergeResult, MergeState, MergeStateStore,
    Resolution,
};
use crate::parquet_codec::{ParquetCodec, Row as ParquetRow};
use crate::pushdown::{Effectiveness, PredicatePushdown};
use crate::refs::RefStore;
use crate::schema::{ShreddingPlan, ShreddingPlanner, TypeDefinition};
use crate::storage::{StorageBackend, WriteOptions};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

fn events_path(collection: &str, segment_id: &str) -> String {
    format!("events/{collection}/{segment_id}")
}

fn data_path(hash: &Hash) -> String {
    format!("data/{hash}.parquet")
}

/// Outcome of `Repository::merge`: either a fast-forward, an immediate
/// conflict-free merge commit, or a set of conflicts left for the caller to
/// resolve via `resolve_conflict`/`complete_merge`.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub fast_forwarded: bool,
    pub commit: Option<Hash>,
    pub conflicts: Vec<Conflict>,
}

pub struct Repository {
    storage: Box<dyn StorageBackend>,
    schemas: Mutex<HashMap<String, TypeDefinition>>,
    shred_policy: Mutex<ShredPolicy>,
}

impl Repository {
    /// Open an existing repository, or create `main` + a root commit if the
    /// backend is empty. Idempotent: safe to call on every process start.
    pub fn init(storage: Box<dyn StorageBackend>) -> Result<Self> {
        let repo = Self {
            storage,
            schemas: Mutex::new(HashMap::new()),
            shred_policy: Mutex::new(ShredPolicy::default()),
        };
        let refs = repo.refs();
        if refs.ref_exists("main")? {
            return Ok(repo);
        }
        let root = Commit::new(vec![], "init".into(), "system".into(), 0, DatabaseState::default());
        repo.commits().save(&root)?;
        refs.update_ref("main", &root.hash, None)?;
        refs.set_head("main")?;
        Ok(repo)
    }

    pub fn open(storage: Box<dyn StorageBackend>) -> Self {
        Self {
            storage,
            schemas: Mutex::new(HashMap::new()),
            shred_policy: Mutex::new(ShredPolicy::default()),
        }
    }

    /// Register a collection's field definitions, used to plan shredding.
    /// Collections must be defined before their first `commit_events` call.
    pub fn define_collection(&self, type_def: TypeDefinition) {
        self.schemas.lock().unwrap().insert(type_def.name.clone(), type_def);
    }

    pub fn set_shred_policy(&self, policy: ShredPolicy) {
        *self.shred_policy.lock().unwrap() = policy;
    }

    fn refs(&self) -> RefStore<'_> {
        RefStore::new(self.storage.as_ref())
    }

    fn commits(&self) -> CommitStore<'_> {
        CommitStore::new(self.storage.as_ref())
    }

    pub fn branches(&self) -> BranchManager<'_> {
        BranchManager::new(self.storage.as_ref())
    }

    pub fn head_commit(&self) -> Result<Commit> {
        let hash = self.refs().resolve_head()?;
        self.commits().load(&hash)
    }

    fn branch_commit(&self, branch: &str) -> Result<Commit> {
        let hash = self.refs().resolve_ref(branch)?;
        self.commits().load(&hash)
    }

    fn shredding_plan(&self, collection: &str) -> Result<ShreddingPlan> {
        let schemas = self.schemas.lock().unwrap();
        let type_def = schemas
            .get(collection)
            .ok_or_else(|| DbError::NotFound(format!("collection schema {collection}")))?;
        let policy = self.shred_policy.lock().unwrap();
        Ok(ShreddingPlanner::plan(type_def, policy.for_collection(collection)))
    }

    /// Materialize every live (non soft-deleted) document of a collection as
    /// of `state`, keyed by entity id. A collection with no committed data
    /// file yet materializes to an empty set.
    fn materialize(&self, state: &DatabaseState, collection: &str) -> Result<BTreeMap<String, Entity>> {
        let Some(coll_state) = state.collections.get(collection) else {
            return Ok(BTreeMap::new());
        };
        let plan = self.shredding_plan(collection)?;
        let data = self.storage.read(&data_path(&coll_state.data_hash))?;
        let rows = ParquetCodec::decode(&data, &plan)?;
        Ok(rows
            .into_iter()
            .filter(|r| r.deleted_at.is_none())
            .map(|r| (r.id.clone(), r.fields))
            .collect())
    }

    /// Validate and apply `events` against `branch`'s current collection
    /// state, re-shred and commit the result, and advance `branch` to the
    /// new commit.
    pub fn commit_events(
        &self,
        branch: &str,
        collection: &str,
        events: Vec<Event>,
        message: String,
        author: String,
        ts: i64,
    ) -> Result<Hash> {
        for event in &events {
            event.validate()?;
        }
        let refs = self.refs();
        let current_hash = refs.resolve_ref(branch)?;
        let current = self.commits().load(&current_hash)?;

        let mut documents = self.materialize(&current.state, collection)?;
        apply_events_to_documents(&mut documents, &events, ts, &author);

        let new_state = self.write_collection(&current.state, collection, &documents, &events)?;

        let commit = Commit::new(vec![current_hash], message, author, ts, new_state);
        self.commits().save(&commit)?;
        let expected = refs.ref_etag(branch)?;
        refs.update_ref(branch, &commit.hash, Some(&expected))?;
        Ok(commit.hash)
    }

    /// Re-shred `documents`, write the resulting Parquet data file (a
    /// no-op if that exact content is already stored, since the path is
    /// content-addressed), append `events` to the collection's event log,
    /// and return the updated `DatabaseState`.
    fn write_collection(
        &self,
        base_state: &DatabaseState,
        collection: &str,
        documents: &BTreeMap<String, Entity>,
        events: &[Event],
    ) -> Result<DatabaseState> {
        let plan = self.shredding_plan(collection)?;
        let rows: Vec<ParquetRow> = documents.iter().map(|(id, fields)| entity_to_row(id, fields)).collect();
        let live_count = rows.iter().filter(|r| r.deleted_at.is_none()).count();
        let data = ParquetCodec::encode(&plan, &rows)?;
        let data_hash = content_hash(&data);
        match self.storage.write(&data_path(&data_hash), &data, &WriteOptions::if_not_exists()) {
            Ok(_) | Err(DbError::AlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }

        let segment_id = uuid::Uuid::new_v4().to_string();
        let header = SegmentHeader {
            source_id: segment_id.clone(),
            created_at: events.first().map(|e| e.ts).unwrap_or(0),
            batch_seq: 0,
        };
        let segment = encode_segment(&header, events)?;
        self.storage.write_atomic(&events_path(collection, &segment_id), &segment)?;

        let mut state = base_state.clone();
        state.collections.insert(
            collection.to_string(),
            CollectionState {
                data_hash,
                schema_hash: content_hash(format!("{:?}", plan.fields).as_bytes()),
                row_count: live_count as u64,
            },
        );
        state.event_log_position = EventLogPosition {
            segment_id,
            offset: events.len() as u64,
        };
        Ok(state)
    }

    /// Read back every live document of a collection on `branch`, applying
    /// `filter` (if given). Row groups whose shredded statistics rule out
    /// every condition pushed down from `filter` are never decoded; the
    /// full filter is still evaluated in memory afterward since pushdown
    /// only prunes, it never substitutes for the real predicate.
    pub fn query(&self, branch: &str, collection: &str, filter: Option<&Filter>) -> Result<Vec<Entity>> {
        let commit = self.branch_commit(branch)?;
        let documents = match filter {
            Some(f) => self.materialize_with_pushdown(&commit.state, collection, f)?,
            None => self.materialize(&commit.state, collection)?,
        };
        Ok(documents
            .into_values()
            .filter(|doc| {
                filter
                    .map(|f| evaluate(f, &Value::Object(doc.clone())))
                    .unwrap_or(true)
            })
            .collect())
    }

    /// Like `materialize`, but plans `filter` against shredded statistics
    /// paths first and skips any row group `should_skip_row_group` rules
    /// out, rather than decoding the whole collection unconditionally.
    fn materialize_with_pushdown(
        &self,
        state: &DatabaseState,
        collection: &str,
        filter: &Filter,
    ) -> Result<BTreeMap<String, Entity>> {
        let Some(coll_state) = state.collections.get(collection) else {
            return Ok(BTreeMap::new());
        };
        let plan = self.shredding_plan(collection)?;
        let data = self.storage.read(&data_path(&coll_state.data_hash))?;

        let pushdown = PredicatePushdown::new(self.stats_paths(&plan));
        let pushdown_plan = pushdown.plan(filter);

        let rows = ParquetCodec::decode_with_skip(&data, &plan, |stats| {
            pushdown.should_skip_row_group(&pushdown_plan, stats)
        })?;
        Ok(rows
            .into_iter()
            .filter(|r| r.deleted_at.is_none())
            .map(|r| (r.id.clone(), r.fields))
            .collect())
    }

    /// Map each shredded field to the physical column name its row-group
    /// statistics are actually keyed by (`ParquetCodec::shredded_column_name`),
    /// not the logical VARIANT-tree path `schema::ShreddingPlan::stats_path`
    /// documents — the two namespaces never intersect.
    fn stats_paths(&self, plan: &ShreddingPlan) -> HashMap<String, String> {
        plan.fields
            .iter()
            .map(|(field, _)| (field.clone(), ParquetCodec::shredded_column_name(field)))
            .collect()
    }

    /// Read a single document by id, or `None` if it doesn't exist or was
    /// soft-deleted.
    pub fn get(&self, branch: &str, collection: &str, id: &str) -> Result<Option<Entity>> {
        let commit = self.branch_commit(branch)?;
        Ok(self.materialize(&commit.state, collection)?.remove(id))
    }

    /// The commit ancestry of `branch`, newest first, up to `limit` entries.
    pub fn log(&self, branch: &str, limit: usize) -> Result<Vec<Commit>> {
        let tip = self.refs().resolve_ref(branch)?;
        let mut commits = Vec::new();
        self.commits().walk(&tip, |commit| {
            if commits.len() < limit {
                commits.push(commit.clone());
            }
        })?;
        commits.sort_by(|a, b| b.ts.cmp(&a.ts));
        commits.truncate(limit);
        Ok(commits)
    }

    /// Report how much of `filter` would be pushed down to shredded
    /// statistics for `collection`, without running a query.
    pub fn explain(&self, collection: &str, filter: &Filter) -> Result<Effectiveness> {
        let plan = self.shredding_plan(collection)?;
        let pushdown = PredicatePushdown::new(self.stats_paths(&plan));
        let pushdown_plan = pushdown.plan(filter);
        Ok(pushdown.effectiveness(&pushdown_plan))
    }

    /// Merge `source` into `target`. Fast-forwards when possible; otherwise
    /// runs the three-way merge engine and either commits immediately (no
    /// conflicts) or persists a `MergeState` for the caller to resolve via
    /// `resolve_conflict` and `complete_merge`.
    pub fn merge(
        &self,
        source: &str,
        target: &str,
        options: MergeOptions,
        author: String,
        message: String,
        ts: i64,
    ) -> Result<MergeOutcome> {
        let refs = self.refs();
        let source_commit = refs.resolve_ref(source)?;
        let target_commit = refs.resolve_ref(target)?;

        let apply = ApplyMerge::new(self.storage.as_ref());
        if apply.fast_forward(target, &source_commit)? {
            return Ok(MergeOutcome {
                fast_forwarded: true,
                commit: Some(source_commit),
                conflicts: Vec::new(),
            });
        }

        let base = self
            .commits()
            .lca(&source_commit, &target_commit)?
            .ok_or_else(|| DbError::InvalidArgument("source and target share no common ancestor".into()))?;

        let ours = self.events_since(target, &base)?;
        let theirs = self.events_since(source, &base)?;

        let engine = MergeEngine::new(options);
        let result: MergeResult = engine.merge(&ours, &theirs);

        let mut state = MergeState::new(source, target, base, source_commit, target_commit, options.strategy)?;
        state.merged_events = result.merged_events;
        for conflict in result.conflicts {
            state.add_conflict(conflict);
        }

        if state.conflicts.is_empty() {
            let new_state = self.recompute_state_from_events(&state.target_commit, &state.merged_events)?;
            let outcome = apply.apply_with_state(&state, author, message, ts, new_state)?;
            return Ok(MergeOutcome {
                fast_forwarded: false,
                commit: Some(outcome.commit),
                conflicts: Vec::new(),
            });
        }

        let conflicts = state.conflicts.clone();
        MergeStateStore::new(self.storage.as_ref()).begin(&state)?;
        Ok(MergeOutcome {
            fast_forwarded: false,
            commit: None,
            conflicts,
        })
    }

    pub fn resolve_conflict(&self, path: &str, resolution: Resolution, value: Option<Value>) -> Result<()> {
        let store = MergeStateStore::new(self.storage.as_ref());
        let mut state = store.load()?;
        state.resolve_conflict(path, resolution, value)?;
        store.save(&state)
    }

    /// Complete an in-progress merge once every conflict carries a
    /// resolution: recompute collection state from the resolved event
    /// stream, then assemble and persist the merge commit.
    pub fn complete_merge(&self, author: String, message: String, ts: i64) -> Result<Hash> {
        let store = MergeStateStore::new(self.storage.as_ref());
        let state = store.load()?;
        let apply = ApplyMerge::new(self.storage.as_ref());
        let resolved_events = apply.resolve_event_stream(&state);
        let new_state = self.recompute_state_from_events(&state.target_commit, &resolved_events)?;
        let outcome = apply.apply_with_state(&state, author, message, ts, new_state)?;
        Ok(outcome.commit)
    }

    /// Fold `events` on top of `base_commit`'s materialized collections and
    /// re-shred every touched collection, returning the resulting state.
    fn recompute_state_from_events(&self, base_commit: &Hash, events: &[Event]) -> Result<DatabaseState> {
        let base = self.commits().load(base_commit)?;
        let mut state = base.state.clone();
        let mut by_collection: BTreeMap<String, Vec<Event>> = BTreeMap::new();
        for event in events {
            by_collection.entry(event.collection().to_string()).or_default().push(event.clone());
        }
        for (collection, coll_events) in by_collection {
            let mut documents = self.materialize(&state, &collection)?;
            let ts = coll_events.last().map(|e| e.ts).unwrap_or(0);
            apply_events_to_documents(&mut documents, &coll_events, ts, "merge");
            state = self.write_collection(&state, &collection, &documents, &coll_events)?;
        }
        Ok(state)
    }

    /// Events recorded on `branch` strictly after `base`: a bounded
    /// ancestor walk from `branch`'s tip that stops expanding at `base`
    /// rather than walking to the root, reading each commit's event-log
    /// segment once regardless of how many collections it touched.
    fn events_since(&self, branch: &str, base: &Hash) -> Result<Vec<Event>> {
        let tip = self.refs().resolve_ref(branch)?;
        let commits = self.commits();
        let mut events = Vec::new();
        let mut seen_segments = HashSet::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(tip);

        while let Some(hash) = queue.pop_front() {
            if hash == *base || !visited.insert(hash.clone()) {
                continue;
            }
            let commit = commits.load(&hash)?;
            let segment_id = &commit.state.event_log_position.segment_id;
            if !segment_id.is_empty() && seen_segments.insert(segment_id.clone()) {
                for collection in commit.state.collections.keys() {
                    if let Ok(data) = self.storage.read(&events_path(collection, segment_id)) {
                        if let Ok((_, segment_events)) = decode_segment(&data) {
                            events.extend(segment_events);
                        }
                    }
                }
            }
            queue.extend(commit.parents.iter().cloned());
        }
        Ok(events)
    }
}

fn entity_to_row(id: &str, fields: &Entity) -> ParquetRow {
    ParquetRow {
        id: id.to_string(),
        type_name: fields
            .get("$type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        created_at: fields.get("createdAt").and_then(Value::as_i64).unwrap_or(0),
        updated_at: fields.get("updatedAt").and_then(Value::as_i64).unwrap_or(0),
        created_by: fields.get("createdBy").and_then(Value::as_str).unwrap_or_default().to_string(),
        updated_by: fields.get("updatedBy").and_then(Value::as_str).unwrap_or_default().to_string(),
        version: fields.get("version").and_then(Value::as_i64).unwrap_or(1),
        deleted_at: fields.get("deletedAt").and_then(Value::as_i64),
        deleted_by: fields.get("deletedBy").and_then(Value::as_str).map(str::to_string),
        fields: fields.clone(),
    }
}

/// Fold CREATE/UPDATE/DELETE events into a collection's materialized
/// documents in place, stamping audit columns the way every write path
/// (direct commits and merge replays alike) needs them stamped.
fn apply_events_to_documents(documents: &mut BTreeMap<String, Entity>, events: &[Event], ts: i64, author: &str) {
    for event in events {
        let id = event.entity_id().to_string();
        match event.op {
            Op::Create => {
                if let Some(after) = &event.after {
                    let mut doc = after.clone();
                    doc.entry("createdAt".to_string()).or_insert(json!(ts));
                    doc.entry("updatedAt".to_string()).or_insert(json!(ts));
                    doc.entry("createdBy".to_string()).or_insert(json!(author));
                    doc.entry("updatedBy".to_string()).or_insert(json!(author));
                    doc.entry("version".to_string()).or_insert(json!(1));
                    documents.insert(id, doc);
                }
            }
            Op::Update => {
                if let Some(doc) = documents.get_mut(&id) {
                    let update = event.effective_update();
                    for (k, v) in &update.set {
                        doc.insert(k.clone(), v.clone());
                    }
                    for (k, delta) in &update.inc {
                        let base = doc.get(k).and_then(Value::as_f64).unwrap_or(0.0);
                        let d = delta.as_f64().unwrap_or(0.0);
                        doc.insert(k.clone(), json!(base + d));
                    }
                    doc.insert("updatedAt".to_string(), json!(ts));
                    doc.insert("updatedBy".to_string(), json!(author));
                    let version = doc.get("version").and_then(Value::as_i64).unwrap_or(1);
                    doc.insert("version".to_string(), json!(version + 1));
                } else if let Some(after) = &event.after {
                    documents.insert(id, after.clone());
                }
            }
            Op::Delete => {
                if let Some(doc) = documents.get_mut(&id) {
                    doc.insert("deletedAt".to_string(), json!(ts));
                    doc.insert("deletedBy".to_string(), json!(author));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Op, UpdateOp};
    use crate::schema::{FieldDef, Primitive, ShredConfig};
    use crate::storage::MemoryBackend;
    use serde_json::Map;

    fn posts_type() -> TypeDefinition {
        TypeDefinition {
            name: "posts".into(),
            fields: vec![
                FieldDef { name: "title".into(), primitive: Primitive::String, indexed: false },
                FieldDef { name: "year".into(), primitive: Primitive::Int, indexed: false },
            ],
        }
    }

    fn create_event(id: &str, ts: i64, title: &str, year: i64) -> Event {
        let mut after = Map::new();
        after.insert("title".into(), json!(title));
        after.insert("year".into(), json!(year));
        Event {
            id: format!("e-{id}"),
            ts,
            op: Op::Create,
            target: format!("posts:{id}"),
            before: None,
            after: Some(after),
            metadata: None,
        }
    }

    fn repo() -> Repository {
        let repo = Repository::init(Box::new(MemoryBackend::new())).unwrap();
        repo.define_collection(posts_type());
        repo
    }

    #[test]
    fn commit_events_then_query_round_trips() {
        let repo = repo();
        repo.commit_events(
            "main",
            "posts",
            vec![create_event("1", 10, "Hello", 2020)],
            "add post".into(),
            "alice".into(),
            10,
        )
        .unwrap();

        let docs = repo.query("main", "posts", None).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("title"), Some(&json!("Hello")));
        assert_eq!(docs[0].get("version"), Some(&json!(1)));
    }

    #[test]
    fn update_then_delete_soft_deletes() {
        let repo = repo();
        repo.commit_events(
            "main",
            "posts",
            vec![create_event("1", 10, "Hello", 2020)],
            "add".into(),
            "alice".into(),
            10,
        )
        .unwrap();

        let update = Event {
            id: "e-1-upd".into(),
            ts: 11,
            op: Op::Update,
            target: "posts:1".into(),
            before: Some({
                let mut m = Map::new();
                m.insert("title".into(), json!("Hello"));
                m
            }),
            after: Some({
                let mut m = Map::new();
                m.insert("title".into(), json!("Hello v2"));
                m
            }),
            metadata: Some(crate::event::EventMetadata {
                update: Some(UpdateOp {
                    set: {
                        let mut m = Map::new();
                        m.insert("title".into(), json!("Hello v2"));
                        m
                    },
                    inc: Map::new(),
                }),
            }),
        };
        repo.commit_events("main", "posts", vec![update], "update".into(), "alice".into(), 11)
            .unwrap();
        let docs = repo.query("main", "posts", None).unwrap();
        assert_eq!(docs[0].get("title"), Some(&json!("Hello v2")));
        assert_eq!(docs[0].get("version"), Some(&json!(2)));

        let delete = Event {
            id: "e-1-del".into(),
            ts: 12,
            op: Op::Delete,
            target: "posts:1".into(),
            before: Some(docs[0].clone()),
            after: None,
            metadata: None,
        };
        repo.commit_events("main", "posts", vec![delete], "delete".into(), "alice".into(), 12)
            .unwrap();
        assert!(repo.query("main", "posts", None).unwrap().is_empty());
    }

    #[test]
    fn branch_and_fast_forward_merge() {
        let repo = repo();
        repo.commit_events(
            "main",
            "posts",
            vec![create_event("1", 10, "Hello", 2020)],
            "add".into(),
            "alice".into(),
            10,
        )
        .unwrap();

        repo.branches().create("feature", &crate::branch::CreateOptions::default()).unwrap();
        repo.commit_events(
            "feature",
            "posts",
            vec![create_event("2", 11, "World", 2021)],
            "add 2".into(),
            "bob".into(),
            11,
        )
        .unwrap();

        let outcome = repo
            .merge("feature", "main", MergeOptions::default(), "bob".into(), "merge".into(), 12)
            .unwrap();
        assert!(outcome.fast_forwarded);
        assert!(outcome.conflicts.is_empty());

        let docs = repo.query("main", "posts", None).unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn explain_reports_shredded_fraction() {
        let repo = repo();
        let filter = Filter::And(vec![
            Filter::Leaf { field: "year".into(), op: crate::filter::CompareOp::Gte(json!(2020)) },
            Filter::Leaf { field: "author".into(), op: crate::filter::CompareOp::Eq(json!("alice")) },
        ]);
        let eff = repo.explain("posts", &filter).unwrap();
        assert_eq!(eff.total_conditions, 2);
        assert_eq!(eff.shredded_conditions, 1);
    }

    #[test]
    fn query_with_shredded_filter_goes_through_pushdown_path() {
        let repo = repo();
        repo.commit_events(
            "main",
            "posts",
            vec![create_event("1", 10, "Hello", 2020), create_event("2", 11, "World", 2021)],
            "add".into(),
            "alice".into(),
            10,
        )
        .unwrap();

        let matching = Filter::Leaf { field: "year".into(), op: crate::filter::CompareOp::Eq(json!(2020)) };
        let docs = repo.query("main", "posts", Some(&matching)).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("title"), Some(&json!("Hello")));

        let excluded = Filter::Leaf { field: "year".into(), op: crate::filter::CompareOp::Eq(json!(1999)) };
        assert!(repo.query("main", "posts", Some(&excluded)).unwrap().is_empty());
    }

    #[test]
    fn shred_policy_override_is_honored() {
        let repo = repo();
        let mut policy = ShredPolicy::default();
        policy.overrides.insert(
            "posts".into(),
            ShredConfig { always: vec!["title".into()], ..ShredConfig::default() },
        );
        repo.set_shred_policy(policy);
        let plan = repo.shredding_plan("posts").unwrap();
        assert!(plan.is_shredded("title"));
    }
}
