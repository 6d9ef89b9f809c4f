//! In-memory relation-tuple backend.
//!
//! # Purpose
//! Implements [`RelationTupleBackend`] entirely in process for local runs and
//! tests. Tuples are indexed by `(namespace, object, relation)` in a
//! `BTreeMap` guarded by `tokio::sync::RwLock`.
//!
//! # Evaluation
//! Checks walk the [`Schema`]: computed permissions expand into their rules,
//! stored relations match either the exact subject or recurse into any
//! subject-set stored under them. Recursion is bounded by `max_depth`; hitting
//! the bound is an error so the caller fails closed rather than guessing.
//!
//! # Consistency
//! - Writes apply all deltas under one write lock, so the backend is
//!   transactional.
//! - Lookups enumerate candidates and check each one. That is linear in the
//!   tuple count and fine for dev/test sizes, not for production.
//!
//! # Paging
//! Results are sorted by their string form and the cursor is the base64url
//! encoding of the last item returned. Resuming skips everything up to and
//! including that item, so concurrent inserts never shift an existing page.
use crate::backend::{
    BackendError, BackendResult, CheckQuery, Page, RelationTuple, RelationTupleBackend,
    ResourceLookup, SubjectLookup, TupleDelta, TupleFilter, TupleSubject,
};
use crate::schema::{Rule, Schema};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;

const DEFAULT_MAX_DEPTH: usize = 32;

type TupleKey = (String, String, String);
type TupleIndex = BTreeMap<TupleKey, BTreeSet<TupleSubject>>;

#[derive(Clone)]
pub struct InMemoryTupleStore {
    /// Stored tuples keyed by `(namespace, object, relation)`.
    tuples: Arc<RwLock<TupleIndex>>,
    schema: Schema,
    /// Maximum rule/subject-set expansion depth for a single check.
    max_depth: usize,
}

impl InMemoryTupleStore {
    pub fn new() -> Self {
        Self::with_schema(Schema::default())
    }

    pub fn with_schema(schema: Schema) -> Self {
        Self {
            tuples: Arc::new(RwLock::new(BTreeMap::new())),
            schema,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub async fn len(&self) -> usize {
        self.tuples.read().await.values().map(BTreeSet::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryTupleStore {
    fn default() -> Self {
        Self::new()
    }
}

struct Evaluator<'a> {
    tuples: &'a TupleIndex,
    schema: &'a Schema,
    max_depth: usize,
}

impl Evaluator<'_> {
    fn check(
        &self,
        namespace: &str,
        object: &str,
        name: &str,
        subject: &TupleSubject,
        depth: usize,
    ) -> BackendResult<bool> {
        if depth > self.max_depth {
            return Err(BackendError::DepthExceeded(self.max_depth));
        }
        let Some(rules) = self.schema.rules(namespace, name) else {
            return self.direct(namespace, object, name, subject, depth);
        };
        for rule in rules {
            let allowed = match *rule {
                Rule::This(relation) => self.direct(namespace, object, relation, subject, depth)?,
                Rule::Computed(permission) => {
                    self.check(namespace, object, permission, subject, depth + 1)?
                }
                Rule::Arrow {
                    tupleset,
                    permission,
                } => {
                    let mut allowed = false;
                    for related in self.subjects(namespace, object, tupleset) {
                        if self.check(
                            related.namespace(),
                            related.object_id(),
                            permission,
                            subject,
                            depth + 1,
                        )? {
                            allowed = true;
                            break;
                        }
                    }
                    allowed
                }
            };
            if allowed {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn direct(
        &self,
        namespace: &str,
        object: &str,
        relation: &str,
        subject: &TupleSubject,
        depth: usize,
    ) -> BackendResult<bool> {
        for stored in self.subjects(namespace, object, relation) {
            if stored == subject {
                return Ok(true);
            }
            if let TupleSubject::Set(set) = stored
                && self.check(&set.namespace, &set.object, &set.relation, subject, depth + 1)?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn subjects(
        &self,
        namespace: &str,
        object: &str,
        relation: &str,
    ) -> impl Iterator<Item = &TupleSubject> {
        let key = (
            namespace.to_string(),
            object.to_string(),
            relation.to_string(),
        );
        self.tuples.get(&key).into_iter().flatten()
    }
}

fn encode_cursor(value: &str) -> String {
    URL_SAFE_NO_PAD.encode(value.as_bytes())
}

fn decode_cursor(cursor: Option<&str>) -> BackendResult<Option<String>> {
    let Some(cursor) = cursor.filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| BackendError::InvalidCursor)?;
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|_| BackendError::InvalidCursor)
}

/// Page over `(sort_key, item)` pairs already sorted by `sort_key`.
fn paginate<T>(
    sorted: Vec<(String, T)>,
    cursor: Option<&str>,
    limit: usize,
) -> BackendResult<Page<T>> {
    let after = decode_cursor(cursor)?;
    let limit = limit.max(1);
    let mut remaining = sorted
        .into_iter()
        .skip_while(|(key, _)| after.as_ref().is_some_and(|after| key <= after))
        .peekable();
    let mut items = Vec::with_capacity(limit);
    let mut last_key = None;
    while items.len() < limit {
        let Some((key, item)) = remaining.next() else {
            break;
        };
        last_key = Some(key);
        items.push(item);
    }
    let next_cursor = match (remaining.peek(), last_key) {
        (Some(_), Some(key)) => Some(encode_cursor(&key)),
        _ => None,
    };
    Ok(Page { items, next_cursor })
}

/// A candidate that exceeds the depth limit is left out of a lookup
/// instead of failing the whole result.
fn skip_unresolved(matched: BackendResult<bool>, namespace: &str, id: &str) -> BackendResult<bool> {
    match matched {
        Err(BackendError::DepthExceeded(depth)) => {
            tracing::warn!(namespace, id, depth, "lookup candidate exceeded depth limit, skipped");
            Ok(false)
        }
        other => other,
    }
}

impl InMemoryTupleStore {
    async fn matching_resources(&self, lookup: &ResourceLookup) -> BackendResult<Vec<String>> {
        let tuples = self.tuples.read().await;
        let evaluator = Evaluator {
            tuples: &tuples,
            schema: &self.schema,
            max_depth: self.max_depth,
        };
        let candidates: BTreeSet<&str> = tuples
            .keys()
            .filter(|(ns, _, _)| *ns == lookup.namespace)
            .map(|(_, object, _)| object.as_str())
            .collect();
        let mut found = Vec::new();
        for object in candidates {
            let matched = evaluator.check(
                &lookup.namespace,
                object,
                &lookup.permission,
                &lookup.subject,
                0,
            );
            if skip_unresolved(matched, &lookup.namespace, object)? {
                found.push(object.to_string());
            }
        }
        Ok(found)
    }

    async fn matching_subjects(&self, lookup: &SubjectLookup) -> BackendResult<Vec<String>> {
        let tuples = self.tuples.read().await;
        let evaluator = Evaluator {
            tuples: &tuples,
            schema: &self.schema,
            max_depth: self.max_depth,
        };
        let candidates: BTreeSet<&TupleSubject> = tuples
            .values()
            .flatten()
            .filter(|subject| {
                matches!(subject, TupleSubject::Id { namespace, .. } if *namespace == lookup.subject_namespace)
            })
            .collect();
        let mut found = Vec::new();
        for subject in candidates {
            let matched = evaluator.check(
                &lookup.namespace,
                &lookup.object,
                &lookup.permission,
                subject,
                0,
            );
            if skip_unresolved(matched, &lookup.subject_namespace, subject.object_id())? {
                found.push(subject.object_id().to_string());
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl RelationTupleBackend for InMemoryTupleStore {
    async fn check(&self, query: &CheckQuery) -> BackendResult<bool> {
        let tuples = self.tuples.read().await;
        Evaluator {
            tuples: &tuples,
            schema: &self.schema,
            max_depth: self.max_depth,
        }
        .check(
            &query.namespace,
            &query.object,
            &query.permission,
            &query.subject,
            0,
        )
    }

    async fn write(&self, deltas: &[TupleDelta]) -> BackendResult<Vec<bool>> {
        let mut tuples = self.tuples.write().await;
        let mut changed = Vec::with_capacity(deltas.len());
        for delta in deltas {
            let tuple = delta.tuple();
            let key = (
                tuple.namespace.clone(),
                tuple.object.clone(),
                tuple.relation.clone(),
            );
            let applied = match delta {
                TupleDelta::Insert(_) => tuples.entry(key).or_default().insert(tuple.subject.clone()),
                TupleDelta::Delete(_) => {
                    let removed = tuples
                        .get_mut(&key)
                        .is_some_and(|subjects| subjects.remove(&tuple.subject));
                    if tuples.get(&key).is_some_and(BTreeSet::is_empty) {
                        tuples.remove(&key);
                    }
                    removed
                }
            };
            changed.push(applied);
        }
        Ok(changed)
    }

    async fn read(
        &self,
        filter: &TupleFilter,
        cursor: Option<&str>,
        limit: usize,
    ) -> BackendResult<Page<RelationTuple>> {
        let tuples = self.tuples.read().await;
        let mut matching: Vec<(String, RelationTuple)> = tuples
            .iter()
            .flat_map(|((namespace, object, relation), subjects)| {
                subjects.iter().map(move |subject| RelationTuple {
                    namespace: namespace.clone(),
                    object: object.clone(),
                    relation: relation.clone(),
                    subject: subject.clone(),
                })
            })
            .filter(|tuple| filter.matches(tuple))
            .map(|tuple| (tuple.to_string(), tuple))
            .collect();
        drop(tuples);
        matching.sort_by(|a, b| a.0.cmp(&b.0));
        paginate(matching, cursor, limit)
    }

    async fn lookup_resources(
        &self,
        lookup: &ResourceLookup,
        cursor: Option<&str>,
        limit: usize,
    ) -> BackendResult<Page<String>> {
        let found = self.matching_resources(lookup).await?;
        paginate(
            found.into_iter().map(|id| (id.clone(), id)).collect(),
            cursor,
            limit,
        )
    }

    async fn lookup_subjects(
        &self,
        lookup: &SubjectLookup,
        cursor: Option<&str>,
        limit: usize,
    ) -> BackendResult<Page<String>> {
        let found = self.matching_subjects(lookup).await?;
        paginate(
            found.into_iter().map(|id| (id.clone(), id)).collect(),
            cursor,
            limit,
        )
    }

    async fn count_resources(&self, lookup: &ResourceLookup) -> BackendResult<u64> {
        Ok(self.matching_resources(lookup).await?.len() as u64)
    }

    async fn count_subjects(&self, lookup: &SubjectLookup) -> BackendResult<u64> {
        Ok(self.matching_subjects(lookup).await?.len() as u64)
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
