//! Policy agent: typed requests in, backend calls out.
//!
//! # Purpose
//! [`PolicyAgent`] owns the translation between [`PolicyReq`] and the
//! string-typed [`RelationTupleBackend`] contract, and the semantics the
//! backend does not provide on its own:
//! - checks fail closed: a backend error is a denial;
//! - single mutations are idempotent;
//! - bulk mutations are all-or-nothing even on non-transactional backends;
//! - list-all loops are bounded.
//!
//! # Bulk mutations
//! On a transactional backend a bulk call is one `write`. Otherwise the agent
//! runs a saga: deltas are applied one at a time and every delta that
//! actually changed state is recorded. On the first failure the recorded
//! deltas are inverted, serially and newest first, and the original error is
//! returned. Deltas that were no-ops are never inverted, so compensation
//! cannot remove a tuple that existed before the call.
//!
//! # Cancellation
//! Dropping the returned future stops further writes. Writes already applied
//! stay applied; only a backend-reported failure triggers compensation.
use crate::backend::{
    BackendError, CheckQuery, RelationTuple, RelationTupleBackend, ResourceLookup, SubjectLookup,
    TupleDelta, TupleFilter, TupleSubject,
};
use crate::policy::{PolicyPage, PolicyReq, RelationQuery, RelationsPage};
use crate::{EntityType, Permission, PolicyError, PolicyResult, Relation, SubjectKind, SubjectRef};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

/// Page size used when the caller passes `limit == 0`.
pub const DEFAULT_LIST_LIMIT: usize = 100;
/// Upper bound on the number of identifiers a list-all call accumulates.
pub const DEFAULT_LIST_ALL_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct PolicyAgent {
    backend: Arc<dyn RelationTupleBackend>,
    list_all_limit: usize,
}

enum Lookup {
    Resources(ResourceLookup),
    Subjects(SubjectLookup),
}

impl Lookup {
    async fn fetch(
        &self,
        backend: &dyn RelationTupleBackend,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<crate::backend::Page<String>, BackendError> {
        match self {
            Lookup::Resources(lookup) => backend.lookup_resources(lookup, cursor, limit).await,
            Lookup::Subjects(lookup) => backend.lookup_subjects(lookup, cursor, limit).await,
        }
    }
}

#[derive(Clone, Copy)]
enum Mutation {
    Add,
    Delete,
}

impl Mutation {
    fn as_str(self) -> &'static str {
        match self {
            Mutation::Add => "add",
            Mutation::Delete => "delete",
        }
    }

    fn delta(self, tuple: RelationTuple) -> TupleDelta {
        match self {
            Mutation::Add => TupleDelta::Insert(tuple),
            Mutation::Delete => TupleDelta::Delete(tuple),
        }
    }
}

impl PolicyAgent {
    pub fn new(backend: Arc<dyn RelationTupleBackend>) -> Self {
        Self {
            backend,
            list_all_limit: DEFAULT_LIST_ALL_LIMIT,
        }
    }

    pub fn with_list_all_limit(mut self, limit: usize) -> Self {
        self.list_all_limit = limit.max(1);
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Succeeds only when the backend positively confirms the tuple.
    pub async fn check_policy(&self, req: &PolicyReq) -> PolicyResult<()> {
        let query = CheckQuery {
            namespace: req.object_type.as_str().to_string(),
            object: non_empty(&req.object, "object")?.to_string(),
            permission: check_name(req)?.to_string(),
            subject: tuple_subject(req)?,
        };
        match self.backend.check(&query).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(PolicyError::Authorization(None)),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    backend = self.backend.backend_name(),
                    "policy check failed, denying"
                );
                Err(PolicyError::Authorization(Some(err)))
            }
        }
    }

    pub async fn add_policy(&self, req: &PolicyReq) -> PolicyResult<()> {
        let delta = TupleDelta::Insert(relation_tuple(req)?);
        self.backend.write(&[delta]).await?;
        Ok(())
    }

    pub async fn delete_policy(&self, req: &PolicyReq) -> PolicyResult<()> {
        let delta = TupleDelta::Delete(relation_tuple(req)?);
        self.backend.write(&[delta]).await?;
        Ok(())
    }

    pub async fn add_policies(&self, reqs: &[PolicyReq]) -> PolicyResult<()> {
        self.mutate(Mutation::Add, reqs).await
    }

    pub async fn delete_policies(&self, reqs: &[PolicyReq]) -> PolicyResult<()> {
        self.mutate(Mutation::Delete, reqs).await
    }

    async fn mutate(&self, mutation: Mutation, reqs: &[PolicyReq]) -> PolicyResult<()> {
        if reqs.is_empty() {
            return Err(PolicyError::MalformedEntity(
                "no policies provided".to_string(),
            ));
        }
        // Validate everything before the first write.
        let mut seen = HashSet::with_capacity(reqs.len());
        let mut deltas = Vec::with_capacity(reqs.len());
        for req in reqs {
            let tuple = relation_tuple(req)?;
            if seen.insert(tuple.clone()) {
                deltas.push(mutation.delta(tuple));
            }
        }

        if self.backend.supports_transactions() {
            self.backend.write(&deltas).await?;
            return Ok(());
        }

        let mut applied: Vec<&TupleDelta> = Vec::new();
        for delta in &deltas {
            match self.backend.write(std::slice::from_ref(delta)).await {
                Ok(changed) => {
                    if changed.first().copied().unwrap_or(false) {
                        applied.push(delta);
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        op = mutation.as_str(),
                        applied = applied.len(),
                        total = deltas.len(),
                        "bulk policy write failed, compensating"
                    );
                    self.compensate(mutation, &applied).await;
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    async fn compensate(&self, mutation: Mutation, applied: &[&TupleDelta]) {
        for delta in applied.iter().rev() {
            let inverse = delta.inverse();
            if let Err(err) = self.backend.write(std::slice::from_ref(&inverse)).await {
                tracing::error!(
                    error = %err,
                    op = mutation.as_str(),
                    tuple = %inverse.tuple(),
                    "policy compensation failed"
                );
            }
        }
    }

    /// Objects of `req.object_type` on which the subject holds the permission.
    pub async fn list_objects(
        &self,
        req: &PolicyReq,
        page_token: Option<&str>,
        limit: usize,
    ) -> PolicyResult<PolicyPage> {
        let lookup = Lookup::Resources(resource_lookup(req)?);
        self.page(&lookup, page_token, limit).await
    }

    pub async fn list_all_objects(&self, req: &PolicyReq) -> PolicyResult<PolicyPage> {
        let lookup = Lookup::Resources(resource_lookup(req)?);
        self.collect_all(&lookup).await
    }

    pub async fn count_objects(&self, req: &PolicyReq) -> PolicyResult<u64> {
        Ok(self.backend.count_resources(&resource_lookup(req)?).await?)
    }

    /// Subjects of `req.subject_type` holding the permission on the object.
    pub async fn list_subjects(
        &self,
        req: &PolicyReq,
        page_token: Option<&str>,
        limit: usize,
    ) -> PolicyResult<PolicyPage> {
        let lookup = Lookup::Subjects(subject_lookup(req)?);
        self.page(&lookup, page_token, limit).await
    }

    pub async fn list_all_subjects(&self, req: &PolicyReq) -> PolicyResult<PolicyPage> {
        let lookup = Lookup::Subjects(subject_lookup(req)?);
        self.collect_all(&lookup).await
    }

    pub async fn count_subjects(&self, req: &PolicyReq) -> PolicyResult<u64> {
        Ok(self.backend.count_subjects(&subject_lookup(req)?).await?)
    }

    /// Subset of `permissions` the subject holds on the object.
    ///
    /// Each permission is one backend check. A permission whose check errors
    /// is left out, consistent with fail-closed checks.
    pub async fn list_permissions(
        &self,
        req: &PolicyReq,
        permissions: &[Permission],
    ) -> PolicyResult<Vec<Permission>> {
        let mut held = Vec::new();
        for permission in permissions {
            let candidate = req.clone().with_permission(*permission);
            match self.check_policy(&candidate).await {
                Ok(()) => held.push(*permission),
                Err(PolicyError::Authorization(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(held)
    }

    /// Stored relations matching `query`.
    pub async fn read_relations(
        &self,
        query: &RelationQuery,
        page_token: Option<&str>,
        limit: usize,
    ) -> PolicyResult<RelationsPage> {
        let filter = tuple_filter(query)?;
        let page = self
            .backend
            .read(&filter, page_token, effective_limit(limit))
            .await?;
        let relations = page
            .items
            .iter()
            .map(policy_from_tuple)
            .collect::<PolicyResult<Vec<_>>>()?;
        Ok(RelationsPage {
            relations,
            next_page_token: page.next_cursor,
        })
    }

    async fn page(
        &self,
        lookup: &Lookup,
        page_token: Option<&str>,
        limit: usize,
    ) -> PolicyResult<PolicyPage> {
        let page = lookup
            .fetch(self.backend.as_ref(), page_token, effective_limit(limit))
            .await?;
        Ok(PolicyPage {
            policies: page.items,
            next_page_token: page.next_cursor,
        })
    }

    async fn collect_all(&self, lookup: &Lookup) -> PolicyResult<PolicyPage> {
        let mut policies = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let batch = self
                .list_all_limit
                .saturating_sub(policies.len())
                .clamp(1, DEFAULT_LIST_ALL_LIMIT);
            let page = lookup
                .fetch(self.backend.as_ref(), cursor.as_deref(), batch)
                .await?;
            policies.extend(page.items);
            // Backends may return more than the batch they were asked for.
            let over_limit = policies.len() > self.list_all_limit;
            if over_limit || (page.next_cursor.is_some() && policies.len() >= self.list_all_limit) {
                tracing::warn!(
                    limit = self.list_all_limit,
                    "list-all result truncated at configured maximum"
                );
                policies.truncate(self.list_all_limit);
                return Ok(PolicyPage {
                    policies,
                    next_page_token: page.next_cursor,
                });
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => {
                    return Ok(PolicyPage {
                        policies,
                        next_page_token: None,
                    });
                }
            }
        }
    }
}

fn effective_limit(limit: usize) -> usize {
    if limit == 0 { DEFAULT_LIST_LIMIT } else { limit }
}

fn non_empty<'a>(value: &'a str, field: &str) -> PolicyResult<&'a str> {
    if value.trim().is_empty() {
        return Err(PolicyError::MalformedEntity(format!("empty {field}")));
    }
    Ok(value)
}

fn check_name(req: &PolicyReq) -> PolicyResult<&'static str> {
    req.check_name().ok_or_else(|| {
        PolicyError::MalformedEntity("relation or permission required".to_string())
    })
}

/// Parse the subject once and pick the backend subject shape.
fn tuple_subject(req: &PolicyReq) -> PolicyResult<TupleSubject> {
    if req.subject_kind == SubjectKind::Token {
        return Err(PolicyError::MalformedEntity(
            "token subjects must be identified before policy evaluation".to_string(),
        ));
    }
    let subject = non_empty(&req.subject, "subject")?;
    Ok(match SubjectRef::parse(subject) {
        SubjectRef::Set(set) => TupleSubject::Set(set),
        SubjectRef::Id(id) => TupleSubject::id(req.subject_type.as_str(), id),
    })
}

fn relation_tuple(req: &PolicyReq) -> PolicyResult<RelationTuple> {
    let relation = req.relation.ok_or_else(|| {
        PolicyError::MalformedEntity("relation required for policy mutation".to_string())
    })?;
    Ok(RelationTuple {
        namespace: req.object_type.as_str().to_string(),
        object: non_empty(&req.object, "object")?.to_string(),
        relation: relation.as_str().to_string(),
        subject: tuple_subject(req)?,
    })
}

fn resource_lookup(req: &PolicyReq) -> PolicyResult<ResourceLookup> {
    Ok(ResourceLookup {
        namespace: req.object_type.as_str().to_string(),
        permission: check_name(req)?.to_string(),
        subject: tuple_subject(req)?,
    })
}

fn subject_lookup(req: &PolicyReq) -> PolicyResult<SubjectLookup> {
    Ok(SubjectLookup {
        namespace: req.object_type.as_str().to_string(),
        object: non_empty(&req.object, "object")?.to_string(),
        permission: check_name(req)?.to_string(),
        subject_namespace: req.subject_type.as_str().to_string(),
    })
}

fn tuple_filter(query: &RelationQuery) -> PolicyResult<TupleFilter> {
    let subject = match query.subject.as_deref() {
        None => None,
        Some(raw) => Some(match SubjectRef::parse(raw) {
            SubjectRef::Set(set) => TupleSubject::Set(set),
            SubjectRef::Id(id) => {
                let subject_type = query.subject_type.ok_or_else(|| {
                    PolicyError::MalformedEntity("subject type required".to_string())
                })?;
                TupleSubject::id(subject_type.as_str(), id)
            }
        }),
    };
    Ok(TupleFilter {
        namespace: Some(query.object_type.as_str().to_string()),
        object: query.object.clone(),
        relation: query.relation.map(|relation| relation.as_str().to_string()),
        subject_namespace: match subject {
            None => query.subject_type.map(|ty| ty.as_str().to_string()),
            Some(_) => None,
        },
        subject,
    })
}

fn policy_from_tuple(tuple: &RelationTuple) -> PolicyResult<PolicyReq> {
    let unknown = |what: &str, value: &str| {
        PolicyError::Backend(BackendError::Unexpected(anyhow::anyhow!(
            "backend returned unknown {what} {value:?}"
        )))
    };
    let object_type =
        EntityType::from_str(&tuple.namespace).map_err(|_| unknown("namespace", &tuple.namespace))?;
    let relation =
        Relation::from_str(&tuple.relation).map_err(|_| unknown("relation", &tuple.relation))?;
    let subject_type = EntityType::from_str(tuple.subject.namespace())
        .map_err(|_| unknown("subject namespace", tuple.subject.namespace()))?;
    let subject = match &tuple.subject {
        TupleSubject::Id { id, .. } => id.clone(),
        TupleSubject::Set(set) => set.to_string(),
    };
    Ok(PolicyReq::new(subject_type, subject, object_type, tuple.object.clone()).with_relation(relation))
}
