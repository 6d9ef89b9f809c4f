//! Hierarchical groups.
//!
//! # Purpose
//! Groups form a tree through `group:child#parent_group@group:parent`
//! tuples. Permissions flow down the tree and from the owning domain through
//! the schema's arrow rules, so this service only writes the structural
//! tuples and checks permissions through [`AuthService::authorize`].
//!
//! # Key invariants
//! - All validation (name, parent existence, permissions) happens before the
//!   first write.
//! - A group record and its structural tuples appear together. If the tuple
//!   write fails after the record is saved, the record is deleted.
//! - A group with children cannot be removed. Removing a childless group
//!   deletes every tuple that names it, then the record; if the record delete
//!   fails the tuples are restored.
//! - Nested groups are members through `group:G#member@group:C#membership`,
//!   so members of `C` inherit membership of `G`.
use crate::auth::Clock;
use crate::error::{AuthError, AuthResult};
use crate::model::{Group, GroupPage, GroupReq, GroupsPage, MemberKind};
use crate::service::{
    AuthService, GroupService, identify_principal, is_platform_admin, require_non_empty,
};
use crate::store::GroupRepository;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tessera_authz::{
    EntityType, Permission, PolicyPage, PolicyReq, Relation, RelationQuery, SubjectRef, SubjectSet,
};

/// Deepest hierarchy level `list_parents` / `list_children` will walk.
pub const MAX_LEVEL: usize = 20;
const READ_BATCH: usize = 100;

pub struct CoreGroupService {
    auth: Arc<dyn AuthService>,
    groups: Arc<dyn GroupRepository>,
    clock: Arc<dyn Clock>,
}

#[derive(Clone, Copy)]
enum Direction {
    Parents,
    Children,
}

fn membership_set(group_id: &str) -> String {
    SubjectSet::new(EntityType::Group, group_id, Permission::Membership.as_str()).to_string()
}

impl CoreGroupService {
    pub fn new(
        auth: Arc<dyn AuthService>,
        groups: Arc<dyn GroupRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            auth,
            groups,
            clock,
        }
    }

    async fn principal(&self, token: &str) -> AuthResult<String> {
        identify_principal(self.auth.as_ref(), token).await
    }

    /// Check `permission` on `group`, gated on its domain when it has one.
    async fn require(&self, user: &str, group: &Group, permission: Permission) -> AuthResult<()> {
        let mut req = PolicyReq::user(user, EntityType::Group, group.id.as_str())
            .with_permission(permission);
        if let Some(domain_id) = &group.domain_id {
            req = req.in_domain(domain_id.as_str());
        }
        self.auth.authorize(&req).await
    }

    async fn authorized_group(&self, user: &str, id: &str, permission: Permission) -> AuthResult<Group> {
        let group = self.groups.retrieve_by_id(id).await?;
        self.require(user, &group, permission).await?;
        Ok(group)
    }

    /// Every stored relation matching `query`, across pages.
    async fn read_all(&self, query: &RelationQuery) -> AuthResult<Vec<PolicyReq>> {
        let mut relations = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .auth
                .read_relations(query, cursor.as_deref(), READ_BATCH)
                .await?;
            relations.extend(page.relations);
            match page.next_page_token {
                Some(next) => cursor = Some(next),
                None => return Ok(relations),
            }
        }
    }

    /// Groups one hop away from `id` in `direction`.
    async fn neighbours(&self, id: &str, direction: Direction) -> AuthResult<Vec<String>> {
        let query = RelationQuery::on(EntityType::Group).relation(Relation::ParentGroup);
        let ids = match direction {
            Direction::Parents => self
                .read_all(&query.object(id))
                .await?
                .into_iter()
                .map(|rel| rel.subject)
                .collect(),
            Direction::Children => self
                .read_all(&query.subject(EntityType::Group, id))
                .await?
                .into_iter()
                .map(|rel| rel.object)
                .collect(),
        };
        Ok(ids)
    }

    /// Breadth-first walk, skipping groups already seen.
    async fn walk(&self, user: &str, id: &str, level: usize, direction: Direction) -> AuthResult<Vec<Group>> {
        self.authorized_group(user, id, Permission::View).await?;
        let mut visited: HashSet<String> = HashSet::from([id.to_string()]);
        let mut order = Vec::new();
        let mut frontier = vec![id.to_string()];
        for _ in 0..level.clamp(1, MAX_LEVEL) {
            let mut next = Vec::new();
            for current in &frontier {
                for neighbour in self.neighbours(current, direction).await? {
                    if visited.insert(neighbour.clone()) {
                        next.push(neighbour);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            order.extend(next.iter().cloned());
            frontier = next;
        }
        // Only groups the user can view are returned; hidden ones still link the walk.
        if !is_platform_admin(self.auth.as_ref(), user).await? {
            let visible: HashSet<String> = self
                .auth
                .list_all_objects(
                    &PolicyReq::user(user, EntityType::Group, "").with_permission(Permission::View),
                )
                .await?
                .policies
                .into_iter()
                .collect();
            order.retain(|group_id| visible.contains(group_id));
        }
        Ok(self.groups.retrieve_by_ids(&order).await?)
    }

    /// Validated membership tuples for `assign` / `unassign`.
    fn member_policies(
        group_id: &str,
        relation: Relation,
        kind: MemberKind,
        member_ids: &[String],
    ) -> AuthResult<Vec<PolicyReq>> {
        if member_ids.is_empty() {
            return Err(AuthError::malformed("no members provided"));
        }
        for member_id in member_ids {
            require_non_empty(member_id, "member id")?;
        }
        match kind {
            MemberKind::Users => {
                if relation.delegation_permission().is_none() {
                    return Err(AuthError::malformed(format!(
                        "relation {relation} cannot be assigned to users"
                    )));
                }
                Ok(member_ids
                    .iter()
                    .map(|member_id| {
                        PolicyReq::user(member_id.as_str(), EntityType::Group, group_id)
                            .with_relation(relation)
                    })
                    .collect())
            }
            MemberKind::Groups => {
                if relation != Relation::Member {
                    return Err(AuthError::malformed("groups can only be assigned as members"));
                }
                if member_ids.iter().any(|member_id| member_id == group_id) {
                    return Err(AuthError::malformed("a group cannot be its own member"));
                }
                Ok(member_ids
                    .iter()
                    .map(|member_id| {
                        PolicyReq::new(
                            EntityType::Group,
                            membership_set(member_id),
                            EntityType::Group,
                            group_id,
                        )
                        .with_relation(Relation::Member)
                    })
                    .collect())
            }
        }
    }

    async fn visible_groups(&self, user: &str, mut page: GroupPage) -> AuthResult<GroupsPage> {
        let ids = self
            .auth
            .list_all_objects(
                &PolicyReq::user(user, EntityType::Group, "").with_permission(Permission::View),
            )
            .await?
            .policies;
        let ids: Vec<String> = match page.ids.take() {
            Some(wanted) => ids.into_iter().filter(|id| wanted.contains(id)).collect(),
            None => ids,
        };
        if ids.is_empty() {
            return Ok(GroupsPage {
                total: 0,
                offset: page.offset,
                limit: page.limit,
                groups: Vec::new(),
            });
        }
        page.ids = Some(ids);
        Ok(self.groups.retrieve_all(&page).await?)
    }
}

#[async_trait]
impl GroupService for CoreGroupService {
    async fn create_group(&self, token: &str, mut group: Group) -> AuthResult<Group> {
        let user = self.principal(token).await?;
        require_non_empty(&group.name, "group name")?;

        // Step 1: Parent must exist and be editable by the requester.
        if let Some(parent_id) = group.parent_id.clone() {
            require_non_empty(&parent_id, "parent id")?;
            let parent = self.groups.retrieve_by_id(&parent_id).await?;
            self.require(&user, &parent, Permission::Edit).await?;
            match (&group.domain_id, &parent.domain_id) {
                (None, inherited) => group.domain_id = inherited.clone(),
                (Some(own), Some(parent_domain)) if own != parent_domain => {
                    return Err(AuthError::malformed(
                        "group and parent belong to different domains",
                    ));
                }
                _ => {}
            }
        }
        // Step 2: The owning domain, if any, must be active and editable.
        if let Some(domain_id) = &group.domain_id {
            self.auth
                .authorize(
                    &PolicyReq::user(user.as_str(), EntityType::Domain, domain_id.as_str())
                        .with_permission(Permission::Edit)
                        .in_domain(domain_id.as_str()),
                )
                .await?;
        }

        group.id = uuid::Uuid::new_v4().to_string();
        group.owner_id = user.clone();
        group.created_at = self.clock.now();
        group.updated_at = 0;

        let mut policies = vec![
            PolicyReq::user(user.as_str(), EntityType::Group, group.id.as_str())
                .with_relation(Relation::Administrator),
        ];
        if let Some(parent_id) = &group.parent_id {
            policies.push(
                PolicyReq::new(
                    EntityType::Group,
                    parent_id.as_str(),
                    EntityType::Group,
                    group.id.as_str(),
                )
                .with_relation(Relation::ParentGroup),
            );
        }
        if let Some(domain_id) = &group.domain_id {
            policies.push(
                PolicyReq::new(
                    EntityType::Domain,
                    domain_id.as_str(),
                    EntityType::Group,
                    group.id.as_str(),
                )
                .with_relation(Relation::Domain),
            );
        }

        // Step 3: Record, then tuples. A failed tuple write removes the record.
        let saved = self.groups.save(group).await?;
        if let Err(err) = self.auth.add_policies(&policies).await {
            if let Err(rollback) = self.groups.delete(&saved.id).await {
                tracing::error!(
                    error = ?rollback,
                    group_id = %saved.id,
                    "failed to roll back group record"
                );
            }
            return Err(err);
        }
        Ok(saved)
    }

    async fn update_group(&self, token: &str, id: &str, req: GroupReq) -> AuthResult<Group> {
        let user = self.principal(token).await?;
        if req.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(AuthError::malformed("empty group name"));
        }
        self.authorized_group(&user, id, Permission::Edit).await?;
        Ok(self.groups.update(id, &req, self.clock.now()).await?)
    }

    async fn view_group(&self, token: &str, id: &str) -> AuthResult<Group> {
        let user = self.principal(token).await?;
        self.authorized_group(&user, id, Permission::View).await
    }

    async fn list_groups(&self, token: &str, page: GroupPage) -> AuthResult<GroupsPage> {
        let user = self.principal(token).await?;
        if is_platform_admin(self.auth.as_ref(), &user).await? {
            return Ok(self.groups.retrieve_all(&page).await?);
        }
        self.visible_groups(&user, page).await
    }

    async fn list_parents(&self, token: &str, id: &str, level: usize) -> AuthResult<Vec<Group>> {
        let user = self.principal(token).await?;
        self.walk(&user, id, level, Direction::Parents).await
    }

    async fn list_children(&self, token: &str, id: &str, level: usize) -> AuthResult<Vec<Group>> {
        let user = self.principal(token).await?;
        self.walk(&user, id, level, Direction::Children).await
    }

    async fn list_members(
        &self,
        token: &str,
        group_id: &str,
        kind: MemberKind,
        page_token: Option<&str>,
        limit: usize,
    ) -> AuthResult<PolicyPage> {
        let user = self.principal(token).await?;
        self.authorized_group(&user, group_id, Permission::View).await?;
        match kind {
            MemberKind::Users => {
                self.auth
                    .list_subjects(
                        &PolicyReq::user("", EntityType::Group, group_id)
                            .with_permission(Permission::Membership),
                        page_token,
                        limit,
                    )
                    .await
            }
            MemberKind::Groups => {
                let page = self
                    .auth
                    .read_relations(
                        &RelationQuery::on(EntityType::Group)
                            .object(group_id)
                            .relation(Relation::Member)
                            .subject_type(EntityType::Group),
                        page_token,
                        limit,
                    )
                    .await?;
                let policies = page
                    .relations
                    .iter()
                    .filter_map(|rel| match SubjectRef::parse(&rel.subject) {
                        SubjectRef::Set(set) => Some(set.object),
                        SubjectRef::Id(_) => None,
                    })
                    .collect();
                Ok(PolicyPage {
                    policies,
                    next_page_token: page.next_page_token,
                })
            }
        }
    }

    async fn list_memberships(
        &self,
        token: &str,
        member_id: &str,
        kind: MemberKind,
        page_token: Option<&str>,
        limit: usize,
    ) -> AuthResult<PolicyPage> {
        let user = self.principal(token).await?;
        require_non_empty(member_id, "member id")?;
        match kind {
            MemberKind::Users => {
                if user != member_id && !is_platform_admin(self.auth.as_ref(), &user).await? {
                    return Err(AuthError::denied());
                }
                self.auth
                    .list_objects(
                        &PolicyReq::user(member_id, EntityType::Group, "")
                            .with_permission(Permission::Membership),
                        page_token,
                        limit,
                    )
                    .await
            }
            MemberKind::Groups => {
                if !is_platform_admin(self.auth.as_ref(), &user).await? {
                    self.authorized_group(&user, member_id, Permission::View).await?;
                }
                let page = self
                    .auth
                    .read_relations(
                        &RelationQuery::on(EntityType::Group)
                            .relation(Relation::Member)
                            .subject(EntityType::Group, membership_set(member_id)),
                        page_token,
                        limit,
                    )
                    .await?;
                Ok(PolicyPage {
                    policies: page.relations.into_iter().map(|rel| rel.object).collect(),
                    next_page_token: page.next_page_token,
                })
            }
        }
    }

    async fn assign(
        &self,
        token: &str,
        group_id: &str,
        relation: Relation,
        kind: MemberKind,
        member_ids: &[String],
    ) -> AuthResult<()> {
        let user = self.principal(token).await?;
        let policies = Self::member_policies(group_id, relation, kind, member_ids)?;
        self.authorized_group(&user, group_id, Permission::Share).await?;
        if kind == MemberKind::Groups {
            for member_id in member_ids {
                self.groups.retrieve_by_id(member_id).await?;
            }
        }
        self.auth.add_policies(&policies).await
    }

    async fn unassign(
        &self,
        token: &str,
        group_id: &str,
        relation: Relation,
        kind: MemberKind,
        member_ids: &[String],
    ) -> AuthResult<()> {
        let user = self.principal(token).await?;
        let policies = Self::member_policies(group_id, relation, kind, member_ids)?;
        self.authorized_group(&user, group_id, Permission::Share).await?;
        self.auth.delete_policies(&policies).await
    }

    async fn remove_group(&self, token: &str, id: &str) -> AuthResult<()> {
        let user = self.principal(token).await?;
        self.authorized_group(&user, id, Permission::Delete).await?;

        let children = self
            .auth
            .read_relations(
                &RelationQuery::on(EntityType::Group)
                    .relation(Relation::ParentGroup)
                    .subject(EntityType::Group, id),
                None,
                1,
            )
            .await?;
        if !children.relations.is_empty() {
            return Err(AuthError::GroupNotEmpty);
        }

        // Tuples on the group itself plus tuples that use its membership set.
        let mut tuples = self
            .read_all(&RelationQuery::on(EntityType::Group).object(id))
            .await?;
        tuples.extend(
            self.read_all(
                &RelationQuery::on(EntityType::Group).subject(EntityType::Group, membership_set(id)),
            )
            .await?,
        );
        if !tuples.is_empty() {
            self.auth.delete_policies(&tuples).await?;
        }

        if let Err(err) = self.groups.delete(id).await {
            if !tuples.is_empty()
                && let Err(restore) = self.auth.add_policies(&tuples).await
            {
                tracing::error!(
                    error = ?restore,
                    group_id = id,
                    "failed to restore group policies"
                );
            }
            return Err(err.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ManualClock, SigningKey, Tokenizer};
    use crate::model::{KeyRequest, KeyType};
    use crate::service::{CoreAuthService, TokenTtls};
    use crate::store::memory::InMemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tessera_authz::{
        BackendError, BackendResult, CheckQuery, InMemoryTupleStore, Page, PolicyAgent,
        RelationTuple, RelationTupleBackend, ResourceLookup, SubjectLookup, TupleDelta,
        TupleFilter,
    };

    /// Tuple store whose writes fail once `fail_writes` is set.
    struct FailingWrites {
        inner: InMemoryTupleStore,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl RelationTupleBackend for FailingWrites {
        async fn check(&self, query: &CheckQuery) -> BackendResult<bool> {
            self.inner.check(query).await
        }

        async fn write(&self, deltas: &[TupleDelta]) -> BackendResult<Vec<bool>> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(BackendError::Unavailable("writes disabled".to_string()));
            }
            self.inner.write(deltas).await
        }

        async fn read(
            &self,
            filter: &TupleFilter,
            cursor: Option<&str>,
            limit: usize,
        ) -> BackendResult<Page<RelationTuple>> {
            self.inner.read(filter, cursor, limit).await
        }

        async fn lookup_resources(
            &self,
            lookup: &ResourceLookup,
            cursor: Option<&str>,
            limit: usize,
        ) -> BackendResult<Page<String>> {
            self.inner.lookup_resources(lookup, cursor, limit).await
        }

        async fn lookup_subjects(
            &self,
            lookup: &SubjectLookup,
            cursor: Option<&str>,
            limit: usize,
        ) -> BackendResult<Page<String>> {
            self.inner.lookup_subjects(lookup, cursor, limit).await
        }

        async fn count_resources(&self, lookup: &ResourceLookup) -> BackendResult<u64> {
            self.inner.count_resources(lookup).await
        }

        async fn count_subjects(&self, lookup: &SubjectLookup) -> BackendResult<u64> {
            self.inner.count_subjects(lookup).await
        }

        fn supports_transactions(&self) -> bool {
            self.inner.supports_transactions()
        }

        fn backend_name(&self) -> &'static str {
            "failing-writes"
        }
    }

    #[tokio::test]
    async fn failed_tuple_write_deletes_group_record() {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let store = Arc::new(InMemoryStore::new());
        let backend = Arc::new(FailingWrites {
            inner: InMemoryTupleStore::new(),
            fail_writes: AtomicBool::new(false),
        });
        let tokenizer = Tokenizer::new(
            SigningKey::from_seed("k1", [7u8; 32]),
            "tessera",
            0,
            clock.clone(),
        )
        .expect("tokenizer");
        let auth: Arc<dyn AuthService> = Arc::new(CoreAuthService::new(
            store.clone(),
            store.clone(),
            PolicyAgent::new(backend.clone()),
            Arc::new(tokenizer),
            TokenTtls::default(),
        ));
        let service = CoreGroupService::new(auth.clone(), store.clone(), clock);
        let token = auth
            .issue("", KeyRequest::new(KeyType::Access, "alice"))
            .await
            .expect("login")
            .access_token;

        backend.fail_writes.store(true, Ordering::SeqCst);
        let group = Group {
            name: "team".to_string(),
            ..Group::default()
        };
        let err = service
            .create_group(&token, group)
            .await
            .expect_err("tuple write fails");
        assert!(matches!(err, AuthError::Internal(_)));

        let left = GroupRepository::retrieve_all(store.as_ref(), &GroupPage::default())
            .await
            .expect("list records");
        assert_eq!(left.total, 0);
        assert!(left.groups.is_empty());
    }
}
