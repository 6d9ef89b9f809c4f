//! In-memory implementation of the key, domain, and group repositories.
//!
//! # Purpose
//! Backs the repositories with `HashMap`s guarded by `tokio::sync::RwLock`
//! for local development, tests, and single-node deployments where the
//! records do not need to survive a restart.
//!
//! # Consistency
//! Every method takes at most one write lock per map, so a single call is
//! atomic with respect to other calls on the same map. Listing is a scan
//! followed by an in-memory sort; ordering is `(created_at, id)` so offset
//! paging is stable.
//!
//! # Metrics
//! Entity gauges are refreshed after every mutation.
use super::{DomainRepository, GroupRepository, KeyRepository, StoreError, StoreResult};
use crate::model::{
    Domain, DomainPage, DomainReq, DomainStatus, DomainsPage, Group, GroupPage, GroupReq,
    GroupsPage, Key, KeyType,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemoryStore {
    /// Persisted keys keyed by `id`.
    keys: Arc<RwLock<HashMap<String, Key>>>,
    /// Domains keyed by `id`.
    domains: Arc<RwLock<HashMap<String, Domain>>>,
    /// Groups keyed by `id`.
    groups: Arc<RwLock<HashMap<String, Group>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Offset/limit over an already filtered and sorted list.
fn window<T: Clone>(items: &[T], offset: u64, limit: u64) -> Vec<T> {
    items
        .iter()
        .skip(offset as usize)
        .take(limit as usize)
        .cloned()
        .collect()
}

fn name_matches(candidate: &str, filter: Option<&str>) -> bool {
    filter.is_none_or(|needle| {
        candidate
            .to_lowercase()
            .contains(&needle.to_lowercase())
    })
}

fn id_matches(candidate: &str, ids: Option<&Vec<String>>) -> bool {
    ids.is_none_or(|ids| ids.iter().any(|id| id == candidate))
}

#[async_trait]
impl KeyRepository for InMemoryStore {
    async fn save(&self, key: Key) -> StoreResult<()> {
        let mut keys = self.keys.write().await;
        if keys.contains_key(&key.id) {
            return Err(StoreError::Conflict("key exists".into()));
        }
        if key.key_type == KeyType::Recovery {
            // A subject holds at most one live recovery key.
            keys.retain(|_, existing| {
                !(existing.key_type == KeyType::Recovery && existing.subject == key.subject)
            });
        }
        keys.insert(key.id.clone(), key);
        metrics::gauge!("tessera_keys_total").set(keys.len() as f64);
        Ok(())
    }

    async fn retrieve(&self, id: &str) -> StoreResult<Key> {
        self.keys
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("key".into()))
    }

    async fn remove(&self, id: &str) -> StoreResult<()> {
        let mut keys = self.keys.write().await;
        if keys.remove(id).is_none() {
            return Err(StoreError::NotFound("key".into()));
        }
        metrics::gauge!("tessera_keys_total").set(keys.len() as f64);
        Ok(())
    }
}

#[async_trait]
impl DomainRepository for InMemoryStore {
    async fn save(&self, domain: Domain) -> StoreResult<Domain> {
        let mut domains = self.domains.write().await;
        if domains.contains_key(&domain.id) {
            return Err(StoreError::Conflict("domain exists".into()));
        }
        if !domain.alias.is_empty() && domains.values().any(|d| d.alias == domain.alias) {
            return Err(StoreError::Conflict("domain alias taken".into()));
        }
        domains.insert(domain.id.clone(), domain.clone());
        metrics::gauge!("tessera_domains_total").set(domains.len() as f64);
        Ok(domain)
    }

    async fn retrieve_by_id(&self, id: &str) -> StoreResult<Domain> {
        self.domains
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("domain".into()))
    }

    async fn retrieve_all(&self, page: &DomainPage) -> StoreResult<DomainsPage> {
        let domains = self.domains.read().await;
        let mut matched: Vec<&Domain> = domains
            .values()
            .filter(|d| id_matches(&d.id, page.ids.as_ref()))
            .filter(|d| name_matches(&d.name, page.name.as_deref()))
            .filter(|d| match page.status {
                None | Some(DomainStatus::All) => true,
                Some(status) => d.status == status,
            })
            .collect();
        matched.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(DomainsPage {
            total: matched.len() as u64,
            offset: page.offset,
            limit: page.limit,
            domains: window(&matched, page.offset, page.limit)
                .into_iter()
                .cloned()
                .collect(),
        })
    }

    async fn update(
        &self,
        id: &str,
        updated_by: &str,
        req: &DomainReq,
        now: i64,
    ) -> StoreResult<Domain> {
        let mut domains = self.domains.write().await;
        let alias_taken = req
            .alias
            .as_deref()
            .filter(|alias| !alias.is_empty())
            .is_some_and(|alias| domains.values().any(|d| d.id != id && d.alias == alias));
        if alias_taken {
            return Err(StoreError::Conflict("domain alias taken".into()));
        }
        let domain = domains
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound("domain".into()))?;
        if let Some(name) = &req.name {
            domain.name = name.clone();
        }
        if let Some(alias) = &req.alias {
            domain.alias = alias.clone();
        }
        if let Some(tags) = &req.tags {
            domain.tags = tags.clone();
        }
        if let Some(metadata) = &req.metadata {
            domain.metadata = metadata.clone();
        }
        if let Some(status) = req.status {
            domain.status = status;
        }
        domain.updated_by = updated_by.to_string();
        domain.updated_at = now;
        Ok(domain.clone())
    }
}

#[async_trait]
impl GroupRepository for InMemoryStore {
    async fn save(&self, group: Group) -> StoreResult<Group> {
        let mut groups = self.groups.write().await;
        if groups.contains_key(&group.id) {
            return Err(StoreError::Conflict("group exists".into()));
        }
        groups.insert(group.id.clone(), group.clone());
        metrics::gauge!("tessera_groups_total").set(groups.len() as f64);
        Ok(group)
    }

    async fn retrieve_by_id(&self, id: &str) -> StoreResult<Group> {
        self.groups
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("group".into()))
    }

    async fn retrieve_by_ids(&self, ids: &[String]) -> StoreResult<Vec<Group>> {
        let groups = self.groups.read().await;
        Ok(ids.iter().filter_map(|id| groups.get(id).cloned()).collect())
    }

    async fn retrieve_all(&self, page: &GroupPage) -> StoreResult<GroupsPage> {
        let groups = self.groups.read().await;
        let mut matched: Vec<&Group> = groups
            .values()
            .filter(|g| id_matches(&g.id, page.ids.as_ref()))
            .filter(|g| name_matches(&g.name, page.name.as_deref()))
            .filter(|g| {
                page.domain_id
                    .as_ref()
                    .is_none_or(|domain| g.domain_id.as_ref() == Some(domain))
            })
            .collect();
        matched.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(GroupsPage {
            total: matched.len() as u64,
            offset: page.offset,
            limit: page.limit,
            groups: window(&matched, page.offset, page.limit)
                .into_iter()
                .cloned()
                .collect(),
        })
    }

    async fn update(&self, id: &str, req: &GroupReq, now: i64) -> StoreResult<Group> {
        let mut groups = self.groups.write().await;
        let group = groups
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound("group".into()))?;
        if let Some(name) = &req.name {
            group.name = name.clone();
        }
        if let Some(description) = &req.description {
            group.description = description.clone();
        }
        if let Some(metadata) = &req.metadata {
            group.metadata = metadata.clone();
        }
        group.updated_at = now;
        Ok(group.clone())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let mut groups = self.groups.write().await;
        if groups.remove(id).is_none() {
            return Err(StoreError::NotFound("group".into()));
        }
        metrics::gauge!("tessera_groups_total").set(groups.len() as f64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recovery(id: &str, subject: &str) -> Key {
        Key {
            id: id.to_string(),
            key_type: KeyType::Recovery,
            issuer_id: subject.to_string(),
            subject: subject.to_string(),
            issued_at: 0,
            expires_at: Some(300),
        }
    }

    fn domain(id: &str, alias: &str, created_at: i64) -> Domain {
        Domain {
            id: id.to_string(),
            name: format!("Domain {id}"),
            alias: alias.to_string(),
            created_at,
            ..Domain::default()
        }
    }

    #[tokio::test]
    async fn recovery_save_replaces_previous_for_subject() {
        let store = InMemoryStore::new();
        KeyRepository::save(&store, recovery("r1", "alice")).await.expect("first");
        KeyRepository::save(&store, recovery("r2", "bob")).await.expect("other subject");
        KeyRepository::save(&store, recovery("r3", "alice")).await.expect("replacement");

        assert!(matches!(
            store.retrieve("r1").await,
            Err(StoreError::NotFound(_))
        ));
        store.retrieve("r2").await.expect("bob untouched");
        store.retrieve("r3").await.expect("alice current");
        assert!(matches!(
            KeyRepository::save(&store, recovery("r3", "carol")).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn domain_alias_is_unique() {
        let store = InMemoryStore::new();
        DomainRepository::save(&store, domain("d1", "acme", 1)).await.expect("save");
        DomainRepository::save(&store, domain("d2", "", 2)).await.expect("no alias");
        DomainRepository::save(&store, domain("d3", "", 3)).await.expect("no alias again");
        assert!(matches!(
            DomainRepository::save(&store, domain("d4", "acme", 4)).await,
            Err(StoreError::Conflict(_))
        ));

        let req = DomainReq {
            alias: Some("acme".to_string()),
            ..DomainReq::default()
        };
        assert!(matches!(
            DomainRepository::update(&store, "d2", "u1", &req, 10).await,
            Err(StoreError::Conflict(_))
        ));
        let same = DomainRepository::update(&store, "d1", "u1", &req, 10)
            .await
            .expect("own alias");
        assert_eq!(same.updated_by, "u1");
        assert_eq!(same.updated_at, 10);
    }

    #[tokio::test]
    async fn domain_listing_filters_and_pages() {
        let store = InMemoryStore::new();
        for (i, id) in ["d1", "d2", "d3"].iter().enumerate() {
            DomainRepository::save(&store, domain(id, "", i as i64))
                .await
                .expect("save");
        }
        let disable = DomainReq {
            status: Some(DomainStatus::Disabled),
            ..DomainReq::default()
        };
        DomainRepository::update(&store, "d2", "u1", &disable, 5)
            .await
            .expect("disable");

        let page = DomainRepository::retrieve_all(
            &store,
            &DomainPage {
                status: Some(DomainStatus::Enabled),
                ..DomainPage::default()
            },
        )
        .await
        .expect("list");
        assert_eq!(page.total, 2);

        let page = DomainRepository::retrieve_all(
            &store,
            &DomainPage {
                offset: 1,
                limit: 1,
                ids: Some(vec!["d1".to_string(), "d3".to_string()]),
                ..DomainPage::default()
            },
        )
        .await
        .expect("list");
        assert_eq!(page.total, 2);
        assert_eq!(page.domains.len(), 1);
        assert_eq!(page.domains[0].id, "d3");
    }

    #[tokio::test]
    async fn group_lookup_by_ids_skips_missing() {
        let store = InMemoryStore::new();
        for id in ["g1", "g2"] {
            GroupRepository::save(
                &store,
                Group {
                    id: id.to_string(),
                    name: id.to_string(),
                    ..Group::default()
                },
            )
            .await
            .expect("save");
        }
        let found = store
            .retrieve_by_ids(&["g2".to_string(), "gx".to_string(), "g1".to_string()])
            .await
            .expect("lookup");
        let ids: Vec<_> = found.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["g2", "g1"]);

        GroupRepository::delete(&store, "g1").await.expect("delete");
        assert!(matches!(
            GroupRepository::delete(&store, "g1").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
