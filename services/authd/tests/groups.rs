mod common;

use authd::error::AuthError;
use authd::model::{GroupPage, GroupReq, MemberKind};
use common::{ADMIN, harness, ids, new_group};
use tessera_authz::{EntityType, Permission, PolicyReq, Relation, RelationQuery};

#[tokio::test]
async fn missing_parent_leaves_no_trace() {
    let h = harness().await;
    let owner = h.login("owner").await;
    let err = h
        .state
        .groups
        .create_group(&owner, new_group("orphan", Some("no-such-group"), None))
        .await
        .expect_err("missing parent");
    assert!(matches!(err, AuthError::NotFound(_)));

    let root = h.login(ADMIN).await;
    let page = h
        .state
        .groups
        .list_groups(&root, GroupPage::default())
        .await
        .expect("list");
    assert_eq!(page.total, 0);
    let tuples = h
        .state
        .auth
        .read_relations(&RelationQuery::on(EntityType::Group), None, 100)
        .await
        .expect("read");
    assert!(tuples.relations.is_empty());
}

#[tokio::test]
async fn hierarchy_walks_are_transitive() {
    let h = harness().await;
    let owner = h.login("owner").await;
    let domain = h.create_domain(&owner, "acme").await;
    let top = h.create_group(&owner, "top", None, Some(&domain.id)).await;
    let mid = h.create_group(&owner, "mid", Some(&top.id), None).await;
    let leaf = h.create_group(&owner, "leaf", Some(&mid.id), None).await;
    assert_eq!(leaf.domain_id.as_deref(), Some(domain.id.as_str()));
    assert_eq!(leaf.parent_id.as_deref(), Some(mid.id.as_str()));

    let parents = h
        .state
        .groups
        .list_parents(&owner, &leaf.id, 5)
        .await
        .expect("parents");
    assert_eq!(ids(&parents), vec![mid.id.clone(), top.id.clone()]);

    let children = h
        .state
        .groups
        .list_children(&owner, &top.id, 5)
        .await
        .expect("children");
    assert_eq!(ids(&children), vec![mid.id.clone(), leaf.id.clone()]);

    let direct = h
        .state
        .groups
        .list_children(&owner, &top.id, 1)
        .await
        .expect("direct children");
    assert_eq!(ids(&direct), vec![mid.id.clone()]);

    let other = h.login("other").await;
    assert!(matches!(
        h.state.groups.list_parents(&other, &leaf.id, 5).await,
        Err(AuthError::Authorization(_))
    ));
}

#[tokio::test]
async fn child_cannot_leave_its_parents_domain() {
    let h = harness().await;
    let owner = h.login("owner").await;
    let first = h.create_domain(&owner, "first").await;
    let second = h.create_domain(&owner, "second").await;
    let parent = h.create_group(&owner, "parent", None, Some(&first.id)).await;
    let err = h
        .state
        .groups
        .create_group(&owner, new_group("child", Some(&parent.id), Some(&second.id)))
        .await
        .expect_err("domain mismatch");
    assert!(matches!(err, AuthError::MalformedEntity(_)));
}

#[tokio::test]
async fn group_with_children_cannot_be_removed() {
    let h = harness().await;
    let owner = h.login("owner").await;
    let parent = h.create_group(&owner, "parent", None, None).await;
    let child = h.create_group(&owner, "child", Some(&parent.id), None).await;

    let err = h
        .state
        .groups
        .remove_group(&owner, &parent.id)
        .await
        .expect_err("has children");
    assert!(matches!(err, AuthError::GroupNotEmpty));

    h.state
        .groups
        .remove_group(&owner, &child.id)
        .await
        .expect("remove leaf");
    assert!(matches!(
        h.state.groups.view_group(&owner, &child.id).await,
        Err(AuthError::NotFound(_))
    ));
    let leftover = h
        .state
        .auth
        .read_relations(&RelationQuery::on(EntityType::Group).object(&child.id), None, 100)
        .await
        .expect("read");
    assert!(leftover.relations.is_empty());

    h.state
        .groups
        .remove_group(&owner, &parent.id)
        .await
        .expect("remove now-empty parent");
}

#[tokio::test]
async fn nested_group_members_inherit_membership() {
    let h = harness().await;
    let owner = h.login("owner").await;
    let outer = h.create_group(&owner, "outer", None, None).await;
    let inner = h.create_group(&owner, "inner", None, None).await;

    h.state
        .groups
        .assign(&owner, &inner.id, Relation::Member, MemberKind::Users, &["dana".to_string()])
        .await
        .expect("add user to inner");
    h.state
        .groups
        .assign(&owner, &outer.id, Relation::Member, MemberKind::Groups, &[inner.id.clone()])
        .await
        .expect("nest inner into outer");

    let membership = PolicyReq::user("dana", EntityType::Group, outer.id.as_str())
        .with_permission(Permission::Membership);
    h.state
        .auth
        .authorize(&membership)
        .await
        .expect("dana inherits outer membership");

    let members = h
        .state
        .groups
        .list_members(&owner, &outer.id, MemberKind::Groups, None, 10)
        .await
        .expect("group members");
    assert_eq!(members.policies, vec![inner.id.clone()]);

    let memberships = h
        .state
        .groups
        .list_memberships(&owner, &inner.id, MemberKind::Groups, None, 10)
        .await
        .expect("group memberships");
    assert_eq!(memberships.policies, vec![outer.id.clone()]);

    let dana = h.login("dana").await;
    let joined = h
        .state
        .groups
        .list_memberships(&dana, "dana", MemberKind::Users, None, 10)
        .await
        .expect("user memberships");
    let mut joined = joined.policies;
    joined.sort();
    let mut expected = vec![outer.id.clone(), inner.id.clone()];
    expected.sort();
    assert_eq!(joined, expected);

    assert!(matches!(
        h.state
            .groups
            .assign(&owner, &outer.id, Relation::Member, MemberKind::Groups, &[outer.id.clone()])
            .await,
        Err(AuthError::MalformedEntity(_))
    ));
    assert!(matches!(
        h.state
            .groups
            .assign(&owner, &outer.id, Relation::Viewer, MemberKind::Groups, &[inner.id.clone()])
            .await,
        Err(AuthError::MalformedEntity(_))
    ));

    h.state
        .groups
        .unassign(&owner, &outer.id, Relation::Member, MemberKind::Groups, &[inner.id.clone()])
        .await
        .expect("unnest");
    assert!(matches!(
        h.state.auth.authorize(&membership).await,
        Err(AuthError::Authorization(_))
    ));
}

#[tokio::test]
async fn editors_update_and_strangers_do_not_see_groups() {
    let h = harness().await;
    let owner = h.login("owner").await;
    let editor = h.login("editor").await;
    let stranger = h.login("stranger").await;
    let group = h.create_group(&owner, "team", None, None).await;

    h.state
        .groups
        .assign(&owner, &group.id, Relation::Editor, MemberKind::Users, &["editor".to_string()])
        .await
        .expect("assign editor");
    let updated = h
        .state
        .groups
        .update_group(
            &editor,
            &group.id,
            GroupReq {
                description: Some("renamed by editor".to_string()),
                ..GroupReq::default()
            },
        )
        .await
        .expect("editor updates");
    assert_eq!(updated.description, "renamed by editor");

    let visible = h
        .state
        .groups
        .list_groups(&editor, GroupPage::default())
        .await
        .expect("editor list");
    assert_eq!(visible.total, 1);
    let hidden = h
        .state
        .groups
        .list_groups(&stranger, GroupPage::default())
        .await
        .expect("stranger list");
    assert_eq!(hidden.total, 0);
    assert!(matches!(
        h.state.groups.view_group(&stranger, &group.id).await,
        Err(AuthError::Authorization(_))
    ));
    assert!(matches!(
        h.state
            .groups
            .assign(&editor, &group.id, Relation::Viewer, MemberKind::Users, &["x".to_string()])
            .await,
        Err(AuthError::Authorization(_))
    ));
}

#[tokio::test]
async fn walks_only_return_viewable_groups() {
    let h = harness().await;
    let alice = h.login("alice").await;
    let bob = h.login("bob").await;
    let parent = h.create_group(&alice, "parent", None, None).await;
    let child = h.create_group(&alice, "child", Some(&parent.id), None).await;
    let grandchild = h.create_group(&alice, "grandchild", Some(&child.id), None).await;

    h.state
        .groups
        .assign(&alice, &child.id, Relation::Viewer, MemberKind::Users, &["bob".to_string()])
        .await
        .expect("assign viewer");

    h.state
        .groups
        .view_group(&bob, &child.id)
        .await
        .expect("bob views child");
    assert!(matches!(
        h.state.groups.view_group(&bob, &parent.id).await,
        Err(AuthError::Authorization(_))
    ));
    let parents = h
        .state
        .groups
        .list_parents(&bob, &grandchild.id, 5)
        .await
        .expect("parents");
    assert_eq!(ids(&parents), vec![child.id.clone()]);
    let parents = h
        .state
        .groups
        .list_parents(&bob, &child.id, 5)
        .await
        .expect("parents of child");
    assert!(parents.is_empty());

    let full = h
        .state
        .groups
        .list_parents(&alice, &grandchild.id, 5)
        .await
        .expect("owner parents");
    assert_eq!(ids(&full), vec![child.id.clone(), parent.id.clone()]);
}
