mod common;

use authd::error::AuthError;
use authd::model::{DomainPage, KeyRequest, KeyType};
use common::{NOW, harness};

#[tokio::test]
async fn access_key_expires_after_ten_minutes() {
    let h = harness().await;
    let issued = h
        .state
        .auth
        .issue("", KeyRequest::new(KeyType::Access, "alice").expires_at(NOW + 600))
        .await
        .expect("login");

    let key = h.state.auth.identify(&issued.access_token).await.expect("fresh");
    assert_eq!(key.subject, "alice");
    assert_eq!(key.expires_at, Some(NOW + 600));

    h.clock.advance(600);
    h.state
        .auth
        .identify(&issued.access_token)
        .await
        .expect("valid at the expiry instant");

    h.clock.advance(1);
    let err = h
        .state
        .auth
        .identify(&issued.access_token)
        .await
        .expect_err("expired");
    assert!(matches!(err, AuthError::Expired));
}

#[tokio::test]
async fn refresh_token_renews_but_is_not_a_principal() {
    let h = harness().await;
    let issued = h
        .state
        .auth
        .issue("", KeyRequest::new(KeyType::Access, "alice"))
        .await
        .expect("login");
    let refresh = issued.refresh_token.expect("refresh token");

    let err = h
        .state
        .domains
        .list_domains(&refresh, DomainPage::default())
        .await
        .expect_err("refresh as requester");
    assert!(matches!(err, AuthError::Authentication(_)));

    h.clock.advance(3_601);
    assert!(matches!(
        h.state.auth.identify(&issued.access_token).await,
        Err(AuthError::Expired)
    ));
    let renewed = h
        .state
        .auth
        .issue(&refresh, KeyRequest::new(KeyType::Refresh, ""))
        .await
        .expect("refresh");
    let key = h.state.auth.identify(&renewed.access_token).await.expect("renewed");
    assert_eq!(key.key_type, KeyType::Access);
    assert_eq!(key.subject, "alice");
    assert!(renewed.refresh_token.is_some());
}

#[tokio::test]
async fn api_key_lifecycle() {
    let h = harness().await;
    let alice = h.login("alice").await;
    let issued = h
        .state
        .auth
        .issue(&alice, KeyRequest::new(KeyType::Api, "").expires_at(NOW + 60))
        .await
        .expect("api key");
    assert!(issued.refresh_token.is_none());

    let key = h.state.auth.identify(&issued.access_token).await.expect("api identify");
    assert_eq!(key.key_type, KeyType::Api);
    assert_eq!(key.issuer_id, "alice");
    let stored = h.state.auth.retrieve_key(&alice, &key.id).await.expect("retrieve");
    assert_eq!(stored, key);

    let bob = h.login("bob").await;
    assert!(matches!(
        h.state.auth.retrieve_key(&bob, &key.id).await,
        Err(AuthError::Authorization(_))
    ));
    let root = h.login(common::ADMIN).await;
    h.state
        .auth
        .retrieve_key(&root, &key.id)
        .await
        .expect("platform admin sees any key");

    h.clock.advance(61);
    assert!(matches!(
        h.state.auth.identify(&issued.access_token).await,
        Err(AuthError::Expired)
    ));
    let alice = h.login("alice").await;
    assert!(matches!(
        h.state.auth.retrieve_key(&alice, &key.id).await,
        Err(AuthError::KeyNotFound)
    ));
}

#[tokio::test]
async fn revoked_api_key_is_unreachable() {
    let h = harness().await;
    let alice = h.login("alice").await;
    let issued = h
        .state
        .auth
        .issue(&alice, KeyRequest::new(KeyType::Api, ""))
        .await
        .expect("api key");
    let key = h.state.auth.identify(&issued.access_token).await.expect("identify");
    assert_eq!(key.expires_at, None);

    h.state.auth.revoke(&alice, &key.id).await.expect("revoke");
    assert!(matches!(
        h.state.auth.identify(&issued.access_token).await,
        Err(AuthError::KeyNotFound)
    ));
    assert!(matches!(
        h.state.auth.revoke(&alice, &key.id).await,
        Err(AuthError::KeyNotFound)
    ));
}

#[tokio::test]
async fn new_recovery_key_replaces_the_previous_one() {
    let h = harness().await;
    let first = h
        .state
        .auth
        .issue("", KeyRequest::new(KeyType::Recovery, "alice"))
        .await
        .expect("first recovery");
    h.clock.advance(1);
    let second = h
        .state
        .auth
        .issue("", KeyRequest::new(KeyType::Recovery, "alice"))
        .await
        .expect("second recovery");

    assert!(matches!(
        h.state.auth.identify(&first.access_token).await,
        Err(AuthError::KeyNotFound)
    ));
    let key = h.state.auth.identify(&second.access_token).await.expect("second");
    assert_eq!(key.key_type, KeyType::Recovery);

    h.clock.advance(301);
    assert!(matches!(
        h.state.auth.identify(&second.access_token).await,
        Err(AuthError::Expired)
    ));
}

#[tokio::test]
async fn tampered_token_is_rejected() {
    let h = harness().await;
    let token = h.login("alice").await;
    let mut tampered = token.clone();
    tampered.pop();
    tampered.push(if token.ends_with('A') { 'B' } else { 'A' });
    let err = h.state.auth.identify(&tampered).await.expect_err("tampered");
    assert!(matches!(
        err,
        AuthError::InvalidSignature | AuthError::Authentication(_)
    ));
    assert!(matches!(
        h.state.auth.identify("not-a-token").await,
        Err(AuthError::Authentication(_))
    ));
}
