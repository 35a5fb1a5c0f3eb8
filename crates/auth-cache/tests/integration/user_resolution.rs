use std::time::Duration;

use auth_cache::caching::CacheError;
use auth_cache::services::ClientError;
use auth_cache::types::ObjectType;
use futures::future::join_all;

use crate::{TEST_CONFIG, load_config, setup, setup_service};

#[tokio::test]
async fn test_resolution_is_memoized() {
    setup();
    let (client, manager) = setup_service(&load_config(TEST_CONFIG));

    let created = manager.create_user("alice").await.unwrap();
    assert_eq!(client.lookup(ObjectType::User, "alice"), Some(created));

    assert_eq!(manager.create_user("alice").await, Ok(created));
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_resolutions_share_one_request() {
    setup();
    let config = load_config(TEST_CONFIG);
    let (client, manager) = setup_service(&config);

    let requests: Vec<_> = (0..50).map(|_| manager.create_user("bob")).collect();
    let results = join_all(requests).await;

    let bob = client.lookup(ObjectType::User, "bob").unwrap();
    assert!(results.iter().all(|result| result == &Ok(bob)));
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_different_users_resolve_independently() {
    setup();
    let (client, manager) = setup_service(&load_config(TEST_CONFIG));

    let (alice, bob) = futures::join!(manager.create_user("alice"), manager.create_user("bob"));
    assert_ne!(alice.unwrap(), bob.unwrap());
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn test_existing_user() {
    setup();
    let (client, manager) = setup_service(&load_config(TEST_CONFIG));
    let existing = client.insert(ObjectType::User, "dave");

    assert_eq!(manager.create_user("dave").await, Ok(existing));
}

#[tokio::test]
async fn test_existing_user_without_ignore_existing() {
    setup();
    let config = load_config(
        r#"
cypress_user_manager:
  ignore_existing: false
caching_cypress_user_manager:
  cache:
    sweep_interval: 0s
"#,
    );
    let (client, manager) = setup_service(&config);
    let existing = client.insert(ObjectType::User, "dave");

    let err = manager.create_user("dave").await.unwrap_err();
    assert_eq!(
        err,
        CacheError::Upstream(format!("object already exists as {existing}"))
    );
}

#[tokio::test]
async fn test_failures_are_cached_briefly() {
    setup();
    let (client, manager) = setup_service(&load_config(TEST_CONFIG));
    client.set_failure(Some(ClientError::Rejected("no such principal".into())));

    let err = manager.create_user("carol").await.unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"upstream request failed: request rejected: no such principal");

    // The failure is served from memory while it is fresh, even though the authority recovered.
    client.set_failure(None);
    assert_eq!(manager.create_user("carol").await, Err(err));
    assert_eq!(client.calls(), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;

    let carol = manager.create_user("carol").await.unwrap();
    assert_eq!(client.lookup(ObjectType::User, "carol"), Some(carol));
    assert_eq!(client.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_authority_times_out() {
    setup();
    let (client, manager) = setup_service(&load_config(TEST_CONFIG));
    client.set_hang(true);

    let requests: Vec<_> = (0..3).map(|_| manager.create_user("erin")).collect();
    for result in join_all(requests).await {
        assert_eq!(result, Err(CacheError::Timeout(Duration::from_millis(50))));
    }
    assert_eq!(client.calls(), 1);

    // Timeouts are not memoized, the next resolution goes to the authority right away.
    client.set_hang(false);
    let erin = manager.create_user("erin").await.unwrap();
    assert_eq!(client.lookup(ObjectType::User, "erin"), Some(erin));
    assert_eq!(client.calls(), 2);
}
