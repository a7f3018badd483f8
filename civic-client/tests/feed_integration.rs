// civic-client/tests/feed_integration.rs
// Feed, like toggle and reconciliation against the in-memory gateway

use chrono::{Duration, Utc};
use civic_client::feed::FeedOptions;
use civic_client::{
    ClientError, FilterCriteria, Gateway, IssueFeed, MemoryGateway, RowId, SessionContext, Severity, Table,
    UserInfo,
};
use serde_json::json;
use std::sync::Arc;

fn citizen(id: &str) -> SessionContext {
    SessionContext::authenticated(UserInfo::new(id).with_full_name("Asha Rao"), "jwt")
}

/// Five issues, newest first by id: 1 is newest, 5 is eight days old
fn seeded() -> MemoryGateway {
    let now = Utc::now();
    let gateway = MemoryGateway::new();
    gateway.seed(
        Table::Issues,
        [
            json!({ "id": 1, "title": "Open manhole", "severity": "emergency", "status": "Pending", "category": "roads", "created_at": now - Duration::hours(2) }),
            json!({ "id": 2, "title": "Street light out", "severity": "minor", "status": "Resolved", "category": "electricity", "created_at": now - Duration::days(1) }),
            json!({ "id": 3, "title": "Burst pipe", "severity": "critical", "status": "In Progress", "category": "water", "created_at": now - Duration::days(2) }),
            json!({ "id": 4, "title": "Garbage pile", "severity": "urgent", "status": "Pending", "category": "sanitation", "created_at": now - Duration::days(3) }),
            json!({ "id": 5, "title": "Old crash site", "severity": "emergency", "status": "Resolved", "category": "accident", "created_at": now - Duration::days(8) }),
        ],
    );
    // issue 5 is the most liked but outside the trending window
    let likes = [(1, 4), (2, 1), (4, 2), (5, 9)];
    for (issue, count) in likes {
        gateway.seed(
            Table::IssueLikes,
            (0..count).map(|n| json!({ "issue_id": issue, "user_id": format!("other-{n}") })),
        );
    }
    gateway
}

fn ids(issues: &[civic_client::Issue]) -> Vec<String> {
    issues.iter().map(|i| i.id.to_string()).collect()
}

async fn wait_for_generation(reconciler: &civic_client::Reconciler, at_least: u64) {
    let mut generation = reconciler.generation();
    tokio::time::timeout(std::time::Duration::from_secs(2), generation.wait_for(|g| *g >= at_least))
        .await
        .expect("reconciler did not reload in time")
        .expect("reconciler stopped");
}

#[tokio::test]
async fn test_load_orders_newest_first_with_counts() {
    let gateway = seeded();
    let feed = IssueFeed::new(Arc::new(gateway.clone()), citizen("u1"));
    feed.refresh().await.unwrap();

    assert_eq!(ids(&feed.snapshot()), ["1", "2", "3", "4", "5"]);
    assert_eq!(feed.issue(&RowId::from(1)).unwrap().like_count, 4);
    assert_eq!(feed.issue(&RowId::from(3)).unwrap().like_count, 0);
    assert_eq!(feed.stats().total, 5);
    assert_eq!(feed.stats().resolved, 2);
    assert!(feed.liked().is_empty());
}

#[tokio::test]
async fn test_fetch_error_keeps_previous_snapshot() {
    let gateway = seeded();
    let feed = IssueFeed::new(Arc::new(gateway.clone()), citizen("u1"));
    feed.load().await.unwrap();
    let before = feed.snapshot();

    gateway.insert(Table::Issues, json!({ "title": "New one" })).await.unwrap();
    gateway.fail_queries(Table::Issues, 1);

    let err = feed.load().await.unwrap_err();
    assert!(matches!(err, ClientError::Fetch { table: Table::Issues, .. }));
    assert_eq!(feed.snapshot(), before);
}

#[tokio::test]
async fn test_unknown_labels_do_not_break_load() {
    let now = Utc::now();
    let gateway = MemoryGateway::new();
    gateway.seed(
        Table::Issues,
        [
            json!({ "id": 1, "title": "Blocked drain", "severity": "urgent", "created_at": now - Duration::hours(1) }),
            json!({ "id": 2, "title": "Imported row", "severity": "low", "status": "Closed", "created_at": now - Duration::hours(2) }),
        ],
    );
    let feed = IssueFeed::new(Arc::new(gateway), SessionContext::anonymous());
    feed.load().await.unwrap();

    assert_eq!(ids(&feed.snapshot()), ["1", "2"]);
    let odd = feed.issue(&RowId::from(2)).unwrap();
    assert_eq!(odd.severity, Severity::Minor);
    assert_eq!(odd.status, civic_client::IssueStatus::Pending);
    assert_eq!(feed.issue(&RowId::from(1)).unwrap().severity, Severity::Urgent);
}

#[tokio::test]
async fn test_filter_all_returns_snapshot_in_order() {
    let feed = IssueFeed::new(Arc::new(seeded()), SessionContext::anonymous());
    feed.load().await.unwrap();

    assert_eq!(feed.filtered(&FilterCriteria::all()), feed.snapshot());
}

#[tokio::test]
async fn test_filter_severity_is_case_sensitive() {
    let feed = IssueFeed::new(Arc::new(seeded()), SessionContext::anonymous());
    feed.load().await.unwrap();

    let criteria = FilterCriteria::from_labels("emergency", "all", "all").unwrap();
    let emergencies = feed.filtered(&criteria);
    assert_eq!(ids(&emergencies), ["1", "5"]);
    assert!(FilterCriteria::from_labels("Emergency", "all", "all").is_err());
    assert!(emergencies.iter().all(|i| i.severity == Severity::Emergency));
}

#[tokio::test]
async fn test_trending_excludes_issues_older_than_a_week() {
    let feed = IssueFeed::new(Arc::new(seeded()), SessionContext::anonymous());
    feed.load().await.unwrap();

    let trending = feed.trending();
    assert_eq!(ids(&trending), ["1", "4", "2"]);
    assert!(trending.iter().all(|i| i.id != RowId::from(5)));
}

#[tokio::test]
async fn test_trending_window_and_limit_are_configurable() {
    let options = FeedOptions::default().with_trending(Duration::days(30), 1);
    let feed = IssueFeed::new(Arc::new(seeded()), SessionContext::anonymous()).with_options(options);
    feed.load().await.unwrap();

    assert_eq!(ids(&feed.trending()), ["5"]);
}

#[tokio::test]
async fn test_anonymous_toggle_requires_auth() {
    let gateway = seeded();
    let feed = IssueFeed::new(Arc::new(gateway.clone()), SessionContext::anonymous());
    feed.load().await.unwrap();

    let err = feed.toggle_like(&RowId::from(1)).unwrap_err();
    assert!(matches!(err, ClientError::AuthRequired));
    assert!(!feed.is_liked(&RowId::from(1)));
    assert_eq!(feed.issue(&RowId::from(1)).unwrap().like_count, 4);
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_toggle_like_is_optimistic_and_calls_gateway() {
    let gateway = seeded();
    let feed = IssueFeed::new(Arc::new(gateway.clone()), citizen("u1"));
    feed.refresh().await.unwrap();
    let id = RowId::from(1);

    let toggle = feed.toggle_like(&id).unwrap();
    assert!(toggle.liked);
    assert_eq!(toggle.like_count, 5);
    assert!(feed.is_liked(&id));
    assert_eq!(feed.issue(&id).unwrap().like_count, 5);

    toggle.confirmed().await.unwrap();
    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "toggle_like");
    assert_eq!(calls[0].1, json!({ "p_issue_id": "1", "p_user_id": "u1" }));

    // server truth agrees after a full reload
    feed.refresh().await.unwrap();
    assert!(feed.is_liked(&id));
    assert_eq!(feed.issue(&id).unwrap().like_count, 5);
}

#[tokio::test]
async fn test_toggle_twice_restores_state() {
    let gateway = seeded();
    let feed = IssueFeed::new(Arc::new(gateway.clone()), citizen("u1"));
    feed.refresh().await.unwrap();
    let id = RowId::from(4);
    let liked_before = feed.liked();

    let first = feed.toggle_like(&id).unwrap();
    let second = feed.toggle_like(&id).unwrap();
    assert_eq!((first.liked, first.like_count), (true, 3));
    assert_eq!((second.liked, second.like_count), (false, 2));
    assert_eq!(feed.liked(), liked_before);
    assert_eq!(feed.issue(&id).unwrap().like_count, 2);

    first.confirmed().await.unwrap();
    second.confirmed().await.unwrap();
}

#[tokio::test]
async fn test_like_counts_never_negative() {
    let gateway = MemoryGateway::new();
    gateway.seed(
        Table::Issues,
        [json!({ "id": "z", "title": "Stray cattle", "created_at": Utc::now() })],
    );
    // the user's like exists but the cached aggregate lags behind at zero
    let session = citizen("u1");
    let feed = IssueFeed::new(Arc::new(gateway.clone()), session);
    feed.load().await.unwrap();
    gateway.seed(Table::IssueLikes, [json!({ "issue_id": "z", "user_id": "u1" })]);
    feed.load_likes().await.unwrap();

    let id = RowId::from("z");
    for _ in 0..5 {
        let toggle = feed.toggle_like(&id).unwrap();
        toggle.confirmed().await.unwrap();
        assert!(feed.issue(&id).unwrap().like_count <= 1);
    }
    // unlike, like, unlike, like, unlike
    assert!(!feed.is_liked(&id));
    assert_eq!(feed.issue(&id).unwrap().like_count, 0);
}

#[tokio::test]
async fn test_failed_toggle_rolls_back() {
    let gateway = seeded();
    let feed = IssueFeed::new(Arc::new(gateway.clone()), citizen("u1"));
    feed.refresh().await.unwrap();
    let id = RowId::from(2);

    gateway.fail_calls("toggle_like", 1);
    let toggle = feed.toggle_like(&id).unwrap();
    assert_eq!(toggle.like_count, 2);

    let err = toggle.confirmed().await.unwrap_err();
    assert!(matches!(err, ClientError::Call { .. }));
    assert!(!feed.is_liked(&id));
    assert_eq!(feed.issue(&id).unwrap().like_count, 1);
}

#[tokio::test]
async fn test_failed_toggle_after_reload_matches_server() {
    let gateway = seeded();
    let feed = IssueFeed::new(Arc::new(gateway.clone()), citizen("u1"));
    feed.refresh().await.unwrap();
    let id = RowId::from(2);

    gateway.fail_calls("toggle_like", 1);
    let toggle = feed.toggle_like(&id).unwrap();
    assert_eq!(toggle.like_count, 2);

    // a reload lands before the remote call fails
    feed.load().await.unwrap();
    assert_eq!(feed.issue(&id).unwrap().like_count, 1);

    assert!(toggle.confirmed().await.is_err());
    assert!(!feed.is_liked(&id));
    assert_eq!(feed.issue(&id).unwrap().like_count, 1);

    feed.refresh().await.unwrap();
    assert!(!feed.is_liked(&id));
    assert_eq!(feed.issue(&id).unwrap().like_count, 1);
}

#[tokio::test]
async fn test_failed_toggle_without_rollback_keeps_local_state() {
    let gateway = seeded();
    let feed = IssueFeed::new(Arc::new(gateway.clone()), citizen("u1"))
        .with_options(FeedOptions::default().with_rollback(false));
    feed.refresh().await.unwrap();
    let id = RowId::from(2);

    gateway.fail_calls("toggle_like", 1);
    let toggle = feed.toggle_like(&id).unwrap();
    assert!(toggle.confirmed().await.is_err());
    assert!(feed.is_liked(&id));
    assert_eq!(feed.issue(&id).unwrap().like_count, 2);

    // next reconciliation restores server truth
    feed.refresh().await.unwrap();
    assert!(!feed.is_liked(&id));
    assert_eq!(feed.issue(&id).unwrap().like_count, 1);
}

#[tokio::test]
async fn test_comment_change_triggers_one_reload() {
    let gateway = seeded();
    let feed = IssueFeed::new(Arc::new(gateway.clone()), citizen("u1"));
    feed.refresh().await.unwrap();
    let reconciler = feed.spawn_reconciler().await.unwrap();

    let queries_before = gateway.query_count(Table::Issues);
    let generation_before = feed.generation();

    // another citizen comments on issue 3
    gateway
        .insert(Table::Comments, json!({ "issue_id": 3, "user_id": "u2", "content": "Water everywhere" }))
        .await
        .unwrap();
    wait_for_generation(&reconciler, generation_before + 1).await;

    assert_eq!(gateway.query_count(Table::Issues), queries_before + 1);
    assert_eq!(feed.generation(), generation_before + 1);
    assert_eq!(feed.issue(&RowId::from(3)).unwrap().comment_count, 1);
    assert_eq!(ids(&feed.trending()), ["1", "4", "2"]);

    reconciler.close().await;
}

#[tokio::test]
async fn test_like_change_reconciles_like_set() {
    let gateway = seeded();
    let feed = IssueFeed::new(Arc::new(gateway.clone()), citizen("u1"));
    feed.refresh().await.unwrap();
    let reconciler = feed.spawn_reconciler().await.unwrap();
    let generation = feed.generation();

    // the same user likes issue 4 from another device
    gateway
        .remote_call("toggle_like", json!({ "p_issue_id": 4, "p_user_id": "u1" }))
        .await
        .unwrap();
    wait_for_generation(&reconciler, generation + 1).await;

    assert!(feed.is_liked(&RowId::from(4)));
    assert_eq!(feed.issue(&RowId::from(4)).unwrap().like_count, 3);
    assert_eq!(ids(&feed.trending()), ["1", "4", "2"]);

    reconciler.close().await;
}

#[tokio::test]
async fn test_issue_change_reloads_snapshot() {
    let gateway = seeded();
    let feed = IssueFeed::new(Arc::new(gateway.clone()), citizen("u1"));
    feed.load().await.unwrap();
    let reconciler = feed.spawn_reconciler().await.unwrap();

    gateway
        .update(Table::Issues, &RowId::from(4), json!({ "status": "Resolved" }))
        .await
        .unwrap();
    wait_for_generation(&reconciler, 2).await;

    assert_eq!(feed.stats().resolved, 3);
    reconciler.close().await;
}

#[tokio::test]
async fn test_anonymous_session_does_not_subscribe() {
    let gateway = seeded();
    let feed = IssueFeed::new(Arc::new(gateway.clone()), SessionContext::anonymous());
    feed.load().await.unwrap();

    let err = feed.spawn_reconciler().await.unwrap_err();
    assert!(matches!(err, ClientError::AuthRequired));
    assert_eq!(gateway.subscriber_count(), 0);
}

#[tokio::test]
async fn test_reconciler_close_releases_subscriptions() {
    let gateway = seeded();
    let feed = IssueFeed::new(Arc::new(gateway.clone()), citizen("u1"));
    feed.load().await.unwrap();

    let reconciler = feed.spawn_reconciler().await.unwrap();
    assert_eq!(gateway.subscriber_count(), 3);
    assert!(reconciler.is_running());

    reconciler.close().await;
    assert_eq!(gateway.subscriber_count(), 0);

    // changes after teardown no longer reload the feed
    let queries = gateway.query_count(Table::Issues);
    gateway.insert(Table::Comments, json!({ "issue_id": 1, "content": "late" })).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(gateway.query_count(Table::Issues), queries);
}

#[tokio::test]
async fn test_reconciler_survives_failed_reload() {
    let gateway = seeded();
    let feed = IssueFeed::new(Arc::new(gateway.clone()), citizen("u1"));
    feed.load().await.unwrap();
    let reconciler = feed.spawn_reconciler().await.unwrap();

    gateway.fail_queries(Table::Issues, 1);
    gateway.insert(Table::Comments, json!({ "issue_id": 2, "content": "first" })).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(feed.generation(), 1);
    assert!(reconciler.is_running());

    gateway.insert(Table::Comments, json!({ "issue_id": 2, "content": "second" })).await.unwrap();
    wait_for_generation(&reconciler, 2).await;
    assert_eq!(feed.issue(&RowId::from(2)).unwrap().comment_count, 2);

    reconciler.close().await;
}
