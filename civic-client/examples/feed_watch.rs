// civic-client/examples/feed_watch.rs
// Watch the issue feed and print it on every change
//
// With CIVIC_API_URL and CIVIC_API_KEY set (environment or .env) the feed is
// read from the platform; otherwise a seeded in-memory gateway is used.
//
// Run: cargo run --example feed_watch

use chrono::{Duration, Utc};
use civic_client::{
    ClientConfig, ClientError, Gateway, IssueFeed, MemoryGateway, RestGateway, SessionContext, Table, UserInfo, logger,
};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init_logger();

    let (gateway, session, demo): (Arc<dyn Gateway>, SessionContext, Option<MemoryGateway>) =
        match ClientConfig::from_env() {
            Ok(config) => {
                let rest = RestGateway::new(&config)?;
                let session = rest.resolve_session().await?;
                println!("Connected to {}", config.base());
                (Arc::new(rest), session, None)
            }
            Err(e) => {
                println!("{e}; using the in-memory demo gateway");
                let memory = demo_gateway();
                let session = SessionContext::authenticated(UserInfo::new("demo-user").with_full_name("Demo"), "demo");
                (Arc::new(memory.clone()), session, Some(memory))
            }
        };

    let feed = IssueFeed::new(gateway, session);
    if let Err(e) = feed.refresh().await {
        eprintln!("Initial load failed: {e}");
    }
    print_feed(&feed);
    let reconciler = match feed.spawn_reconciler().await {
        Ok(reconciler) => reconciler,
        Err(ClientError::AuthRequired) => {
            println!("\nSign in (CIVIC_ACCESS_TOKEN) to follow live changes");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let mut generation = reconciler.generation();

    if let Some(memory) = demo {
        if let Some(first) = feed.snapshot().first() {
            let toggle = feed.toggle_like(&first.id)?;
            println!("\nLiked \"{}\" ({} likes)", first.title, toggle.like_count);
            toggle.confirmed().await?;
        }
        memory
            .insert(Table::Comments, json!({ "issue_id": 2, "content": "Still not fixed" }))
            .await?;
    }

    println!("\nWatching for changes, Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = generation.changed() => {
                if changed.is_err() {
                    break;
                }
                print_feed(&feed);
            }
        }
    }

    reconciler.close().await;
    Ok(())
}

fn print_feed(feed: &IssueFeed) {
    let stats = feed.stats();
    println!("\n== Feed (generation {}) ==", feed.generation());
    println!("{} reported, {} resolved", stats.total, stats.resolved);

    for issue in feed.snapshot() {
        let heart = if feed.is_liked(&issue.id) { "♥" } else { " " };
        println!(
            "{heart} [{:<15}] {:<12} {:<40} {:>3} likes {:>3} comments",
            issue.severity.as_str(),
            issue.status.as_str(),
            issue.title,
            issue.like_count,
            issue.comment_count
        );
    }

    let trending: Vec<String> = feed.trending().into_iter().map(|i| i.title).collect();
    println!("Trending: {}", trending.join(", "));
}

fn demo_gateway() -> MemoryGateway {
    let now = Utc::now();
    let gateway = MemoryGateway::new();
    gateway.seed(
        Table::Issues,
        [
            json!({ "id": 1, "title": "Pothole on Station Road", "severity": "urgent", "category": "roads", "created_at": now - Duration::hours(3) }),
            json!({ "id": 2, "title": "Overflowing garbage bin", "severity": "needs attention", "category": "sanitation", "created_at": now - Duration::days(1) }),
            json!({ "id": 3, "title": "Fallen tree blocking lane", "severity": "critical", "category": "nature", "status": "In Progress", "created_at": now - Duration::days(2) }),
            json!({ "id": 4, "title": "Street light flickering", "severity": "minor", "category": "electricity", "status": "Resolved", "created_at": now - Duration::days(10) }),
        ],
    );
    gateway.seed(
        Table::IssueLikes,
        [
            json!({ "issue_id": 2, "user_id": "neighbour-1" }),
            json!({ "issue_id": 2, "user_id": "neighbour-2" }),
            json!({ "issue_id": 3, "user_id": "neighbour-1" }),
        ],
    );
    gateway
}
