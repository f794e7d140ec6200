// Integration tests for the quota-scheduled remote access layer: follower
// pagination, resharer sampling, and sample-stream collection, all against
// the scripted in-memory graph.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use common::{session, session_with_plan, status, users, ScriptedClient, StreamScript};
use ripple::social::error::ApiError;
use ripple::social::followers::fetch_followers;
use ripple::social::quota::{Operation, PoolSpec, QuotaPlan};
use ripple::social::resharers::sample_resharers;
use ripple::social::stream::{collect_sample, SampleOptions};
use ripple::social::types::Credential;

// ============================================================
// Follower fetching
// ============================================================

#[tokio::test]
async fn followers_are_collected_across_pages() {
    let client = Arc::new(ScriptedClient::with_page_size(2));
    client.set_followers(7, vec![1, 2, 3, 4, 5]);
    let session = session(client.clone());

    let followers = fetch_followers(&session, 7).await.unwrap();

    assert_eq!(followers, vec![1, 2, 3, 4, 5]);
    assert_eq!(client.calls().follower_pages.len(), 3);
    assert_eq!(
        session.quota().usage(Operation::FollowerIds).iter().sum::<u32>(),
        3
    );
}

#[tokio::test]
async fn protected_account_keeps_partial_list() {
    let client = Arc::new(ScriptedClient::with_page_size(2));
    client.set_followers(7, vec![1, 2, 3, 4, 5, 6]);
    client.protect_from_page(7, 2);
    let session = session(client.clone());

    let followers = fetch_followers(&session, 7).await.unwrap();

    assert_eq!(followers, vec![1, 2, 3, 4]);
    // The rejected page is not charged.
    assert_eq!(
        session.quota().usage(Operation::FollowerIds).iter().sum::<u32>(),
        2
    );
}

#[tokio::test]
async fn connection_failure_reconnects_without_double_counting() {
    let client = Arc::new(ScriptedClient::with_page_size(2));
    client.set_followers(7, vec![1, 2, 3, 4, 5]);
    client.fail_follower_pages(1);
    let session = session(client.clone());

    let followers = fetch_followers(&session, 7).await.unwrap();

    assert_eq!(followers, vec![1, 2, 3, 4, 5]);
    assert_eq!(client.calls().reauthenticate, 1);
    // The reconnect zeroed the counters; only the three served pages count.
    assert_eq!(
        session.quota().usage(Operation::FollowerIds).iter().sum::<u32>(),
        3
    );
}

#[tokio::test]
async fn exhausted_reconnect_budget_is_returned() {
    let client = Arc::new(ScriptedClient::with_page_size(2));
    client.set_followers(7, vec![1, 2, 3]);
    client.fail_follower_pages(100);
    let session = session(client.clone());

    let result = fetch_followers(&session, 7).await;

    assert!(matches!(result, Err(ApiError::Connection(_))));
    assert_eq!(client.calls().reauthenticate, 10);
}

#[tokio::test]
async fn page_count_is_capped_at_one_window_budget() {
    let client = Arc::new(ScriptedClient::with_page_size(1));
    client.set_followers(7, (1..=100).collect());
    let session = session(client.clone());

    let followers = fetch_followers(&session, 7).await.unwrap();

    assert_eq!(followers.len(), 30);
    assert_eq!(followers, (1..=30).collect::<Vec<u64>>());
    assert_eq!(client.calls().follower_pages.len(), 30);
}

// ============================================================
// Resharer sampling
// ============================================================

fn tight_plan() -> QuotaPlan {
    QuotaPlan {
        window: Duration::from_secs(60),
        resharers: vec![
            PoolSpec::full(Credential::User, 1),
            PoolSpec::full(Credential::App, 1),
            PoolSpec::reduced(Credential::User, 1),
            PoolSpec::reduced(Credential::App, 1),
        ],
        follower_ids: vec![PoolSpec::full(Credential::User, 15)],
    }
}

#[tokio::test]
async fn non_positive_limit_makes_no_call() {
    let client = Arc::new(ScriptedClient::new());
    client.set_resharers(1, users(&[10, 11], 50));
    let session = session(client.clone());

    assert!(sample_resharers(&session, 1, 0).await.unwrap().is_empty());
    assert!(sample_resharers(&session, 1, -3).await.unwrap().is_empty());

    let calls = client.calls();
    assert!(calls.recent_resharers.is_empty());
    assert!(calls.resharer_ids.is_empty());
}

#[tokio::test]
async fn sample_is_truncated_to_limit() {
    let client = Arc::new(ScriptedClient::new());
    client.set_resharers(1, users(&[10, 11, 12, 13, 14], 50));
    let session = session(client.clone());

    let sampled = sample_resharers(&session, 1, 2).await.unwrap();

    assert_eq!(sampled.iter().map(|u| u.id).collect::<Vec<_>>(), vec![10, 11]);
}

#[tokio::test]
async fn reduced_enumeration_only_after_full_pools_are_spent() {
    let client = Arc::new(ScriptedClient::new());
    client.set_resharers(1, users(&[10, 11, 12], 50));
    let session = session_with_plan(client.clone(), tight_plan());

    for _ in 0..4 {
        let sampled = sample_resharers(&session, 1, 3).await.unwrap();
        assert_eq!(sampled.len(), 3);
    }

    let calls = client.calls();
    assert_eq!(calls.recent_resharers, vec![Credential::User, Credential::App]);
    assert_eq!(calls.resharer_ids, vec![Credential::User, Credential::App]);
    assert_eq!(calls.lookup_users, 2);
    assert_eq!(session.quota().usage(Operation::Resharers), vec![1, 1, 1, 1]);
}

// ============================================================
// Sample stream
// ============================================================

fn options(target: Option<usize>, restart: bool) -> SampleOptions {
    SampleOptions {
        target,
        poll_interval: Duration::from_millis(2),
        settle: Duration::ZERO,
        restart_on_error: restart,
        max_restarts: 3,
    }
}

fn far_deadline() -> Instant {
    Instant::now() + Duration::from_secs(5)
}

#[tokio::test]
async fn stream_restart_keeps_buffered_posts() {
    let client = Arc::new(ScriptedClient::new());
    client.script_stream(StreamScript {
        posts: vec![status(1, 9, 0, "en"), status(2, 9, 0, "en")],
        then_fail: true,
    });
    client.script_stream(StreamScript {
        posts: vec![status(3, 9, 0, "en")],
        then_fail: false,
    });

    let sample = collect_sample(client.as_ref(), &options(Some(3), true), far_deadline())
        .await
        .unwrap();

    assert_eq!(sample.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(client.calls().open_sample, 2);
}

#[tokio::test]
async fn stream_failure_without_restart_is_an_error() {
    let client = Arc::new(ScriptedClient::new());
    client.script_stream(StreamScript {
        posts: vec![status(1, 9, 0, "en")],
        then_fail: true,
    });

    let result = collect_sample(client.as_ref(), &options(Some(5), false), far_deadline()).await;

    assert!(matches!(result, Err(ApiError::Stream(_))));
    assert_eq!(client.calls().open_sample, 1);
}

#[tokio::test]
async fn uncapped_sample_stops_at_deadline() {
    let client = Arc::new(ScriptedClient::new());
    client.script_stream(StreamScript {
        posts: vec![status(1, 9, 0, "en"), status(2, 9, 0, "de")],
        then_fail: false,
    });

    let start = Instant::now();
    let deadline = start + Duration::from_millis(30);
    let sample = collect_sample(client.as_ref(), &options(None, true), deadline)
        .await
        .unwrap();

    assert_eq!(sample.len(), 2);
    assert!(start.elapsed() >= Duration::from_millis(30));
}
