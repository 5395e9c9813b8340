use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::config::RateLimitConfig;
use crate::store::memory::{DownStore, MemoryStore};

fn limiter(store: Arc<MemoryStore>) -> RateLimiter {
    RateLimiter::new(store, RateLimitConfig { max_requests: 10, window_secs: 86_400 })
}

#[tokio::test]
async fn allows_up_to_limit_then_rejects() {
    let store = Arc::new(MemoryStore::new());
    let rl = limiter(store);

    for i in 0..10 {
        let status = rl.check_and_record("1.2.3.4").await;
        assert!(status.is_ok(), "request {i} should succeed");
    }
    assert!(matches!(
        rl.check_and_record("1.2.3.4").await,
        Err(RateLimitError::Exceeded { limit: 10, .. })
    ));
}

#[tokio::test]
async fn remaining_counts_down() {
    let store = Arc::new(MemoryStore::new());
    let rl = limiter(store);

    let first = rl.check_and_record("1.2.3.4").await.unwrap();
    assert_eq!(first.remaining, 9);
    let second = rl.check_and_record("1.2.3.4").await.unwrap();
    assert_eq!(second.remaining, 8);
}

#[tokio::test]
async fn distinct_ips_do_not_interfere() {
    let store = Arc::new(MemoryStore::new());
    let rl = limiter(store);

    for _ in 0..10 {
        rl.check_and_record("1.1.1.1").await.unwrap();
    }
    assert!(rl.check_and_record("1.1.1.1").await.is_err());
    assert!(rl.check_and_record("2.2.2.2").await.is_ok());
}

#[tokio::test]
async fn window_expiry_allows_new_requests() {
    let store = Arc::new(MemoryStore::new());
    let rl = limiter(store.clone());

    for _ in 0..10 {
        rl.check_and_record("1.2.3.4").await.unwrap();
    }
    assert!(rl.check_and_record("1.2.3.4").await.is_err());

    store.advance(Duration::from_secs(86_401));
    assert!(rl.check_and_record("1.2.3.4").await.is_ok());
}

#[tokio::test]
async fn reset_does_not_slide_with_requests() {
    let store = Arc::new(MemoryStore::new());
    let rl = limiter(store.clone());

    let first = rl.check_and_record("1.2.3.4").await.unwrap();

    store.advance(Duration::from_secs(3600));
    let later = rl.check_and_record("1.2.3.4").await.unwrap();

    // The window was fixed at the first request, so an hour later the
    // reported reset is about an hour *closer*, never pushed out.
    assert!(later.reset <= first.reset + 2, "reset slid: {} -> {}", first.reset, later.reset);
}

#[tokio::test]
async fn status_reports_without_charging() {
    let store = Arc::new(MemoryStore::new());
    let rl = limiter(store);

    rl.check_and_record("1.2.3.4").await.unwrap();
    let status = rl.status("1.2.3.4").await;
    assert_eq!(status.limit, 10);
    assert_eq!(status.remaining, 9);

    // A second status read sees the same remaining count.
    let again = rl.status("1.2.3.4").await;
    assert_eq!(again.remaining, 9);
}

#[tokio::test]
async fn status_for_fresh_ip_shows_full_quota() {
    let store = Arc::new(MemoryStore::new());
    let rl = limiter(store);

    let status = rl.status("9.9.9.9").await;
    assert_eq!(status.remaining, 10);
    assert!(status.reset > 0);
}

#[tokio::test]
async fn fails_open_when_store_is_down() {
    let rl = RateLimiter::new(Arc::new(DownStore), RateLimitConfig { max_requests: 10, window_secs: 86_400 });

    for _ in 0..20 {
        assert!(rl.check_and_record("1.2.3.4").await.is_ok());
    }
    let status = rl.status("1.2.3.4").await;
    assert_eq!(status.remaining, 10);
}
