use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use super::*;

struct Counting {
    calls: Arc<AtomicU32>,
    lifetime_secs: i64,
}

#[async_trait::async_trait]
impl TokenSource for Counting {
    async fn exchange(&self) -> Result<AccessToken, RemoteError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(AccessToken {
            token: format!("t{n}"),
            expires_at: Utc::now() + chrono::Duration::seconds(self.lifetime_secs),
        })
    }
}

fn manager(lifetime_secs: i64) -> (Arc<TokenManager>, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let mgr = TokenManager::new(Counting {
        calls: calls.clone(),
        lifetime_secs,
    });
    (Arc::new(mgr), calls)
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
    let (mgr, calls) = manager(3600);
    let tokens = futures::future::join_all((0..8).map(|_| {
        let mgr = mgr.clone();
        async move { mgr.bearer().await.unwrap() }
    }))
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(tokens.iter().all(|t| t == "t1"));
}

#[tokio::test]
async fn near_expiry_tokens_are_refreshed() {
    let (mgr, calls) = manager(30);
    assert_eq!(mgr.bearer().await.unwrap(), "t1");
    assert_eq!(mgr.bearer().await.unwrap(), "t2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn invalidate_only_drops_the_stale_token() {
    let (mgr, calls) = manager(3600);
    let first = mgr.bearer().await.unwrap();

    mgr.invalidate("someone-elses").await;
    assert_eq!(mgr.bearer().await.unwrap(), first);

    mgr.invalidate(&first).await;
    assert_eq!(mgr.bearer().await.unwrap(), "t2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn exchange_failure_is_surfaced_and_not_cached() {
    struct Failing;

    #[async_trait::async_trait]
    impl TokenSource for Failing {
        async fn exchange(&self) -> Result<AccessToken, RemoteError> {
            Err(RemoteError::new(RemoteErrorKind::Client(400), "invalid_grant"))
        }
    }

    let mgr = TokenManager::new(Failing);
    let err = mgr.bearer().await.unwrap_err();
    assert!(!err.is_retryable());
    assert!(mgr.bearer().await.is_err());
}
