//! Threads access token cell and its background refresher.
//!
//! Every Threads call reads the token at the moment it is made, so a refresh
//! that lands mid-carousel is picked up by the next request.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use threads_client::ThreadsClient;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::common::SecretString;

/// Delay before retrying a failed refresh.
const RETRY_AFTER_FAILURE: Duration = Duration::from_secs(60 * 60);

/// Refresh this long before the token expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Shortest wait between two successful refreshes.
const MIN_WAIT: Duration = Duration::from_secs(60);

/// When the refresher runs.
#[derive(Debug, Clone, Copy)]
pub struct RefreshPolicy {
    /// Longest wait between refreshes
    pub interval: Duration,
    pub expiry_margin: Duration,
    pub min_wait: Duration,
    pub retry_after_failure: Duration,
}

impl RefreshPolicy {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            expiry_margin: EXPIRY_MARGIN,
            min_wait: MIN_WAIT,
            retry_after_failure: RETRY_AFTER_FAILURE.min(interval),
        }
    }

    /// Wait until the next refresh: the interval, or sooner when the token
    /// would otherwise get within `expiry_margin` of expiring.
    pub fn next_wait(&self, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
        let Some(expires_at) = expires_at else {
            return self.interval;
        };
        let margin = ChronoDuration::from_std(self.expiry_margin).unwrap_or_else(|_| ChronoDuration::zero());
        let until_due = (expires_at - margin - now).to_std().unwrap_or(Duration::ZERO);
        until_due.min(self.interval).max(self.min_wait)
    }
}

#[derive(Debug, Clone)]
struct TokenState {
    token: SecretString,
    expires_at: Option<DateTime<Utc>>,
}

/// Shared, internally synchronized access token.
#[derive(Debug, Clone)]
pub struct AccessToken {
    inner: Arc<RwLock<TokenState>>,
}

impl AccessToken {
    pub fn new(token: SecretString) -> Self {
        Self {
            inner: Arc::new(RwLock::new(TokenState {
                token,
                expires_at: None,
            })),
        }
    }

    /// Current token value.
    pub fn current(&self) -> SecretString {
        match self.inner.read() {
            Ok(state) => state.token.clone(),
            Err(poisoned) => poisoned.into_inner().token.clone(),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self.inner.read() {
            Ok(state) => state.expires_at,
            Err(poisoned) => poisoned.into_inner().expires_at,
        }
    }

    pub fn replace(&self, token: SecretString, expires_in_secs: i64) {
        let expires_at = Some(Utc::now() + ChronoDuration::seconds(expires_in_secs));
        let mut state = match self.inner.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        *state = TokenState { token, expires_at };
    }
}

/// Refresh the token once. Errors are returned so the caller decides when to retry.
pub async fn refresh_once(
    client: &ThreadsClient,
    token: &AccessToken,
) -> Result<(), threads_client::ThreadsError> {
    let current = token.current();
    let refreshed = client.refresh_token(current.expose()).await?;
    token.replace(refreshed.access_token.into(), refreshed.expires_in);
    Ok(())
}

/// Spawn the refresher. It refreshes once right away, then again ahead of
/// expiry or after `policy.interval`, whichever comes first. Stops when
/// `cancel` fires.
pub fn spawn_refresher(
    client: ThreadsClient,
    token: AccessToken,
    policy: RefreshPolicy,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut wait = Duration::ZERO;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Token refresher stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Token refresher stopped");
                    return;
                }
                result = refresh_once(&client, &token) => result,
            };

            match result {
                Ok(()) => {
                    wait = policy.next_wait(token.expires_at(), Utc::now());
                    info!(
                        expires_at = ?token.expires_at(),
                        next_refresh_secs = wait.as_secs(),
                        "Threads access token refreshed"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Failed to refresh Threads access token");
                    wait = policy.retry_after_failure;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn replace_swaps_value_and_records_expiry() {
        let token = AccessToken::new("first".into());
        let shared = token.clone();
        assert!(token.expires_at().is_none());

        shared.replace("second".into(), 3600);

        assert_eq!(token.current().expose(), "second");
        let expires = token.expires_at().unwrap();
        assert!(expires > Utc::now() + ChronoDuration::minutes(59));
    }

    #[tokio::test]
    async fn refresher_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let handle = spawn_refresher(
            ThreadsClient::new().with_base_url("http://127.0.0.1:9"),
            AccessToken::new("t".into()),
            RefreshPolicy::every(Duration::from_secs(3600)),
            cancel.clone(),
        );

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("refresher should exit promptly")
            .unwrap();
    }

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn far_expiry_waits_the_full_interval() {
        let policy = RefreshPolicy::every(45 * DAY);
        let now = Utc::now();

        assert_eq!(policy.next_wait(None, now), 45 * DAY);
        assert_eq!(
            policy.next_wait(Some(now + ChronoDuration::days(60)), now),
            45 * DAY
        );
    }

    #[test]
    fn near_expiry_brings_the_refresh_forward() {
        let policy = RefreshPolicy::every(45 * DAY);
        let now = Utc::now();

        assert_eq!(policy.next_wait(Some(now + ChronoDuration::days(10)), now), 3 * DAY);
        // Already inside the margin
        assert_eq!(
            policy.next_wait(Some(now + ChronoDuration::days(2)), now),
            policy.min_wait
        );
    }

    /// Refresh endpoint that hands out `token-N` valid for `expires_in` seconds.
    async fn spawn_refresh_server(expires_in: i64) -> (String, Arc<AtomicUsize>) {
        use axum::routing::get;
        use axum::{Json, Router};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/refresh_access_token",
            get(move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Json(serde_json::json!({
                    "access_token": format!("token-{n}"),
                    "token_type": "bearer",
                    "expires_in": expires_in,
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{}", addr), calls)
    }

    async fn wait_for_calls(calls: &AtomicUsize, n: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while calls.load(Ordering::SeqCst) < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("refresh endpoint was not called in time");
    }

    #[tokio::test]
    async fn token_is_refreshed_at_startup() {
        let (base, calls) = spawn_refresh_server(60 * 24 * 60 * 60).await;
        let token = AccessToken::new("initial".into());
        let cancel = CancellationToken::new();
        let handle = spawn_refresher(
            ThreadsClient::new().with_base_url(base),
            token.clone(),
            RefreshPolicy::every(Duration::from_secs(3600)),
            cancel.clone(),
        );

        wait_for_calls(&calls, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(token.current().expose(), "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn near_expiry_token_is_refreshed_before_the_interval() {
        // Every refreshed token is already inside the margin
        let (base, calls) = spawn_refresh_server(60).await;
        let token = AccessToken::new("initial".into());
        let cancel = CancellationToken::new();
        let policy = RefreshPolicy {
            interval: Duration::from_secs(3600),
            expiry_margin: Duration::from_secs(120),
            min_wait: Duration::from_millis(10),
            retry_after_failure: Duration::from_secs(3600),
        };
        let handle = spawn_refresher(
            ThreadsClient::new().with_base_url(base),
            token.clone(),
            policy,
            cancel.clone(),
        );

        wait_for_calls(&calls, 3).await;

        assert_ne!(token.current().expose(), "initial");
        cancel.cancel();
        handle.await.unwrap();
    }
}
