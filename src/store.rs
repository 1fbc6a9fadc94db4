use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::types::{LoginOutcome, OpenId, SessionId, UnionId};

/// Login outcome storage keyed by session id.
///
/// An absent entry means the login is still pending; it is never an error.
/// Handlers only see this trait, so the in-memory store can be swapped for a
/// shared one without touching the login flow.
///
/// # Example
///
/// ```rust,ignore
/// impl SessionStore for RedisStore {
///     async fn get(&self, sid: &SessionId) -> Option<LoginOutcome> {
///         self.fetch(sid).await.ok().flatten()
///     }
///
///     async fn put_scanned(&self, sid: &SessionId, openid: OpenId, unionid: Option<UnionId>) {
///         self.merge(sid, openid, unionid).await;
///     }
/// }
/// ```
pub trait SessionStore: Send + Sync + 'static {
    /// Current outcome for `sid`, or `None` while pending.
    fn get(&self, sid: &SessionId) -> impl Future<Output = Option<LoginOutcome>> + Send;

    /// Records a completed scan for `sid`.
    ///
    /// Idempotent upsert: `openid` and `scanned_at` take the latest write,
    /// while a `None` unionid never clears one stored by an earlier write.
    fn put_scanned(
        &self,
        sid: &SessionId,
        openid: OpenId,
        unionid: Option<UnionId>,
    ) -> impl Future<Output = ()> + Send;
}

struct Entry {
    outcome: LoginOutcome,
    written: Instant,
}

/// Single-process store: one reader/writer lock around the whole map.
///
/// Entries expire `ttl` after their last write. Expired entries read as
/// pending and are dropped by [`MemoryStore::purge_expired`].
pub struct MemoryStore {
    entries: RwLock<HashMap<SessionId, Entry>>,
    ttl: Duration,
}

impl MemoryStore {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Drops every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.written) < self.ttl);
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}

impl SessionStore for MemoryStore {
    async fn get(&self, sid: &SessionId) -> Option<LoginOutcome> {
        let entries = self.entries.read().await;
        entries
            .get(sid)
            .filter(|entry| entry.written.elapsed() < self.ttl)
            .map(|entry| entry.outcome.clone())
    }

    async fn put_scanned(&self, sid: &SessionId, openid: OpenId, unionid: Option<UnionId>) {
        let scanned_at = OffsetDateTime::now_utc();
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        // An expired entry is a new login; its unionid must not leak forward.
        let previous_unionid = entries
            .remove(sid)
            .filter(|entry| now.duration_since(entry.written) < self.ttl)
            .and_then(|entry| entry.outcome.unionid);

        let outcome = LoginOutcome {
            openid,
            unionid: unionid
                .filter(|u| !u.0.is_empty())
                .or(previous_unionid),
            scanned_at,
        };
        entries.insert(
            sid.clone(),
            Entry {
                outcome,
                written: now,
            },
        );
    }
}

/// Periodically purges expired entries for the lifetime of the runtime.
pub fn spawn_sweeper(store: Arc<MemoryStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = store.purge_expired().await;
            if removed > 0 {
                tracing::debug!(removed, "Purged expired login sessions");
            }
        }
    })
}
