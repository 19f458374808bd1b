//! Device Session Tracker - maps remote addresses to device sessions
//!
//! The map itself sits behind a `RwLock` that is only held long enough to
//! find or insert an entry. Each session has its own `Mutex`, so a heartbeat
//! for one device never waits on a catalog exchange for another, and a
//! heartbeat racing a catalog response for the same device cannot lose an
//! update.

use super::session::{DeviceCatalogItem, DeviceSession};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Poll the catalog on every Nth keepalive
pub const DEFAULT_CATALOG_POLL_INTERVAL: u64 = 5;

pub type SharedSession = Arc<Mutex<DeviceSession>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterTransition {
    Registered,
    Unregistered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterOutcome {
    pub transition: RegisterTransition,
    /// `register_count` or `unregister_count`, depending on the transition
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveOutcome {
    pub count: u64,
    pub became_online: bool,
    pub poll_catalog: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogOutcome {
    /// Call-ID did not match the outstanding query; nothing was changed
    Ignored { expected: Option<String> },
    /// Matched the outstanding query but the status is provisional
    Provisional,
    Accepted {
        ok: bool,
        /// Running catalog count and the first listed item, if any
        surfaced: Option<(u64, DeviceCatalogItem)>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogNotifyOutcome {
    pub count: u64,
    pub first_item: Option<DeviceCatalogItem>,
}

pub struct DeviceSessionTracker {
    sessions: RwLock<HashMap<SocketAddr, SharedSession>>,
    catalog_poll_interval: u64,
}

impl DeviceSessionTracker {
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_CATALOG_POLL_INTERVAL)
    }

    /// An interval of 0 disables heartbeat-driven catalog polling
    pub fn with_poll_interval(catalog_poll_interval: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            catalog_poll_interval,
        }
    }

    pub fn catalog_poll_interval(&self) -> u64 {
        self.catalog_poll_interval
    }

    /// Find or create the session for `addr`. Returns `true` when the
    /// session was created by this call.
    pub async fn touch(&self, addr: SocketAddr, gb_id: &str) -> (SharedSession, bool) {
        if let Some(session) = self.session(addr).await {
            session.lock().await.touch(gb_id, addr);
            return (session, false);
        }

        let mut sessions = self.sessions.write().await;
        // Another task may have inserted between the read and write locks.
        if let Some(session) = sessions.get(&addr) {
            let session = session.clone();
            drop(sessions);
            session.lock().await.touch(gb_id, addr);
            return (session, false);
        }

        let session = Arc::new(Mutex::new(DeviceSession::new(gb_id, addr)));
        sessions.insert(addr, session.clone());
        info!(%addr, gb_id, "New device session");
        (session, true)
    }

    pub async fn session(&self, addr: SocketAddr) -> Option<SharedSession> {
        let sessions = self.sessions.read().await;
        sessions.get(&addr).cloned()
    }

    pub async fn on_register(&self, addr: SocketAddr, gb_id: &str, expires: u32) -> RegisterOutcome {
        let (session, _) = self.touch(addr, gb_id).await;
        let mut session = session.lock().await;

        if expires == 0 {
            session.registered = false;
            session.unregister_count += 1;
            RegisterOutcome {
                transition: RegisterTransition::Unregistered,
                count: session.unregister_count,
            }
        } else {
            session.registered = true;
            session.register_count += 1;
            RegisterOutcome {
                transition: RegisterTransition::Registered,
                count: session.register_count,
            }
        }
    }

    pub async fn on_keepalive(&self, addr: SocketAddr, gb_id: &str) -> KeepaliveOutcome {
        let (session, _) = self.touch(addr, gb_id).await;
        let mut session = session.lock().await;

        let became_online = !session.online;
        session.online = true;
        session.keep_alive_count += 1;

        let count = session.keep_alive_count;
        KeepaliveOutcome {
            count,
            became_online,
            poll_catalog: self.catalog_poll_interval > 0 && count % self.catalog_poll_interval == 0,
        }
    }

    /// Correlate a SIP response to a catalog query by Call-ID
    pub async fn on_catalog_response(
        &self,
        addr: SocketAddr,
        call_id: &str,
        status: u16,
        items: &[DeviceCatalogItem],
    ) -> CatalogOutcome {
        let Some(session) = self.session(addr).await else {
            return CatalogOutcome::Ignored { expected: None };
        };
        let mut session = session.lock().await;

        if !session.is_catalog_response(call_id) {
            debug!(
                %addr,
                call_id,
                expected = ?session.catalog_call_id,
                "Dropping stale catalog response"
            );
            return CatalogOutcome::Ignored {
                expected: session.catalog_call_id.clone(),
            };
        }

        if status < 200 {
            return CatalogOutcome::Provisional;
        }

        let ok = status == 200;
        session.last_catalog_ok = ok;

        let surfaced = match items.first() {
            Some(item) if ok => {
                session.catalog_count += 1;
                Some((session.catalog_count, item.clone()))
            }
            _ => None,
        };

        CatalogOutcome::Accepted { ok, surfaced }
    }

    /// A device-initiated Catalog MESSAGE listing its channels
    pub async fn on_catalog_notify(
        &self,
        addr: SocketAddr,
        gb_id: &str,
        items: &[DeviceCatalogItem],
    ) -> CatalogNotifyOutcome {
        let (session, _) = self.touch(addr, gb_id).await;
        let mut session = session.lock().await;
        session.catalog_count += 1;

        CatalogNotifyOutcome {
            count: session.catalog_count,
            first_item: items.first().cloned(),
        }
    }

    pub async fn next_cseq(&self, addr: SocketAddr) -> Option<u32> {
        let session = self.session(addr).await?;
        let cseq = session.lock().await.next_cseq();
        Some(cseq)
    }

    /// Returns `true` exactly once per session, the first time it is asked
    pub async fn claim_user_agent_log(&self, addr: SocketAddr) -> bool {
        let Some(session) = self.session(addr).await else {
            return false;
        };
        let mut session = session.lock().await;
        let first = !session.user_agent_logged;
        session.user_agent_logged = true;
        first
    }

    pub async fn snapshot(&self, addr: SocketAddr) -> Option<DeviceSession> {
        let session = self.session(addr).await?;
        let snapshot = session.lock().await.clone();
        Some(snapshot)
    }

    pub async fn snapshots(&self) -> Vec<DeviceSession> {
        let sessions: Vec<SharedSession> = {
            let sessions = self.sessions.read().await;
            sessions.values().cloned().collect()
        };

        let mut snapshots = Vec::with_capacity(sessions.len());
        for session in sessions {
            snapshots.push(session.lock().await.clone());
        }
        snapshots
    }

    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }
}

impl Default for DeviceSessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE_ID: &str = "34020000001320000001";

    fn addr() -> SocketAddr {
        "192.168.1.64:5060".parse().unwrap()
    }

    fn item(id: &str) -> DeviceCatalogItem {
        DeviceCatalogItem {
            id: id.to_string(),
            name: "Camera 01".to_string(),
            manufacturer: "Hikvision".to_string(),
            model: "DS-2CD3T46WD".to_string(),
        }
    }

    #[tokio::test]
    async fn test_touch_creates_once() {
        let tracker = DeviceSessionTracker::new();

        let (_, created) = tracker.touch(addr(), DEVICE_ID).await;
        assert!(created);
        let (_, created) = tracker.touch(addr(), DEVICE_ID).await;
        assert!(!created);

        assert_eq!(tracker.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_register_and_unregister_transitions() {
        let tracker = DeviceSessionTracker::new();

        let outcome = tracker.on_register(addr(), DEVICE_ID, 3600).await;
        assert_eq!(outcome.transition, RegisterTransition::Registered);
        assert_eq!(outcome.count, 1);

        let session = tracker.snapshot(addr()).await.unwrap();
        assert!(session.registered);
        assert_eq!(session.register_count, 1);

        let outcome = tracker.on_register(addr(), DEVICE_ID, 0).await;
        assert_eq!(outcome.transition, RegisterTransition::Unregistered);
        assert_eq!(outcome.count, 1);

        let session = tracker.snapshot(addr()).await.unwrap();
        assert!(!session.registered);
        assert_eq!(session.register_count, 1);
        assert_eq!(session.unregister_count, 1);
    }

    #[tokio::test]
    async fn test_keepalive_polls_every_fifth() {
        let tracker = DeviceSessionTracker::new();

        let polls: Vec<u64> = {
            let mut polls = Vec::new();
            for _ in 0..12 {
                let outcome = tracker.on_keepalive(addr(), DEVICE_ID).await;
                if outcome.poll_catalog {
                    polls.push(outcome.count);
                }
            }
            polls
        };

        assert_eq!(polls, vec![5, 10]);
    }

    #[tokio::test]
    async fn test_keepalive_marks_online_once() {
        let tracker = DeviceSessionTracker::new();

        assert!(tracker.on_keepalive(addr(), DEVICE_ID).await.became_online);
        assert!(!tracker.on_keepalive(addr(), DEVICE_ID).await.became_online);
        assert!(tracker.snapshot(addr()).await.unwrap().online);
    }

    #[tokio::test]
    async fn test_zero_interval_disables_polling() {
        let tracker = DeviceSessionTracker::with_poll_interval(0);
        for _ in 0..10 {
            assert!(!tracker.on_keepalive(addr(), DEVICE_ID).await.poll_catalog);
        }
    }

    #[tokio::test]
    async fn test_catalog_response_mismatch_is_ignored() {
        let tracker = DeviceSessionTracker::new();
        let (session, _) = tracker.touch(addr(), DEVICE_ID).await;
        session.lock().await.expect_catalog_response("current");

        let outcome = tracker
            .on_catalog_response(addr(), "stale", 500, &[item("34020000001180000001")])
            .await;
        assert_eq!(
            outcome,
            CatalogOutcome::Ignored {
                expected: Some("current".to_string())
            }
        );

        let session = tracker.snapshot(addr()).await.unwrap();
        assert!(session.last_catalog_ok);
        assert_eq!(session.catalog_count, 0);
    }

    #[tokio::test]
    async fn test_catalog_response_surfaces_first_item() {
        let tracker = DeviceSessionTracker::new();
        let (session, _) = tracker.touch(addr(), DEVICE_ID).await;
        session.lock().await.expect_catalog_response("q1");

        let items = [item("34020000001180000001"), item("34020000001180000002")];
        let outcome = tracker.on_catalog_response(addr(), "q1", 200, &items).await;

        assert_eq!(
            outcome,
            CatalogOutcome::Accepted {
                ok: true,
                surfaced: Some((1, item("34020000001180000001"))),
            }
        );
        assert!(tracker.snapshot(addr()).await.unwrap().last_catalog_ok);
    }

    #[tokio::test]
    async fn test_catalog_response_failure_status() {
        let tracker = DeviceSessionTracker::new();
        let (session, _) = tracker.touch(addr(), DEVICE_ID).await;
        session.lock().await.expect_catalog_response("q1");

        let outcome = tracker.on_catalog_response(addr(), "q1", 100, &[]).await;
        assert_eq!(outcome, CatalogOutcome::Provisional);
        assert!(tracker.snapshot(addr()).await.unwrap().last_catalog_ok);

        let outcome = tracker.on_catalog_response(addr(), "q1", 403, &[]).await;
        assert_eq!(
            outcome,
            CatalogOutcome::Accepted {
                ok: false,
                surfaced: None
            }
        );
        assert!(!tracker.snapshot(addr()).await.unwrap().last_catalog_ok);
    }

    #[tokio::test]
    async fn test_catalog_response_without_session() {
        let tracker = DeviceSessionTracker::new();
        let outcome = tracker.on_catalog_response(addr(), "q1", 200, &[]).await;
        assert_eq!(outcome, CatalogOutcome::Ignored { expected: None });
        assert_eq!(tracker.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_catalog_notify_counts_even_when_empty() {
        let tracker = DeviceSessionTracker::new();

        let outcome = tracker.on_catalog_notify(addr(), DEVICE_ID, &[]).await;
        assert_eq!(outcome.count, 1);
        assert!(outcome.first_item.is_none());

        let outcome = tracker
            .on_catalog_notify(addr(), DEVICE_ID, &[item("34020000001180000001")])
            .await;
        assert_eq!(outcome.count, 2);
        assert_eq!(outcome.first_item, Some(item("34020000001180000001")));
    }

    #[tokio::test]
    async fn test_next_cseq_per_session() {
        let tracker = DeviceSessionTracker::new();
        let other: SocketAddr = "192.168.1.65:5060".parse().unwrap();

        assert_eq!(tracker.next_cseq(addr()).await, None);

        tracker.touch(addr(), DEVICE_ID).await;
        tracker.touch(other, "34020000001320000002").await;

        assert_eq!(tracker.next_cseq(addr()).await, Some(1));
        assert_eq!(tracker.next_cseq(addr()).await, Some(2));
        assert_eq!(tracker.next_cseq(other).await, Some(1));
    }

    #[tokio::test]
    async fn test_user_agent_claimed_once() {
        let tracker = DeviceSessionTracker::new();
        tracker.touch(addr(), DEVICE_ID).await;

        assert!(tracker.claim_user_agent_log(addr()).await);
        assert!(!tracker.claim_user_agent_log(addr()).await);
    }

    #[tokio::test]
    async fn test_concurrent_keepalives_are_not_lost() {
        let tracker = Arc::new(DeviceSessionTracker::new());

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let tracker = tracker.clone();
            tasks.push(tokio::spawn(async move {
                tracker.on_keepalive(addr(), DEVICE_ID).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let session = tracker.snapshot(addr()).await.unwrap();
        assert_eq!(session.keep_alive_count, 50);
        assert_eq!(tracker.session_count().await, 1);
    }
}
