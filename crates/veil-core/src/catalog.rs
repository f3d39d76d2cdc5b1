//! Server Catalog
//!
//! Holds the current snapshot of candidate servers and answers selection
//! queries against it. The catalog never performs network activity: server
//! lists are pushed in through [`ServerCatalog::refresh`].
//!
//! # Snapshots
//!
//! The list is stored as an `Arc<[VpnServer]>` inside the server-list
//! watch channel and swapped wholesale on refresh. Readers clone the `Arc`,
//! so a reader sees either the old list or the new one, never a mix, and
//! the stream's latest value is always the list selection runs against.

use crate::server::VpnServer;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Number of entries in the quick-connect list unless configured otherwise
pub const DEFAULT_QUICK_CONNECT_LIMIT: usize = 4;

/// Immutable catalog snapshot
pub type CatalogSnapshot = Arc<[VpnServer]>;

/// Server catalog
pub struct ServerCatalog {
    /// Current snapshot and server-list stream
    updates: watch::Sender<CatalogSnapshot>,
    /// Quick-connect size
    quick_connect_limit: usize,
}

impl ServerCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        let empty: CatalogSnapshot = Arc::from(Vec::new());
        let (updates, _) = watch::channel(empty);

        Self {
            updates,
            quick_connect_limit: DEFAULT_QUICK_CONNECT_LIMIT,
        }
    }

    /// Create a catalog seeded with `servers`
    pub fn with_servers(servers: Vec<VpnServer>) -> Self {
        let catalog = Self::new();
        catalog.refresh(servers);
        catalog
    }

    /// Create a catalog seeded with the hard-coded fallback list
    pub fn with_fallback() -> Self {
        Self::with_servers(VpnServer::fallback_servers())
    }

    /// Override the quick-connect size
    pub fn with_quick_connect_limit(mut self, limit: usize) -> Self {
        self.quick_connect_limit = limit;
        self
    }

    /// Replace the snapshot atomically.
    ///
    /// Servers whose id already appeared earlier in `servers` are dropped.
    pub fn refresh(&self, servers: Vec<VpnServer>) {
        let total = servers.len();
        let mut seen = HashSet::with_capacity(total);
        let unique: Vec<VpnServer> = servers
            .into_iter()
            .filter(|s| {
                let fresh = seen.insert(s.id.clone());
                if !fresh {
                    warn!("Dropping duplicate server id in refresh: {}", s.id);
                }
                fresh
            })
            .collect();

        let snapshot: CatalogSnapshot = Arc::from(unique);
        let len = snapshot.len();
        let available = snapshot.iter().filter(|s| s.is_available).count();
        self.updates.send_replace(snapshot);

        info!("Catalog refreshed: {} servers ({} available)", len, available);
    }

    /// Current snapshot
    pub fn snapshot(&self) -> CatalogSnapshot {
        self.updates.borrow().clone()
    }

    /// Subscribe to snapshots emitted after each refresh
    pub fn subscribe(&self) -> watch::Receiver<CatalogSnapshot> {
        self.updates.subscribe()
    }

    /// Number of servers in the snapshot
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Is the snapshot empty?
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Number of available servers
    pub fn available_count(&self) -> usize {
        self.snapshot().iter().filter(|s| s.is_available).count()
    }

    /// Find server by id
    pub fn find(&self, id: &str) -> Option<VpnServer> {
        self.snapshot().iter().find(|s| s.id == id).cloned()
    }

    /// Pick the best available server.
    ///
    /// Highest `performance_score` wins, then lowest `ping_ms`, then the
    /// lexicographically smallest `id`.
    pub fn select_best_server(&self) -> Option<VpnServer> {
        let snapshot = self.snapshot();
        let best = snapshot
            .iter()
            .filter(|s| s.is_available)
            .min_by(|a, b| rank(a, b))
            .cloned();

        match &best {
            Some(server) => debug!(
                "Best server: {} (score {}, ping {}ms)",
                server.id, server.performance_score, server.ping_ms
            ),
            None => debug!("No available server in catalog"),
        }

        best
    }

    /// Available servers sorted by ascending ping, at most `limit` entries.
    ///
    /// Servers with equal ping keep their catalog order.
    pub fn quick_connect_list(&self, limit: usize) -> Vec<VpnServer> {
        let snapshot = self.snapshot();
        let mut available: Vec<&VpnServer> = snapshot.iter().filter(|s| s.is_available).collect();

        available.sort_by_key(|s| s.ping_ms);
        available.into_iter().take(limit).cloned().collect()
    }

    /// Quick-connect list using the configured size
    pub fn quick_connect_default(&self) -> Vec<VpnServer> {
        self.quick_connect_list(self.quick_connect_limit)
    }
}

impl Default for ServerCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Total order where the preferred server compares as `Less`
fn rank(a: &VpnServer, b: &VpnServer) -> Ordering {
    b.performance_score
        .cmp(&a.performance_score)
        .then_with(|| a.ping_ms.cmp(&b.ping_ms))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::TransportProtocol;

    fn server(id: &str, score: u8, ping: u32, available: bool) -> VpnServer {
        VpnServer::new(id, id, "SG", "10.0.0.1", TransportProtocol::WireGuard)
            .with_metrics(score, ping, 10)
            .with_availability(available)
    }

    #[test]
    fn test_best_server_by_score() {
        let catalog = ServerCatalog::with_servers(vec![
            server("a", 70, 10, true),
            server("b", 90, 80, true),
            server("c", 99, 5, false),
        ]);

        assert_eq!(catalog.select_best_server().unwrap().id, "b");
    }

    #[test]
    fn test_best_server_tie_breaks() {
        let catalog = ServerCatalog::with_servers(vec![
            server("de-1", 95, 45, true),
            server("sg-1", 95, 25, true),
        ]);
        assert_eq!(catalog.select_best_server().unwrap().id, "sg-1");

        let catalog = ServerCatalog::with_servers(vec![
            server("zz", 95, 25, true),
            server("aa", 95, 25, true),
        ]);
        assert_eq!(catalog.select_best_server().unwrap().id, "aa");
    }

    #[test]
    fn test_nothing_available() {
        let catalog = ServerCatalog::with_servers(vec![
            server("a", 70, 10, false),
            server("b", 90, 80, false),
        ]);

        assert!(catalog.select_best_server().is_none());
        assert!(catalog.quick_connect_list(4).is_empty());
        assert!(ServerCatalog::new().select_best_server().is_none());
    }

    #[test]
    fn test_quick_connect_sorted_and_stable() {
        let catalog = ServerCatalog::with_servers(vec![
            server("a", 50, 40, true),
            server("b", 50, 10, true),
            server("c", 50, 40, true),
            server("d", 50, 5, false),
            server("e", 50, 20, true),
            server("f", 50, 90, true),
        ]);

        let ids: Vec<_> = catalog.quick_connect_list(4).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["b", "e", "a", "c"]);

        assert_eq!(catalog.quick_connect_list(10).len(), 5);
        assert!(catalog.quick_connect_list(0).is_empty());
    }

    #[test]
    fn test_quick_connect_default_limit() {
        let catalog = ServerCatalog::with_fallback();
        assert_eq!(catalog.quick_connect_default().len(), DEFAULT_QUICK_CONNECT_LIMIT);

        let catalog = ServerCatalog::with_fallback().with_quick_connect_limit(2);
        assert_eq!(catalog.quick_connect_default().len(), 2);
    }

    #[test]
    fn test_refresh_drops_duplicates() {
        let catalog = ServerCatalog::with_servers(vec![
            server("a", 10, 10, true),
            server("a", 99, 1, true),
            server("b", 20, 20, true),
        ]);

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.find("a").unwrap().performance_score, 10);
    }

    #[test]
    fn test_refresh_replaces_snapshot() {
        let catalog = ServerCatalog::with_servers(vec![server("a", 10, 10, true)]);
        let old = catalog.snapshot();

        catalog.refresh(vec![server("b", 20, 20, true), server("c", 30, 30, false)]);

        assert_eq!(old.len(), 1);
        assert_eq!(old[0].id, "a");
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.available_count(), 1);
        assert!(catalog.find("a").is_none());
    }

    #[test]
    fn test_concurrent_refresh_stream_matches_snapshot() {
        let catalog = ServerCatalog::new();
        let rx = catalog.subscribe();

        std::thread::scope(|scope| {
            for t in 0..8u32 {
                let catalog = &catalog;
                scope.spawn(move || {
                    for i in 0..50u32 {
                        let id = format!("t{}-{}", t, i);
                        catalog.refresh(vec![server(&id, 50, i, true)]);
                    }
                });
            }
        });

        let snapshot = catalog.snapshot();
        let streamed = rx.borrow().clone();
        assert_eq!(snapshot.len(), 1);
        assert!(Arc::ptr_eq(&snapshot, &streamed));
        assert_eq!(catalog.select_best_server().unwrap().id, streamed[0].id);
    }

    #[test]
    fn test_refresh_counts_after_dedup() {
        let catalog = ServerCatalog::new();
        let rx = catalog.subscribe();

        catalog.refresh(vec![server("a", 10, 10, true), server("a", 20, 20, true)]);

        assert_eq!(rx.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_sees_refresh() {
        let catalog = ServerCatalog::new();
        let mut rx = catalog.subscribe();
        assert!(rx.borrow().is_empty());

        catalog.refresh(VpnServer::fallback_servers());
        rx.changed().await.unwrap();

        assert_eq!(rx.borrow_and_update().len(), 6);
    }
}
