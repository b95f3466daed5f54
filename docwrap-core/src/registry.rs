//! Per-endpoint cache of long-lived store connections.

use mea::{mutex::Mutex, rwlock::RwLock};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info, instrument};

use crate::{
    backend::StoreDialer,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Maps a dial string to one established, reusable connection.
///
/// Create one registry at process start and share it (behind an `Arc`) with
/// every [`Database`](crate::database::Database) handle. Connections are dialed
/// lazily on first use and kept for the lifetime of the registry. There is no
/// eviction, health check or reconnect: a dead connection surfaces as errors
/// from the operations that use it.
#[derive(Debug)]
pub struct SessionRegistry<D: StoreDialer> {
    dialer: D,
    connections: RwLock<HashMap<String, D::Connection>>,
    // One gate per endpoint serializes first dials without holding the map locks.
    gates: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl<D: StoreDialer> SessionRegistry<D> {
    /// Creates an empty registry that dials through `dialer`.
    pub fn new(dialer: D) -> Self {
        Self {
            dialer,
            connections: RwLock::new(HashMap::new()),
            gates: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the dialer backing this registry.
    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    /// Returns the cached connection for `endpoint`, dialing it on first use.
    ///
    /// Concurrent first calls for the same endpoint dial exactly once. A dial in
    /// progress never delays callers of other endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] for an empty endpoint and
    /// propagates dial failures. A failed dial is not cached.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_or_dial(&self, endpoint: &str) -> DocumentStoreResult<D::Connection> {
        if endpoint.trim().is_empty() {
            return Err(DocumentStoreError::Configuration(
                "must provide a valid dial string".to_string(),
            ));
        }

        if let Some(connection) = self.cached(endpoint).await {
            return Ok(connection);
        }

        let gate = self.gate(endpoint).await;
        let _dialing = gate.lock().await;

        // Another caller may have dialed while we waited on the gate
        if let Some(connection) = self.cached(endpoint).await {
            debug!("connection dialed concurrently, reusing");
            return Ok(connection);
        }

        let connection = self.dialer.dial(endpoint).await?;
        self.connections
            .write()
            .await
            .insert(endpoint.to_string(), connection.clone());

        info!(endpoint, "dialed new store connection");

        Ok(connection)
    }

    async fn cached(&self, endpoint: &str) -> Option<D::Connection> {
        self.connections.read().await.get(endpoint).cloned()
    }

    async fn gate(&self, endpoint: &str) -> Arc<Mutex<()>> {
        if let Some(gate) = self.gates.read().await.get(endpoint) {
            return Arc::clone(gate);
        }

        Arc::clone(
            self.gates
                .write()
                .await
                .entry(endpoint.to_string())
                .or_default(),
        )
    }

    /// Returns the endpoints that currently hold a connection.
    pub async fn endpoints(&self) -> Vec<String> {
        self.connections
            .read()
            .await
            .keys()
            .cloned()
            .collect()
    }

    /// Returns the number of cached connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Returns `true` if no endpoint has been dialed yet.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use super::*;
    use crate::{
        backend::{StoreConnection, StoreSession},
        test_support::NullSession,
    };

    #[derive(Debug, Clone)]
    struct CountingConnection;

    impl StoreConnection for CountingConnection {
        type Session = NullSession;

        fn clone_session(&self) -> DocumentStoreResult<NullSession> {
            Ok(NullSession::default())
        }
    }

    #[derive(Debug, Default)]
    struct SlowDialer {
        dials: AtomicUsize,
    }

    #[async_trait]
    impl StoreDialer for SlowDialer {
        type Connection = CountingConnection;

        async fn dial(&self, endpoint: &str) -> DocumentStoreResult<CountingConnection> {
            if endpoint.starts_with("bad://") {
                return Err(DocumentStoreError::Initialization("unreachable".to_string()));
            }

            let delay = if endpoint.starts_with("slow://") { 5_000 } else { 20 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.dials.fetch_add(1, Ordering::SeqCst);
            Ok(CountingConnection)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_dials_once() {
        let registry = Arc::new(SessionRegistry::new(SlowDialer::default()));

        let handles = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.get_or_dial("memory://x").await.map(|_| ()) })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(registry.dialer().dials.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_endpoint_is_configuration_error() {
        let registry = SessionRegistry::new(SlowDialer::default());

        let error = registry.get_or_dial("  ").await.unwrap_err();

        assert!(error.is_configuration());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_dial_is_retried() {
        let registry = SessionRegistry::new(SlowDialer::default());

        assert!(registry.get_or_dial("bad://x").await.is_err());
        assert!(registry.is_empty().await);

        let mut session = registry.get_or_dial("good://x").await.unwrap().clone_session().unwrap();
        session.release();
        assert_eq!(registry.endpoints().await, vec!["good://x".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slow_dial_does_not_block_other_endpoints() {
        let registry = Arc::new(SessionRegistry::new(SlowDialer::default()));
        registry.get_or_dial("fast://a").await.unwrap();

        let slow = tokio::spawn({
            let registry = Arc::clone(&registry);
            async move { registry.get_or_dial("slow://b").await.map(|_| ()) }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let cached = tokio::time::timeout(Duration::from_secs(1), registry.get_or_dial("fast://a")).await;
        assert!(cached.is_ok_and(|result| result.is_ok()));

        let fresh = tokio::time::timeout(Duration::from_secs(1), registry.get_or_dial("fast://c")).await;
        assert!(fresh.is_ok_and(|result| result.is_ok()));

        assert!(!slow.is_finished());
        slow.abort();

        let mut endpoints = registry.endpoints().await;
        endpoints.sort();
        assert_eq!(endpoints, vec!["fast://a".to_string(), "fast://c".to_string()]);
    }
}
