//! # Realtime Subscriber
//!
//! Session-scoped consumer of the realtime subscription service. Registered
//! once per session; every pushed record is handed to the reconciliation
//! engine, never applied directly. Teardown is explicit and idempotent, and
//! no message is processed after it.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::clients::{FeedId, RealtimeService};
use crate::error::CoreResult;
use crate::services::reconciliation::{ReconcileEngine, RemoteOutcome};
use crate::services::refresh_service::RefreshHandle;

struct ActiveSubscription {
    feed_id: FeedId,
    drain_task: JoinHandle<()>,
}

pub struct RealtimeSubscriber {
    engine: Arc<ReconcileEngine>,
    service: Arc<dyn RealtimeService>,
    refresh: RefreshHandle,
    active: Mutex<Option<ActiveSubscription>>,
}

impl RealtimeSubscriber {
    pub fn new(
        engine: Arc<ReconcileEngine>,
        service: Arc<dyn RealtimeService>,
        refresh: RefreshHandle,
    ) -> Self {
        Self {
            engine,
            service,
            refresh,
            active: Mutex::new(None),
        }
    }

    /// Register the subscription and start draining pushed messages into the
    /// reconciliation funnel. Calling `start` while already subscribed is a
    /// no-op.
    pub async fn start(&self) -> CoreResult<()> {
        let mut guard = self.active.lock().await;
        if guard.is_some() {
            tracing::debug!("realtime subscription already active");
            return Ok(());
        }

        let feed = self.service.subscribe().await?;
        let feed_id = feed.id;
        let mut receiver = feed.receiver;
        let engine = self.engine.clone();
        let refresh = self.refresh.clone();
        let drain_task = tokio::spawn(async move {
            while let Some(remote) = receiver.recv().await {
                match engine.apply_remote(remote).await {
                    RemoteOutcome::Inserted | RemoteOutcome::ReplacedProvisional => {
                        // Consistency backstop after a successful receive.
                        refresh.request_now();
                    }
                    RemoteOutcome::Duplicate | RemoteOutcome::DroppedStale => {}
                }
            }
            tracing::debug!("realtime feed closed");
        });

        *guard = Some(ActiveSubscription {
            feed_id,
            drain_task,
        });
        tracing::info!("realtime subscription registered");
        Ok(())
    }

    /// Unregister and stop processing. Safe to call when already stopped.
    pub async fn stop(&self) {
        let mut guard = self.active.lock().await;
        let Some(active) = guard.take() else {
            return;
        };
        self.service.unsubscribe(active.feed_id).await;
        active.drain_task.abort();
        tracing::info!("realtime subscription torn down");
    }

    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }
}
