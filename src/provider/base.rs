//! Shared provider worker: subscription set, run state and price store

use super::{PriceStore, Provider, ProviderError, ProviderKind};
use crate::task::ShutdownSignal;
use crate::types::{ProviderTicker, ResolvedPrice};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// The source-specific run loop behind a [`BaseProvider`].
///
/// Implementations must return when `shutdown` fires or when the
/// subscription set observed through `ids` becomes empty, and must pick up
/// non-empty changes to `ids` without returning.
#[async_trait]
pub trait QueryHandler: Send + Sync {
    async fn run(
        &self,
        provider: &str,
        ids: watch::Receiver<Vec<ProviderTicker>>,
        store: PriceStore,
        shutdown: ShutdownSignal,
    ) -> Result<(), ProviderError>;
}

/// Clears the running flag on every exit path, unwinding included
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Provider built from a query handler.
///
/// The subscription set lives in a `watch` channel so the run loop sees
/// every swap without polling; readers copy it out.
pub struct BaseProvider {
    name: String,
    kind: ProviderKind,
    handler: Box<dyn QueryHandler>,
    ids: watch::Sender<Vec<ProviderTicker>>,
    store: PriceStore,
    running: AtomicBool,
    max_subscriptions: usize,
}

impl BaseProvider {
    pub fn new(
        name: impl Into<String>,
        kind: ProviderKind,
        handler: Box<dyn QueryHandler>,
        ids: Vec<ProviderTicker>,
        max_subscriptions: usize,
    ) -> Self {
        let (ids, _rx) = watch::channel(ids);
        Self {
            name: name.into(),
            kind,
            handler,
            ids,
            store: PriceStore::new(),
            running: AtomicBool::new(false),
            max_subscriptions,
        }
    }

    fn acquire(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    async fn serve(&self, shutdown: ShutdownSignal) -> Result<(), ProviderError> {
        let mut ids = self.ids.subscribe();
        let count = ids.borrow_and_update().len();
        if count == 0 {
            tracing::info!(provider = %self.name, "No tickers to serve, not starting");
            return Ok(());
        }

        tracing::info!(provider = %self.name, kind = ?self.kind, tickers = count, "Provider started");
        let result = self
            .handler
            .run(&self.name, ids, self.store.clone(), shutdown)
            .await;
        match &result {
            Ok(()) => tracing::info!(provider = %self.name, "Provider stopped"),
            Err(e) => tracing::warn!(provider = %self.name, error = %e, "Provider failed"),
        }
        result
    }
}

#[async_trait]
impl Provider for BaseProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn start(&self, shutdown: ShutdownSignal) -> Result<(), ProviderError> {
        if !self.acquire() {
            return Err(ProviderError::AlreadyRunning(self.name.clone()));
        }

        loop {
            let result = {
                let _guard = RunningGuard(&self.running);
                self.serve(shutdown.clone()).await
            };

            // An update may refill the set after the worker saw it empty but
            // before the flag dropped; such an update found us running and
            // spawned nothing, so resume here
            if result.is_err() || shutdown.is_shutdown() || self.ids.borrow().is_empty() {
                return result;
            }
            if !self.acquire() {
                return result;
            }
            tracing::debug!(provider = %self.name, "Subscriptions refilled while stopping, resuming");
        }
    }

    fn get_ids(&self) -> Vec<ProviderTicker> {
        self.ids.borrow().clone()
    }

    async fn update(&self, ids: Vec<ProviderTicker>) -> Result<(), ProviderError> {
        if ids.len() > self.max_subscriptions {
            return Err(ProviderError::TooManySubscriptions {
                provider: self.name.clone(),
                requested: ids.len(),
                max: self.max_subscriptions,
            });
        }

        // An unchanged set must not wake the run loop; handlers treat every
        // notification as a resubscription
        if *self.ids.borrow() == ids {
            return Ok(());
        }
        self.store.retain(&ids).await;
        self.ids.send_if_modified(|current| {
            if *current == ids {
                return false;
            }
            *current = ids;
            true
        });
        Ok(())
    }

    async fn get_data(&self) -> HashMap<ProviderTicker, ResolvedPrice> {
        self.store.snapshot().await
    }
}
