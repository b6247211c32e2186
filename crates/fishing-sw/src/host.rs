//! Host shim standing in for the browser runtime.
//!
//! The host owns the registration, dispatches lifecycle events to the worker
//! script and routes fetches: requests inside the scope of an active worker go
//! through the script, everything else goes straight to the network.

use std::sync::Arc;

use fishing_net::{Fetcher, Response};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::lifecycle::{ServiceWorker, ServiceWorkerId, ServiceWorkerRegistration, ServiceWorkerState};
use crate::worker::{FetchEvent, WorkerGlobalScope, WorkerScript};
use crate::ServiceWorkerError;

/// Service worker events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceWorkerEvent {
    /// State changed.
    StateChange {
        worker_id: ServiceWorkerId,
        new_state: ServiceWorkerState,
    },
    /// The install handler failed; the worker is redundant.
    InstallFailed {
        worker_id: ServiceWorkerId,
        error: String,
    },
    /// A new worker now controls the scope.
    ControllerChange { worker_id: ServiceWorkerId },
}

/// Runs one worker script for one scope.
pub struct ServiceWorkerHost {
    registration: Arc<RwLock<ServiceWorkerRegistration>>,
    global: WorkerGlobalScope,
    script: Arc<dyn WorkerScript>,
    event_tx: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl ServiceWorkerHost {
    /// Create a host with nothing installed yet.
    pub fn new(
        scope: Url,
        script: Arc<dyn WorkerScript>,
        caches: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceWorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        (
            Self {
                registration: Arc::new(RwLock::new(ServiceWorkerRegistration::new(scope.clone()))),
                global: WorkerGlobalScope::new(scope, caches, fetcher),
                script,
                event_tx,
            },
            event_rx,
        )
    }

    /// Scope URL.
    pub fn scope(&self) -> &Url {
        self.global.scope()
    }

    /// Cache storage shared with the worker.
    pub fn caches(&self) -> &dyn CacheStorage {
        self.global.caches()
    }

    fn emit(&self, event: ServiceWorkerEvent) {
        // Nobody listening is fine.
        let _ = self.event_tx.send(event);
    }

    fn emit_state(&self, worker: &ServiceWorker) {
        self.emit(ServiceWorkerEvent::StateChange {
            worker_id: worker.id,
            new_state: worker.state,
        });
    }

    /// Install a new worker and wait for its install handler.
    ///
    /// On success the worker is `Installed` (waiting). On failure it is
    /// `Redundant` and the handler's error is returned.
    pub async fn install(&self) -> Result<ServiceWorkerId, ServiceWorkerError> {
        let worker = {
            let mut registration = self.registration.write().await;
            let (worker, displaced) = registration.begin_install();
            if let Some(old) = displaced {
                self.emit_state(&old);
            }
            worker
        };
        self.emit_state(&worker);
        info!(worker = worker.id.raw(), scope = %self.scope(), "Installing service worker");

        match self.script.on_install(&self.global).await {
            Ok(()) => {
                let mut registration = self.registration.write().await;
                let (installed, displaced) = registration.install_complete(worker.id).ok_or_else(|| {
                    ServiceWorkerError::StateError(format!(
                        "worker {} was replaced during install",
                        worker.id.raw()
                    ))
                })?;
                if let Some(old) = displaced {
                    self.emit_state(&old);
                }
                self.emit_state(&installed);
                info!(worker = worker.id.raw(), "Service worker installed");
                Ok(worker.id)
            }
            Err(e) => {
                warn!(worker = worker.id.raw(), error = %e, "Service worker install failed");
                let failed = self
                    .registration
                    .write()
                    .await
                    .install_failed(worker.id, e.to_string());
                if let Some(failed) = failed {
                    self.emit_state(&failed);
                }
                self.emit(ServiceWorkerEvent::InstallFailed {
                    worker_id: worker.id,
                    error: e.to_string(),
                });
                Err(ServiceWorkerError::Install(Box::new(e)))
            }
        }
    }

    /// Promote the waiting worker to active.
    pub async fn activate(&self) -> Result<ServiceWorkerId, ServiceWorkerError> {
        let mut registration = self.registration.write().await;
        let (active, displaced) = registration
            .activate()
            .ok_or_else(|| ServiceWorkerError::StateError("no waiting worker to activate".to_string()))?;

        self.emit(ServiceWorkerEvent::StateChange {
            worker_id: active.id,
            new_state: ServiceWorkerState::Activating,
        });
        if let Some(old) = displaced {
            self.emit_state(&old);
        }
        self.emit_state(&active);
        self.emit(ServiceWorkerEvent::ControllerChange { worker_id: active.id });
        info!(worker = active.id.raw(), scope = %registration.scope, "Service worker activated");

        Ok(active.id)
    }

    /// Install then activate.
    pub async fn register(&self) -> Result<ServiceWorkerId, ServiceWorkerError> {
        self.install().await?;
        self.activate().await
    }

    /// The active worker, if any.
    pub async fn controller(&self) -> Option<ServiceWorker> {
        self.registration.read().await.active.clone()
    }

    /// The installed worker waiting for activation, if any.
    pub async fn waiting(&self) -> Option<ServiceWorker> {
        self.registration.read().await.waiting.clone()
    }

    /// Answer a request the way the browser would.
    pub async fn handle_fetch(&self, event: FetchEvent) -> Result<Response, ServiceWorkerError> {
        let controlled = {
            let registration = self.registration.read().await;
            registration.active.is_some() && registration.controls(&event.request.url)
        };

        if !controlled {
            debug!(url = %event.request.url, "Uncontrolled request, using network");
            return self.global.fetch(event.request).await;
        }

        self.script.on_fetch(&self.global, event).await
    }

    /// Retire every worker. Returns whether anything was registered.
    pub async fn unregister(&self) -> bool {
        let retired = self.registration.write().await.unregister();
        for worker in &retired {
            self.emit_state(worker);
        }
        info!(scope = %self.scope(), retired = retired.len(), "Service worker unregistered");
        !retired.is_empty()
    }
}
