//! Worker lifecycle: worker records and the registration that owns them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use url::Url;

/// Unique identifier for a service worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceWorkerState {
    /// Created, install not started.
    #[default]
    Parsed,
    /// Install handler running.
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Being promoted to active.
    Activating,
    /// Active and controlling its scope.
    Activated,
    /// Replaced, unregistered or failed to install.
    Redundant,
}

/// A service worker instance.
#[derive(Debug, Clone)]
pub struct ServiceWorker {
    /// Unique ID.
    pub id: ServiceWorkerId,

    /// Current state.
    pub state: ServiceWorkerState,

    /// Install failure, if any.
    pub error: Option<String>,

    /// Time of last state change.
    pub state_changed_at: Instant,
}

impl ServiceWorker {
    /// Create a new service worker.
    pub fn new() -> Self {
        Self {
            id: ServiceWorkerId::new(),
            state: ServiceWorkerState::Parsed,
            error: None,
            state_changed_at: Instant::now(),
        }
    }

    /// Set state.
    pub fn set_state(&mut self, state: ServiceWorkerState) {
        self.state = state;
        self.state_changed_at = Instant::now();
    }

    /// Check if active.
    pub fn is_active(&self) -> bool {
        self.state == ServiceWorkerState::Activated
    }

    /// Check if redundant.
    pub fn is_redundant(&self) -> bool {
        self.state == ServiceWorkerState::Redundant
    }
}

impl Default for ServiceWorker {
    fn default() -> Self {
        Self::new()
    }
}

/// The worker slots of one scope.
#[derive(Debug)]
pub struct ServiceWorkerRegistration {
    /// Scope URL.
    pub scope: Url,

    /// Installing worker.
    pub installing: Option<ServiceWorker>,

    /// Waiting worker (installed but not active).
    pub waiting: Option<ServiceWorker>,

    /// Active worker.
    pub active: Option<ServiceWorker>,
}

fn retire(worker: Option<ServiceWorker>) -> Option<ServiceWorker> {
    worker.map(|mut w| {
        w.set_state(ServiceWorkerState::Redundant);
        w
    })
}

impl ServiceWorkerRegistration {
    /// Create an empty registration.
    pub fn new(scope: Url) -> Self {
        Self {
            scope,
            installing: None,
            waiting: None,
            active: None,
        }
    }

    /// Whether `url` falls inside this registration's scope.
    pub fn controls(&self, url: &Url) -> bool {
        url.as_str().starts_with(self.scope.as_str())
    }

    /// Start installing a new worker. Returns the new worker and the one it
    /// displaced from the installing slot, now redundant.
    pub fn begin_install(&mut self) -> (ServiceWorker, Option<ServiceWorker>) {
        let mut worker = ServiceWorker::new();
        worker.set_state(ServiceWorkerState::Installing);
        let displaced = retire(self.installing.replace(worker.clone()));
        (worker, displaced)
    }

    /// Move the installing worker `id` to waiting. Returns the installed
    /// worker and any previously waiting worker, now redundant. `None` when
    /// `id` is no longer the installing worker.
    pub fn install_complete(
        &mut self,
        id: ServiceWorkerId,
    ) -> Option<(ServiceWorker, Option<ServiceWorker>)> {
        if self.installing.as_ref().map(|w| w.id) != Some(id) {
            return None;
        }
        let mut worker = self.installing.take()?;
        worker.set_state(ServiceWorkerState::Installed);
        let displaced = retire(self.waiting.replace(worker.clone()));
        Some((worker, displaced))
    }

    /// Mark the installing worker `id` redundant with `error`.
    pub fn install_failed(&mut self, id: ServiceWorkerId, error: String) -> Option<ServiceWorker> {
        if self.installing.as_ref().map(|w| w.id) != Some(id) {
            return None;
        }
        let mut worker = retire(self.installing.take())?;
        worker.error = Some(error);
        Some(worker)
    }

    /// Promote the waiting worker. Returns the new active worker and the
    /// previous one, now redundant.
    pub fn activate(&mut self) -> Option<(ServiceWorker, Option<ServiceWorker>)> {
        let mut worker = self.waiting.take()?;
        worker.set_state(ServiceWorkerState::Activating);
        worker.set_state(ServiceWorkerState::Activated);
        let displaced = retire(self.active.replace(worker.clone()));
        Some((worker, displaced))
    }

    /// Retire every worker. Returns them, now redundant.
    pub fn unregister(&mut self) -> Vec<ServiceWorker> {
        [self.installing.take(), self.waiting.take(), self.active.take()]
            .into_iter()
            .filter_map(retire)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration() -> ServiceWorkerRegistration {
        ServiceWorkerRegistration::new(Url::parse("https://fishing.example/").unwrap())
    }

    #[test]
    fn test_service_worker_creation() {
        let worker = ServiceWorker::new();
        assert_eq!(worker.state, ServiceWorkerState::Parsed);
        assert!(!worker.is_active());
        assert!(worker.error.is_none());
    }

    #[test]
    fn test_worker_ids_unique() {
        assert_ne!(ServiceWorker::new().id, ServiceWorker::new().id);
    }

    #[test]
    fn test_registration_lifecycle() {
        let mut registration = registration();

        let (worker, displaced) = registration.begin_install();
        assert_eq!(worker.state, ServiceWorkerState::Installing);
        assert!(displaced.is_none());

        // Installing -> Installed
        let (installed, _) = registration.install_complete(worker.id).unwrap();
        assert_eq!(installed.state, ServiceWorkerState::Installed);
        assert!(registration.installing.is_none());
        assert!(registration.waiting.is_some());

        // Installed -> Active
        let (active, previous) = registration.activate().unwrap();
        assert!(active.is_active());
        assert!(previous.is_none());
        assert!(registration.waiting.is_none());
    }

    #[test]
    fn test_activate_retires_previous() {
        let mut registration = registration();
        for _ in 0..2 {
            let (worker, _) = registration.begin_install();
            registration.install_complete(worker.id).unwrap();
        }

        // Second install displaced the first waiting worker.
        assert!(registration.waiting.is_some());
        let (first_active, _) = registration.activate().unwrap();

        let (worker, _) = registration.begin_install();
        registration.install_complete(worker.id).unwrap();
        let (_, previous) = registration.activate().unwrap();
        let previous = previous.unwrap();
        assert_eq!(previous.id, first_active.id);
        assert!(previous.is_redundant());
    }

    #[test]
    fn test_stale_install_completion_ignored() {
        let mut registration = registration();
        let (stale, _) = registration.begin_install();
        let (current, displaced) = registration.begin_install();

        assert_eq!(displaced.unwrap().id, stale.id);
        assert!(registration.install_complete(stale.id).is_none());
        assert!(registration.install_complete(current.id).is_some());
    }

    #[test]
    fn test_install_failed() {
        let mut registration = registration();
        let (worker, _) = registration.begin_install();

        let failed = registration
            .install_failed(worker.id, "404 for /static/manifest.json".to_string())
            .unwrap();
        assert!(failed.is_redundant());
        assert!(failed.error.is_some());
        assert!(registration.installing.is_none());
        assert!(registration.activate().is_none());
    }

    #[test]
    fn test_unregister() {
        let mut registration = registration();
        let (worker, _) = registration.begin_install();
        registration.install_complete(worker.id).unwrap();
        registration.activate().unwrap();
        registration.begin_install();

        let retired = registration.unregister();
        assert_eq!(retired.len(), 2);
        assert!(retired.iter().all(ServiceWorker::is_redundant));
        assert!(registration.active.is_none());
    }

    #[test]
    fn test_controls_scope() {
        let registration = ServiceWorkerRegistration::new(Url::parse("https://fishing.example/app/").unwrap());
        assert!(registration.controls(&Url::parse("https://fishing.example/app/report").unwrap()));
        assert!(!registration.controls(&Url::parse("https://fishing.example/other").unwrap()));
        assert!(!registration.controls(&Url::parse("https://evil.example/app/").unwrap()));
    }
}
