use crate::config::Config;
use crate::error::ApiError;
use facegate_core::{
    BlobStore, EmbeddingSource, IngestCoordinator, IngestError, LabelIndex, RebuildOptions, Verifier,
};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::watch;

/// Startup progress of the daemon.
///
/// `Uninitialized -> ModelsLoaded -> IndexReady`, or `Failed` if model
/// loading or the initial rebuild fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServicePhase {
    Uninitialized,
    ModelsLoaded,
    IndexReady,
    Failed(String),
}

impl fmt::Display for ServicePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServicePhase::Uninitialized => f.write_str("uninitialized"),
            ServicePhase::ModelsLoaded => f.write_str("models_loaded"),
            ServicePhase::IndexReady => f.write_str("index_ready"),
            ServicePhase::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Components that exist only once an embedding source is available.
pub struct Services {
    pub coordinator: IngestCoordinator,
    pub verifier: Verifier,
}

/// Shared application state
pub struct AppState {
    pub index: Arc<LabelIndex>,
    pub store: Arc<dyn BlobStore>,
    pub threshold: f32,
    pub sample_timeout: Duration,
    phase: watch::Sender<ServicePhase>,
    services: OnceLock<Services>,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<dyn BlobStore>) -> Self {
        let (phase, _) = watch::channel(ServicePhase::Uninitialized);
        Self {
            index: Arc::new(LabelIndex::new()),
            store,
            threshold: config.match_threshold,
            sample_timeout: config.sample_timeout(),
            phase,
            services: OnceLock::new(),
        }
    }

    pub fn phase(&self) -> ServicePhase {
        self.phase.borrow().clone()
    }

    fn set_phase(&self, phase: ServicePhase) {
        tracing::info!(%phase, "service phase changed");
        self.phase.send_replace(phase);
    }

    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::error!(%reason, "startup failed");
        self.set_phase(ServicePhase::Failed(reason));
    }

    /// Services if the daemon is serving, otherwise a not-ready error.
    pub fn ready(&self) -> Result<&Services, ApiError> {
        match (self.phase(), self.services.get()) {
            (ServicePhase::IndexReady, Some(services)) => Ok(services),
            (phase, _) => Err(ApiError::NotReady(phase)),
        }
    }

    /// The coordinator, once models are loaded, regardless of phase.
    pub fn services(&self) -> Option<&Services> {
        self.services.get()
    }

    /// Full rebuild on demand. Also allowed after a failed initial build;
    /// success moves the phase to `IndexReady`.
    pub async fn reload(&self) -> Result<u64, ApiError> {
        let services = self.services().ok_or_else(|| ApiError::NotReady(self.phase()))?;
        let version = services.coordinator.reload().await?;
        if self.phase() != ServicePhase::IndexReady {
            self.set_phase(ServicePhase::IndexReady);
        }
        Ok(version)
    }

    /// Wire up ingestion and verification on top of `source`, then run the
    /// initial rebuild. Moves the phase to `IndexReady` or `Failed`.
    pub async fn install(&self, source: Arc<dyn EmbeddingSource>) -> Result<u64, IngestError> {
        let options = RebuildOptions {
            sample_timeout: self.sample_timeout,
        };
        let services = Services {
            coordinator: IngestCoordinator::new(
                self.store.clone(),
                source.clone(),
                self.index.clone(),
                options,
            ),
            verifier: Verifier::new(self.index.clone(), source)
                .with_threshold(self.threshold)
                .with_timeout(self.sample_timeout),
        };
        let services = self.services.get_or_init(|| services);
        self.set_phase(ServicePhase::ModelsLoaded);

        match services.coordinator.reload().await {
            Ok(version) => {
                self.set_phase(ServicePhase::IndexReady);
                Ok(version)
            }
            Err(e) => {
                self.fail(format!("initial index build: {e}"));
                Err(e)
            }
        }
    }
}
