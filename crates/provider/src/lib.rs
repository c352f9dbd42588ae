//! Vector providers for the Forest knowledge store
//!
//! - [`VectorProvider`]: the async interface every backend implements
//! - [`SessionState`]: connection state shared with the engine
//! - [`LocalProvider`]: in-process, optionally persisted to a data directory
//! - [`ChromaProvider`]: Chroma-compatible HTTP service

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chroma;
pub mod local;
pub mod session;
pub mod traits;

pub use chroma::ChromaProvider;
pub use local::LocalProvider;
pub use session::{ConnectionState, HealthCheck, SessionSnapshot, SessionState};
pub use traits::{InitializeOutcome, ProviderMode, ProviderStatus, VectorProvider};

use forest_core::{ProviderKind, StoreConfig, StoreResult};
use std::sync::Arc;

/// Build the provider selected by `config`
pub fn provider_from_config(config: &StoreConfig) -> StoreResult<Arc<dyn VectorProvider>> {
    let provider: Arc<dyn VectorProvider> = match config.provider {
        ProviderKind::Local => match &config.data_dir {
            Some(dir) => Arc::new(LocalProvider::persistent(dir)),
            None => Arc::new(LocalProvider::in_memory()),
        },
        ProviderKind::Chroma => Arc::new(
            ChromaProvider::new(&config.chroma)?.with_signatures(config.recovery.signatures()),
        ),
    };
    tracing::debug!(
        target: "forest::store",
        provider = provider.name(),
        mode = %provider.mode(),
        "Provider selected"
    );
    Ok(provider)
}
