pub mod broadcaster;
pub mod config;
pub mod connection;
pub mod error;
pub mod registry;

use std::sync::Arc;

use smt_db::Database;

pub use broadcaster::Broadcaster;
pub use config::GatewayConfig;
pub use error::{GatewayError, TransportError};
pub use registry::{ConnectionRegistry, Registration};

/// Everything a live connection needs: the shared registry, the fan-out point
/// and the store. Cheap to clone.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    db: Arc<Database>,
    registry: ConnectionRegistry,
    broadcaster: Broadcaster,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(db: Arc<Database>, config: GatewayConfig) -> Self {
        let registry = ConnectionRegistry::new(config.outbound_queue);
        let broadcaster = Broadcaster::new(registry.clone(), db.clone());
        Self {
            inner: Arc::new(GatewayInner {
                db,
                registry,
                broadcaster,
                config,
            }),
        }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.inner.db
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.inner.broadcaster
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }
}
