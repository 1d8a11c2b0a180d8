use std::sync::Arc;

use broker::Broker;
use config::Config;
use push::PushBackend;
use store::Store;
use verification::EndpointVerifier;

pub mod ack_id;
pub mod auth;
pub mod broker;
pub mod config;
pub mod error;
mod handlers;
pub mod model;
pub mod push;
pub mod push_config;
pub mod store;
pub mod verification;

pub use handlers::{DeleteResponse, RequestContext};

/// Entry point of the subscription endpoints. Every request handler is a
/// method on it; see the `handlers` module.
pub struct Backend {
    store: Arc<dyn Store>,
    broker: Arc<dyn Broker>,
    push: Arc<dyn PushBackend>,
    verifier: Arc<dyn EndpointVerifier>,
    config: Config,
}

impl Backend {
    pub fn new(
        store: Arc<dyn Store>,
        broker: Arc<dyn Broker>,
        push: Arc<dyn PushBackend>,
        verifier: Arc<dyn EndpointVerifier>,
        config: Config,
    ) -> Self {
        Self {
            store,
            broker,
            push,
            verifier,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn push_backend(&self) -> &Arc<dyn PushBackend> {
        &self.push
    }
}
