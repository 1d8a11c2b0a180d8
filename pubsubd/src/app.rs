use std::{sync::Arc, time::Duration};

use log::info;
use pubsubd_backend::{
    broker::MemoryBroker,
    config::{Config, ConfigError},
    push::{HttpSender, LocalPushBackend, Manager, ManagerHandle, PushBackend, Sender},
    store::MemoryStore,
    verification::HttpVerifier,
    Backend,
};
use tokio_util::sync::CancellationToken;

use crate::{
    actions::{report_status, start_push_delivery, stop_push_delivery},
    fixture::{Fixture, FixtureError},
};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fixture(#[from] FixtureError),
    #[error("could not build http client: {0}")]
    HttpClient(String),
    #[error("could not listen for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

pub struct App {
    backend: Arc<Backend>,
    manager: ManagerHandle,
    report_interval: Duration,
    cancel_token: CancellationToken,
}

impl App {
    pub async fn new(
        config: Config,
        fixture: Option<Fixture>,
        report_interval: Duration,
    ) -> Result<Self, AppError> {
        let sender = HttpSender::new(config.push_sender_timeout())
            .map_err(|err| AppError::HttpClient(err.to_string()))?;

        Self::with_sender(config, fixture, Arc::new(sender), report_interval).await
    }

    /// Like [`App::new`], delivering push messages through `sender`.
    pub async fn with_sender(
        config: Config,
        fixture: Option<Fixture>,
        sender: Arc<dyn Sender>,
        report_interval: Duration,
    ) -> Result<Self, AppError> {
        config.validate()?;

        let store = MemoryStore::new();
        let broker = MemoryBroker::new(config.consume_wait());
        if let Some(fixture) = fixture {
            fixture.seed(&store, &broker).await?;
        }

        let store = Arc::new(store);
        let broker = Arc::new(broker);

        let manager = Manager::spawn(store.clone(), broker.clone(), sender);
        let push: Arc<dyn PushBackend> = Arc::new(LocalPushBackend::new(manager.clone()));

        let verifier = HttpVerifier::new(config.verification_timeout())
            .map_err(|err| AppError::HttpClient(err.to_string()))?;

        let backend = Backend::new(store, broker, push, Arc::new(verifier), config);

        Ok(Self {
            backend: Arc::new(backend),
            manager,
            report_interval,
            cancel_token: CancellationToken::new(),
        })
    }

    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    pub fn manager(&self) -> &ManagerHandle {
        &self.manager
    }

    /// Starts push delivery, if enabled, along with status reporting.
    pub async fn start(&self) {
        if self.backend.config().push_enabled {
            start_push_delivery(&self.manager).await;
        } else {
            info!("Push functionality is disabled");
        }

        report_status(
            &self.manager,
            self.backend.push_backend(),
            self.report_interval,
            &self.cancel_token,
        );
    }

    /// Runs until Ctrl-C, then stops every pusher.
    pub async fn run(self) -> Result<(), AppError> {
        self.start().await;
        info!("pubsubd started");

        tokio::signal::ctrl_c().await?;
        info!("Shutting down");

        self.shutdown().await;
        Ok(())
    }

    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        stop_push_delivery(&self.manager).await;
    }
}
