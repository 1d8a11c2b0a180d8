use std::{sync::Arc, time::Duration};

use log::{debug, error, info, warn};
use tokio::{select, sync::mpsc::WeakSender, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

use super::{compose_payload, message::ManagerCommand, PushError, Sender};
use crate::{
    broker::Broker,
    error::{BrokerError, StoreError},
    model::{PubsubMessage, PushConfig, RetryPolicy, RetryPolicyType, Subscription},
    store::Store,
};

const SLOWSTART_MIN_RATE: Duration = Duration::from_millis(300);
const SLOWSTART_MAX_RATE: Duration = Duration::from_secs(3600);

/// Collaborators shared by every delivery loop.
#[derive(Clone)]
pub(crate) struct PushDeps {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) broker: Arc<dyn Broker>,
    pub(crate) sender: Arc<dyn Sender>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PusherState {
    Idle,
    Running,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PusherStatus {
    pub id: u64,
    pub key: String,
    pub full_name: String,
    pub endpoint: String,
    pub retry_policy: RetryPolicy,
    pub state: PusherState,
}

struct PusherTask {
    run_id: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Registry entry of a push subscription.
pub(crate) struct Pusher {
    id: u64,
    key: String,
    project_uuid: String,
    sub: String,
    full_name: String,
    config: PushConfig,
    task: Option<PusherTask>,
}

impl Pusher {
    pub(crate) fn new(
        id: u64,
        key: String,
        sub: &Subscription,
        full_name: String,
    ) -> Result<Self, PushError> {
        let config = sub
            .push_config()
            .cloned()
            .ok_or_else(|| PushError::NotPushEnabled(key.clone()))?;

        Ok(Self {
            id,
            key,
            project_uuid: sub.project_uuid.clone(),
            sub: sub.name.0.clone(),
            full_name,
            config,
            task: None,
        })
    }

    pub(crate) fn project_uuid(&self) -> &str {
        &self.project_uuid
    }

    pub(crate) fn run_id(&self) -> Option<u64> {
        self.task.as_ref().map(|task| task.run_id)
    }

    /// Takes over the push configuration currently persisted for the subscription.
    pub(crate) fn refresh(&mut self, sub: &Subscription) -> Result<(), PushError> {
        self.config = sub
            .push_config()
            .cloned()
            .ok_or_else(|| PushError::NotPushEnabled(self.key.clone()))?;
        Ok(())
    }

    pub(crate) fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    pub(crate) fn launch(
        &mut self,
        run_id: u64,
        deps: PushDeps,
        deregister: WeakSender<ManagerCommand>,
    ) {
        let token = CancellationToken::new();

        let delivery = Delivery {
            key: self.key.clone(),
            run_id,
            project_uuid: self.project_uuid.clone(),
            sub: self.sub.clone(),
            full_name: self.full_name.clone(),
            config: self.config.clone(),
            deps,
            deregister,
            token: token.clone(),
        };

        info!(
            "Pusher {} launching for {} ({:?} every {}ms)",
            self.id,
            self.full_name,
            self.config.retry_policy.policy_type,
            self.config.retry_policy.period
        );

        let handle = tokio::spawn(delivery.run());
        self.task = Some(PusherTask {
            run_id,
            token,
            handle,
        });
    }

    /// Cancels the delivery loop and waits for it to exit.
    pub(crate) async fn stop(&mut self) -> bool {
        let Some(task) = self.task.take() else {
            return false;
        };

        task.token.cancel();
        if let Err(err) = task.handle.await {
            error!("Pusher {} exited abnormally: {}", self.id, err);
        }

        info!("Pusher {} stopped", self.id);
        true
    }

    pub(crate) fn status(&self) -> PusherStatus {
        PusherStatus {
            id: self.id,
            key: self.key.clone(),
            full_name: self.full_name.clone(),
            endpoint: self.config.target().to_string(),
            retry_policy: self.config.retry_policy.clone(),
            state: if self.is_running() {
                PusherState::Running
            } else {
                PusherState::Idle
            },
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Delivered,
    Empty,
    Failed,
}

/// State owned by a running delivery loop.
struct Delivery {
    key: String,
    run_id: u64,
    project_uuid: String,
    sub: String,
    full_name: String,
    config: PushConfig,
    deps: PushDeps,
    deregister: WeakSender<ManagerCommand>,
    token: CancellationToken,
}

impl Delivery {
    async fn run(self) {
        let mut rate = Duration::from_millis(self.config.retry_policy.period);

        loop {
            select! {
                biased;
                _ = self.token.cancelled() => return,
                _ = sleep(rate) => {}
            }

            let outcome = select! {
                biased;
                _ = self.token.cancelled() => return,
                outcome = self.push_once() => outcome,
            };

            match outcome {
                Ok(outcome) => rate = self.next_rate(rate, &outcome),
                Err(err) => {
                    info!("Pusher for {} stopping itself: {}", self.full_name, err);
                    self.deregister().await;
                    return;
                }
            }
        }
    }

    fn next_rate(&self, rate: Duration, outcome: &Outcome) -> Duration {
        if self.config.retry_policy.policy_type != RetryPolicyType::Slowstart {
            return rate;
        }

        match outcome {
            Outcome::Delivered => (rate / 2).max(SLOWSTART_MIN_RATE),
            Outcome::Failed => (rate * 2).min(SLOWSTART_MAX_RATE),
            Outcome::Empty => rate,
        }
    }

    async fn deregister(&self) {
        let Some(tx) = self.deregister.upgrade() else {
            return;
        };

        let cmd = ManagerCommand::Deregister {
            key: self.key.clone(),
            run_id: self.run_id,
        };

        select! {
            _ = self.token.cancelled() => {}
            _ = tx.send(cmd) => {}
        }
    }

    /// Attempts to deliver the message at the subscription's cursor.
    ///
    /// Errors mean the subscription no longer exists or is no longer push.
    async fn push_once(&self) -> Result<Outcome, PushError> {
        let store = &self.deps.store;

        let sub = match store.query_sub(&self.project_uuid, &self.sub).await {
            Ok(sub) => sub,
            Err(err) => return self.store_failure(err),
        };

        if !sub.delivery.is_push() {
            return Err(PushError::NotPushEnabled(self.key.clone()));
        }

        let topic = sub.broker_topic();
        let raw = match self.deps.broker.consume(&topic, sub.offset, true, 1).await {
            Ok(raw) => raw,
            Err(BrokerError::OffsetOff) => {
                let min = self.deps.broker.min_offset(&topic).await.unwrap_or(sub.offset);
                info!("Pusher for {} resyncing offset to {}", self.full_name, min);
                if let Err(err) = store
                    .update_sub_offset(&self.project_uuid, &self.sub, min)
                    .await
                {
                    return self.store_failure(err);
                }
                return Ok(Outcome::Empty);
            }
            Err(err) => {
                warn!("Pusher for {} could not consume: {}", self.full_name, err);
                return Ok(Outcome::Failed);
            }
        };

        let Some(raw) = raw.into_iter().next() else {
            debug!("Pusher for {}: empty", self.full_name);
            return Ok(Outcome::Empty);
        };

        let mut message = match PubsubMessage::from_json(&raw) {
            Ok(message) => message,
            Err(err) => {
                error!(
                    "Pusher for {} found invalid message at offset {}: {}",
                    self.full_name, sub.offset, err
                );
                return Ok(Outcome::Failed);
            }
        };
        if message.id.is_empty() {
            message.id = sub.offset.to_string();
        }
        let size = message.size();

        let payload = match compose_payload(&self.config, message, &self.full_name) {
            Ok(payload) => payload,
            Err(err) => {
                error!("Pusher for {} could not render payload: {}", self.full_name, err);
                return Ok(Outcome::Failed);
            }
        };

        if let Err(err) = self
            .deps
            .sender
            .send(payload, self.config.target(), self.config.authorization())
            .await
        {
            warn!("Pusher for {} failed to deliver: {}", self.full_name, err);
            return Ok(Outcome::Failed);
        }

        if let Err(err) = store
            .update_sub_offset(&self.project_uuid, &self.sub, sub.offset + 1)
            .await
        {
            return self.store_failure(err);
        }

        let metrics = async {
            store
                .increment_sub_msg_num(&self.project_uuid, &self.sub, 1)
                .await?;
            store
                .increment_sub_bytes(&self.project_uuid, &self.sub, size)
                .await
        };
        if let Err(err) = metrics.await {
            warn!("Could not update push metrics of {}: {}", self.full_name, err);
        }

        debug!("Pusher for {} advanced offset to {}", self.full_name, sub.offset + 1);
        Ok(Outcome::Delivered)
    }

    /// Only a vanished subscription stops the loop, other store failures are retried.
    fn store_failure(&self, err: StoreError) -> Result<Outcome, PushError> {
        match err {
            StoreError::NotFound => Err(PushError::SubscriptionNotFound(self.key.clone())),
            err => {
                warn!("Pusher for {} store failure: {}", self.full_name, err);
                Ok(Outcome::Failed)
            }
        }
    }
}
