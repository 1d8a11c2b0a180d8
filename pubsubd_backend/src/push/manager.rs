use std::{collections::HashMap, sync::Arc};

use log::{info, warn};
use tokio::sync::{
    mpsc::{self, Receiver, WeakSender},
    oneshot,
};

use super::{
    message::{ManagerCommand, Reply},
    pusher::{PushDeps, Pusher},
    pusher_key, PushError, PusherStatus, Sender,
};
use crate::{broker::Broker, error::StoreError, store::Store};

const COMMAND_BUFFER: usize = 32;

/// Supervisor owning the registry of pushers. All registry mutations go
/// through its command channel; see [`ManagerHandle`].
pub struct Manager {
    pushers: HashMap<String, Pusher>,
    deps: PushDeps,
    rx: Receiver<ManagerCommand>,
    weak_tx: WeakSender<ManagerCommand>,
    next_id: u64,
    next_run: u64,
}

impl Manager {
    pub fn new(
        store: Arc<dyn Store>,
        broker: Arc<dyn Broker>,
        sender: Arc<dyn Sender>,
    ) -> (Self, ManagerHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);

        let manager = Self {
            pushers: HashMap::new(),
            deps: PushDeps {
                store,
                broker,
                sender,
            },
            rx,
            weak_tx: tx.downgrade(),
            next_id: 0,
            next_run: 0,
        };

        (manager, ManagerHandle { tx })
    }

    /// Spawns the manager task, returning the handle to drive it.
    pub fn spawn(
        store: Arc<dyn Store>,
        broker: Arc<dyn Broker>,
        sender: Arc<dyn Sender>,
    ) -> ManagerHandle {
        let (manager, handle) = Self::new(store, broker, sender);
        tokio::spawn(manager.run());
        info!("Push manager initialized");
        handle
    }

    /// Serves commands until every handle is dropped, then stops all pushers.
    pub async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                ManagerCommand::LoadPushSubs { reply } => {
                    let _ = reply.send(self.load_push_subs().await);
                }
                ManagerCommand::Add {
                    project_uuid,
                    sub,
                    reply,
                } => {
                    let _ = reply.send(self.add(&project_uuid, &sub).await);
                }
                ManagerCommand::Launch {
                    project_uuid,
                    sub,
                    reply,
                } => {
                    let _ = reply.send(self.launch(&pusher_key(&project_uuid, &sub)).await);
                }
                ManagerCommand::Stop {
                    project_uuid,
                    sub,
                    reply,
                } => {
                    let _ = reply.send(self.stop(&pusher_key(&project_uuid, &sub)).await);
                }
                ManagerCommand::Restart {
                    project_uuid,
                    sub,
                    reply,
                } => {
                    let _ = reply.send(self.restart(&pusher_key(&project_uuid, &sub)).await);
                }
                ManagerCommand::Remove {
                    project_uuid,
                    sub,
                    reply,
                } => {
                    let _ = reply.send(self.remove(&pusher_key(&project_uuid, &sub)).await);
                }
                ManagerCommand::RemoveProjectAll {
                    project_uuid,
                    reply,
                } => {
                    let _ = reply.send(Ok(self.remove_project_all(&project_uuid).await));
                }
                ManagerCommand::StartAll { reply } => {
                    let _ = reply.send(Ok(self.start_all().await));
                }
                ManagerCommand::StopAll { reply } => {
                    let _ = reply.send(Ok(self.stop_all().await));
                }
                ManagerCommand::Status {
                    project_uuid,
                    sub,
                    reply,
                } => {
                    let key = pusher_key(&project_uuid, &sub);
                    let status = self
                        .pushers
                        .get(&key)
                        .map(Pusher::status)
                        .ok_or(PushError::NotRegistered(key));
                    let _ = reply.send(status);
                }
                ManagerCommand::List { reply } => {
                    let mut statuses: Vec<PusherStatus> =
                        self.pushers.values().map(Pusher::status).collect();
                    statuses.sort_by(|a, b| a.key.cmp(&b.key));
                    let _ = reply.send(Ok(statuses));
                }
                ManagerCommand::Deregister { key, run_id } => {
                    self.deregister(&key, run_id).await;
                }
            }
        }

        self.stop_all().await;
        info!("Push manager shut down");
    }

    async fn load_push_subs(&mut self) -> Result<usize, PushError> {
        let subs = self.deps.store.query_push_subs().await?;

        let mut added = 0;
        for sub in subs {
            let verified = sub.push_config().is_some_and(|cfg| cfg.verified);
            if !verified {
                continue;
            }

            match self.add(&sub.project_uuid, &sub.name.0).await {
                Ok(()) => added += 1,
                Err(err) => warn!("Could not load push subscription {}: {}", sub.name, err),
            }
        }

        Ok(added)
    }

    async fn add(&mut self, project_uuid: &str, name: &str) -> Result<(), PushError> {
        let key = pusher_key(project_uuid, name);

        let sub = match self.deps.store.query_sub(project_uuid, name).await {
            Ok(sub) => sub,
            Err(StoreError::NotFound) => return Err(PushError::SubscriptionNotFound(key)),
            Err(err) => return Err(err.into()),
        };

        if let Some(pusher) = self.pushers.get_mut(&key) {
            return pusher.refresh(&sub);
        }

        let project_name = self
            .deps
            .store
            .query_project_name(project_uuid)
            .await
            .unwrap_or_else(|_| project_uuid.to_string());

        let pusher = Pusher::new(self.next_id, key.clone(), &sub, sub.full_name(&project_name))?;
        self.next_id += 1;
        self.pushers.insert(key.clone(), pusher);

        info!("Push subscription {} added", key);
        Ok(())
    }

    /// Reloads the pusher's configuration from the store.
    async fn refresh(&mut self, key: &str) -> Result<(), PushError> {
        let pusher = self
            .pushers
            .get_mut(key)
            .ok_or_else(|| PushError::NotRegistered(key.to_string()))?;

        let (project_uuid, name) = key.split_once('/').unwrap_or((key, ""));
        match self.deps.store.query_sub(project_uuid, name).await {
            Ok(sub) => pusher.refresh(&sub),
            Err(StoreError::NotFound) => Err(PushError::SubscriptionNotFound(key.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    async fn launch(&mut self, key: &str) -> Result<(), PushError> {
        if self.pushers.get(key).is_some_and(Pusher::is_running) {
            return Err(PushError::AlreadyRunning(key.to_string()));
        }

        self.refresh(key).await?;

        let run_id = self.next_run;
        self.next_run += 1;

        let pusher = self
            .pushers
            .get_mut(key)
            .ok_or_else(|| PushError::NotRegistered(key.to_string()))?;
        pusher.launch(run_id, self.deps.clone(), self.weak_tx.clone());
        Ok(())
    }

    async fn stop(&mut self, key: &str) -> Result<(), PushError> {
        let pusher = self
            .pushers
            .get_mut(key)
            .ok_or_else(|| PushError::NotRegistered(key.to_string()))?;

        if !pusher.is_running() {
            return Err(PushError::AlreadyStopped(key.to_string()));
        }

        pusher.stop().await;
        Ok(())
    }

    async fn restart(&mut self, key: &str) -> Result<(), PushError> {
        self.stop(key).await?;
        info!("Pusher {} restarting", key);
        self.launch(key).await
    }

    async fn remove(&mut self, key: &str) -> Result<(), PushError> {
        let mut pusher = self
            .pushers
            .remove(key)
            .ok_or_else(|| PushError::NotRegistered(key.to_string()))?;

        pusher.stop().await;
        info!("Push subscription {} removed", key);
        Ok(())
    }

    async fn remove_project_all(&mut self, project_uuid: &str) -> usize {
        let keys: Vec<String> = self
            .pushers
            .iter()
            .filter(|(_, pusher)| pusher.project_uuid() == project_uuid)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            let _ = self.remove(key).await;
        }

        keys.len()
    }

    async fn start_all(&mut self) -> usize {
        let keys: Vec<String> = self.pushers.keys().cloned().collect();

        let mut launched = 0;
        for key in keys {
            match self.launch(&key).await {
                Ok(()) => launched += 1,
                Err(PushError::AlreadyRunning(_)) => {}
                Err(err) => warn!("Could not launch pusher {}: {}", key, err),
            }
        }

        launched
    }

    async fn stop_all(&mut self) -> usize {
        let stops = self.pushers.values_mut().map(|pusher| pusher.stop());
        let results = futures::future::join_all(stops).await;

        results.into_iter().filter(|stopped| *stopped).count()
    }

    async fn deregister(&mut self, key: &str, run_id: u64) {
        let current = self.pushers.get(key).and_then(Pusher::run_id);
        if current != Some(run_id) {
            return;
        }

        if let Some(mut pusher) = self.pushers.remove(key) {
            pusher.stop().await;
            info!("Pusher {} deregistered itself", key);
        }
    }
}

/// Cloneable handle to the manager task.
#[derive(Clone)]
pub struct ManagerHandle {
    tx: mpsc::Sender<ManagerCommand>,
}

impl ManagerHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> ManagerCommand,
    ) -> Result<T, PushError> {
        let (reply, rx) = oneshot::channel();

        self.tx
            .send(build(reply))
            .await
            .map_err(|_| PushError::ManagerGone)?;

        rx.await.map_err(|_| PushError::ManagerGone)?
    }

    pub async fn load_push_subs(&self) -> Result<usize, PushError> {
        self.request(|reply| ManagerCommand::LoadPushSubs { reply })
            .await
    }

    pub async fn add(&self, project_uuid: &str, sub: &str) -> Result<(), PushError> {
        self.request(|reply| ManagerCommand::Add {
            project_uuid: project_uuid.to_string(),
            sub: sub.to_string(),
            reply,
        })
        .await
    }

    pub async fn launch(&self, project_uuid: &str, sub: &str) -> Result<(), PushError> {
        self.request(|reply| ManagerCommand::Launch {
            project_uuid: project_uuid.to_string(),
            sub: sub.to_string(),
            reply,
        })
        .await
    }

    pub async fn stop(&self, project_uuid: &str, sub: &str) -> Result<(), PushError> {
        self.request(|reply| ManagerCommand::Stop {
            project_uuid: project_uuid.to_string(),
            sub: sub.to_string(),
            reply,
        })
        .await
    }

    pub async fn restart(&self, project_uuid: &str, sub: &str) -> Result<(), PushError> {
        self.request(|reply| ManagerCommand::Restart {
            project_uuid: project_uuid.to_string(),
            sub: sub.to_string(),
            reply,
        })
        .await
    }

    pub async fn remove(&self, project_uuid: &str, sub: &str) -> Result<(), PushError> {
        self.request(|reply| ManagerCommand::Remove {
            project_uuid: project_uuid.to_string(),
            sub: sub.to_string(),
            reply,
        })
        .await
    }

    pub async fn remove_project_all(&self, project_uuid: &str) -> Result<usize, PushError> {
        self.request(|reply| ManagerCommand::RemoveProjectAll {
            project_uuid: project_uuid.to_string(),
            reply,
        })
        .await
    }

    pub async fn start_all(&self) -> Result<usize, PushError> {
        self.request(|reply| ManagerCommand::StartAll { reply }).await
    }

    pub async fn stop_all(&self) -> Result<usize, PushError> {
        self.request(|reply| ManagerCommand::StopAll { reply }).await
    }

    pub async fn status(&self, project_uuid: &str, sub: &str) -> Result<PusherStatus, PushError> {
        self.request(|reply| ManagerCommand::Status {
            project_uuid: project_uuid.to_string(),
            sub: sub.to_string(),
            reply,
        })
        .await
    }

    pub async fn list(&self) -> Result<Vec<PusherStatus>, PushError> {
        self.request(|reply| ManagerCommand::List { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        broker::MemoryBroker,
        model::{
            DeliveryMode, PubsubMessageToPublish, PushConfig, RetryPolicy, RetryPolicyType,
            Subscription,
        },
        push::{MockSender, PusherState},
        store::MemoryStore,
    };

    struct Fixture {
        store: Arc<MemoryStore>,
        broker: Arc<MemoryBroker>,
        sender: Arc<MockSender>,
        handle: ManagerHandle,
    }

    fn push_sub(project_uuid: &str, name: &str) -> Subscription {
        let mut sub = Subscription::new(project_uuid, name, "topic1");
        sub.delivery = DeliveryMode::Push(PushConfig {
            endpoint: format!("https://www.example.com/{}", name),
            max_messages: 1,
            retry_policy: RetryPolicy {
                policy_type: RetryPolicyType::Linear,
                period: 20,
            },
            verified: true,
            ..Default::default()
        });
        sub
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let broker = Arc::new(MemoryBroker::new(Duration::from_millis(10)));
        let sender = Arc::new(MockSender::new(false));

        store.insert_project("argo_uuid", "ARGO").await;
        store.insert_sub(push_sub("argo_uuid", "sub1")).await.unwrap();
        broker.create_topic("argo_uuid.topic1").await;

        let handle = Manager::spawn(store.clone(), broker.clone(), sender.clone());

        Fixture {
            store,
            broker,
            sender,
            handle,
        }
    }

    async fn wait_for<F: Fn() -> bool>(check: F) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn launched_pusher_delivers_messages() {
        let fx = fixture().await;
        let payload = PubsubMessageToPublish::new("hello".to_string())
            .to_broker_payload()
            .unwrap();
        fx.broker.publish("argo_uuid.topic1", payload).await.unwrap();

        fx.handle.add("argo_uuid", "sub1").await.unwrap();
        fx.handle.launch("argo_uuid", "sub1").await.unwrap();

        assert!(wait_for(|| !fx.sender.sent().is_empty()).await);
        let sent = fx.sender.last().unwrap();
        assert_eq!(sent.endpoint, "https://www.example.com/sub1");
        assert!(sent.payload.contains("/projects/ARGO/subscriptions/sub1"));

        fx.handle.stop("argo_uuid", "sub1").await.unwrap();
        let sub = fx.store.query_sub("argo_uuid", "sub1").await.unwrap();
        assert_eq!(sub.offset, 1);
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let fx = fixture().await;

        assert_eq!(
            fx.handle.launch("argo_uuid", "sub1").await,
            Err(PushError::NotRegistered("argo_uuid/sub1".to_string()))
        );
        assert_eq!(
            fx.handle.add("argo_uuid", "missing").await,
            Err(PushError::SubscriptionNotFound("argo_uuid/missing".to_string()))
        );

        fx.handle.add("argo_uuid", "sub1").await.unwrap();
        let status = fx.handle.status("argo_uuid", "sub1").await.unwrap();
        assert_eq!(status.state, PusherState::Idle);
        assert_eq!(status.full_name, "/projects/ARGO/subscriptions/sub1");

        assert_eq!(
            fx.handle.stop("argo_uuid", "sub1").await,
            Err(PushError::AlreadyStopped("argo_uuid/sub1".to_string()))
        );

        fx.handle.launch("argo_uuid", "sub1").await.unwrap();
        assert_eq!(
            fx.handle.launch("argo_uuid", "sub1").await,
            Err(PushError::AlreadyRunning("argo_uuid/sub1".to_string()))
        );

        fx.handle.restart("argo_uuid", "sub1").await.unwrap();
        let status = fx.handle.status("argo_uuid", "sub1").await.unwrap();
        assert_eq!(status.state, PusherState::Running);

        fx.handle.stop("argo_uuid", "sub1").await.unwrap();
        let status = fx.handle.status("argo_uuid", "sub1").await.unwrap();
        assert_eq!(status.state, PusherState::Idle);

        fx.handle.remove("argo_uuid", "sub1").await.unwrap();
        assert!(fx.handle.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn restart_picks_up_new_endpoint() {
        let fx = fixture().await;
        fx.handle.add("argo_uuid", "sub1").await.unwrap();
        fx.handle.launch("argo_uuid", "sub1").await.unwrap();

        let mut sub = push_sub("argo_uuid", "sub1");
        if let DeliveryMode::Push(cfg) = &mut sub.delivery {
            cfg.endpoint = "https://new.example.com".to_string();
        }
        fx.store
            .mod_sub_push("argo_uuid", "sub1", sub.delivery)
            .await
            .unwrap();

        fx.handle.restart("argo_uuid", "sub1").await.unwrap();

        let status = fx.handle.status("argo_uuid", "sub1").await.unwrap();
        assert_eq!(status.endpoint, "https://new.example.com");
    }

    #[tokio::test]
    async fn pusher_of_deleted_subscription_deregisters_itself() {
        let fx = fixture().await;
        fx.handle.add("argo_uuid", "sub1").await.unwrap();
        fx.handle.launch("argo_uuid", "sub1").await.unwrap();

        fx.store.remove_sub("argo_uuid", "sub1").await.unwrap();

        let mut gone = false;
        for _ in 0..100 {
            if fx.handle.list().await.unwrap().is_empty() {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(gone);
    }

    #[tokio::test]
    async fn load_start_and_remove_project() {
        let fx = fixture().await;
        fx.store.insert_sub(push_sub("argo_uuid", "sub2")).await.unwrap();
        fx.store.insert_sub(push_sub("other_uuid", "sub3")).await.unwrap();

        let mut unverified = push_sub("argo_uuid", "sub4");
        if let DeliveryMode::Push(cfg) = &mut unverified.delivery {
            cfg.verified = false;
        }
        fx.store.insert_sub(unverified).await.unwrap();
        fx.store
            .insert_sub(Subscription::new("argo_uuid", "pull", "topic1"))
            .await
            .unwrap();

        assert_eq!(fx.handle.load_push_subs().await, Ok(3));
        assert_eq!(fx.handle.start_all().await, Ok(3));

        assert_eq!(fx.handle.remove_project_all("argo_uuid").await, Ok(2));
        let remaining = fx.handle.list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key, "other_uuid/sub3");

        assert_eq!(fx.handle.stop_all().await, Ok(1));
    }
}
