#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeZone, Utc};
use pubsubd_backend::{
    broker::MemoryBroker,
    config::Config,
    model::{PubsubMessageToPublish, Role, Subscription, User},
    push::{LocalPushBackend, Manager, ManagerHandle, MockSender},
    store::{MemoryStore, Store},
    verification::MockVerifier,
    Backend, RequestContext,
};

pub const PROJECT_UUID: &str = "argo_uuid";
pub const PROJECT: &str = "ARGO";
pub const TOPIC: &str = "topic1";
pub const SUB: &str = "sub1";
pub const BROKER_TOPIC: &str = "argo_uuid.topic1";
pub const PUSH_WORKER_UUID: &str = "uuid_pw";
pub const PUSH_WORKER_TOKEN: &str = "push_token";
pub const CONSUMER_UUID: &str = "uuid_consumer";

pub struct TestBed {
    pub backend: Backend,
    pub store: Arc<MemoryStore>,
    pub broker: Arc<MemoryBroker>,
    pub verifier: Arc<MockVerifier>,
    pub sender: Arc<MockSender>,
    pub manager: ManagerHandle,
}

/// Publish time of the message at `offset` in the seeded topic.
pub fn published_at(offset: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, offset as u32, 0, 0)
        .single()
        .unwrap()
}

/// A project with one topic holding three messages published an hour apart,
/// a pull subscription on it, a push worker and a consumer.
pub async fn test_bed(push_enabled: bool) -> TestBed {
    let store = Arc::new(MemoryStore::new());
    store.insert_project(PROJECT_UUID, PROJECT).await;
    store.insert_topic(PROJECT_UUID, TOPIC).await;
    store
        .insert_user(User {
            uuid: PUSH_WORKER_UUID.to_string(),
            name: "push_worker".to_string(),
            token: PUSH_WORKER_TOKEN.to_string(),
            projects: vec![],
            service_roles: vec![Role::PushWorker],
        })
        .await;
    store
        .insert_user(User {
            uuid: CONSUMER_UUID.to_string(),
            name: "consumer".to_string(),
            token: "consumer_token".to_string(),
            projects: vec![PROJECT_UUID.to_string()],
            service_roles: vec![],
        })
        .await;
    store
        .insert_sub(Subscription::new(PROJECT_UUID, SUB, TOPIC))
        .await
        .unwrap();

    let broker = Arc::new(MemoryBroker::new(Duration::from_millis(10)));
    broker.create_topic(BROKER_TOPIC).await;
    for (offset, data) in ["hello", "world", "again"].into_iter().enumerate() {
        let payload = PubsubMessageToPublish::new(data.to_string())
            .to_broker_payload()
            .unwrap();
        broker
            .publish_at(BROKER_TOPIC, payload, published_at(offset as i64))
            .await
            .unwrap();
    }

    let sender = Arc::new(MockSender::new(false));
    let verifier = Arc::new(MockVerifier::new(200, ""));
    let manager = Manager::spawn(store.clone(), broker.clone(), sender.clone());

    let config = Config {
        push_enabled,
        push_worker_token: PUSH_WORKER_TOKEN.to_string(),
        consume_wait_millis: 10,
        ..Config::default()
    };

    let backend = Backend::new(
        store.clone(),
        broker.clone(),
        Arc::new(LocalPushBackend::new(manager.clone())),
        verifier.clone(),
        config,
    );

    TestBed {
        backend,
        store,
        broker,
        verifier,
        sender,
        manager,
    }
}

pub fn admin() -> RequestContext {
    RequestContext::new(PROJECT_UUID, PROJECT, "uuid_admin", vec![Role::ProjectAdmin])
}

pub fn consumer() -> RequestContext {
    RequestContext::new(PROJECT_UUID, PROJECT, CONSUMER_UUID, vec![Role::Consumer])
}

pub async fn wait_for<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
