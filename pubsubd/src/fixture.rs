use std::{collections::BTreeMap, path::Path};

use pubsubd_backend::{
    broker::{Broker, MemoryBroker},
    error::{BrokerError, StoreError},
    model::{DeliveryMode, PubsubMessageToPublish, PushConfig, Subscription, User},
    store::{MemoryStore, Store},
};

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("could not read fixture: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse fixture: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub projects: Vec<ProjectFixture>,
    pub users: Vec<User>,
    pub topics: Vec<TopicFixture>,
    pub subscriptions: Vec<SubscriptionFixture>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProjectFixture {
    pub uuid: String,
    pub name: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TopicFixture {
    pub project_uuid: String,
    pub name: String,
    #[serde(default)]
    pub messages: Vec<MessageFixture>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MessageFixture {
    pub data: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SubscriptionFixture {
    pub project_uuid: String,
    pub name: String,
    pub topic: String,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub ack_deadline_seconds: Option<u32>,
    #[serde(default)]
    pub push_config: Option<PushConfig>,
    /// Users, besides the push worker, allowed to consume the subscription.
    #[serde(default)]
    pub acl: Vec<String>,
}

impl Fixture {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Loads the fixture into the store and the broker, publishing the
    /// messages of each topic in order.
    pub async fn seed(&self, store: &MemoryStore, broker: &MemoryBroker) -> Result<(), FixtureError> {
        for project in &self.projects {
            store.insert_project(&project.uuid, &project.name).await;
        }

        for user in &self.users {
            store.insert_user(user.clone()).await;
        }

        for topic in &self.topics {
            store.insert_topic(&topic.project_uuid, &topic.name).await;

            let broker_topic = format!("{}.{}", topic.project_uuid, topic.name);
            broker.create_topic(&broker_topic).await;

            for message in &topic.messages {
                let message = message
                    .attributes
                    .iter()
                    .fold(PubsubMessageToPublish::new(message.data.clone()), |msg, (k, v)| {
                        msg.with_attribute(k, v)
                    });
                broker
                    .publish(&broker_topic, message.to_broker_payload()?)
                    .await?;
            }
        }

        for fixture in &self.subscriptions {
            let mut sub = Subscription::new(&fixture.project_uuid, &fixture.name, &fixture.topic);
            sub.offset = fixture.offset;
            if let Some(ack) = fixture.ack_deadline_seconds {
                sub.ack_deadline = ack;
            }
            if let Some(cfg) = &fixture.push_config {
                sub.delivery = DeliveryMode::Push(cfg.clone());
            }

            store.insert_sub(sub).await?;

            for user in &fixture.acl {
                store
                    .append_to_acl(&fixture.project_uuid, &fixture.name, user)
                    .await?;
            }
        }

        Ok(())
    }
}
