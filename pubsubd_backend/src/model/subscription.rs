use chrono::{DateTime, Utc};

use super::{PushConfig, PushConfigRequest, SubscriptionName, TopicName};

pub const DEFAULT_ACK_DEADLINE: u32 = 10;
pub const MAX_ACK_DEADLINE: i64 = 600;

/// How messages leave a subscription.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DeliveryMode {
    #[default]
    Pull,
    Push(PushConfig),
}

impl DeliveryMode {
    pub fn push_config(&self) -> Option<&PushConfig> {
        match self {
            Self::Pull => None,
            Self::Push(cfg) => Some(cfg),
        }
    }

    pub fn is_push(&self) -> bool {
        matches!(self, Self::Push(_))
    }
}

/// Window of messages handed out by the latest pull and not yet acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAck {
    pub from: i64,
    pub next: i64,
    pub pulled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub project_uuid: String,
    pub name: SubscriptionName,
    pub topic: TopicName,
    /// Committed read cursor into the topic's log.
    pub offset: i64,
    /// Ack deadline in seconds.
    pub ack_deadline: u32,
    pub delivery: DeliveryMode,
    pub pending_ack: Option<PendingAck>,
    pub created_on: DateTime<Utc>,
    pub latest_consume: Option<DateTime<Utc>>,
    pub consume_rate: f64,
    pub msg_num: i64,
    pub total_bytes: i64,
}

impl Subscription {
    pub fn new(project_uuid: &str, name: &str, topic: &str) -> Self {
        Self {
            project_uuid: project_uuid.to_string(),
            name: SubscriptionName(name.to_string()),
            topic: TopicName(topic.to_string()),
            offset: 0,
            ack_deadline: DEFAULT_ACK_DEADLINE,
            delivery: DeliveryMode::Pull,
            pending_ack: None,
            created_on: Utc::now(),
            latest_consume: None,
            consume_rate: 0.0,
            msg_num: 0,
            total_bytes: 0,
        }
    }

    pub fn full_name(&self, project_name: &str) -> String {
        format!("/projects/{}/subscriptions/{}", project_name, self.name)
    }

    pub fn full_topic(&self, project_name: &str) -> String {
        format!("/projects/{}/topics/{}", project_name, self.topic)
    }

    /// Name of the subscription's topic inside the broker.
    pub fn broker_topic(&self) -> String {
        format!("{}.{}", self.project_uuid, self.topic)
    }

    pub fn push_config(&self) -> Option<&PushConfig> {
        self.delivery.push_config()
    }

    pub fn view(&self, project_name: &str) -> SubscriptionView {
        SubscriptionView {
            name: self.full_name(project_name),
            topic: self.full_topic(project_name),
            push_config: self.push_config().cloned(),
            ack_deadline_seconds: self.ack_deadline,
            push_status: String::new(),
            created_on: self.created_on.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

/// Wire representation of a subscription.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub name: String,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_config: Option<PushConfig>,
    pub ack_deadline_seconds: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub push_status: String,
    pub created_on: String,
}

/// Body of create and modifyPushConfig requests.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriptionRequest {
    pub topic: String,
    pub ack_deadline_seconds: i64,
    pub push_config: Option<PushConfigRequest>,
}

impl SubscriptionRequest {
    /// The requested push configuration, `None` when the request asks for pull delivery.
    pub fn push_config(&self) -> Option<&PushConfigRequest> {
        self.push_config.as_ref().filter(|cfg| !cfg.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PullOptions {
    pub max_messages: String,
    pub return_immediately: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckIds {
    #[serde(default)]
    pub ack_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AckDeadline {
    pub ack_deadline_seconds: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_derived_from_project() {
        let sub = Subscription::new("argo_uuid", "sub1", "topic1");

        assert_eq!(sub.full_name("ARGO"), "/projects/ARGO/subscriptions/sub1");
        assert_eq!(sub.full_topic("ARGO"), "/projects/ARGO/topics/topic1");
        assert_eq!(sub.broker_topic(), "argo_uuid.topic1");
        assert_eq!(sub.ack_deadline, DEFAULT_ACK_DEADLINE);
        assert!(!sub.delivery.is_push());
    }

    #[test]
    fn pull_view_omits_push_config() {
        let sub = Subscription::new("argo_uuid", "sub1", "topic1");
        let json = serde_json::to_value(sub.view("ARGO")).unwrap();

        assert!(json.get("pushConfig").is_none());
        assert_eq!(json["ackDeadlineSeconds"], 10);
    }

    #[test]
    fn empty_push_config_request_means_pull() {
        let req: SubscriptionRequest =
            serde_json::from_str(r#"{"topic":"projects/ARGO/topics/topic1","pushConfig":{}}"#)
                .unwrap();
        assert!(req.push_config().is_none());

        let req: SubscriptionRequest = serde_json::from_str(
            r#"{"pushConfig":{"type":"http_endpoint","pushEndpoint":"https://www.example.com"}}"#,
        )
        .unwrap();
        assert_eq!(
            req.push_config().map(|cfg| cfg.endpoint.as_str()),
            Some("https://www.example.com")
        );
    }
}
