mod offsets;
mod pubsub_message;
mod pubsub_message_to_publish;
mod push_config;
mod subscription;
mod user;

pub use offsets::{Offsets, SetOffset, TopicOffset};
pub use pubsub_message::{
    MattermostMessage, PubsubMessage, PushMessage, ReceivedMessage, ReceivedMessages,
};
pub use pubsub_message_to_publish::PubsubMessageToPublish;
pub use push_config::{
    AuthorizationHeader, AuthorizationHeaderRequest, AuthorizationType, PushConfig,
    PushConfigRequest, PushType, RetryPolicy, RetryPolicyRequest, RetryPolicyType,
    DEFAULT_RETRY_PERIOD_MILLIS,
};
pub use subscription::{
    AckDeadline, AckIds, DeliveryMode, PendingAck, PullOptions, Subscription,
    SubscriptionRequest, SubscriptionView, DEFAULT_ACK_DEADLINE, MAX_ACK_DEADLINE,
};
pub use user::{Role, User};

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, serde::Deserialize, serde::Serialize)]
pub struct TopicName(pub String);

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, serde::Deserialize, serde::Serialize)]
pub struct SubscriptionName(pub String);

impl std::fmt::Display for TopicName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for SubscriptionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
