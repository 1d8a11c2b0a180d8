pub const DEFAULT_RETRY_PERIOD_MILLIS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushType {
    #[default]
    HttpEndpoint,
    Mattermost,
}

impl PushType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "http_endpoint" => Some(Self::HttpEndpoint),
            "mattermost" => Some(Self::Mattermost),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicyType {
    #[default]
    Linear,
    Slowstart,
}

impl RetryPolicyType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "linear" => Some(Self::Linear),
            "slowstart" => Some(Self::Slowstart),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationType {
    #[default]
    Autogen,
    Disabled,
}

impl AuthorizationType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "autogen" => Some(Self::Autogen),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
pub struct RetryPolicy {
    #[serde(rename = "type")]
    pub policy_type: RetryPolicyType,
    /// Milliseconds between delivery attempts.
    pub period: u64,
}

/// Value is non-empty iff the type is `autogen`.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
pub struct AuthorizationHeader {
    #[serde(rename = "type")]
    pub auth_type: AuthorizationType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
}

/// Validated push configuration of a push enabled subscription.
#[derive(Debug, Clone, PartialEq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushConfig {
    #[serde(rename = "type")]
    pub push_type: PushType,
    #[serde(rename = "pushEndpoint", default)]
    pub endpoint: String,
    pub max_messages: i64,
    pub authorization_header: AuthorizationHeader,
    pub retry_policy: RetryPolicy,
    #[serde(default)]
    pub verification_hash: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub mattermost_url: String,
    #[serde(default)]
    pub mattermost_username: String,
    #[serde(default)]
    pub mattermost_channel: String,
    /// Push the decoded message payload instead of its base64 form.
    #[serde(default)]
    pub base64_decode: bool,
}

impl PushConfig {
    /// The url pushed messages are posted to.
    pub fn target(&self) -> &str {
        match self.push_type {
            PushType::HttpEndpoint => &self.endpoint,
            PushType::Mattermost => &self.mattermost_url,
        }
    }

    /// The `Authorization` header value sent along with pushed messages.
    pub fn authorization(&self) -> Option<&str> {
        match self.authorization_header.auth_type {
            AuthorizationType::Autogen if !self.authorization_header.value.is_empty() => {
                Some(&self.authorization_header.value)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
pub struct RetryPolicyRequest {
    #[serde(rename = "type", default)]
    pub policy_type: String,
    #[serde(default)]
    pub period: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
pub struct AuthorizationHeaderRequest {
    #[serde(rename = "type", default)]
    pub auth_type: String,
}

/// Push configuration as submitted by a client, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PushConfigRequest {
    #[serde(rename = "type")]
    pub push_type: String,
    #[serde(rename = "pushEndpoint")]
    pub endpoint: String,
    pub max_messages: i64,
    pub authorization_header: AuthorizationHeaderRequest,
    pub retry_policy: RetryPolicyRequest,
    pub mattermost_url: String,
    pub mattermost_username: String,
    pub mattermost_channel: String,
    pub base64_decode: bool,
}

impl PushConfigRequest {
    /// An all-default request asks for a pull subscription.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
