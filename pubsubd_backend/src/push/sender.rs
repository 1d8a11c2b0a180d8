use std::{sync::Mutex, time::Duration};

use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use thiserror::Error;

use crate::model::{MattermostMessage, PubsubMessage, PushConfig, PushMessage, PushType};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("endpoint not reachable: {0}")]
    Unreachable(String),
    #[error("Endpoint Responded: not delivered ({0})")]
    NotDelivered(u16),
}

/// Delivers a rendered payload to a remote endpoint.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(
        &self,
        payload: String,
        endpoint: &str,
        authorization: Option<&str>,
    ) -> Result<(), SendError>;
}

/// Renders the body posted for `message` according to the push type.
///
/// With `base64_decode` set the message data is pushed decoded.
pub fn compose_payload(
    cfg: &PushConfig,
    mut message: PubsubMessage,
    full_name: &str,
) -> serde_json::Result<String> {
    if cfg.base64_decode {
        message.data = message.decoded_data();
    }

    match cfg.push_type {
        PushType::HttpEndpoint => serde_json::to_string(&PushMessage {
            message,
            subscription: full_name.to_string(),
        }),
        PushType::Mattermost => serde_json::to_string(&MattermostMessage {
            text: message.data,
            username: cfg.mattermost_username.clone(),
            channel: cfg.mattermost_channel.clone(),
        }),
    }
}

pub struct HttpSender {
    client: reqwest::Client,
}

impl HttpSender {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

fn is_delivered(status: u16) -> bool {
    matches!(status, 200 | 201 | 204 | 101)
}

#[async_trait]
impl Sender for HttpSender {
    async fn send(
        &self,
        payload: String,
        endpoint: &str,
        authorization: Option<&str>,
    ) -> Result<(), SendError> {
        debug!("Sending to endpoint {}: {}", endpoint, payload);

        let mut req = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(payload);

        if let Some(authorization) = authorization {
            req = req.header(AUTHORIZATION, authorization);
        }

        let resp = req
            .send()
            .await
            .map_err(|err| SendError::Unreachable(err.to_string()))?;

        let status = resp.status().as_u16();
        if !is_delivered(status) {
            return Err(SendError::NotDelivered(status));
        }

        info!("Message delivered to {}", endpoint);
        Ok(())
    }
}

/// A message captured by [`MockSender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub payload: String,
    pub endpoint: String,
    pub authorization: Option<String>,
}

/// Sender recording deliveries instead of performing them.
#[derive(Default)]
pub struct MockSender {
    fail: Mutex<bool>,
    sent: Mutex<Vec<SentMessage>>,
}

impl MockSender {
    pub fn new(fail: bool) -> Self {
        Self {
            fail: Mutex::new(fail),
            sent: Mutex::new(vec![]),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        if let Ok(mut current) = self.fail.lock() {
            *current = fail;
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<SentMessage> {
        self.sent().pop()
    }
}

#[async_trait]
impl Sender for MockSender {
    async fn send(
        &self,
        payload: String,
        endpoint: &str,
        authorization: Option<&str>,
    ) -> Result<(), SendError> {
        let fail = self.fail.lock().map(|fail| *fail).unwrap_or(true);
        if fail {
            return Err(SendError::Unreachable(endpoint.to_string()));
        }

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentMessage {
                payload,
                endpoint: endpoint.to_string(),
                authorization: authorization.map(str::to_string),
            });
        }
        Ok(())
    }
}
