use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;

use super::PubsubMessage;

#[derive(Debug)]
pub struct PubsubMessageToPublish {
    data: String,
    attributes: BTreeMap<String, String>,
}

impl PubsubMessageToPublish {
    pub fn new(data: String) -> Self {
        Self {
            data,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Renders the raw log entry a broker stores for this message.
    pub fn to_broker_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(&PubsubMessage::from(self))
    }
}

impl From<&PubsubMessageToPublish> for PubsubMessage {
    fn from(val: &PubsubMessageToPublish) -> Self {
        Self {
            id: String::new(),
            attributes: val.attributes.clone(),
            data: STANDARD.encode(val.data.as_bytes()),
            publish_time: Some(Utc::now()),
        }
    }
}
