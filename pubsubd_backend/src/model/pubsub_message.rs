use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A message as stored on a topic's log and handed out to subscribers.
///
/// `data` is the base64 encoded payload exactly as it was published.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PubsubMessage {
    #[serde(rename = "messageId", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<DateTime<Utc>>,
}

impl PubsubMessage {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Payload size in bytes, as accounted by the consume metrics.
    pub fn size(&self) -> i64 {
        self.data.len() as i64
    }

    /// Returns the payload decoded from base64, falling back to the raw data
    /// when it isn't valid base64 or valid utf-8.
    pub fn decoded_data(&self) -> String {
        STANDARD
            .decode(self.data.as_bytes())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_else(|| self.data.clone())
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedMessage {
    pub ack_id: String,
    pub message: PubsubMessage,
}

/// Response body of a pull request.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedMessages {
    pub received_messages: Vec<ReceivedMessage>,
}

impl ReceivedMessages {
    pub fn len(&self) -> usize {
        self.received_messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.received_messages.is_empty()
    }

    pub fn total_size(&self) -> i64 {
        self.received_messages
            .iter()
            .map(|received| received.message.size())
            .sum()
    }
}

/// Envelope delivered to http push endpoints.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PushMessage {
    pub message: PubsubMessage,
    pub subscription: String,
}

/// Body posted to a mattermost incoming webhook.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct MattermostMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_payload_parses_into_message() {
        let raw = r#"{
            "messageId": "0",
            "attributes": {"foo": "bar"},
            "data": "YmFzZTY0ZW5jb2RlZA==",
            "publishTime": "2016-02-24T11:55:09.786127994Z"
        }"#;

        let message = PubsubMessage::from_json(raw).unwrap();

        assert_eq!(message.id, "0");
        assert_eq!(message.attributes.get("foo").map(String::as_str), Some("bar"));
        assert_eq!(message.decoded_data(), "base64encoded");
        assert_eq!(message.size(), 20);
        assert!(message.publish_time.is_some());
    }

    #[test]
    fn invalid_base64_falls_back_to_raw_data() {
        let message = PubsubMessage {
            data: "not base64!".to_string(),
            ..Default::default()
        };

        assert_eq!(message.decoded_data(), "not base64!");
    }

    #[test]
    fn empty_pull_response_serializes_empty_list() {
        let json = serde_json::to_string(&ReceivedMessages::default()).unwrap();
        assert_eq!(json, r#"{"receivedMessages":[]}"#);
    }
}
