use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};

use super::{Broker, BrokerResult};
use crate::error::BrokerError;

const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

#[derive(Debug, Default)]
struct TopicLog {
    /// Offset of the first retained entry.
    base: i64,
    entries: Vec<(DateTime<Utc>, String)>,
}

impl TopicLog {
    fn max(&self) -> i64 {
        self.base + self.entries.len() as i64
    }

    fn read(&self, offset: i64, max: i64) -> Vec<String> {
        let start = (offset - self.base).max(0) as usize;
        self.entries
            .iter()
            .skip(start)
            .take(max.max(1) as usize)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

/// Broker keeping topic logs in memory.
pub struct MemoryBroker {
    topics: Mutex<HashMap<String, TopicLog>>,
    published: Notify,
    consume_wait: Duration,
    max_message_size: usize,
}

impl MemoryBroker {
    pub fn new(consume_wait: Duration) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            published: Notify::new(),
            consume_wait,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub async fn create_topic(&self, topic: &str) {
        let mut topics = self.topics.lock().await;
        topics.entry(topic.to_string()).or_default();
    }

    /// Appends a message with an explicit publish time.
    pub async fn publish_at(
        &self,
        topic: &str,
        payload: String,
        at: DateTime<Utc>,
    ) -> BrokerResult<i64> {
        if payload.len() > self.max_message_size {
            return Err(BrokerError::MessageTooLarge);
        }

        let offset = {
            let mut topics = self.topics.lock().await;
            let log = topics.entry(topic.to_string()).or_default();
            log.entries.push((at, payload));
            log.max() - 1
        };

        self.published.notify_waiters();
        Ok(offset)
    }

    /// Drops every entry below `upto`, as retention would.
    pub async fn evict(&self, topic: &str, upto: i64) -> BrokerResult<()> {
        let mut topics = self.topics.lock().await;
        let log = topics
            .get_mut(topic)
            .ok_or_else(|| BrokerError::TopicNotFound(topic.to_string()))?;

        let upto = upto.min(log.max());
        if upto > log.base {
            log.entries.drain(..(upto - log.base) as usize);
            log.base = upto;
        }
        Ok(())
    }

    async fn read(&self, topic: &str, offset: i64, max: i64) -> BrokerResult<Vec<String>> {
        let topics = self.topics.lock().await;
        let log = topics
            .get(topic)
            .ok_or_else(|| BrokerError::TopicNotFound(topic.to_string()))?;

        if offset < log.base {
            return Err(BrokerError::OffsetOff);
        }

        Ok(log.read(offset, max))
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn consume(
        &self,
        topic: &str,
        offset: i64,
        return_immediately: bool,
        max: i64,
    ) -> BrokerResult<Vec<String>> {
        let notified = self.published.notified();

        let messages = self.read(topic, offset, max).await?;
        if !messages.is_empty() || return_immediately {
            return Ok(messages);
        }

        if tokio::time::timeout(self.consume_wait, notified).await.is_err() {
            return Ok(vec![]);
        }

        self.read(topic, offset, max).await
    }

    async fn publish(&self, topic: &str, payload: String) -> BrokerResult<i64> {
        self.publish_at(topic, payload, Utc::now()).await
    }

    async fn min_offset(&self, topic: &str) -> BrokerResult<i64> {
        let topics = self.topics.lock().await;
        topics
            .get(topic)
            .map(|log| log.base)
            .ok_or_else(|| BrokerError::TopicNotFound(topic.to_string()))
    }

    async fn max_offset(&self, topic: &str) -> BrokerResult<i64> {
        let topics = self.topics.lock().await;
        topics
            .get(topic)
            .map(TopicLog::max)
            .ok_or_else(|| BrokerError::TopicNotFound(topic.to_string()))
    }

    async fn time_to_offset(&self, topic: &str, time: DateTime<Utc>) -> BrokerResult<i64> {
        let topics = self.topics.lock().await;
        let log = topics
            .get(topic)
            .ok_or_else(|| BrokerError::TopicNotFound(topic.to_string()))?;

        Ok(log
            .entries
            .iter()
            .position(|(published, _)| *published >= time)
            .map(|idx| log.base + idx as i64)
            .unwrap_or(-1))
    }

    async fn delete_topic(&self, topic: &str) -> BrokerResult<()> {
        let mut topics = self.topics.lock().await;
        topics
            .remove(topic)
            .map(|_| ())
            .ok_or_else(|| BrokerError::TopicNotFound(topic.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration as ChronoDuration;

    use super::*;

    fn broker() -> MemoryBroker {
        MemoryBroker::new(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn consume_reads_from_offset() {
        let broker = broker();
        for payload in ["a", "b", "c"] {
            broker.publish("t", payload.to_string()).await.unwrap();
        }

        let messages = broker.consume("t", 1, true, 5).await.unwrap();

        assert_eq!(messages, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(broker.min_offset("t").await.unwrap(), 0);
        assert_eq!(broker.max_offset("t").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn evicted_offsets_are_off() {
        let broker = broker();
        for payload in ["a", "b", "c"] {
            broker.publish("t", payload.to_string()).await.unwrap();
        }

        broker.evict("t", 2).await.unwrap();

        assert_eq!(
            broker.consume("t", 0, true, 1).await,
            Err(BrokerError::OffsetOff)
        );
        assert_eq!(broker.min_offset("t").await.unwrap(), 2);
        assert_eq!(broker.consume("t", 2, true, 1).await.unwrap(), vec!["c"]);
    }

    #[tokio::test]
    async fn waiting_consume_wakes_on_publish() {
        let broker = Arc::new(MemoryBroker::new(Duration::from_secs(5)));
        broker.create_topic("t").await;

        let consumer = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.consume("t", 0, false, 1).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        broker.publish("t", "late".to_string()).await.unwrap();

        let messages = consumer.await.unwrap().unwrap();
        assert_eq!(messages, vec!["late".to_string()]);
    }

    #[tokio::test]
    async fn waiting_consume_gives_up_after_wait() {
        let broker = broker();
        broker.create_topic("t").await;

        let messages = broker.consume("t", 0, false, 1).await.unwrap();

        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn time_to_offset_finds_first_later_message() {
        let broker = broker();
        let start = Utc::now() - ChronoDuration::minutes(10);
        for idx in 0..3 {
            broker
                .publish_at("t", idx.to_string(), start + ChronoDuration::minutes(idx))
                .await
                .unwrap();
        }

        let offset = broker
            .time_to_offset("t", start + ChronoDuration::seconds(30))
            .await
            .unwrap();
        assert_eq!(offset, 1);

        let offset = broker.time_to_offset("t", Utc::now()).await.unwrap();
        assert_eq!(offset, -1);
    }

    #[tokio::test]
    async fn oversized_messages_are_rejected() {
        let broker = broker().with_max_message_size(4);

        assert_eq!(
            broker.publish("t", "too large".to_string()).await,
            Err(BrokerError::MessageTooLarge)
        );
    }
}
