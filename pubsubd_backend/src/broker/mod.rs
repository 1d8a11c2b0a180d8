use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BrokerError;

mod memory;

pub use memory::MemoryBroker;

pub type BrokerResult<T> = Result<T, BrokerError>;

/// An ordered, offset addressed log per topic.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Reads up to `max` raw messages starting at `offset`.
    ///
    /// Fails with [`BrokerError::OffsetOff`] when `offset` has already been
    /// evicted. Unless `return_immediately` is set an empty read waits a bounded
    /// time for new messages.
    async fn consume(
        &self,
        topic: &str,
        offset: i64,
        return_immediately: bool,
        max: i64,
    ) -> BrokerResult<Vec<String>>;

    /// Appends a raw message and returns its offset.
    async fn publish(&self, topic: &str, payload: String) -> BrokerResult<i64>;

    async fn min_offset(&self, topic: &str) -> BrokerResult<i64>;

    /// The offset the next published message will get.
    async fn max_offset(&self, topic: &str) -> BrokerResult<i64>;

    /// Offset of the first message published at or after `time`, `-1` when there is none.
    async fn time_to_offset(&self, topic: &str, time: DateTime<Utc>) -> BrokerResult<i64>;

    async fn delete_topic(&self, topic: &str) -> BrokerResult<()>;
}
