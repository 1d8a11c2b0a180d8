use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::StoreError,
    model::{DeliveryMode, Subscription, User},
};

mod memory;

pub use memory::MemoryStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence of subscriptions and their acls.
///
/// Every update targets a single subscription and is applied atomically.
#[async_trait]
pub trait Store: Send + Sync {
    async fn query_project_name(&self, project_uuid: &str) -> StoreResult<String>;

    async fn has_topic(&self, project_uuid: &str, topic: &str) -> StoreResult<bool>;

    async fn query_sub(&self, project_uuid: &str, name: &str) -> StoreResult<Subscription>;

    /// All subscriptions whose delivery mode is push.
    async fn query_push_subs(&self) -> StoreResult<Vec<Subscription>>;

    async fn insert_sub(&self, sub: Subscription) -> StoreResult<()>;

    async fn remove_sub(&self, project_uuid: &str, name: &str) -> StoreResult<()>;

    async fn mod_ack(&self, project_uuid: &str, name: &str, ack: u32) -> StoreResult<()>;

    async fn mod_sub_push(
        &self,
        project_uuid: &str,
        name: &str,
        delivery: DeliveryMode,
    ) -> StoreResult<()>;

    /// Moves the cursor unconditionally, dropping any pending ack window.
    async fn update_sub_offset(&self, project_uuid: &str, name: &str, offset: i64)
        -> StoreResult<()>;

    /// Records a pull that handed out every message up to `next_offset`.
    ///
    /// A subscription holds at most one pending ack window, so concurrent
    /// pulls of the same subscription overwrite each other's window.
    async fn update_sub_pull(
        &self,
        project_uuid: &str,
        name: &str,
        next_offset: i64,
        pulled_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Commits an acknowledgment by setting the cursor to `offset`, enforcing
    /// the pending window and the ack deadline.
    async fn update_sub_offset_ack(
        &self,
        project_uuid: &str,
        name: &str,
        offset: i64,
        acked_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn increment_sub_msg_num(&self, project_uuid: &str, name: &str, num: i64)
        -> StoreResult<()>;

    async fn increment_sub_bytes(&self, project_uuid: &str, name: &str, bytes: i64)
        -> StoreResult<()>;

    async fn update_sub_latest_consume(
        &self,
        project_uuid: &str,
        name: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn update_sub_consume_rate(&self, project_uuid: &str, name: &str, rate: f64)
        -> StoreResult<()>;

    /// User uuids allowed to access the subscription.
    async fn query_acl(&self, project_uuid: &str, name: &str) -> StoreResult<Vec<String>>;

    async fn append_to_acl(&self, project_uuid: &str, name: &str, user_uuid: &str)
        -> StoreResult<()>;

    async fn remove_from_acl(&self, project_uuid: &str, name: &str, user_uuid: &str)
        -> StoreResult<()>;

    async fn query_user_by_token(&self, token: &str) -> StoreResult<User>;

    async fn append_to_user_projects(&self, user_uuid: &str, project_uuid: &str)
        -> StoreResult<()>;
}
