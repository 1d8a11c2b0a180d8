//! In-process push delivery: a supervisor task owning one delivery loop per
//! active push subscription.

use thiserror::Error;

use crate::error::StoreError;

mod backend;
mod manager;
pub mod message;
mod pusher;
mod sender;

pub use backend::{LocalPushBackend, PushBackend, PushStatus};
pub use manager::{Manager, ManagerHandle};
pub use pusher::{PusherState, PusherStatus};
pub use sender::{compose_payload, HttpSender, MockSender, SendError, Sender, SentMessage};

/// Key of a pusher in the manager's registry.
pub fn pusher_key(project_uuid: &str, sub: &str) -> String {
    format!("{}/{}", project_uuid, sub)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    #[error("subscription {0} not found")]
    SubscriptionNotFound(String),
    #[error("subscription {0} is not push enabled")]
    NotPushEnabled(String),
    #[error("pusher {0} is not registered")]
    NotRegistered(String),
    #[error("pusher {0} is already running")]
    AlreadyRunning(String),
    #[error("pusher {0} is already stopped")]
    AlreadyStopped(String),
    #[error("push manager is not running")]
    ManagerGone,
    #[error(transparent)]
    Store(#[from] StoreError),
}
