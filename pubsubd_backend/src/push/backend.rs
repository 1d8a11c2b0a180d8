use async_trait::async_trait;

use super::{ManagerHandle, PushError, PusherState};
use crate::model::Subscription;

/// Outcome of a push backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushStatus {
    Ok(String),
    Unavailable(String),
    Failed(String),
}

impl PushStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Human readable rendering; `details` exposes the cause of unavailability.
    pub fn result(&self, details: bool) -> String {
        match self {
            Self::Ok(message) => message.clone(),
            Self::Unavailable(message) if details => message.clone(),
            Self::Unavailable(_) => "Push server is currently unavailable".to_string(),
            Self::Failed(message) => format!("Error: {}", message),
        }
    }
}

impl From<PushError> for PushStatus {
    fn from(err: PushError) -> Self {
        match err {
            PushError::ManagerGone => Self::Unavailable(err.to_string()),
            other => Self::Failed(other.to_string()),
        }
    }
}

/// The mechanism owning push delivery of subscriptions.
#[async_trait]
pub trait PushBackend: Send + Sync {
    async fn activate_subscription(&self, sub: &Subscription, full_name: &str) -> PushStatus;

    async fn deactivate_subscription(&self, sub: &Subscription, full_name: &str) -> PushStatus;

    async fn subscription_status(&self, sub: &Subscription, full_name: &str) -> PushStatus;

    async fn health_check(&self) -> PushStatus;

    fn target(&self) -> String;
}

/// Push backend driving the in-process manager.
#[derive(Clone)]
pub struct LocalPushBackend {
    manager: ManagerHandle,
}

impl LocalPushBackend {
    pub fn new(manager: ManagerHandle) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &ManagerHandle {
        &self.manager
    }
}

#[async_trait]
impl PushBackend for LocalPushBackend {
    async fn activate_subscription(&self, sub: &Subscription, full_name: &str) -> PushStatus {
        if let Err(err) = self.manager.add(&sub.project_uuid, &sub.name.0).await {
            return err.into();
        }

        let launched = match self.manager.launch(&sub.project_uuid, &sub.name.0).await {
            Err(PushError::AlreadyRunning(_)) => {
                self.manager.restart(&sub.project_uuid, &sub.name.0).await
            }
            other => other,
        };

        match launched {
            Ok(()) => PushStatus::Ok(format!("Subscription {} activated", full_name)),
            Err(err) => err.into(),
        }
    }

    async fn deactivate_subscription(&self, sub: &Subscription, full_name: &str) -> PushStatus {
        match self.manager.remove(&sub.project_uuid, &sub.name.0).await {
            Ok(()) => PushStatus::Ok(format!("Subscription {} deactivated", full_name)),
            Err(PushError::NotRegistered(_)) => {
                PushStatus::Failed(format!("Subscription {} is not active", full_name))
            }
            Err(err) => err.into(),
        }
    }

    async fn subscription_status(&self, sub: &Subscription, full_name: &str) -> PushStatus {
        match self.manager.status(&sub.project_uuid, &sub.name.0).await {
            Ok(status) if status.state == PusherState::Running => {
                PushStatus::Ok(format!("Subscription {} is currently active", full_name))
            }
            Ok(_) | Err(PushError::NotRegistered(_)) => {
                PushStatus::Ok(format!("Subscription {} is not active", full_name))
            }
            Err(err) => err.into(),
        }
    }

    async fn health_check(&self) -> PushStatus {
        match self.manager.list().await {
            Ok(_) => PushStatus::Ok("SERVING".to_string()),
            Err(err) => err.into(),
        }
    }

    fn target(&self) -> String {
        "in-process".to_string()
    }
}
