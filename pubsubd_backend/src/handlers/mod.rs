//! Request handling of the subscription endpoints.
//!
//! Handlers take the already authenticated caller, the subscription name and
//! the raw request body, and answer with a typed response or an [`ApiError`].

mod pull;
mod push;
mod subscriptions;

pub use subscriptions::DeleteResponse;

use crate::{
    error::{ApiError, StoreError},
    model::{Role, Subscription},
    Backend,
};

/// The authenticated caller of a request and the project it addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub project_uuid: String,
    pub project_name: String,
    pub user_uuid: String,
    pub roles: Vec<Role>,
}

impl RequestContext {
    pub fn new(project_uuid: &str, project_name: &str, user_uuid: &str, roles: Vec<Role>) -> Self {
        Self {
            project_uuid: project_uuid.to_string(),
            project_name: project_name.to_string(),
            user_uuid: user_uuid.to_string(),
            roles,
        }
    }
}

fn parse_body<'a, T: serde::Deserialize<'a>>(body: &'a [u8], err: ApiError) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|_| err)
}

impl Backend {
    async fn find_sub(&self, ctx: &RequestContext, name: &str) -> Result<Subscription, ApiError> {
        match self.store.query_sub(&ctx.project_uuid, name).await {
            Ok(sub) => Ok(sub),
            Err(StoreError::NotFound) => Err(ApiError::subscription_not_found()),
            Err(err) => {
                log::error!("Could not load subscription {}: {}", name, err);
                Err(ApiError::generic_backend())
            }
        }
    }
}
