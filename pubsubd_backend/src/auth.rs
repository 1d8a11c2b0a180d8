//! Identity helpers for push delivery: token generation, push worker
//! resolution and the acl linkage that lets the push worker act on a
//! subscription.

use log::warn;
use uuid::Uuid;

use crate::{
    error::ApiError,
    model::{Role, User},
    store::Store,
};

/// Generates an opaque random token.
pub fn gen_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn is_service_admin(roles: &[Role]) -> bool {
    roles.contains(&Role::ServiceAdmin)
}

pub fn is_push_worker(roles: &[Role]) -> bool {
    roles.contains(&Role::PushWorker)
}

/// Whether acl checks apply to a caller holding `roles`.
pub fn is_consumer_only(roles: &[Role]) -> bool {
    roles.contains(&Role::Consumer)
        && !roles
            .iter()
            .any(|role| matches!(role, Role::ProjectAdmin | Role::ServiceAdmin))
}

/// Resolves the identity push deliveries are made as.
pub async fn push_worker(store: &dyn Store, token: &str) -> Result<User, ApiError> {
    if token.is_empty() {
        warn!("No push worker token configured");
        return Err(ApiError::push_unavailable());
    }

    match store.query_user_by_token(token).await {
        Ok(user) if user.is_push_worker() => Ok(user),
        Ok(user) => {
            warn!("User {} is configured as push worker but lacks the role", user.name);
            Err(ApiError::push_unavailable())
        }
        Err(err) => {
            warn!("Could not resolve push worker: {}", err);
            Err(ApiError::push_unavailable())
        }
    }
}

/// Whether `user_uuid` is listed in the subscription's acl.
pub async fn per_resource(
    store: &dyn Store,
    project_uuid: &str,
    sub: &str,
    user_uuid: &str,
) -> Result<bool, ApiError> {
    let acl = store
        .query_acl(project_uuid, sub)
        .await
        .map_err(ApiError::from_store)?;

    Ok(acl.iter().any(|uuid| uuid == user_uuid))
}

/// Grants the push worker access to the subscription and its project.
pub async fn link_push_worker(
    store: &dyn Store,
    project_uuid: &str,
    sub: &str,
    worker: &User,
) -> Result<(), ApiError> {
    store
        .append_to_acl(project_uuid, sub, &worker.uuid)
        .await
        .map_err(|_| ApiError::generic_backend())?;

    store
        .append_to_user_projects(&worker.uuid, project_uuid)
        .await
        .map_err(|_| ApiError::generic_backend())
}

pub async fn unlink_push_worker(
    store: &dyn Store,
    project_uuid: &str,
    sub: &str,
    worker: &User,
) -> Result<(), ApiError> {
    store
        .remove_from_acl(project_uuid, sub, &worker.uuid)
        .await
        .map_err(|_| ApiError::generic_backend())
}
