use log::{info, warn};

use super::{parse_body, RequestContext};
use crate::{
    auth,
    error::ApiError,
    model::{DeliveryMode, PushType, Subscription, SubscriptionRequest, User},
    push_config, Backend,
};

impl Backend {
    /// Hands the subscription over to the push backend and grants the push
    /// worker access to it. Backend failures are only logged.
    pub(crate) async fn activate_push_subscription(
        &self,
        sub: &Subscription,
        full_name: &str,
        worker: &User,
    ) -> Result<(), ApiError> {
        let status = self.push.activate_subscription(sub, full_name).await;
        if status.is_ok() {
            info!("{}", status.result(false));
        } else {
            warn!("Could not activate {}: {}", full_name, status.result(true));
        }

        auth::link_push_worker(self.store.as_ref(), &sub.project_uuid, &sub.name.0, worker).await
    }

    /// Switches the subscription between pull and push delivery, or updates
    /// its push configuration.
    pub async fn modify_push_config(
        &self,
        ctx: &RequestContext,
        name: &str,
        body: &[u8],
    ) -> Result<(), ApiError> {
        let req: SubscriptionRequest =
            parse_body(body, ApiError::invalid_arguments("Subscription"))?;

        let existing = self.find_sub(ctx, name).await?;
        let full_name = existing.full_name(&ctx.project_name);
        let previous = existing.push_config();

        let (delivery, worker) = match req.push_config() {
            Some(push_req) => {
                if !self.config.push_enabled {
                    return Err(ApiError::push_disabled());
                }

                let worker =
                    auth::push_worker(self.store.as_ref(), &self.config.push_worker_token).await?;
                let cfg = push_config::normalize(push_req, previous)?;
                (DeliveryMode::Push(cfg), Some(worker))
            }
            None => (DeliveryMode::Pull, None),
        };

        self.store
            .mod_sub_push(&ctx.project_uuid, name, delivery.clone())
            .await
            .map_err(ApiError::from_store)?;

        if previous.is_some_and(|cfg| cfg.verified) {
            let status = self.push.deactivate_subscription(&existing, &full_name).await;
            if !status.is_ok() {
                warn!("Could not deactivate {}: {}", full_name, status.result(true));
            }

            let worker = match &worker {
                Some(worker) => Some(worker.clone()),
                None => auth::push_worker(self.store.as_ref(), &self.config.push_worker_token)
                    .await
                    .ok(),
            };
            if let Some(worker) = worker {
                auth::unlink_push_worker(self.store.as_ref(), &ctx.project_uuid, name, &worker)
                    .await?;
            }
        }

        if let (DeliveryMode::Push(cfg), Some(worker)) = (&delivery, &worker) {
            let keeps_verified_endpoint = cfg.push_type == PushType::HttpEndpoint
                && previous.is_some_and(|prev| {
                    prev.push_type == PushType::HttpEndpoint
                        && prev.endpoint == cfg.endpoint
                        && prev.verified
                });

            if keeps_verified_endpoint || cfg.push_type == PushType::Mattermost {
                let mut updated = existing.clone();
                updated.delivery = delivery.clone();
                self.activate_push_subscription(&updated, &full_name, worker)
                    .await?;
            }
        }

        Ok(())
    }

    /// Runs the ownership handshake against the subscription's http endpoint
    /// and activates the subscription once it succeeds.
    pub async fn verify_push_endpoint(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<(), ApiError> {
        if !self.config.push_enabled {
            return Err(ApiError::push_disabled());
        }

        let worker = auth::push_worker(self.store.as_ref(), &self.config.push_worker_token).await?;

        let mut sub = self.find_sub(ctx, name).await?;
        let mut cfg = match sub.push_config() {
            Some(cfg) if cfg.push_type == PushType::HttpEndpoint => cfg.clone(),
            _ => {
                return Err(ApiError::Conflict(
                    "Subscription is not in http push mode".to_string(),
                ))
            }
        };

        if cfg.verified {
            return Err(ApiError::Conflict(
                "Push endpoint is already verified".to_string(),
            ));
        }

        self.verifier
            .verify(&cfg.endpoint, &cfg.verification_hash)
            .await
            .map_err(|err| ApiError::push_verification(&err.to_string()))?;

        cfg.verified = true;
        sub.delivery = DeliveryMode::Push(cfg);
        self.store
            .mod_sub_push(&ctx.project_uuid, name, sub.delivery.clone())
            .await
            .map_err(ApiError::from_store)?;

        let full_name = sub.full_name(&ctx.project_name);
        info!("Push endpoint of {} verified", full_name);

        self.activate_push_subscription(&sub, &full_name, &worker)
            .await
    }
}
