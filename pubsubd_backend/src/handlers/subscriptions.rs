use log::info;

use super::{parse_body, RequestContext};
use crate::{
    auth,
    error::{ApiError, BrokerError},
    model::{
        DeliveryMode, PushType, Subscription, SubscriptionRequest, SubscriptionView,
        DEFAULT_ACK_DEADLINE, MAX_ACK_DEADLINE,
    },
    push_config, Backend,
};

/// Body returned when deleting a subscription that was being pushed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct DeleteResponse {
    pub message: String,
}

/// Splits `projects/{project}/topics/{topic}` into its project and topic names.
fn topic_ref(full_topic: &str) -> Option<(&str, &str)> {
    let tokens: Vec<&str> = full_topic.split('/').collect();

    match tokens.as_slice() {
        ["projects", project, "topics", topic] if !project.is_empty() && !topic.is_empty() => {
            Some((project, topic))
        }
        _ => None,
    }
}

impl Backend {
    pub async fn create_subscription(
        &self,
        ctx: &RequestContext,
        name: &str,
        body: &[u8],
    ) -> Result<SubscriptionView, ApiError> {
        let req: SubscriptionRequest =
            parse_body(body, ApiError::invalid_arguments("Subscription"))?;

        let (_, topic) = topic_ref(&req.topic)
            .ok_or_else(|| ApiError::InvalidArgument("Invalid Topic name".to_string()))?;

        let has_topic = self
            .store
            .has_topic(&ctx.project_uuid, topic)
            .await
            .map_err(|_| ApiError::generic_backend())?;
        if !has_topic {
            return Err(ApiError::NotFound("Topic".to_string()));
        }

        if !(0..=MAX_ACK_DEADLINE).contains(&req.ack_deadline_seconds) {
            return Err(ApiError::invalid_arguments("Subscription"));
        }

        let mut sub = Subscription::new(&ctx.project_uuid, name, topic);
        sub.ack_deadline = match req.ack_deadline_seconds {
            0 => DEFAULT_ACK_DEADLINE,
            ack => ack as u32,
        };

        let worker = match req.push_config() {
            Some(push_req) => {
                if !self.config.push_enabled {
                    return Err(ApiError::push_disabled());
                }

                let worker =
                    auth::push_worker(self.store.as_ref(), &self.config.push_worker_token).await?;
                sub.delivery = DeliveryMode::Push(push_config::normalize(push_req, None)?);
                Some(worker)
            }
            None => None,
        };

        sub.offset = match self.broker.max_offset(&sub.broker_topic()).await {
            Ok(offset) => offset,
            Err(BrokerError::TopicNotFound(_)) => 0,
            Err(err) => return Err(err.into()),
        };

        self.store
            .insert_sub(sub.clone())
            .await
            .map_err(ApiError::from_store)?;

        let full_name = sub.full_name(&ctx.project_name);
        info!("Subscription {} created", full_name);

        let is_mattermost = sub
            .push_config()
            .is_some_and(|cfg| cfg.push_type == PushType::Mattermost);
        if let (true, Some(worker)) = (is_mattermost, &worker) {
            self.activate_push_subscription(&sub, &full_name, worker)
                .await?;
        }

        Ok(sub.view(&ctx.project_name))
    }

    /// The subscription's wire view, along with the push backend's view of it
    /// when it is an active push subscription.
    pub async fn get_subscription(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<SubscriptionView, ApiError> {
        let sub = self.find_sub(ctx, name).await?;
        let mut view = sub.view(&ctx.project_name);

        if sub.push_config().is_some_and(|cfg| cfg.verified) {
            view.push_status = self
                .push
                .subscription_status(&sub, &view.name)
                .await
                .result(false);
        }

        Ok(view)
    }

    pub async fn delete_subscription(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<Option<DeleteResponse>, ApiError> {
        let sub = self.find_sub(ctx, name).await?;
        let full_name = sub.full_name(&ctx.project_name);

        // stop delivery before the record disappears under the pusher
        let status = match sub.push_config() {
            Some(cfg) if cfg.verified => {
                Some(self.push.deactivate_subscription(&sub, &full_name).await)
            }
            _ => None,
        };

        self.store
            .remove_sub(&ctx.project_uuid, name)
            .await
            .map_err(ApiError::from_store)?;
        info!("Subscription {} deleted", full_name);

        Ok(status.map(|status| DeleteResponse {
            message: status.result(false),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_refs_need_full_path() {
        assert_eq!(
            topic_ref("projects/ARGO/topics/topic1"),
            Some(("ARGO", "topic1"))
        );
        assert_eq!(topic_ref("/projects/ARGO/topics/topic1"), None);
        assert_eq!(topic_ref("projects/ARGO/subscriptions/topic1"), None);
        assert_eq!(topic_ref("projects//topics/topic1"), None);
        assert_eq!(topic_ref("topic1"), None);
    }
}
