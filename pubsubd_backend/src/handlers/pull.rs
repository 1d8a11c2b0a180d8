use chrono::{NaiveDateTime, TimeZone, Utc};
use log::{debug, error, warn};

use super::{parse_body, RequestContext};
use crate::{
    ack_id, auth,
    error::{ApiError, BrokerError},
    model::{
        AckDeadline, AckIds, Offsets, PubsubMessage, PullOptions, ReceivedMessage,
        ReceivedMessages, SetOffset, TopicOffset, MAX_ACK_DEADLINE,
    },
    Backend,
};

const ACK_DEADLINE_ARGUMENT: &str = "ackDeadlineSeconds(needs value between 0 and 600)";
const ZULU_MILLIS: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

fn invalid_ack_id() -> ApiError {
    ApiError::InvalidArgument("Invalid ack id".to_string())
}

impl Backend {
    /// Hands out up to `maxMessages` messages starting at the subscription's
    /// cursor and moves the cursor past them.
    pub async fn pull(
        &self,
        ctx: &RequestContext,
        name: &str,
        body: &[u8],
    ) -> Result<ReceivedMessages, ApiError> {
        let sub = self.find_sub(ctx, name).await?;
        let is_push_worker = auth::is_push_worker(&ctx.roles);

        if sub.delivery.is_push() && !self.config.push_enabled && is_push_worker {
            return Err(ApiError::push_disabled());
        }

        if sub.delivery.is_push() && !is_push_worker && !auth::is_service_admin(&ctx.roles) {
            return Err(ApiError::forbidden());
        }

        if self.config.resource_auth
            && auth::is_consumer_only(&ctx.roles)
            && !auth::per_resource(self.store.as_ref(), &ctx.project_uuid, name, &ctx.user_uuid)
                .await?
        {
            return Err(ApiError::forbidden());
        }

        let has_topic = self
            .store
            .has_topic(&ctx.project_uuid, &sub.topic.0)
            .await
            .map_err(|_| ApiError::generic_backend())?;
        if !has_topic {
            return Err(ApiError::pull_no_topic());
        }

        let opts: PullOptions = parse_body(body, ApiError::invalid_arguments("Pull Parameters"))?;
        let max = opts
            .max_messages
            .parse::<i64>()
            .ok()
            .filter(|max| *max > 0)
            .unwrap_or(1);
        let return_immediately = opts.return_immediately != "false";

        let full_name = sub.full_name(&ctx.project_name);
        let topic = sub.broker_topic();
        let mut offset = sub.offset;

        let raw = match self
            .broker
            .consume(&topic, offset, return_immediately, max)
            .await
        {
            Ok(raw) => raw,
            Err(BrokerError::OffsetOff) => {
                debug!("Offset of {} is off, moving it to the topic's min", full_name);
                offset = self
                    .broker
                    .min_offset(&topic)
                    .await
                    .map_err(|_| ApiError::generic_backend())?;
                self.store
                    .update_sub_offset(&ctx.project_uuid, name, offset)
                    .await
                    .map_err(|_| ApiError::generic_backend())?;

                self.broker
                    .consume(&topic, offset, return_immediately, max)
                    .await
                    .map_err(|err| {
                        error!("Couldn't consume messages for {}: {}", full_name, err);
                        ApiError::generic_backend()
                    })?
            }
            Err(err) => {
                error!("Couldn't consume messages for {}: {}", full_name, err);
                return Err(ApiError::generic_backend());
            }
        };

        let mut received = ReceivedMessages::default();
        for (idx, raw) in raw.iter().take(max as usize).enumerate() {
            let mut message = PubsubMessage::from_json(raw).map_err(|_| {
                ApiError::Internal(
                    "Message retrieved from broker network has invalid JSON Structure".to_string(),
                )
            })?;

            let id = offset + idx as i64;
            message.id = id.to_string();
            received.received_messages.push(ReceivedMessage {
                ack_id: ack_id::encode(&ctx.project_name, name, id),
                message,
            });
        }

        let count = received.len() as i64;
        let now = Utc::now();

        let dt = sub
            .latest_consume
            .map(|previous| (now - previous).num_milliseconds() as f64 / 1000.0)
            .filter(|dt| *dt > 0.0)
            .unwrap_or(1.0);

        let metrics = async {
            self.store
                .increment_sub_msg_num(&ctx.project_uuid, name, count)
                .await?;
            self.store
                .increment_sub_bytes(&ctx.project_uuid, name, received.total_size())
                .await?;
            self.store
                .update_sub_latest_consume(&ctx.project_uuid, name, now)
                .await?;
            self.store
                .update_sub_consume_rate(&ctx.project_uuid, name, count as f64 / dt)
                .await
        };
        if let Err(err) = metrics.await {
            warn!("Could not update consume metrics of {}: {}", full_name, err);
        }

        self.store
            .update_sub_pull(&ctx.project_uuid, name, offset + count, now)
            .await
            .map_err(ApiError::from_store)?;

        Ok(received)
    }

    /// Acknowledges every message up to the greatest offset among the ack ids.
    pub async fn acknowledge(
        &self,
        ctx: &RequestContext,
        name: &str,
        body: &[u8],
    ) -> Result<(), ApiError> {
        let req: AckIds = parse_body(
            body,
            ApiError::InvalidArgument("Invalid ack parameter".to_string()),
        )?;

        self.find_sub(ctx, name).await?;

        let ids = req
            .ack_ids
            .filter(|ids| !ids.is_empty())
            .ok_or_else(invalid_ack_id)?;

        if !ids
            .iter()
            .all(|id| ack_id::validate(&ctx.project_name, name, id))
        {
            return Err(invalid_ack_id());
        }

        let (_, offset) = ack_id::max_offset(ids.as_slice()).map_err(|_| invalid_ack_id())?;

        self.store
            .update_sub_offset_ack(&ctx.project_uuid, name, offset + 1, Utc::now())
            .await
            .map_err(ApiError::from_store)
    }

    pub async fn modify_ack_deadline(
        &self,
        ctx: &RequestContext,
        name: &str,
        body: &[u8],
    ) -> Result<(), ApiError> {
        let req: AckDeadline = parse_body(body, ApiError::invalid_arguments(ACK_DEADLINE_ARGUMENT))?;

        if !(0..=MAX_ACK_DEADLINE).contains(&req.ack_deadline_seconds) {
            return Err(ApiError::invalid_arguments(ACK_DEADLINE_ARGUMENT));
        }

        self.store
            .mod_ack(&ctx.project_uuid, name, req.ack_deadline_seconds as u32)
            .await
            .map_err(ApiError::from_store)
    }

    /// Reports the cursor along with the topic's watermarks, raising a cursor
    /// that fell below the topic's min.
    pub async fn offsets(&self, ctx: &RequestContext, name: &str) -> Result<Offsets, ApiError> {
        let sub = self.find_sub(ctx, name).await?;
        let topic = sub.broker_topic();

        let min = self.broker.min_offset(&topic).await?;
        let max = self.broker.max_offset(&topic).await?;

        let mut current = sub.offset;
        if current < min {
            self.store
                .update_sub_offset(&ctx.project_uuid, name, min)
                .await
                .map_err(ApiError::from_store)?;
            current = min;
        }

        Ok(Offsets { max, min, current })
    }

    pub async fn modify_offset(
        &self,
        ctx: &RequestContext,
        name: &str,
        body: &[u8],
    ) -> Result<(), ApiError> {
        let req: SetOffset = parse_body(body, ApiError::invalid_arguments("Offset"))?;

        let sub = self.find_sub(ctx, name).await?;
        let topic = sub.broker_topic();

        let min = self.broker.min_offset(&topic).await?;
        let max = self.broker.max_offset(&topic).await?;

        if req.offset < min || req.offset > max {
            return Err(ApiError::InvalidArgument("Offset out of bounds".to_string()));
        }

        self.store
            .update_sub_offset(&ctx.project_uuid, name, req.offset)
            .await
            .map_err(ApiError::from_store)
    }

    /// Translates a Zulu timestamp with millisecond precision to a topic offset.
    pub async fn time_to_offset(
        &self,
        ctx: &RequestContext,
        name: &str,
        time: &str,
    ) -> Result<TopicOffset, ApiError> {
        let sub = self.find_sub(ctx, name).await?;

        let time = NaiveDateTime::parse_from_str(time, ZULU_MILLIS)
            .map(|time| Utc.from_utc_datetime(&time))
            .map_err(|_| ApiError::InvalidArgument("Time is not in valid Zulu format.".to_string()))?;

        let offset = self
            .broker
            .time_to_offset(&sub.broker_topic(), time)
            .await?;

        if offset < 0 {
            return Err(ApiError::Conflict(
                "Timestamp is out of bounds for the subscription's topic/partition".to_string(),
            ));
        }

        Ok(TopicOffset { offset })
    }
}
