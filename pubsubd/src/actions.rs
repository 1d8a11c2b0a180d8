use std::{sync::Arc, time::Duration};

use log::{debug, info, warn};
use pubsubd_backend::push::{ManagerHandle, PushBackend, PusherState};
use tokio::{select, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

/// Loads the verified push subscriptions into the manager and launches them.
pub async fn start_push_delivery(manager: &ManagerHandle) {
    match manager.load_push_subs().await {
        Ok(loaded) => info!("Loaded {} push subscriptions", loaded),
        Err(err) => {
            warn!("Could not load push subscriptions: {}", err);
            return;
        }
    }

    match manager.start_all().await {
        Ok(launched) => info!("Launched {} pushers", launched),
        Err(err) => warn!("Could not launch pushers: {}", err),
    }
}

pub async fn stop_push_delivery(manager: &ManagerHandle) {
    match manager.stop_all().await {
        Ok(stopped) => info!("Stopped {} pushers", stopped),
        Err(err) => warn!("Could not stop pushers: {}", err),
    }
}

/// Periodically logs the push backend's health and the state of every pusher
/// until the token is cancelled.
pub fn report_status(
    manager: &ManagerHandle,
    push: &Arc<dyn PushBackend>,
    interval: Duration,
    cancel_token: &CancellationToken,
) -> JoinHandle<()> {
    let manager = manager.to_owned();
    let push = push.to_owned();
    let cancel_token = cancel_token.to_owned();

    tokio::spawn(async move {
        loop {
            select! {
                _ = cancel_token.cancelled() => break,
                _ = sleep(interval) => {}
            }

            let health = push.health_check().await;
            let pushers = match manager.list().await {
                Ok(pushers) => pushers,
                Err(err) => {
                    warn!("Push backend {} is {}: {}", push.target(), health.result(true), err);
                    continue;
                }
            };

            let running = pushers
                .iter()
                .filter(|pusher| pusher.state == PusherState::Running)
                .count();
            info!(
                "Push backend {} is {}, {} of {} pushers running",
                push.target(),
                health.result(false),
                running,
                pushers.len()
            );

            for pusher in pushers {
                debug!(
                    "Pusher {} ({:?}) -> {} every {}ms",
                    pusher.full_name, pusher.state, pusher.endpoint, pusher.retry_policy.period
                );
            }
        }
    })
}
