use tokio::sync::oneshot;

use super::{PushError, PusherStatus};

pub type Reply<T> = oneshot::Sender<Result<T, PushError>>;

/// Requests handled by the push manager task.
#[derive(Debug)]
pub enum ManagerCommand {
    /// Registers every persisted push subscription, replying with how many were added.
    LoadPushSubs { reply: Reply<usize> },
    Add {
        project_uuid: String,
        sub: String,
        reply: Reply<()>,
    },
    Launch {
        project_uuid: String,
        sub: String,
        reply: Reply<()>,
    },
    Stop {
        project_uuid: String,
        sub: String,
        reply: Reply<()>,
    },
    Restart {
        project_uuid: String,
        sub: String,
        reply: Reply<()>,
    },
    Remove {
        project_uuid: String,
        sub: String,
        reply: Reply<()>,
    },
    RemoveProjectAll {
        project_uuid: String,
        reply: Reply<usize>,
    },
    StartAll { reply: Reply<usize> },
    StopAll { reply: Reply<usize> },
    Status {
        project_uuid: String,
        sub: String,
        reply: Reply<PusherStatus>,
    },
    List { reply: Reply<Vec<PusherStatus>> },
    /// Sent by a delivery loop that stopped on its own.
    Deregister { key: String, run_id: u64 },
}
