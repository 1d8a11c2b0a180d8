//! Acknowledgment identifiers handed out with pulled messages.
//!
//! An ack id has the shape `projects/{project}/subscriptions/{sub}:{offset}` and
//! carries the log offset of the message it was issued for.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AckIdError {
    #[error("invalid ack id: {0}")]
    Malformed(String),
    #[error("no ack ids provided")]
    Empty,
}

pub fn encode(project: &str, sub: &str, offset: i64) -> String {
    format!("projects/{}/subscriptions/{}:{}", project, sub, offset)
}

/// Checks that `ack_id` was issued for the given project and subscription.
pub fn validate(project: &str, sub: &str, ack_id: &str) -> bool {
    let tokens: Vec<&str> = ack_id.split('/').collect();

    if tokens.len() != 4
        || tokens[0] != "projects"
        || tokens[1] != project
        || tokens[2] != "subscriptions"
    {
        return false;
    }

    let sub_tokens: Vec<&str> = tokens[3].split(':').collect();
    if sub_tokens.len() != 2 || sub_tokens[0] != sub {
        return false;
    }

    sub_tokens[1].parse::<i64>().is_ok()
}

/// Extracts the offset an ack id refers to.
pub fn decode(ack_id: &str) -> Result<i64, AckIdError> {
    let malformed = || AckIdError::Malformed(ack_id.to_string());

    let tokens: Vec<&str> = ack_id.split('/').collect();
    if tokens.len() != 4 {
        return Err(malformed());
    }

    let sub_tokens: Vec<&str> = tokens[3].split(':').collect();
    if sub_tokens.len() != 2 {
        return Err(malformed());
    }

    sub_tokens[1].parse::<i64>().map_err(|_| malformed())
}

/// Returns the ack id referring to the greatest offset along with that offset.
pub fn max_offset<S: AsRef<str>>(ack_ids: &[S]) -> Result<(&str, i64), AckIdError> {
    let mut max: Option<(&str, i64)> = None;

    for ack_id in ack_ids {
        let ack_id = ack_id.as_ref();
        let offset = decode(ack_id)?;

        match max {
            Some((_, current)) if current > offset => {}
            _ => max = Some((ack_id, offset)),
        }
    }

    max.ok_or(AckIdError::Empty)
}
