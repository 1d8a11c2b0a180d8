use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{Store, StoreResult};
use crate::{
    error::StoreError,
    model::{DeliveryMode, PendingAck, Subscription, User},
};

type SubKey = (String, String);

fn key(project_uuid: &str, name: &str) -> SubKey {
    (project_uuid.to_string(), name.to_string())
}

#[derive(Default)]
struct State {
    projects: HashMap<String, String>,
    topics: HashSet<SubKey>,
    subs: HashMap<SubKey, Subscription>,
    acls: HashMap<SubKey, Vec<String>>,
    users: HashMap<String, User>,
}

impl State {
    fn sub_mut(&mut self, project_uuid: &str, name: &str) -> StoreResult<&mut Subscription> {
        self.subs
            .get_mut(&key(project_uuid, name))
            .ok_or(StoreError::NotFound)
    }
}

/// Store keeping everything in process memory behind a single lock.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_project(&self, uuid: &str, name: &str) {
        let mut state = self.state.lock().await;
        state.projects.insert(uuid.to_string(), name.to_string());
    }

    pub async fn insert_topic(&self, project_uuid: &str, topic: &str) {
        let mut state = self.state.lock().await;
        state.topics.insert(key(project_uuid, topic));
    }

    pub async fn remove_topic(&self, project_uuid: &str, topic: &str) {
        let mut state = self.state.lock().await;
        state.topics.remove(&key(project_uuid, topic));
    }

    pub async fn insert_user(&self, user: User) {
        let mut state = self.state.lock().await;
        state.users.insert(user.uuid.clone(), user);
    }

    pub async fn query_user(&self, uuid: &str) -> StoreResult<User> {
        let state = self.state.lock().await;
        state.users.get(uuid).cloned().ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn query_project_name(&self, project_uuid: &str) -> StoreResult<String> {
        let state = self.state.lock().await;
        state
            .projects
            .get(project_uuid)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn has_topic(&self, project_uuid: &str, topic: &str) -> StoreResult<bool> {
        let state = self.state.lock().await;
        Ok(state.topics.contains(&key(project_uuid, topic)))
    }

    async fn query_sub(&self, project_uuid: &str, name: &str) -> StoreResult<Subscription> {
        let state = self.state.lock().await;
        state
            .subs
            .get(&key(project_uuid, name))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn query_push_subs(&self) -> StoreResult<Vec<Subscription>> {
        let state = self.state.lock().await;
        let mut subs: Vec<Subscription> = state
            .subs
            .values()
            .filter(|sub| sub.delivery.is_push())
            .cloned()
            .collect();
        subs.sort_by(|a, b| (&a.project_uuid, &a.name).cmp(&(&b.project_uuid, &b.name)));
        Ok(subs)
    }

    async fn insert_sub(&self, sub: Subscription) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let sub_key = key(&sub.project_uuid, &sub.name.0);

        if state.subs.contains_key(&sub_key) {
            return Err(StoreError::Exists);
        }

        state.acls.entry(sub_key.clone()).or_default();
        state.subs.insert(sub_key, sub);
        Ok(())
    }

    async fn remove_sub(&self, project_uuid: &str, name: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let sub_key = key(project_uuid, name);

        state.acls.remove(&sub_key);
        state
            .subs
            .remove(&sub_key)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn mod_ack(&self, project_uuid: &str, name: &str, ack: u32) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.sub_mut(project_uuid, name)?.ack_deadline = ack;
        Ok(())
    }

    async fn mod_sub_push(
        &self,
        project_uuid: &str,
        name: &str,
        delivery: DeliveryMode,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.sub_mut(project_uuid, name)?.delivery = delivery;
        Ok(())
    }

    async fn update_sub_offset(
        &self,
        project_uuid: &str,
        name: &str,
        offset: i64,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let sub = state.sub_mut(project_uuid, name)?;

        sub.offset = offset;
        sub.pending_ack = None;
        Ok(())
    }

    async fn update_sub_pull(
        &self,
        project_uuid: &str,
        name: &str,
        next_offset: i64,
        pulled_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let sub = state.sub_mut(project_uuid, name)?;

        sub.pending_ack = Some(PendingAck {
            from: sub.offset,
            next: next_offset,
            pulled_at,
        });
        sub.offset = sub.offset.max(next_offset);
        Ok(())
    }

    async fn update_sub_offset_ack(
        &self,
        project_uuid: &str,
        name: &str,
        offset: i64,
        acked_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let sub = state.sub_mut(project_uuid, name)?;

        let pending = sub.pending_ack.ok_or(StoreError::NoAckPending)?;

        if offset <= pending.from || offset > pending.next {
            return Err(StoreError::WrongAck);
        }

        let elapsed = (acked_at - pending.pulled_at).num_seconds();
        if elapsed > i64::from(sub.ack_deadline) {
            return Err(StoreError::AckTimeout);
        }

        sub.offset = offset;
        sub.pending_ack = None;
        Ok(())
    }

    async fn increment_sub_msg_num(
        &self,
        project_uuid: &str,
        name: &str,
        num: i64,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.sub_mut(project_uuid, name)?.msg_num += num;
        Ok(())
    }

    async fn increment_sub_bytes(
        &self,
        project_uuid: &str,
        name: &str,
        bytes: i64,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.sub_mut(project_uuid, name)?.total_bytes += bytes;
        Ok(())
    }

    async fn update_sub_latest_consume(
        &self,
        project_uuid: &str,
        name: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.sub_mut(project_uuid, name)?.latest_consume = Some(at);
        Ok(())
    }

    async fn update_sub_consume_rate(
        &self,
        project_uuid: &str,
        name: &str,
        rate: f64,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.sub_mut(project_uuid, name)?.consume_rate = rate;
        Ok(())
    }

    async fn query_acl(&self, project_uuid: &str, name: &str) -> StoreResult<Vec<String>> {
        let state = self.state.lock().await;
        state
            .acls
            .get(&key(project_uuid, name))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn append_to_acl(
        &self,
        project_uuid: &str,
        name: &str,
        user_uuid: &str,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let acl = state
            .acls
            .get_mut(&key(project_uuid, name))
            .ok_or(StoreError::NotFound)?;

        if !acl.iter().any(|uuid| uuid == user_uuid) {
            acl.push(user_uuid.to_string());
        }
        Ok(())
    }

    async fn remove_from_acl(
        &self,
        project_uuid: &str,
        name: &str,
        user_uuid: &str,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let acl = state
            .acls
            .get_mut(&key(project_uuid, name))
            .ok_or(StoreError::NotFound)?;

        acl.retain(|uuid| uuid != user_uuid);
        Ok(())
    }

    async fn query_user_by_token(&self, token: &str) -> StoreResult<User> {
        let state = self.state.lock().await;
        state
            .users
            .values()
            .find(|user| user.token == token)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn append_to_user_projects(&self, user_uuid: &str, project_uuid: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(user_uuid).ok_or(StoreError::NotFound)?;

        if !user.projects.iter().any(|uuid| uuid == project_uuid) {
            user.projects.push(project_uuid.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    async fn store_with_sub() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_sub(Subscription::new("argo_uuid", "sub1", "topic1"))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn insert_rejects_duplicates() {
        let store = store_with_sub().await;

        let result = store
            .insert_sub(Subscription::new("argo_uuid", "sub1", "topic1"))
            .await;

        assert_eq!(result, Err(StoreError::Exists));
    }

    #[tokio::test]
    async fn pull_moves_cursor_and_opens_ack_window() {
        let store = store_with_sub().await;
        let now = Utc::now();

        store.update_sub_pull("argo_uuid", "sub1", 3, now).await.unwrap();

        let sub = store.query_sub("argo_uuid", "sub1").await.unwrap();
        assert_eq!(sub.offset, 3);
        assert_eq!(
            sub.pending_ack,
            Some(PendingAck {
                from: 0,
                next: 3,
                pulled_at: now
            })
        );
    }

    #[tokio::test]
    async fn ack_within_window_and_deadline_clears_pending() {
        let store = store_with_sub().await;
        let now = Utc::now();
        store.update_sub_pull("argo_uuid", "sub1", 3, now).await.unwrap();

        store
            .update_sub_offset_ack("argo_uuid", "sub1", 3, now + Duration::seconds(2))
            .await
            .unwrap();

        let sub = store.query_sub("argo_uuid", "sub1").await.unwrap();
        assert_eq!(sub.offset, 3);
        assert!(sub.pending_ack.is_none());
    }

    #[tokio::test]
    async fn late_ack_times_out() {
        let store = store_with_sub().await;
        let pulled_at = Utc::now() - Duration::seconds(30);
        store
            .update_sub_pull("argo_uuid", "sub1", 1, pulled_at)
            .await
            .unwrap();

        let result = store
            .update_sub_offset_ack("argo_uuid", "sub1", 1, Utc::now())
            .await;

        assert_eq!(result, Err(StoreError::AckTimeout));
    }

    #[tokio::test]
    async fn ack_outside_window_or_without_pull_is_rejected() {
        let store = store_with_sub().await;

        let result = store
            .update_sub_offset_ack("argo_uuid", "sub1", 1, Utc::now())
            .await;
        assert_eq!(result, Err(StoreError::NoAckPending));

        store
            .update_sub_pull("argo_uuid", "sub1", 2, Utc::now())
            .await
            .unwrap();
        let result = store
            .update_sub_offset_ack("argo_uuid", "sub1", 5, Utc::now())
            .await;
        assert_eq!(result, Err(StoreError::WrongAck));
    }

    #[tokio::test]
    async fn moving_the_cursor_drops_the_ack_window() {
        let store = store_with_sub().await;
        store.update_sub_pull("argo_uuid", "sub1", 3, Utc::now()).await.unwrap();

        store.update_sub_offset("argo_uuid", "sub1", 0).await.unwrap();

        let sub = store.query_sub("argo_uuid", "sub1").await.unwrap();
        assert_eq!(sub.offset, 0);
        assert!(sub.pending_ack.is_none());
        let result = store
            .update_sub_offset_ack("argo_uuid", "sub1", 3, Utc::now())
            .await;
        assert_eq!(result, Err(StoreError::NoAckPending));
    }

    #[tokio::test]
    async fn partial_ack_rewinds_to_the_first_unacked() {
        let store = store_with_sub().await;
        let now = Utc::now();
        store.update_sub_pull("argo_uuid", "sub1", 3, now).await.unwrap();

        store
            .update_sub_offset_ack("argo_uuid", "sub1", 1, now)
            .await
            .unwrap();

        let sub = store.query_sub("argo_uuid", "sub1").await.unwrap();
        assert_eq!(sub.offset, 1);
    }

    #[tokio::test]
    async fn later_pull_replaces_the_ack_window() {
        let store = store_with_sub().await;
        let now = Utc::now();
        store.update_sub_pull("argo_uuid", "sub1", 2, now).await.unwrap();
        store.update_sub_pull("argo_uuid", "sub1", 3, now).await.unwrap();

        let result = store.update_sub_offset_ack("argo_uuid", "sub1", 1, now).await;
        assert_eq!(result, Err(StoreError::WrongAck));

        store.update_sub_offset_ack("argo_uuid", "sub1", 3, now).await.unwrap();
    }

    #[tokio::test]
    async fn acl_entries_are_unique() {
        let store = store_with_sub().await;

        store.append_to_acl("argo_uuid", "sub1", "worker").await.unwrap();
        store.append_to_acl("argo_uuid", "sub1", "worker").await.unwrap();
        assert_eq!(
            store.query_acl("argo_uuid", "sub1").await.unwrap(),
            vec!["worker".to_string()]
        );

        store.remove_from_acl("argo_uuid", "sub1", "worker").await.unwrap();
        assert!(store.query_acl("argo_uuid", "sub1").await.unwrap().is_empty());
    }
}
