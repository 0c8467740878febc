//! 内存存储实现
//!
//! 开发环境（`database.url = "memory"`）和测试使用。每个存储把全部索引放在
//! 同一把写锁下，保证唯一性检查与插入是一个临界区。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Duration;
use domain::{
    Match, MatchAlias, MatchId, Message, MessageId, RepositoryError, Timestamp, UserId, UserPair,
};
use tokio::sync::RwLock;

use crate::repository::{IdentityDirectory, MatchRepository, MessageRepository};

#[derive(Default)]
struct MatchState {
    by_id: HashMap<MatchId, Match>,
    by_pair: HashMap<UserPair, MatchId>,
    by_alias: HashMap<MatchAlias, MatchId>,
}

#[derive(Default)]
pub struct InMemoryMatchRepository {
    state: RwLock<MatchState>,
}

impl InMemoryMatchRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MatchRepository for InMemoryMatchRepository {
    async fn find_by_id(&self, id: MatchId) -> Result<Option<Match>, RepositoryError> {
        Ok(self.state.read().await.by_id.get(&id).cloned())
    }

    async fn find_by_pair(&self, pair: UserPair) -> Result<Option<Match>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .by_pair
            .get(&pair)
            .and_then(|id| state.by_id.get(id))
            .cloned())
    }

    async fn find_by_alias(&self, alias: &MatchAlias) -> Result<Option<Match>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .by_alias
            .get(alias)
            .and_then(|id| state.by_id.get(id))
            .cloned())
    }

    async fn create_if_absent(
        &self,
        pair: UserPair,
        now: Timestamp,
    ) -> Result<(Match, bool), RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.by_pair.get(&pair).and_then(|id| state.by_id.get(id)) {
            return Ok((existing.clone(), false));
        }

        let created = Match::new(MatchId::generate(), pair, now);
        state.by_pair.insert(pair, created.id);
        state.by_id.insert(created.id, created.clone());
        Ok((created, true))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Match>, RepositoryError> {
        let state = self.state.read().await;
        let mut matches: Vec<Match> = state
            .by_id
            .values()
            .filter(|m| m.is_member(user_id))
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(matches)
    }

    async fn record_last_message(
        &self,
        match_id: MatchId,
        message_id: MessageId,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let entry = state
            .by_id
            .get_mut(&match_id)
            .ok_or(RepositoryError::NotFound)?;
        entry.record_last_message(message_id, at);
        Ok(())
    }

    async fn assign_alias(
        &self,
        match_id: MatchId,
        alias: MatchAlias,
        at: Timestamp,
    ) -> Result<Match, RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(holder) = state.by_alias.get(&alias) {
            if *holder != match_id {
                return Err(RepositoryError::Conflict);
            }
        }

        let entry = state
            .by_id
            .get_mut(&match_id)
            .ok_or(RepositoryError::NotFound)?;
        let previous = entry.alias.replace(alias.clone());
        entry.set_alias(alias.clone(), at);
        let updated = entry.clone();

        if let Some(previous) = previous {
            state.by_alias.remove(&previous);
        }
        state.by_alias.insert(alias, match_id);
        Ok(updated)
    }
}

#[derive(Default)]
struct MessageState {
    // 每个配对内按插入顺序保存，时间戳严格递增
    by_match: HashMap<MatchId, Vec<Message>>,
    index: HashMap<MessageId, MatchId>,
}

impl MessageState {
    fn find(&self, id: &MessageId) -> Option<&Message> {
        let match_id = self.index.get(id)?;
        self.by_match
            .get(match_id)?
            .iter()
            .find(|message| message.id == *id)
    }

    fn unread(&self, match_id: &MatchId, user_id: UserId) -> u64 {
        self.by_match
            .get(match_id)
            .map(|messages| messages.iter().filter(|m| m.is_unread_for(user_id)).count() as u64)
            .unwrap_or(0)
    }
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    state: RwLock<MessageState>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn append(&self, mut message: Message) -> Result<Message, RepositoryError> {
        let mut state = self.state.write().await;
        if state.index.contains_key(&message.id) {
            return Err(RepositoryError::Conflict);
        }

        let thread = state.by_match.entry(message.match_id).or_default();
        if let Some(last) = thread.last() {
            if message.created_at <= last.created_at {
                message.created_at = last.created_at + Duration::microseconds(1);
            }
        }
        thread.push(message.clone());
        state.index.insert(message.id, message.match_id);
        Ok(message)
    }

    async fn find_by_ids(&self, ids: &[MessageId]) -> Result<Vec<Message>, RepositoryError> {
        let state = self.state.read().await;
        Ok(ids.iter().filter_map(|id| state.find(id)).cloned().collect())
    }

    async fn list_page(
        &self,
        match_id: MatchId,
        before: Option<Timestamp>,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let state = self.state.read().await;
        let Some(thread) = state.by_match.get(&match_id) else {
            return Ok(Vec::new());
        };

        let end = match before {
            Some(bound) => thread.partition_point(|m| m.created_at < bound),
            None => thread.len(),
        };
        let start = end.saturating_sub(limit as usize);
        Ok(thread[start..end].to_vec())
    }

    async fn mark_seen(
        &self,
        match_id: MatchId,
        reader: UserId,
        ids: &[MessageId],
    ) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        let Some(thread) = state.by_match.get_mut(&match_id) else {
            return Ok(0);
        };

        let mut updated = 0;
        for message in thread.iter_mut().filter(|m| ids.contains(&m.id)) {
            if message.mark_seen_by(reader) {
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn unread_count(
        &self,
        match_id: MatchId,
        user_id: UserId,
    ) -> Result<u64, RepositoryError> {
        Ok(self.state.read().await.unread(&match_id, user_id))
    }

    async fn unread_counts(
        &self,
        match_ids: &[MatchId],
        user_id: UserId,
    ) -> Result<HashMap<MatchId, u64>, RepositoryError> {
        let state = self.state.read().await;
        Ok(match_ids
            .iter()
            .map(|id| (*id, state.unread(id, user_id)))
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryIdentityDirectory {
    names: RwLock<HashMap<UserId, String>>,
}

impl InMemoryIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user_id: UserId, display_name: impl Into<String>) {
        self.names.write().await.insert(user_id, display_name.into());
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryIdentityDirectory {
    async fn display_names(
        &self,
        ids: &[UserId],
    ) -> Result<HashMap<UserId, String>, RepositoryError> {
        let names = self.names.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| names.get(id).map(|name| (*id, name.clone())))
            .collect())
    }
}
