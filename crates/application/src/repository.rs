use std::collections::HashMap;

use async_trait::async_trait;
use domain::{
    Match, MatchAlias, MatchId, Message, MessageId, RepositoryError, Timestamp, UserId, UserPair,
};

#[async_trait]
pub trait MatchRepository: Send + Sync {
    async fn find_by_id(&self, id: MatchId) -> Result<Option<Match>, RepositoryError>;

    async fn find_by_pair(&self, pair: UserPair) -> Result<Option<Match>, RepositoryError>;

    async fn find_by_alias(&self, alias: &MatchAlias) -> Result<Option<Match>, RepositoryError>;

    /// 原子地按用户对创建配对；已存在时返回现有记录，第二个值表示是否新建
    async fn create_if_absent(
        &self,
        pair: UserPair,
        now: Timestamp,
    ) -> Result<(Match, bool), RepositoryError>;

    /// 用户参与的全部配对，按 `updated_at` 倒序
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Match>, RepositoryError>;

    async fn record_last_message(
        &self,
        match_id: MatchId,
        message_id: MessageId,
        at: Timestamp,
    ) -> Result<(), RepositoryError>;

    /// 别名已被其他配对占用时返回 `RepositoryError::Conflict`
    async fn assign_alias(
        &self,
        match_id: MatchId,
        alias: MatchAlias,
        at: Timestamp,
    ) -> Result<Match, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 追加消息，返回实际存储的版本（时间戳可能被存储层调整）
    async fn append(&self, message: Message) -> Result<Message, RepositoryError>;

    async fn find_by_ids(&self, ids: &[MessageId]) -> Result<Vec<Message>, RepositoryError>;

    // 取 `before` 之前最新的 `limit` 条，按时间升序返回
    async fn list_page(
        &self,
        match_id: MatchId,
        before: Option<Timestamp>,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError>;

    /// 把 `reader` 加入这些消息的已读集合，只处理属于该配对且不是本人发送的消息。
    /// 返回新插入的条数。
    async fn mark_seen(
        &self,
        match_id: MatchId,
        reader: UserId,
        ids: &[MessageId],
    ) -> Result<u64, RepositoryError>;

    async fn unread_count(&self, match_id: MatchId, user_id: UserId)
        -> Result<u64, RepositoryError>;

    async fn unread_counts(
        &self,
        match_ids: &[MatchId],
        user_id: UserId,
    ) -> Result<HashMap<MatchId, u64>, RepositoryError>;
}

/// 外部用户资料服务，这里只需要显示名
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn display_names(
        &self,
        ids: &[UserId],
    ) -> Result<HashMap<UserId, String>, RepositoryError>;
}
