use std::collections::HashMap;
use std::sync::Arc;

use application::repository::{IdentityDirectory, MatchRepository, MessageRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Attachment, Match, MatchAlias, MatchId, Message, MessageBody, MessageId, RepositoryError,
    Timestamp, UserId, UserPair,
};
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool};
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match err.as_database_error() {
        Some(db) if db.is_unique_violation() => RepositoryError::Conflict,
        _ => RepositoryError::storage(err.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn uuids<T: Copy + Into<Uuid>>(ids: &[T]) -> Vec<Uuid> {
    ids.iter().map(|id| (*id).into()).collect()
}

const MATCH_COLUMNS: &str = "id, user_low, user_high, alias, last_message_id, created_at, updated_at";

#[derive(Debug, FromRow)]
struct MatchRecord {
    id: Uuid,
    user_low: Uuid,
    user_high: Uuid,
    alias: Option<String>,
    last_message_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MatchRecord> for Match {
    type Error = RepositoryError;

    fn try_from(value: MatchRecord) -> Result<Self, Self::Error> {
        let users = UserPair::new(UserId::from(value.user_low), UserId::from(value.user_high))
            .map_err(|err| invalid_data(err.to_string()))?;
        let alias = value
            .alias
            .map(MatchAlias::parse)
            .transpose()
            .map_err(|err| invalid_data(err.to_string()))?;

        Ok(Match {
            id: MatchId::from(value.id),
            users,
            alias,
            last_message_id: value.last_message_id.map(MessageId::from),
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct UpsertedMatchRecord {
    #[sqlx(flatten)]
    record: MatchRecord,
    inserted: bool,
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    match_id: Uuid,
    sender_id: Uuid,
    body: String,
    attachments: Json<Vec<Attachment>>,
    created_at: DateTime<Utc>,
    readers: Vec<Uuid>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let body = MessageBody::new(value.body).map_err(|err| invalid_data(err.to_string()))?;
        let mut message = Message::new(
            MessageId::from(value.id),
            MatchId::from(value.match_id),
            UserId::from(value.sender_id),
            body,
            value.attachments.0,
            value.created_at,
        )
        .map_err(|err| invalid_data(err.to_string()))?;
        for reader in value.readers {
            message.mark_seen_by(UserId::from(reader));
        }
        Ok(message)
    }
}

// 已读集合由 message_reads 聚合得到
const MESSAGE_SELECT: &str = r#"
    SELECT m.id, m.match_id, m.sender_id, m.body, m.attachments, m.created_at, m.seq,
           ARRAY(SELECT r.user_id FROM message_reads r WHERE r.message_id = m.id) AS readers
    FROM messages m
"#;

#[derive(Clone)]
pub struct PgMatchRepository {
    pool: PgPool,
}

impl PgMatchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        condition: &str,
        value: Uuid,
    ) -> Result<Option<Match>, RepositoryError> {
        let sql = format!("SELECT {MATCH_COLUMNS} FROM matches WHERE {condition} = $1");
        let record = sqlx::query_as::<_, MatchRecord>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        record.map(Match::try_from).transpose()
    }
}

#[async_trait]
impl MatchRepository for PgMatchRepository {
    async fn find_by_id(&self, id: MatchId) -> Result<Option<Match>, RepositoryError> {
        self.fetch_one_where("id", Uuid::from(id)).await
    }

    async fn find_by_pair(&self, pair: UserPair) -> Result<Option<Match>, RepositoryError> {
        let sql =
            format!("SELECT {MATCH_COLUMNS} FROM matches WHERE user_low = $1 AND user_high = $2");
        let record = sqlx::query_as::<_, MatchRecord>(&sql)
            .bind(Uuid::from(pair.low()))
            .bind(Uuid::from(pair.high()))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        record.map(Match::try_from).transpose()
    }

    async fn find_by_alias(&self, alias: &MatchAlias) -> Result<Option<Match>, RepositoryError> {
        let sql = format!("SELECT {MATCH_COLUMNS} FROM matches WHERE alias = $1");
        let record = sqlx::query_as::<_, MatchRecord>(&sql)
            .bind(alias.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        record.map(Match::try_from).transpose()
    }

    async fn create_if_absent(
        &self,
        pair: UserPair,
        now: Timestamp,
    ) -> Result<(Match, bool), RepositoryError> {
        // 冲突时做一次空更新，让 RETURNING 返回已有行；xmax = 0 表示本次插入
        let sql = format!(
            r#"
            INSERT INTO matches (id, user_low, user_high, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (user_low, user_high) DO UPDATE SET user_low = EXCLUDED.user_low
            RETURNING {MATCH_COLUMNS}, (xmax = 0) AS inserted
            "#
        );
        let upserted = sqlx::query_as::<_, UpsertedMatchRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(Uuid::from(pair.low()))
            .bind(Uuid::from(pair.high()))
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok((Match::try_from(upserted.record)?, upserted.inserted))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Match>, RepositoryError> {
        let sql = format!(
            "SELECT {MATCH_COLUMNS} FROM matches WHERE user_low = $1 OR user_high = $1 \
             ORDER BY updated_at DESC, created_at DESC"
        );
        let records = sqlx::query_as::<_, MatchRecord>(&sql)
            .bind(Uuid::from(user_id))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        records.into_iter().map(Match::try_from).collect()
    }

    async fn record_last_message(
        &self,
        match_id: MatchId,
        message_id: MessageId,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE matches
            SET last_message_id = $2, updated_at = GREATEST(updated_at, $3)
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(match_id))
        .bind(Uuid::from(message_id))
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn assign_alias(
        &self,
        match_id: MatchId,
        alias: MatchAlias,
        at: Timestamp,
    ) -> Result<Match, RepositoryError> {
        let sql = format!(
            "UPDATE matches SET alias = $2, updated_at = GREATEST(updated_at, $3) \
             WHERE id = $1 RETURNING {MATCH_COLUMNS}"
        );
        let record = sqlx::query_as::<_, MatchRecord>(&sql)
            .bind(Uuid::from(match_id))
            .bind(alias.as_str())
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .ok_or(RepositoryError::NotFound)?;
        Match::try_from(record)
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn append(&self, mut message: Message) -> Result<Message, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        // 锁住配对行，同一配对内的写入串行化
        sqlx::query("SELECT id FROM matches WHERE id = $1 FOR UPDATE")
            .bind(Uuid::from(message.match_id))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        // 同一配对内 created_at 严格递增，游标分页不会跳过同一时刻的消息
        let created_at: DateTime<Utc> = sqlx::query_scalar(
            r#"
            INSERT INTO messages (id, match_id, sender_id, body, attachments, created_at)
            SELECT $1, $2, $3, $4, $5, GREATEST(
                $6::timestamptz,
                (SELECT MAX(created_at) FROM messages WHERE match_id = $2) + INTERVAL '1 microsecond'
            )
            RETURNING created_at
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.match_id))
        .bind(Uuid::from(message.sender_id))
        .bind(message.body.as_str())
        .bind(Json(&message.attachments))
        .bind(message.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;

        message.created_at = created_at;
        Ok(message)
    }

    async fn find_by_ids(&self, ids: &[MessageId]) -> Result<Vec<Message>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("{MESSAGE_SELECT} WHERE m.id = ANY($1) ORDER BY m.created_at, m.seq");
        let records = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(uuids(ids))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        records.into_iter().map(Message::try_from).collect()
    }

    async fn list_page(
        &self,
        match_id: MatchId,
        before: Option<Timestamp>,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        // 先倒序取最新的一页，再翻转为升序
        let sql = format!(
            r#"
            SELECT * FROM (
                {MESSAGE_SELECT}
                WHERE m.match_id = $1 AND ($2::timestamptz IS NULL OR m.created_at < $2)
                ORDER BY m.created_at DESC, m.seq DESC
                LIMIT $3
            ) page
            ORDER BY created_at ASC, seq ASC
            "#
        );
        let records = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(Uuid::from(match_id))
            .bind(before)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        records.into_iter().map(Message::try_from).collect()
    }

    async fn mark_seen(
        &self,
        match_id: MatchId,
        reader: UserId,
        ids: &[MessageId],
    ) -> Result<u64, RepositoryError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            r#"
            INSERT INTO message_reads (message_id, user_id, read_at)
            SELECT m.id, $2, NOW()
            FROM messages m
            WHERE m.match_id = $1 AND m.sender_id <> $2 AND m.id = ANY($3)
            ON CONFLICT (message_id, user_id) DO NOTHING
            "#,
        )
        .bind(Uuid::from(match_id))
        .bind(Uuid::from(reader))
        .bind(uuids(ids))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }

    async fn unread_count(
        &self,
        match_id: MatchId,
        user_id: UserId,
    ) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM messages m
            WHERE m.match_id = $1
              AND m.sender_id <> $2
              AND NOT EXISTS (
                  SELECT 1 FROM message_reads r WHERE r.message_id = m.id AND r.user_id = $2
              )
            "#,
        )
        .bind(Uuid::from(match_id))
        .bind(Uuid::from(user_id))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(count.max(0) as u64)
    }

    async fn unread_counts(
        &self,
        match_ids: &[MatchId],
        user_id: UserId,
    ) -> Result<HashMap<MatchId, u64>, RepositoryError> {
        let mut counts: HashMap<MatchId, u64> = match_ids.iter().map(|id| (*id, 0)).collect();
        if match_ids.is_empty() {
            return Ok(counts);
        }

        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT m.match_id, COUNT(*)
            FROM messages m
            WHERE m.match_id = ANY($1)
              AND m.sender_id <> $2
              AND NOT EXISTS (
                  SELECT 1 FROM message_reads r WHERE r.message_id = m.id AND r.user_id = $2
              )
            GROUP BY m.match_id
            "#,
        )
        .bind(uuids(match_ids))
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        for (match_id, count) in rows {
            counts.insert(MatchId::from(match_id), count.max(0) as u64);
        }
        Ok(counts)
    }
}

#[derive(Clone)]
pub struct PgIdentityDirectory {
    pool: PgPool,
}

impl PgIdentityDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 同步外部资料服务的显示名
    pub async fn upsert_profile(
        &self,
        user_id: UserId,
        display_name: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, display_name, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (id) DO UPDATE
            SET display_name = EXCLUDED.display_name, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(Uuid::from(user_id))
        .bind(display_name)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }
}

#[async_trait]
impl IdentityDirectory for PgIdentityDirectory {
    async fn display_names(
        &self,
        ids: &[UserId],
    ) -> Result<HashMap<UserId, String>, RepositoryError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(Uuid, String)> =
            sqlx::query_as("SELECT id, display_name FROM users WHERE id = ANY($1)")
                .bind(uuids(ids))
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| (UserId::from(id), name))
            .collect())
    }
}

/// 同一个连接池上的全部仓储
#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub match_repository: Arc<PgMatchRepository>,
    pub message_repository: Arc<PgMessageRepository>,
    pub identity_directory: Arc<PgIdentityDirectory>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            match_repository: Arc::new(PgMatchRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            identity_directory: Arc::new(PgIdentityDirectory::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
