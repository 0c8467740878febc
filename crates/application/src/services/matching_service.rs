use std::sync::Arc;

use domain::{DomainError, Match, MatchAlias, MatchId, MatchRef, RepositoryError, UserId, UserPair};
use tracing::{debug, info};

use crate::{
    clock::Clock, dto::LikeOutcome, error::ApplicationError, repository::MatchRepository,
};

pub struct MatchingServiceDependencies {
    pub match_repository: Arc<dyn MatchRepository>,
    pub clock: Arc<dyn Clock>,
}

/// 配对的创建、房间标识解析与成员校验
pub struct MatchingService {
    deps: MatchingServiceDependencies,
}

impl MatchingService {
    pub fn new(deps: MatchingServiceDependencies) -> Self {
        Self { deps }
    }

    /// 点赞即配对，同一对用户重复点赞返回同一个配对
    pub async fn like(
        &self,
        actor: UserId,
        target: UserId,
    ) -> Result<LikeOutcome, ApplicationError> {
        let pair = UserPair::new(actor, target)?;
        let (entity, created) = self
            .deps
            .match_repository
            .create_if_absent(pair, self.deps.clock.now())
            .await?;

        info!(
            match_id = %entity.id,
            user_low = %pair.low(),
            user_high = %pair.high(),
            created,
            "like recorded"
        );
        Ok(LikeOutcome {
            match_id: entity.id,
            created,
        })
    }

    /// 把客户端传入的引用解析为规范ID。
    ///
    /// 规范ID原样返回，不检查是否存在；别名需要查库。
    pub async fn resolve(&self, raw: &str) -> Result<MatchId, ApplicationError> {
        match MatchRef::parse(raw)? {
            MatchRef::Canonical(id) => Ok(id),
            MatchRef::Alias(alias) => self
                .deps
                .match_repository
                .find_by_alias(&alias)
                .await?
                .map(|entity| entity.id)
                .ok_or_else(|| DomainError::MatchNotFound.into()),
        }
    }

    /// 解析引用、加载配对并校验 `user` 是成员
    pub async fn authorize(&self, raw: &str, user: UserId) -> Result<Match, ApplicationError> {
        let id = self.resolve(raw).await?;
        let entity = self
            .deps
            .match_repository
            .find_by_id(id)
            .await?
            .ok_or(DomainError::MatchNotFound)?;

        if !entity.is_member(user) {
            debug!(match_id = %id, user_id = %user, "rejected non-member");
            return Err(DomainError::NotMatchMember.into());
        }
        Ok(entity)
    }

    pub async fn assign_alias(
        &self,
        raw: &str,
        user: UserId,
        alias: &str,
    ) -> Result<Match, ApplicationError> {
        let entity = self.authorize(raw, user).await?;
        let alias = MatchAlias::parse(alias)?;

        let updated = self
            .deps
            .match_repository
            .assign_alias(entity.id, alias, self.deps.clock.now())
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict => ApplicationError::from(DomainError::AliasTaken),
                other => other.into(),
            })?;

        info!(match_id = %updated.id, user_id = %user, alias = ?updated.alias, "alias assigned");
        Ok(updated)
    }
}
