//! 领域模型错误定义

use thiserror::Error;

/// 领域规则错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 不能给自己点赞
    #[error("self like not allowed")]
    SelfLike,

    #[error("match not found")]
    MatchNotFound,

    /// 调用者不是该配对的成员
    #[error("user is not a member of this match")]
    NotMatchMember,

    #[error("alias already taken")]
    AliasTaken,
}

impl DomainError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 仓储层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    /// 唯一约束冲突
    #[error("record conflicts with an existing one")]
    Conflict,
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
