use domain::{DomainError, RepositoryError};
use thiserror::Error;

/// 对外暴露的错误分类，传输层据此映射状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    Unauthorized,
    NotFound,
    InvalidRequest,
    Conflict,
    Internal,
}

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("authentication failed")]
    Authentication,
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl ApplicationError {
    pub fn infrastructure(message: impl Into<String>) -> Self {
        ApplicationError::Infrastructure(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApplicationError::Domain(err) => match err {
                DomainError::InvalidArgument { .. } | DomainError::SelfLike => {
                    ErrorKind::InvalidRequest
                }
                DomainError::MatchNotFound => ErrorKind::NotFound,
                DomainError::NotMatchMember => ErrorKind::Unauthorized,
                DomainError::AliasTaken => ErrorKind::Conflict,
            },
            ApplicationError::Repository(err) => match err {
                RepositoryError::NotFound => ErrorKind::NotFound,
                RepositoryError::Conflict => ErrorKind::Conflict,
                RepositoryError::Storage { .. } => ErrorKind::Internal,
            },
            ApplicationError::Authentication => ErrorKind::Unauthenticated,
            ApplicationError::Infrastructure(_) => ErrorKind::Internal,
        }
    }

    /// 稳定的错误码字符串，客户端可以依赖
    pub fn code(&self) -> &'static str {
        match self {
            ApplicationError::Domain(err) => match err {
                DomainError::InvalidArgument { .. } => "invalid_argument",
                DomainError::SelfLike => "self_like",
                DomainError::MatchNotFound => "match_not_found",
                DomainError::NotMatchMember => "not_a_member",
                DomainError::AliasTaken => "alias_taken",
            },
            ApplicationError::Repository(err) => match err {
                RepositoryError::NotFound => "not_found",
                RepositoryError::Conflict => "conflict",
                RepositoryError::Storage { .. } => "storage_error",
            },
            ApplicationError::Authentication => "unauthenticated",
            ApplicationError::Infrastructure(_) => "internal_error",
        }
    }

    /// 返回给客户端的描述，内部错误不暴露细节
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Repository(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_kinds() {
        let err: ApplicationError = DomainError::SelfLike.into();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(err.code(), "self_like");

        let err: ApplicationError = DomainError::NotMatchMember.into();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err: ApplicationError = RepositoryError::storage("connection reset").into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.public_message(), "internal server error");
    }
}
