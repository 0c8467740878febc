use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = DateTime<Utc>;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| DomainError::invalid_argument(stringify!($name), "not a valid id"))
            }
        }
    };
}

uuid_id!(
    /// 用户唯一标识（由外部身份服务签发）。
    UserId
);
uuid_id!(
    /// 配对（会话房间）唯一标识。
    MatchId
);
uuid_id!(
    /// 消息唯一标识。
    MessageId
);

/// 无序用户对，构造时规范化为 (low, high)。
///
/// {A,B} 与 {B,A} 得到相同的值，这是“每对用户最多一个配对”约束的键。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserPair {
    low: UserId,
    high: UserId,
}

impl UserPair {
    pub fn new(a: UserId, b: UserId) -> Result<Self, DomainError> {
        if a == b {
            return Err(DomainError::SelfLike);
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { low, high })
    }

    pub fn low(&self) -> UserId {
        self.low
    }

    pub fn high(&self) -> UserId {
        self.high
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.low == user || self.high == user
    }

    /// 返回对方的用户ID；`user` 不在该对中时返回 `None`。
    pub fn other(&self, user: UserId) -> Option<UserId> {
        if self.low == user {
            Some(self.high)
        } else if self.high == user {
            Some(self.low)
        } else {
            None
        }
    }

    pub fn members(&self) -> [UserId; 2] {
        [self.low, self.high]
    }
}

/// 配对的可读房间码。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MatchAlias(String);

impl MatchAlias {
    pub const MAX_LEN: usize = 64;

    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(DomainError::invalid_argument("alias", "cannot be empty"));
        }
        if value.len() > Self::MAX_LEN {
            return Err(DomainError::invalid_argument("alias", "too long"));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(DomainError::invalid_argument(
                "alias",
                "only letters, digits, '-' and '_' are allowed",
            ));
        }
        // 别名不能与规范ID格式冲突
        if Uuid::parse_str(&value).is_ok() {
            return Err(DomainError::invalid_argument(
                "alias",
                "must not look like a match id",
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MatchAlias {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<MatchAlias> for String {
    fn from(value: MatchAlias) -> Self {
        value.0
    }
}

/// 客户端传入的配对引用：规范ID或别名。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchRef {
    Canonical(MatchId),
    Alias(MatchAlias),
}

impl MatchRef {
    /// 能解析为UUID的视为规范ID，否则按别名处理。
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let raw = raw.trim();
        if let Ok(id) = Uuid::parse_str(raw) {
            return Ok(Self::Canonical(MatchId(id)));
        }
        MatchAlias::parse(raw)
            .map(Self::Alias)
            .map_err(|_| DomainError::MatchNotFound)
    }
}

impl fmt::Display for MatchRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canonical(id) => write!(f, "{id}"),
            Self::Alias(alias) => write!(f, "{alias}"),
        }
    }
}

/// 消息正文（已去除首尾空白）。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageBody(String);

impl MessageBody {
    pub const MAX_LEN: usize = 4000;

    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_owned();
        if value.chars().count() > Self::MAX_LEN {
            return Err(DomainError::invalid_argument("text", "too long"));
        }
        Ok(Self(value))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_is_order_insensitive() {
        let a = UserId::generate();
        let b = UserId::generate();
        let ab = UserPair::new(a, b).unwrap();
        let ba = UserPair::new(b, a).unwrap();
        assert_eq!(ab, ba);
        assert!(ab.low() < ab.high());
        assert_eq!(ab.other(a), Some(b));
        assert_eq!(ab.other(UserId::generate()), None);
    }

    #[test]
    fn pair_rejects_same_user() {
        let a = UserId::generate();
        assert_eq!(UserPair::new(a, a), Err(DomainError::SelfLike));
    }

    #[test]
    fn match_ref_prefers_canonical_id() {
        let id = MatchId::generate();
        assert_eq!(
            MatchRef::parse(&id.to_string()).unwrap(),
            MatchRef::Canonical(id)
        );
        assert!(matches!(
            MatchRef::parse("sunny-walkers").unwrap(),
            MatchRef::Alias(alias) if alias.as_str() == "sunny-walkers"
        ));
        assert_eq!(MatchRef::parse("no spaces"), Err(DomainError::MatchNotFound));
    }

    #[test]
    fn alias_cannot_look_like_an_id() {
        let raw = uuid::Uuid::new_v4().to_string();
        assert!(MatchAlias::parse(raw).is_err());
        assert!(MatchAlias::parse("").is_err());
        assert!(MatchAlias::parse("room_42").is_ok());
    }

    #[test]
    fn body_is_trimmed() {
        let body = MessageBody::new("  hi there \n").unwrap();
        assert_eq!(body.as_str(), "hi there");
        assert!(MessageBody::new("   ").unwrap().is_empty());
    }
}
