mod matching_service;
mod messaging_service;

pub use matching_service::{MatchingService, MatchingServiceDependencies};
pub use messaging_service::{
    MessagingService, MessagingServiceDependencies, PageLimits, PostMessageRequest, PostedMessage,
};
