use {
    anonka_relay::GatewayError,
    teloxide::{ApiError, RequestError},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Telegram(#[from] RequestError),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error("{message}")]
    Message { message: String },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Map a Bot API failure onto the relay's retry classes.
pub fn classify(err: &RequestError) -> GatewayError {
    match err {
        RequestError::RetryAfter(wait) => GatewayError::RateLimited {
            retry_after: Some(wait.duration()),
        },
        RequestError::Network(_) | RequestError::Io(_) => GatewayError::transient(err),
        RequestError::Api(
            ApiError::BotBlocked
            | ApiError::ChatNotFound
            | ApiError::UserDeactivated
            | ApiError::BotKicked
            | ApiError::CantInitiateConversation,
        ) => GatewayError::unreachable(err),
        _ => GatewayError::rejected(err),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, std::time::Duration, teloxide::types::Seconds};

    #[test]
    fn retry_after_carries_the_wait() {
        let err = RequestError::RetryAfter(Seconds::from_seconds(7));
        let classified = classify(&err);
        assert!(classified.is_transient());
        assert_eq!(classified.retry_after(), Some(Duration::from_secs(7)));
    }

    #[rstest]
    #[case(ApiError::BotBlocked, "unreachable")]
    #[case(ApiError::ChatNotFound, "unreachable")]
    #[case(ApiError::UserDeactivated, "unreachable")]
    #[case(ApiError::MessageTextIsEmpty, "rejected")]
    #[case(ApiError::Unknown("Bad Request: something new".into()), "rejected")]
    fn api_errors(#[case] api: ApiError, #[case] kind: &str) {
        let classified = classify(&RequestError::Api(api));
        assert_eq!(classified.kind(), kind);
        assert!(!classified.is_transient());
    }

    #[test]
    fn io_errors_are_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let classified = classify(&RequestError::Io(io.into()));
        assert!(classified.is_transient());
    }
}
