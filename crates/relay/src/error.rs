use anonka_common::UserId;

use crate::{delivery::DeliveryError, policy::DenyReason};

/// Why an inbound event could not be handled.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("user is not registered")]
    Unregistered,

    #[error("action not permitted for this role")]
    Forbidden,

    #[error("user {user_id} not found")]
    NotFound { user_id: UserId },

    /// Operator input that does not parse; the input itself is not logged.
    #[error("malformed input")]
    MalformedInput { input: String },

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Store(anonka_store::Error),
}

impl RelayError {
    pub fn malformed(input: impl Into<String>) -> Self {
        Self::MalformedInput {
            input: input.into(),
        }
    }

    /// Stable name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unregistered => "unregistered",
            Self::Forbidden => "forbidden",
            Self::NotFound { .. } => "not_found",
            Self::MalformedInput { .. } => "malformed_input",
            Self::Delivery(_) => "delivery_failed",
            Self::Store(_) => "store",
        }
    }
}

impl From<anonka_store::Error> for RelayError {
    fn from(err: anonka_store::Error) -> Self {
        match err {
            anonka_store::Error::NotFound { user_id } => Self::NotFound { user_id },
            other => Self::Store(other),
        }
    }
}

impl From<DenyReason> for RelayError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::Unregistered => Self::Unregistered,
            DenyReason::Forbidden => Self::Forbidden,
        }
    }
}

pub type Result<T, E = RelayError> = std::result::Result<T, E>;
