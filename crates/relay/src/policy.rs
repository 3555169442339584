//! Role-based authorization. Pure: no I/O, no state.

use anonka_common::{Role, UserRecord};

/// Everything a user can ask the relay to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    RequestRelay,
    SubmitContent,
    ViewStats,
    Broadcast,
    Promote,
    /// Being a broadcast recipient.
    ReceiveBroadcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No record exists yet, or the user never sent `/start`.
    Unregistered,
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny(DenyReason),
}

impl Verdict {
    pub fn is_allowed(self) -> bool {
        self == Self::Allow
    }
}

/// Decide whether the holder of `record` may perform `action`.
pub fn authorize(record: Option<&UserRecord>, action: Action) -> Verdict {
    if action == Action::Start {
        return Verdict::Allow;
    }
    let Some(record) = record.filter(|r| r.started) else {
        return Verdict::Deny(DenyReason::Unregistered);
    };
    let allowed = match action {
        Action::Start => true,
        Action::RequestRelay | Action::SubmitContent | Action::ReceiveBroadcast => {
            record.role != Role::Operator
        },
        Action::ViewStats | Action::Broadcast | Action::Promote => record.role == Role::Operator,
    };
    if allowed {
        Verdict::Allow
    } else {
        Verdict::Deny(DenyReason::Forbidden)
    }
}
