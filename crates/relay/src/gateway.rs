//! Transport contract between the relay engine and a messaging channel.
//!
//! The engine never sees transport types: adapters translate their native
//! updates into [`InboundEvent`]s and render [`Outbound`] messages back.

use std::time::Duration;

use {anonka_common::UserId, async_trait::async_trait, futures::stream::BoxStream};

use crate::content::{Content, FileRef};

/// Stream of inbound events produced by a transport adapter. Ends when the
/// adapter shuts down.
pub type InboundStream = BoxStream<'static, InboundEvent>;

/// Slash commands the relay reacts to. Any other slash-prefixed text is
/// ordinary content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Cancel,
    Help,
}

/// Buttons of the user menu and the admin panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    RequestRelay,
    Stats,
    Broadcast,
    Promote,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundKind {
    Command(Command),
    Action(MenuAction),
    Content(Content),
}

impl InboundKind {
    /// Short name used in log fields. Never includes payload.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Command(Command::Start) => "start",
            Self::Command(Command::Cancel) => "cancel",
            Self::Command(Command::Help) => "help",
            Self::Action(MenuAction::RequestRelay) => "request_relay",
            Self::Action(MenuAction::Stats) => "stats",
            Self::Action(MenuAction::Broadcast) => "broadcast",
            Self::Action(MenuAction::Promote) => "promote",
            Self::Content(content) => content.kind().as_str(),
        }
    }
}

/// One inbound update, already attributed to a sender.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub from: UserId,
    /// Display name as reported by the transport.
    pub name: Option<String>,
    pub kind: InboundKind,
}

impl InboundEvent {
    pub fn new(from: UserId, kind: InboundKind) -> Self {
        Self {
            from,
            name: None,
            kind,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn command(from: UserId, command: Command) -> Self {
        Self::new(from, InboundKind::Command(command))
    }

    pub fn action(from: UserId, action: MenuAction) -> Self {
        Self::new(from, InboundKind::Action(action))
    }

    pub fn content(from: UserId, content: Content) -> Self {
        Self::new(from, InboundKind::Content(content))
    }
}

/// Keyboard attached to a text message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Menu {
    /// "Send anonymous message".
    User,
    /// Stats, broadcast and promote.
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Document,
    Voice,
    Audio,
    Sticker,
    VideoNote,
}

impl MediaKind {
    /// Human-readable name used in operator-facing announcements.
    pub fn label(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Document => "document",
            Self::Voice => "voice message",
            Self::Audio => "audio",
            Self::Sticker => "sticker",
            Self::VideoNote => "video note",
        }
    }
}

/// One outbound send operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text {
        text: String,
        menu: Option<Menu>,
    },
    Media {
        kind: MediaKind,
        file: FileRef,
        caption: Option<String>,
    },
    Contact {
        phone: String,
        first_name: String,
    },
    Location {
        latitude: f64,
        longitude: f64,
    },
}

impl Outbound {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            menu: None,
        }
    }

    pub fn with_menu(text: impl Into<String>, menu: Menu) -> Self {
        Self::Text {
            text: text.into(),
            menu: Some(menu),
        }
    }

    /// Name of the transport operation, for logs.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Text { .. } => "send_text",
            Self::Media { kind, .. } => match kind {
                MediaKind::Photo => "send_photo",
                MediaKind::Video => "send_video",
                MediaKind::Document => "send_document",
                MediaKind::Voice => "send_voice",
                MediaKind::Audio => "send_audio",
                MediaKind::Sticker => "send_sticker",
                MediaKind::VideoNote => "send_video_note",
            },
            Self::Contact { .. } => "send_contact",
            Self::Location { .. } => "send_location",
        }
    }
}

/// Transport-assigned id of a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef(pub String);

/// Classified outbound failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("transport temporarily unavailable: {message}")]
    Transient { message: String },

    #[error("rate limited by transport")]
    RateLimited { retry_after: Option<Duration> },

    #[error("recipient unreachable: {message}")]
    Unreachable { message: String },

    #[error("request rejected: {message}")]
    Rejected { message: String },
}

impl GatewayError {
    pub fn transient(message: impl std::fmt::Display) -> Self {
        Self::Transient {
            message: message.to_string(),
        }
    }

    pub fn unreachable(message: impl std::fmt::Display) -> Self {
        Self::Unreachable {
            message: message.to_string(),
        }
    }

    pub fn rejected(message: impl std::fmt::Display) -> Self {
        Self::Rejected {
            message: message.to_string(),
        }
    }

    /// Whether a retry of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::RateLimited { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transient { .. } => "transient",
            Self::RateLimited { .. } => "rate_limited",
            Self::Unreachable { .. } => "unreachable",
            Self::Rejected { .. } => "rejected",
        }
    }
}

/// Outbound half of a messaging transport.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send(&self, to: UserId, message: &Outbound) -> Result<MessageRef, GatewayError>;
}
