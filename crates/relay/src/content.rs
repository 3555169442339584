/// Opaque transport-level handle of an uploaded file. Never inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef(pub String);

impl FileRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A captioned media item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub file: FileRef,
    pub caption: Option<String>,
}

impl Media {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: FileRef::new(file),
            caption: None,
        }
    }

    #[must_use]
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }
}

/// Closed set of content kinds the relay understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Text,
    Photo,
    Video,
    Document,
    Voice,
    Audio,
    Sticker,
    VideoNote,
    Contact,
    Location,
    Other,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Document => "document",
            Self::Voice => "voice",
            Self::Audio => "audio",
            Self::Sticker => "sticker",
            Self::VideoNote => "video_note",
            Self::Contact => "contact",
            Self::Location => "location",
            Self::Other => "other",
        }
    }
}

/// A piece of user content with its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text {
        text: String,
    },
    Photo(Media),
    Video(Media),
    Document(Media),
    Voice(Media),
    Audio(Media),
    Sticker {
        file: FileRef,
    },
    VideoNote {
        file: FileRef,
    },
    Contact {
        phone: String,
        first_name: String,
    },
    Location {
        latitude: f64,
        longitude: f64,
    },
    /// Anything the transport delivered that has no dedicated kind (polls,
    /// games, animations, ...). `label` names it for the operator.
    Other {
        label: String,
    },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn kind(&self) -> ContentKind {
        match self {
            Self::Text { .. } => ContentKind::Text,
            Self::Photo(_) => ContentKind::Photo,
            Self::Video(_) => ContentKind::Video,
            Self::Document(_) => ContentKind::Document,
            Self::Voice(_) => ContentKind::Voice,
            Self::Audio(_) => ContentKind::Audio,
            Self::Sticker { .. } => ContentKind::Sticker,
            Self::VideoNote { .. } => ContentKind::VideoNote,
            Self::Contact { .. } => ContentKind::Contact,
            Self::Location { .. } => ContentKind::Location,
            Self::Other { .. } => ContentKind::Other,
        }
    }

    /// The body of a text message, `None` for every other kind.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}
