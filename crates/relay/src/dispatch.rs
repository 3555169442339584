//! Maps inbound content to the outbound sends that reproduce it for the
//! operator without any trace of the sender.

use crate::{
    content::{Content, Media},
    gateway::{MediaKind, Outbound},
};

/// Prefix of relayed text messages.
pub const TEXT_MARKER: &str = "✉️";

const NO_CAPTION: &str = "none";

/// The sends that relay `content`, in order.
///
/// Every kind maps to exactly one send, except stickers, which carry no
/// caption and get a follow-up text announcement.
pub fn plan(content: &Content) -> Vec<Outbound> {
    match content {
        Content::Text { text } => vec![Outbound::text(format!("{TEXT_MARKER} {text}"))],
        Content::Photo(media) => vec![announced(MediaKind::Photo, media)],
        Content::Video(media) => vec![announced(MediaKind::Video, media)],
        Content::Document(media) => vec![announced(MediaKind::Document, media)],
        Content::Voice(media) => vec![announced(MediaKind::Voice, media)],
        Content::Audio(media) => vec![announced(MediaKind::Audio, media)],
        Content::Sticker { file } => vec![
            Outbound::Media {
                kind: MediaKind::Sticker,
                file: file.clone(),
                caption: None,
            },
            Outbound::text(format!("Anonymous {}", MediaKind::Sticker.label())),
        ],
        // Round videos take no caption and are self-describing.
        Content::VideoNote { file } => vec![Outbound::Media {
            kind: MediaKind::VideoNote,
            file: file.clone(),
            caption: None,
        }],
        Content::Contact { phone, first_name } => vec![Outbound::Contact {
            phone: phone.clone(),
            first_name: first_name.clone(),
        }],
        Content::Location {
            latitude,
            longitude,
        } => vec![Outbound::Location {
            latitude: *latitude,
            longitude: *longitude,
        }],
        Content::Other { label } => vec![Outbound::text(format!(
            "Anonymous message\nContent type: {label}"
        ))],
    }
}

fn announced(kind: MediaKind, media: &Media) -> Outbound {
    let caption = media
        .caption
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(NO_CAPTION);
    Outbound::Media {
        kind,
        file: media.file.clone(),
        caption: Some(format!("Anonymous {}\nCaption: {caption}", kind.label())),
    }
}
