//! Translation of Telegram updates into relay events.

use {
    anonka_common::UserId,
    anonka_relay::{Command, Content, FileRef, InboundEvent, InboundKind, Media, MenuAction},
    teloxide::types::{CallbackQuery, MediaKind, Message, MessageKind, User},
    tracing::debug,
};

use crate::keyboards;

/// Map a message to an event. Group chats, bots and service messages yield
/// `None`.
pub fn message_event(msg: &Message) -> Option<InboundEvent> {
    if !msg.chat.is_private() {
        debug!(chat_id = msg.chat.id.0, "ignoring message outside a private chat");
        return None;
    }
    let user = msg.from.as_ref().filter(|u| !u.is_bot)?;
    let content = content_of(msg)?;
    let kind = match content.as_text().and_then(parse_command) {
        Some(kind) => kind,
        None => InboundKind::Content(content),
    };
    Some(InboundEvent::new(sender_id(user)?, kind).with_name(user.full_name()))
}

/// Map an inline-button press to an event. Unknown payloads yield `None`.
pub fn callback_event(query: &CallbackQuery) -> Option<InboundEvent> {
    let action = keyboards::parse_callback(query.data.as_deref()?)?;
    let user = &query.from;
    Some(InboundEvent::action(sender_id(user)?, action).with_name(user.full_name()))
}

fn sender_id(user: &User) -> Option<UserId> {
    i64::try_from(user.id.0).ok().map(UserId)
}

/// `/start`, `/cancel` and `/help` are commands; the admin commands are
/// shortcuts for the admin panel buttons. Other slash words stay content.
fn parse_command(text: &str) -> Option<InboundKind> {
    let word = text.split_whitespace().next()?.strip_prefix('/')?;
    let name = word.split('@').next().unwrap_or_default().to_ascii_lowercase();
    let kind = match name.as_str() {
        "start" => InboundKind::Command(Command::Start),
        "cancel" => InboundKind::Command(Command::Cancel),
        "help" => InboundKind::Command(Command::Help),
        "stats" => InboundKind::Action(MenuAction::Stats),
        "broadcast" => InboundKind::Action(MenuAction::Broadcast),
        "promote" => InboundKind::Action(MenuAction::Promote),
        _ => return None,
    };
    Some(kind)
}

fn content_of(msg: &Message) -> Option<Content> {
    let common = match &msg.kind {
        MessageKind::Common(common) => common,
        MessageKind::Dice(_) => return Some(other("dice")),
        _ => return None,
    };

    let content = match &common.media_kind {
        MediaKind::Text(t) => Content::text(t.text.clone()),
        // Largest size is last.
        MediaKind::Photo(p) => Content::Photo(media(&p.photo.last()?.file.id, &p.caption)),
        MediaKind::Video(v) => Content::Video(media(&v.video.file.id, &v.caption)),
        MediaKind::Document(d) => Content::Document(media(&d.document.file.id, &d.caption)),
        MediaKind::Voice(v) => Content::Voice(media(&v.voice.file.id, &v.caption)),
        MediaKind::Audio(a) => Content::Audio(media(&a.audio.file.id, &a.caption)),
        MediaKind::Sticker(s) => Content::Sticker {
            file: FileRef::new(s.sticker.file.id.clone()),
        },
        MediaKind::VideoNote(v) => Content::VideoNote {
            file: FileRef::new(v.video_note.file.id.clone()),
        },
        MediaKind::Contact(c) => Content::Contact {
            phone: c.contact.phone_number.clone(),
            first_name: c.contact.first_name.clone(),
        },
        MediaKind::Location(l) => Content::Location {
            latitude: l.location.latitude,
            longitude: l.location.longitude,
        },
        MediaKind::Animation(_) => other("animation"),
        MediaKind::Poll(_) => other("poll"),
        MediaKind::Venue(_) => other("venue"),
        MediaKind::Game(_) => other("game"),
        _ => other("message"),
    };
    Some(content)
}

fn media(file_id: &str, caption: &Option<String>) -> Media {
    Media {
        file: FileRef::new(file_id),
        caption: caption.clone(),
    }
}

fn other(label: &str) -> Content {
    Content::Other {
        label: label.to_string(),
    }
}
