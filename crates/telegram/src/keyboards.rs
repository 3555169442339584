//! Inline keyboards and their callback payloads.

use {
    anonka_relay::{Menu, MenuAction},
    teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup},
};

pub const SEND_MESSAGE: &str = "send_message";
pub const ADMIN_STATS: &str = "admin_stats";
pub const ADMIN_BROADCAST: &str = "admin_broadcast";
pub const ADMIN_PROMOTE: &str = "admin_promote";

pub fn markup(menu: Menu) -> InlineKeyboardMarkup {
    let rows = match menu {
        Menu::User => vec![vec![InlineKeyboardButton::callback(
            "✉️ Send anonymous message",
            SEND_MESSAGE,
        )]],
        Menu::Admin => vec![
            vec![InlineKeyboardButton::callback("📊 Statistics", ADMIN_STATS)],
            vec![InlineKeyboardButton::callback("📢 Broadcast", ADMIN_BROADCAST)],
            vec![InlineKeyboardButton::callback("⭐ Promote user", ADMIN_PROMOTE)],
        ],
    };
    InlineKeyboardMarkup::new(rows)
}

/// Callback data back to the button it came from.
pub fn parse_callback(data: &str) -> Option<MenuAction> {
    match data {
        SEND_MESSAGE => Some(MenuAction::RequestRelay),
        ADMIN_STATS => Some(MenuAction::Stats),
        ADMIN_BROADCAST => Some(MenuAction::Broadcast),
        ADMIN_PROMOTE => Some(MenuAction::Promote),
        _ => None,
    }
}
