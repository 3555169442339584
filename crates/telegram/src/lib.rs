//! Telegram transport for the anonymous relay.
//!
//! Long-polls the Bot API with teloxide, turns private-chat messages and
//! inline-button presses into relay events, and renders outbound relay
//! messages (text with menus, media by file id, contacts, locations).

pub mod bot;
pub mod config;
pub mod error;
pub mod handlers;
pub mod keyboards;
pub mod outbound;

pub use {
    bot::{TelegramChannel, start_polling},
    config::TelegramConfig,
    error::{Error, Result},
    outbound::TelegramGateway,
};
