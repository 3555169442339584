use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use crate::error::{Error, Result};

/// Bot account settings, read from `[channels.telegram]`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Long-polling timeout passed to `getUpdates` (seconds).
    pub poll_timeout_secs: u32,

    /// Register the slash commands for client autocomplete on startup.
    pub register_commands: bool,

    /// Capacity of the queue between the poller and the relay engine.
    pub event_buffer: usize,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("register_commands", &self.register_commands)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            poll_timeout_secs: 30,
            register_commands: true,
            event_buffer: 256,
        }
    }
}

impl TelegramConfig {
    /// Parse the opaque `[channels.telegram]` table. A token is required.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value)
            .map_err(|e| Error::external("invalid [channels.telegram] section", e))?;
        if config.token.expose_secret().trim().is_empty() {
            return Err(Error::message(
                "telegram bot token is missing (set channels.telegram.token or ANONKA_TELEGRAM_TOKEN)",
            ));
        }
        Ok(config)
    }
}
