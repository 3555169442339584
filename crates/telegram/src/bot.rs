use std::time::Duration;

use {
    anonka_relay::{InboundEvent, InboundStream},
    futures::StreamExt,
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, BotCommand, Update, UpdateKind},
    },
    tokio::sync::mpsc,
    tokio_stream::wrappers::ReceiverStream,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{config::TelegramConfig, error::Result, handlers, outbound::TelegramGateway};

/// Pause after a failed `getUpdates` before polling again.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// A connected bot: the outbound gateway plus the stream of inbound events.
pub struct TelegramChannel {
    pub gateway: TelegramGateway,
    pub events: InboundStream,
}

/// Connect to the Bot API and spawn the long-polling loop.
///
/// The event stream ends once `cancel` fires or another instance takes over
/// the token.
pub async fn start_polling(
    config: TelegramConfig,
    cancel: CancellationToken,
) -> Result<TelegramChannel> {
    // Client timeout longer than the long-polling timeout so the HTTP client
    // does not abort a request Telegram is still holding open.
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(u64::from(config.poll_timeout_secs) + 15))
        .build()?;
    let bot = Bot::with_client(config.token.expose_secret(), client);

    let me = bot.get_me().await?;

    bot.delete_webhook().send().await?;

    if config.register_commands {
        let commands = vec![
            BotCommand::new("start", "Show the menu"),
            BotCommand::new("cancel", "Abort the current action"),
            BotCommand::new("help", "Show available commands"),
            BotCommand::new("stats", "User and message totals (admin)"),
            BotCommand::new("broadcast", "Message every user (admin)"),
            BotCommand::new("promote", "Make a user trusted (admin)"),
        ];
        if let Err(e) = bot.set_my_commands(commands).await {
            warn!("failed to register bot commands: {e}");
        }
    }

    info!(username = ?me.username, "telegram bot connected (webhook cleared)");

    let (tx, rx) = mpsc::channel(config.event_buffer.max(1));
    tokio::spawn(poll_loop(
        bot.clone(),
        config.poll_timeout_secs,
        tx,
        cancel,
    ));

    Ok(TelegramChannel {
        gateway: TelegramGateway::new(bot),
        events: ReceiverStream::new(rx).boxed(),
    })
}

async fn poll_loop(
    bot: Bot,
    timeout_secs: u32,
    tx: mpsc::Sender<InboundEvent>,
    cancel: CancellationToken,
) {
    info!("starting telegram polling loop");
    let mut offset: i32 = 0;

    loop {
        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = bot
                .get_updates()
                .offset(offset)
                .timeout(timeout_secs)
                .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
                .send() => result,
        };

        match result {
            Ok(updates) => {
                debug!(count = updates.len(), "got telegram updates");
                for update in updates {
                    offset = update.id.as_offset();
                    let Some(event) = translate(&bot, update).await else {
                        continue;
                    };
                    if tx.send(event).await.is_err() {
                        info!("event receiver dropped, stopping telegram polling");
                        return;
                    }
                }
            },
            Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                error!("telegram polling stopped: another instance is running with this token");
                cancel.cancel();
                break;
            },
            Err(e) => {
                warn!(error = %e, "telegram getUpdates failed");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(POLL_ERROR_BACKOFF) => {},
                }
            },
        }
    }
    info!("telegram polling stopped");
}

async fn translate(bot: &Bot, update: Update) -> Option<InboundEvent> {
    match update.kind {
        UpdateKind::Message(msg) => handlers::message_event(&msg),
        UpdateKind::CallbackQuery(query) => {
            // Dismiss the client's loading spinner whatever the payload.
            if let Err(e) = bot.answer_callback_query(&query.id).await {
                debug!(error = %e, "failed to answer callback query");
            }
            handlers::callback_event(&query)
        },
        other => {
            debug!("ignoring update: {other:?}");
            None
        },
    }
}
