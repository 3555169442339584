use {
    anonka_common::UserId,
    anonka_relay::{GatewayError, MediaKind, MessageRef, MessagingGateway, Outbound},
    async_trait::async_trait,
    teloxide::{
        RequestError,
        payloads::setters::*,
        prelude::*,
        types::{ChatId, InputFile},
    },
    tracing::debug,
};

use crate::{error::classify, keyboards};

/// Bot API limit for message text, in UTF-16 code units.
const TEXT_LIMIT: usize = 4096;
/// Bot API limit for media captions, in UTF-16 code units.
const CAPTION_LIMIT: usize = 1024;

/// Send a media request, attaching the caption when there is one.
macro_rules! captioned {
    ($req:expr, $caption:expr) => {{
        let mut req = $req;
        if let Some(caption) = $caption {
            req = req.caption(caption);
        }
        req.await
    }};
}

/// Outbound half of the Telegram transport.
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn dispatch(&self, chat_id: ChatId, message: &Outbound) -> Result<Message, RequestError> {
        let bot = &self.bot;
        match message {
            Outbound::Text { text, menu } => {
                let mut req = bot.send_message(chat_id, clamp(text, TEXT_LIMIT));
                if let Some(menu) = menu {
                    req = req.reply_markup(keyboards::markup(*menu));
                }
                req.await
            },
            Outbound::Media {
                kind,
                file,
                caption,
            } => {
                let input = InputFile::file_id(file.as_str().to_string());
                let caption = caption.as_deref().map(|c| clamp(c, CAPTION_LIMIT));
                match kind {
                    MediaKind::Photo => captioned!(bot.send_photo(chat_id, input), caption),
                    MediaKind::Video => captioned!(bot.send_video(chat_id, input), caption),
                    MediaKind::Document => captioned!(bot.send_document(chat_id, input), caption),
                    MediaKind::Voice => captioned!(bot.send_voice(chat_id, input), caption),
                    MediaKind::Audio => captioned!(bot.send_audio(chat_id, input), caption),
                    MediaKind::Sticker => bot.send_sticker(chat_id, input).await,
                    MediaKind::VideoNote => bot.send_video_note(chat_id, input).await,
                }
            },
            Outbound::Contact { phone, first_name } => {
                bot.send_contact(chat_id, phone, first_name).await
            },
            Outbound::Location {
                latitude,
                longitude,
            } => bot.send_location(chat_id, *latitude, *longitude).await,
        }
    }
}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    async fn send(&self, to: UserId, message: &Outbound) -> Result<MessageRef, GatewayError> {
        let operation = message.operation();
        match self.dispatch(ChatId(to.get()), message).await {
            Ok(sent) => {
                debug!(user_id = %to, operation, message_id = sent.id.0, "telegram send ok");
                Ok(MessageRef(sent.id.0.to_string()))
            },
            Err(e) => {
                let classified = classify(&e);
                debug!(
                    user_id = %to,
                    operation,
                    error_kind = classified.kind(),
                    error = %e,
                    "telegram send failed"
                );
                Err(classified)
            },
        }
    }
}

/// Cut `text` to at most `limit` UTF-16 code units, the unit Telegram counts
/// in. Never splits a character.
fn clamp(text: &str, limit: usize) -> String {
    let mut units = 0;
    for (idx, ch) in text.char_indices() {
        units += ch.len_utf16();
        if units > limit {
            return text[..idx].to_string();
        }
    }
    text.to_string()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use {
        super::*,
        anonka_relay::{FileRef, Menu},
        axum::{Json, Router, body::Bytes, extract::State, http::Uri, routing::post},
        serde_json::{Value, json},
        tokio::sync::oneshot,
    };

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        method: String,
        body: Value,
    }

    /// Scripted Bot API: records every call and answers with `reply`.
    #[derive(Clone)]
    struct MockTelegramApi {
        requests: Arc<Mutex<Vec<CapturedRequest>>>,
        reply: Arc<Value>,
    }

    async fn telegram_api_handler(
        State(state): State<MockTelegramApi>,
        uri: Uri,
        body: Bytes,
    ) -> Json<Value> {
        let method = uri.path().rsplit('/').next().unwrap_or_default().to_string();
        let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
        state
            .requests
            .lock()
            .expect("lock requests")
            .push(CapturedRequest { method, body });
        Json((*state.reply).clone())
    }

    fn ok_message() -> Value {
        json!({
            "ok": true,
            "result": {
                "message_id": 77,
                "date": 0,
                "chat": { "id": 42, "type": "private", "first_name": "Op" },
                "text": "ok"
            }
        })
    }

    struct MockServer {
        requests: Arc<Mutex<Vec<CapturedRequest>>>,
        gateway: TelegramGateway,
        shutdown: oneshot::Sender<()>,
        server: tokio::task::JoinHandle<()>,
    }

    impl MockServer {
        async fn start(reply: Value) -> Self {
            let requests = Arc::new(Mutex::new(Vec::new()));
            let app = Router::new()
                .route("/{*path}", post(telegram_api_handler))
                .with_state(MockTelegramApi {
                    requests: Arc::clone(&requests),
                    reply: Arc::new(reply),
                });

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("bind test listener");
            let addr = listener.local_addr().expect("local addr");
            let (shutdown, shutdown_rx) = oneshot::channel::<()>();
            let server = tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    })
                    .await
                    .expect("serve mock telegram api");
            });

            let api_url = reqwest::Url::parse(&format!("http://{addr}/")).expect("parse api url");
            let bot = Bot::new("test-token").set_api_url(api_url);
            Self {
                requests,
                gateway: TelegramGateway::new(bot),
                shutdown,
                server,
            }
        }

        fn requests(&self) -> Vec<CapturedRequest> {
            self.requests.lock().expect("requests lock").clone()
        }

        async fn stop(self) {
            let _ = self.shutdown.send(());
            self.server.await.expect("server join");
        }
    }

    #[tokio::test]
    async fn text_with_menu_sends_inline_keyboard() {
        let mock = MockServer::start(ok_message()).await;

        let sent = mock
            .gateway
            .send(UserId(42), &Outbound::with_menu("hello", Menu::User))
            .await
            .expect("send text");
        assert_eq!(sent, MessageRef("77".into()));

        let requests = mock.requests();
        assert_eq!(requests.len(), 1, "requests={requests:?}");
        assert_eq!(requests[0].method, "SendMessage");
        assert_eq!(requests[0].body["chat_id"], 42);
        assert_eq!(requests[0].body["text"], "hello");
        assert_eq!(
            requests[0].body["reply_markup"]["inline_keyboard"][0][0]["callback_data"],
            keyboards::SEND_MESSAGE
        );
        mock.stop().await;
    }

    #[tokio::test]
    async fn photo_is_sent_by_file_id_with_caption() {
        let mock = MockServer::start(ok_message()).await;

        mock.gateway
            .send(UserId(42), &Outbound::Media {
                kind: MediaKind::Photo,
                file: FileRef::new("photo-file-id"),
                caption: Some("Anonymous photo\nCaption: none".into()),
            })
            .await
            .expect("send photo");

        let requests = mock.requests();
        assert_eq!(requests[0].method, "SendPhoto", "requests={requests:?}");
        mock.stop().await;
    }

    #[tokio::test]
    async fn blocked_user_is_unreachable() {
        let mock = MockServer::start(json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot was blocked by the user"
        }))
        .await;

        let err = mock
            .gateway
            .send(UserId(42), &Outbound::text("hello"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unreachable");
        mock.stop().await;
    }

    #[tokio::test]
    async fn flood_control_is_rate_limited() {
        let mock = MockServer::start(json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests: retry after 3",
            "parameters": { "retry_after": 3 }
        }))
        .await;

        let err = mock
            .gateway
            .send(UserId(42), &Outbound::text("hello"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.retry_after(), Some(std::time::Duration::from_secs(3)));
        mock.stop().await;
    }

    fn utf16_len(text: &str) -> usize {
        text.encode_utf16().count()
    }

    #[test]
    fn clamp_counts_utf16_units() {
        assert_eq!(clamp("héllo", 2), "hé");
        assert_eq!(clamp("short", 10), "short");
        assert_eq!(clamp(&"✉".repeat(5000), TEXT_LIMIT).chars().count(), 4096);
    }

    #[test]
    fn clamp_keeps_astral_characters_whole() {
        // Each emoji is two UTF-16 units.
        assert_eq!(clamp("😀😀😀", 3), "😀");
        assert_eq!(clamp("😀😀😀", 4), "😀😀");

        let relayed = format!("✉️ {}", "😀".repeat(TEXT_LIMIT / 2));
        let clamped = clamp(&relayed, TEXT_LIMIT);
        assert!(utf16_len(&clamped) <= TEXT_LIMIT);
        assert!(clamped.starts_with("✉️ "));
        assert!(clamped.ends_with('😀'));
    }

    #[tokio::test]
    async fn long_emoji_text_fits_the_api_limit() {
        let mock = MockServer::start(ok_message()).await;

        mock.gateway
            .send(UserId(42), &Outbound::text("😀".repeat(TEXT_LIMIT)))
            .await
            .expect("send text");

        let requests = mock.requests();
        let sent = requests[0].body["text"].as_str().expect("text field");
        assert_eq!(utf16_len(sent), TEXT_LIMIT);
        mock.stop().await;
    }
}
