//! Event handling: session transitions, authorization, relaying and the
//! operator's admin commands.

use std::sync::Arc;

use {
    anonka_common::{Role, UserId, UserRecord},
    anonka_config::{CountPolicy, RelayConfig},
    anonka_store::{UserStats, UserStore},
    futures::{Stream, StreamExt, stream},
    tracing::{debug, error, info, warn},
};

use crate::{
    content::Content,
    delivery::{ResilientDelivery, RetryPolicy},
    dispatch,
    error::{RelayError, Result},
    gateway::{Command, InboundEvent, InboundKind, Menu, MenuAction, MessagingGateway, Outbound},
    policy::{Action, Verdict, authorize},
    session::{AdminKind, SessionState, SessionTracker},
};

const BROADCAST_CONCURRENCY: usize = 4;

const RELAY_PROMPT: &str = "Send your anonymous message: text, photo, video, voice, sticker, \
                            document, contact or location.\n/cancel to abort.";
const RELAY_HINT: &str = "Press the button below to send an anonymous message.";
const RELAY_FAILED: &str = "Sorry, your message could not be delivered right now. \
                            Please send it again.";
const BROADCAST_PROMPT: &str = "Send the text to broadcast to every user, or /cancel.";
const PROMOTE_PROMPT: &str = "Send the numeric id of the user to promote, or /cancel.";
const TEXT_EXPECTED: &str = "Please send text, or /cancel to abort.";
const CANCELLED: &str = "Cancelled.";
const ADMIN_PANEL: &str = "Admin panel";
const NOT_REGISTERED: &str = "Please send /start first.";
const FORBIDDEN: &str = "You are not allowed to do that.";
const INTERNAL: &str = "Something went wrong, please try again later.";
const HELP: &str = "/start - show the menu\n/cancel - abort the current action\n/help - this message";
const OPERATOR_HELP: &str = "\n\nAdmin:\n/stats - user and message totals\n/broadcast - message \
                             every user\n/promote - make a user trusted";

/// Behaviour knobs of a [`RelayEngine`].
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Recipient of every relayed item.
    pub operator: UserId,
    pub greeting: String,
    pub default_answer: String,
    pub count_policy: CountPolicy,
    pub max_concurrent_events: usize,
}

impl RelayOptions {
    pub fn new(operator: UserId) -> Self {
        let defaults = RelayConfig::default();
        Self {
            operator,
            greeting: defaults.greeting,
            default_answer: defaults.default_answer,
            count_policy: defaults.count_policy,
            max_concurrent_events: defaults.max_concurrent_events,
        }
    }

    /// `None` when no primary operator is configured.
    pub fn from_config(config: &RelayConfig) -> Option<Self> {
        Some(Self {
            operator: config.operator?,
            greeting: config.greeting.clone(),
            default_answer: config.default_answer.clone(),
            count_policy: config.count_policy,
            max_concurrent_events: config.max_concurrent_events.max(1),
        })
    }
}

/// Ties the store, the session tracker and outbound delivery together.
pub struct RelayEngine {
    store: Arc<dyn UserStore>,
    sessions: SessionTracker,
    delivery: ResilientDelivery,
    options: RelayOptions,
}

impl RelayEngine {
    pub fn new(
        store: Arc<dyn UserStore>,
        gateway: Arc<dyn MessagingGateway>,
        retry: RetryPolicy,
        options: RelayOptions,
    ) -> Self {
        Self {
            store,
            sessions: SessionTracker::new(),
            delivery: ResilientDelivery::new(gateway, retry),
            options,
        }
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    /// Apply the configured role seed. Roles are only ever raised.
    pub async fn seed_roles(&self, operators: &[UserId], trusted: &[UserId]) -> Result<()> {
        self.store.seed_roles(Role::Operator, operators).await?;
        self.store.seed_roles(Role::Trusted, trusted).await?;
        info!(
            operators = operators.len(),
            trusted = trusted.len(),
            "role seed applied"
        );
        Ok(())
    }

    /// Handle events until the stream ends, at most `max_concurrent_events`
    /// at a time. Events of one identity are still handled one by one.
    pub async fn run(&self, events: impl Stream<Item = InboundEvent>) {
        let limit = self.options.max_concurrent_events.max(1);
        info!(operator = %self.options.operator, limit, "relay engine started");
        events
            .for_each_concurrent(limit, |event| self.handle(event))
            .await;
        info!("relay engine stopped");
    }

    /// Handle one event. Failures are reported to the sender and logged;
    /// they never propagate.
    pub async fn handle(&self, event: InboundEvent) {
        let user_id = event.from;
        let event_name = event.kind.name();
        let mut session = self.sessions.lock(user_id).await;
        debug!(user_id = %user_id, event = event_name, state = session.name(), "handling event");

        if let Err(err) = self.process(&event, &mut session).await {
            self.report(&event, &err).await;
        }
    }

    async fn process(&self, event: &InboundEvent, state: &mut SessionState) -> Result<()> {
        let id = event.from;
        let record = self.store.get_user(id).await?;

        match &event.kind {
            InboundKind::Command(Command::Start) => self.start(event, state).await,
            InboundKind::Command(Command::Cancel) => {
                *state = SessionState::Idle;
                self.reply(id, CANCELLED, menu_for(record.as_ref())).await
            },
            InboundKind::Command(Command::Help) => {
                self.reply(id, &help_for(record.as_ref()), None).await
            },
            InboundKind::Action(action) => self.menu_action(id, record, *action, state).await,
            InboundKind::Content(content) => self.content(id, record, content, state).await,
        }
    }

    async fn start(&self, event: &InboundEvent, state: &mut SessionState) -> Result<()> {
        let record = self
            .store
            .upsert_user(event.from, event.name.as_deref())
            .await?;
        if self.options.count_policy.counts_start() {
            self.store.increment_message_count(record.id).await?;
        }
        *state = SessionState::Idle;
        info!(user_id = %record.id, role = %record.role, "user started");

        if record.is_operator() {
            self.reply(record.id, &self.options.greeting, None).await?;
            self.reply(record.id, ADMIN_PANEL, Some(Menu::Admin)).await
        } else {
            self.reply(record.id, &self.options.greeting, Some(Menu::User))
                .await
        }
    }

    async fn menu_action(
        &self,
        id: UserId,
        record: Option<UserRecord>,
        action: MenuAction,
        state: &mut SessionState,
    ) -> Result<()> {
        let record = record.as_ref();
        match action {
            MenuAction::RequestRelay => {
                require(record, Action::RequestRelay)?;
                *state = SessionState::AwaitingRelayContent;
                self.reply(id, RELAY_PROMPT, None).await
            },
            MenuAction::Stats => {
                require(record, Action::ViewStats)?;
                *state = SessionState::Idle;
                let stats = self.store.stats().await?;
                self.reply(id, &render_stats(stats), Some(Menu::Admin)).await
            },
            MenuAction::Broadcast => {
                require(record, Action::Broadcast)?;
                *state = SessionState::AwaitingAdminReply(AdminKind::Broadcast);
                self.reply(id, BROADCAST_PROMPT, None).await
            },
            MenuAction::Promote => {
                require(record, Action::Promote)?;
                *state = SessionState::AwaitingAdminReply(AdminKind::Promote);
                self.reply(id, PROMOTE_PROMPT, None).await
            },
        }
    }

    async fn content(
        &self,
        id: UserId,
        record: Option<UserRecord>,
        content: &Content,
        state: &mut SessionState,
    ) -> Result<()> {
        let record = record
            .filter(|r| r.started)
            .ok_or(RelayError::Unregistered)?;

        match *state {
            SessionState::AwaitingAdminReply(kind) => {
                self.admin_reply(&record, kind, content, state).await
            },
            SessionState::Idle if looks_like_command(content) => {
                let text = format!("Unknown command.\n\n{}", help_for(Some(&record)));
                self.reply(id, &text, None).await
            },
            _ if record.is_operator() || id == self.options.operator => {
                debug!(user_id = %id, "ignoring content from operator");
                Ok(())
            },
            SessionState::AwaitingRelayContent => self.relay(&record, content, state).await,
            SessionState::Idle => self.reply(id, RELAY_HINT, Some(Menu::User)).await,
        }
    }

    async fn relay(
        &self,
        record: &UserRecord,
        content: &Content,
        state: &mut SessionState,
    ) -> Result<()> {
        require(Some(record), Action::SubmitContent)?;

        let sends = dispatch::plan(content);
        // If the content itself is not delivered the session stays in
        // AwaitingRelayContent so the user can simply resend.
        self.delivery
            .send_plan(self.options.operator, &sends)
            .await?;
        *state = SessionState::Idle;
        info!(user_id = %record.id, kind = content.kind().as_str(), "content relayed");

        if self.options.count_policy.counts_relay() {
            self.store.increment_message_count(record.id).await?;
        }
        self.reply(record.id, &self.options.default_answer, Some(Menu::User))
            .await
    }

    async fn admin_reply(
        &self,
        record: &UserRecord,
        kind: AdminKind,
        content: &Content,
        state: &mut SessionState,
    ) -> Result<()> {
        let action = match kind {
            AdminKind::Broadcast => Action::Broadcast,
            AdminKind::Promote => Action::Promote,
        };
        if let Err(err) = require(Some(record), action) {
            *state = SessionState::Idle;
            return Err(err);
        }
        let Some(text) = content.as_text() else {
            return self.reply(record.id, TEXT_EXPECTED, None).await;
        };

        *state = SessionState::Idle;
        match kind {
            AdminKind::Broadcast => self.broadcast(record.id, text).await,
            AdminKind::Promote => self.promote(record.id, text).await,
        }
    }

    async fn broadcast(&self, operator: UserId, text: &str) -> Result<()> {
        let recipients: Vec<UserRecord> = self
            .store
            .list_users(None)
            .await?
            .into_iter()
            .filter(|u| authorize(Some(u), Action::ReceiveBroadcast).is_allowed())
            .collect();
        let total = recipients.len();
        let message = Outbound::text(text);

        let delivered = stream::iter(&recipients)
            .map(|user| {
                let message = &message;
                async move {
                    match self.delivery.send(user.id, message).await {
                        Ok(_) => true,
                        Err(err) => {
                            warn!(
                                user_id = %user.id,
                                attempts = err.attempts,
                                error_kind = err.source.kind(),
                                "broadcast delivery failed"
                            );
                            false
                        },
                    }
                }
            })
            .buffer_unordered(BROADCAST_CONCURRENCY)
            .filter(|ok| futures::future::ready(*ok))
            .count()
            .await;

        info!(delivered, total, "broadcast finished");
        let report = format!("Broadcast delivered to {delivered}/{total} users.");
        self.reply(operator, &report, Some(Menu::Admin)).await
    }

    async fn promote(&self, operator: UserId, input: &str) -> Result<()> {
        let target: UserId = input.parse().map_err(|_| RelayError::malformed(input))?;
        let user = self
            .store
            .get_user(target)
            .await?
            .ok_or(RelayError::NotFound { user_id: target })?;

        let report = match user.role {
            Role::Standard => {
                self.store.set_role(target, Role::Trusted).await?;
                info!(user_id = %target, "user promoted to trusted");
                format!("User {target} is now trusted.")
            },
            role => format!("User {target} already has role {role}."),
        };
        self.reply(operator, &report, Some(Menu::Admin)).await
    }

    async fn reply(&self, to: UserId, text: &str, menu: Option<Menu>) -> Result<()> {
        let message = Outbound::Text {
            text: text.to_string(),
            menu,
        };
        self.delivery.send(to, &message).await?;
        Ok(())
    }

    /// Tell the sender what went wrong. Logs carry the error kind only.
    async fn report(&self, source: &InboundEvent, err: &RelayError) {
        let user_id = source.from;
        let event = source.kind.name();
        let text = match err {
            RelayError::Unregistered => {
                debug!(user_id = %user_id, event, "event from unregistered user");
                NOT_REGISTERED.to_string()
            },
            RelayError::Forbidden => {
                warn!(user_id = %user_id, event, "action denied");
                FORBIDDEN.to_string()
            },
            RelayError::NotFound { user_id: target } => {
                info!(user_id = %user_id, event, error_kind = err.kind(), "admin target not found");
                format!("User {target} not found.")
            },
            RelayError::MalformedInput { .. } => {
                info!(user_id = %user_id, event, error_kind = err.kind(), "malformed admin input");
                "That is not a numeric user id.".to_string()
            },
            RelayError::Delivery(delivery) => {
                warn!(
                    user_id = %user_id,
                    event,
                    recipient = %delivery.recipient,
                    attempts = delivery.attempts,
                    error_kind = delivery.source.kind(),
                    "delivery failed"
                );
                let relaying = matches!(source.kind, InboundKind::Content(_))
                    && delivery.recipient == self.options.operator;
                if relaying {
                    RELAY_FAILED.to_string()
                } else {
                    INTERNAL.to_string()
                }
            },
            RelayError::Store(store) => {
                error!(user_id = %user_id, event, error = %store, "store failure");
                INTERNAL.to_string()
            },
        };

        if let Err(e) = self.delivery.send(user_id, &Outbound::text(text)).await {
            warn!(
                user_id = %user_id,
                error_kind = e.source.kind(),
                "could not deliver error reply"
            );
        }
    }
}

fn require(record: Option<&UserRecord>, action: Action) -> Result<()> {
    match authorize(record, action) {
        Verdict::Allow => Ok(()),
        Verdict::Deny(reason) => Err(reason.into()),
    }
}

fn menu_for(record: Option<&UserRecord>) -> Option<Menu> {
    record.map(|r| {
        if r.is_operator() {
            Menu::Admin
        } else {
            Menu::User
        }
    })
}

fn help_for(record: Option<&UserRecord>) -> String {
    match record {
        Some(r) if r.is_operator() => format!("{HELP}{OPERATOR_HELP}"),
        _ => HELP.to_string(),
    }
}

/// Slash-prefixed text outside a prompt: most likely a mistyped command.
fn looks_like_command(content: &Content) -> bool {
    content.as_text().is_some_and(|t| t.starts_with('/'))
}

fn render_stats(stats: UserStats) -> String {
    format!(
        "📊 Statistics\nUsers: {}\nMessages: {}",
        stats.total_users, stats.total_messages
    )
}
