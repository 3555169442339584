//! Anonymous relay engine.
//!
//! Receives inbound events from a [`gateway::MessagingGateway`] transport,
//! tracks per-user conversation state, authorizes actions by role, forwards
//! user content to the operator without revealing the sender, and keeps the
//! per-user message counters in an [`anonka_store::UserStore`].

pub mod content;
pub mod delivery;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod policy;
pub mod session;

pub use {
    content::{Content, ContentKind, FileRef, Media},
    delivery::{DeliveryError, ResilientDelivery, RetryPolicy},
    engine::{RelayEngine, RelayOptions},
    error::{RelayError, Result},
    gateway::{
        Command, GatewayError, InboundEvent, InboundKind, InboundStream, MediaKind, Menu,
        MenuAction, MessageRef, MessagingGateway, Outbound,
    },
    session::{AdminKind, SessionState, SessionTracker},
};
