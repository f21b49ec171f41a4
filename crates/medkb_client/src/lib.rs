//! Client library for the medical knowledge-base backend (config, HTTP API,
//! chat session). Used by the `medkb` terminal front end.

pub mod client;
pub mod config;
pub mod messages;
pub mod session;

pub use client::{ApiClient, ApiError, ChatBackend};
pub use config::{default_config_path, ApiSection, Config, ConfigError, Endpoints};
pub use messages::{ChatReply, DeleteReceipt, Document, HealthStatus, Source, UploadReceipt};
pub use session::{
    ChatSession, DefaultSources, Message, PendingExchange, Role, SessionOptions, APOLOGY,
};
