//! Shared legal Q&A client library (config, backend wire contract, query
//! transport, streaming session controller). Used by the CLI front-end;
//! renders nothing itself.

pub mod client;
pub mod config;
pub mod messages;
pub mod session;

pub use client::{QueryClient, QueryError, StreamConnection, StreamEvent, StreamHandle};
pub use config::{default_config_path, ApiSection, ChatSection, Config, ConfigError};
pub use messages::{
    ConversationHistory, ConversationMessage, QueryRequest, QueryResponse, ResponseMetadata,
    Source, StreamChunk,
};
pub use session::{Phase, SessionController, SessionSnapshot};
