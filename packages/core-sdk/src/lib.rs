pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod models;
pub mod persist;
pub mod prompt;
pub mod relay;
pub mod server;
pub mod telemetry;

/**
 * \brief Common re-exports for SDK consumers.
 */
pub mod prelude {
    pub use crate::auth::{CurrentUser, SessionResolver};
    pub use crate::chat::ProviderRoute;
    pub use crate::config::ChatConfig;
    pub use crate::llm::{ChatProvider, ProviderCall, TokenStream};
    pub use crate::models::{ChatRecord, ChatRequest, ChatSettings, Message, Role, SessionUser};
    pub use crate::persist::ChatStore;
    pub use crate::server::AppState;
}
