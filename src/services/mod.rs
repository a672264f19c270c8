pub mod activity;
pub mod conversation;
pub mod http_client;
pub mod proxy_pool;
pub mod session_manager;
pub mod signer;
pub mod stream_decoder;

pub use activity::ActivityExecutor;
pub use conversation::ConversationDriver;
pub use http_client::RetryClient;
pub use proxy_pool::ProxyPool;
pub use session_manager::{Session, SessionManager, SessionStore};
pub use signer::Account;
