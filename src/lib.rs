pub mod butler;
pub mod chat;
pub mod config;
pub mod dispatch;
pub mod sender;
pub mod shutdown;
pub mod store;
pub mod watchers;
