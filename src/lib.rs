pub mod assistant;
pub mod chat;
pub mod config;
pub mod feedback;
pub mod models;
pub mod phrase;
pub mod rewrite;
pub mod server;

pub use config::AppConfig;
pub use server::run_server;
