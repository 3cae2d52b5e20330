pub mod chat;
pub mod config;
pub mod logs;
pub mod remind;
pub mod server;
pub mod tips;
