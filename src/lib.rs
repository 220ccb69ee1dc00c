pub mod adapter;
pub mod auth;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod forward;
pub mod http;
pub mod llm;
pub mod selector;
pub mod server;
