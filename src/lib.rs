pub mod commands;
pub mod config;
pub mod error;
pub mod i18n;
pub mod message_log;
pub mod pipeline;
pub mod retry;
pub mod roster;
pub mod server;
pub mod store;
pub mod translation;
pub mod whatsapp;
