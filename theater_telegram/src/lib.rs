//! Telegram front end: command parsing, API-key intake and delivery of
//! conversation turns into chats.

mod bot;
mod command;
mod error;
mod handler;
mod sink;

pub use bot::TelegramBot;
pub use command::{Command, is_valid_api_key};
pub use error::{Error, Result};
pub use sink::TelegramSink;
