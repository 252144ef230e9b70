//! verify-bot — Telegram email verification that provisions Marzban accounts.

pub mod bot;
pub mod channels;
pub mod config;
pub mod error;
pub mod mail;
pub mod provision;
pub mod verify;
