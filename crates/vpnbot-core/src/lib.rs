//! Core domain + application logic for the VPN subscription bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and the SHM billing
//! API live behind ports (traits) implemented in adapter crates.

pub mod account;
pub mod backend;
pub mod command;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod router;
pub mod screens;
pub mod session;
pub mod trial;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
