//! # BrickMap Common Library
//!
//! Shared code for the BrickMap services:
//! - Error type shared across crates
//! - Root folder and TOML bootstrap configuration
//! - SQLite schema initialization for the catalog and mapping tables

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
