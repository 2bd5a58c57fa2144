//! Tap'n'Tag Core - Shared domain types.
//!
//! This crate provides the value types used across the Tap'n'Tag components:
//! - `storefront` - REST API for catalog, cart, checkout and accounts
//! - `cli` - Command-line tools for migrations and catalog seeding
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no database access,
//! no HTTP clients. Anything that parses here can be trusted downstream.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, phone numbers, emails, quantities, prices and order status

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
