//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `otp` - One-time passcode challenges for phone login
//! - `auth` - Bearer token resolution, account creation, profile updates
//! - `cart` - Cart mutations with captured unit prices
//! - `reconcile` - Merging a pre-login guest cart into the account cart
//! - `orders` - Payment intents, payment verification and order placement
//!
//! Services borrow their repositories and are cheap to build per request.

pub mod auth;
pub mod cart;
pub mod orders;
pub mod otp;
pub mod reconcile;
