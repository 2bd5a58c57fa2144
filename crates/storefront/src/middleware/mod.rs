//! HTTP middleware stack for the storefront API.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (hub per request, capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. CORS
//! 5. Rate limiting on the OTP endpoints (governor)
//!
//! Bearer authentication is an extractor, not a layer: see [`RequireUser`].

pub mod auth;
pub mod rate_limit;
pub mod request_id;

pub use auth::RequireUser;
pub use rate_limit::otp_rate_limiter;
pub use request_id::request_id_middleware;
