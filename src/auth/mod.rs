//! Authentication contract and built-in strategies.
//!
//! Three built-ins cover the common cases: [`strategy::NoAuth`] for public
//! endpoints, [`strategy::StaticBearerStrategy`] for a fixed token, and
//! [`strategy::OAuth2ClientCredentials`] for providers that issue short-lived
//! bearer tokens via the client-credentials grant. Concrete clients may
//! implement [`strategy::AuthStrategy`] directly for anything else (e.g. a
//! query-parameter "polite pool" contact-email strategy some scholarly APIs
//! use — see DESIGN.md).

pub mod strategy;

pub use strategy::{AuthStrategy, NoAuth, OAuth2ClientCredentials, StaticBearerStrategy};
