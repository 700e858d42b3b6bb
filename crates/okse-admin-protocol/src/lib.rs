//! Okse Admin Protocol - endpoint vocabulary and payload types
//!
//! Describes the broker's admin REST API as seen by the console: which tabs
//! exist, which relative endpoint backs each of them, the JSON payloads they
//! return, the CSRF credential every call carries, and how failed calls are
//! classified.

pub mod csrf;
pub mod endpoints;
pub mod error;
pub mod payloads;

pub use csrf::CsrfCredential;
pub use endpoints::*;
pub use error::*;
pub use payloads::*;
