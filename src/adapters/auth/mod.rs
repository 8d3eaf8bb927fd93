//! Authentication adapters.
//!
//! Implementations of the `AuthVerifier` port:
//!
//! - `backend` - HTTP lookup against the application backend
//! - `mock` - Static token table for tests

mod backend;
mod mock;

pub use backend::BackendVerifier;
pub use mock::StaticVerifier;
