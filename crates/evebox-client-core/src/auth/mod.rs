//! Session token storage.
//!
//! This module provides:
//! - `SessionStore`: the seam the request pipeline reads and writes the token through
//! - `FileSessionStore`: JSON file in the cache directory
//! - `KeyringSessionStore`: OS keychain via keyring
//! - `MemorySessionStore`: process-local, nothing persisted

pub mod credentials;
pub mod session;

pub use credentials::KeyringSessionStore;
pub use session::{FileSessionStore, MemorySessionStore, SessionData, SessionStore};
