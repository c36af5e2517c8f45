//! User authentication: registration, credential verification, bearer tokens.
//!
//! Provides:
//! - User registration with name/email/password (iterated SHA-256, 100k rounds + per-user salt)
//! - Stateless signed bearer tokens (HMAC-SHA256, time-limited)
//! - SQLite-backed persistent user storage
//!
//! ## Design Decisions
//! - No external JWT dependency — tokens are `v1.<user_id>.<expiry>.<hmac>`
//!   strings signed with the configured secret and verified without any
//!   server-side session state. Logout is purely client-side; a token stays
//!   valid until its expiry.
//! - Password hashing uses iterated SHA-256 (100k rounds) + per-user salt
//!   (using the existing `sha2` crate) to avoid new dependencies while
//!   maintaining security.
//! - Login failures for unknown email and wrong password are
//!   indistinguishable: same message, and a dummy hash is computed on the
//!   miss path so timing doesn't leak account existence.

pub mod store;
pub mod token;

pub use store::{RegisterError, User, UserStore};
pub use token::TokenSigner;
