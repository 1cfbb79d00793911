//! Account records, their store, and the helpers that keep secrets sealed.
//!
//! - `types`: account lifecycle, country policies, the public view
//! - `store`: sled-backed atomic operations
//! - `auth`: admin token hashing and the passphrase vault
//! - `phone`: phone number normalisation

pub mod auth;
pub mod phone;
pub mod store;
pub mod types;

pub use auth::PassphraseVault;
pub use store::{AccountStore, Creation, FinalAudit, Transition};
pub use types::{Account, AccountId, AccountStatus, AccountView, CountryPolicy, UserId};
