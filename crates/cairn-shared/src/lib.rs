//! # cairn-shared
//!
//! Types and primitives shared by every Cairn crate: content addressing,
//! the passphrase envelope, identifier newtypes and the file/quota/peer
//! data model.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod hashing;
pub mod models;
pub mod types;

pub use error::{CryptoError, HashError};
pub use models::{FileMetadata, PeerInfo, StorageQuota};
pub use types::{ContentId, PeerId};
