//! Repository abstraction for durable users and like edges.
//!
//! The `ProfileRepository` trait is the only way the engine touches
//! persistent state. Implementations:
//! - [`InMemoryRepository`]: everything lost on restart (tests, local runs)
//! - [`SqliteRepository`]: durable storage that survives restarts
//!
//! Operations that must be atomic per pair of users (like + mutual flip,
//! chat pairing, relay self-repair) are single trait methods so each backend
//! can run them inside one lock or one transaction.

mod memory;
mod sqlite;

#[cfg(test)]
mod contract;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::profile::{LikeEdge, Profile, User, UserId};

/// Errors from the storage layer. These are the only hard failures of the core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The backend could not perform the operation.
    #[error("storage error during {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },

    /// Stored data could not be decoded.
    #[error("corrupt {what} in store")]
    Corruption { what: &'static str },
}

impl RepositoryError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }

    pub fn corruption(what: &'static str) -> Self {
        Self::Corruption { what }
    }
}

/// Result of recording a directional like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeRecord {
    /// Edge created. `mutual` is true if the reciprocal edge existed, in
    /// which case both edges were flipped to mutual in the same unit of work.
    Recorded { mutual: bool },
    /// An edge for this ordered pair already existed; nothing changed.
    Duplicate,
}

/// Where a relayed message from a sender should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayTarget {
    /// Sender has no chat partner.
    NoPartner,
    /// Sender's partner no longer points back (or vanished). The sender's
    /// own pointer has been cleared.
    Expired,
    /// Symmetric pairing intact.
    Partner(UserId),
}

/// A chat session that `unpair_chat` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unpaired {
    pub partner: UserId,
    /// The partner still pointed back and was released too. False when the
    /// partner had already moved on to someone else.
    pub partner_released: bool,
}

/// Aggregate counts for the status endpoint and the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub users: u64,
    pub registered: u64,
    pub likes: u64,
    /// Mutual pairs (each counted once).
    pub matches: u64,
    /// Users with a chat pointer set.
    pub chatting: u64,
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Get a user, returning None if unknown.
    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Create a stub (unregistered) user if none exists. Never touches an
    /// existing record.
    async fn ensure_user(&self, id: UserId) -> Result<(), RepositoryError>;

    /// Create or update the full profile for `id` and mark it registered.
    /// Preserves the chat pointer and creation order of existing records.
    async fn upsert_profile(&self, id: UserId, profile: Profile) -> Result<User, RepositoryError>;

    /// First registered user (creation order) that the viewer may be shown.
    ///
    /// Returns None if the viewer is unknown or unregistered.
    async fn next_candidate(&self, viewer: UserId) -> Result<Option<User>, RepositoryError>;

    /// Insert the edge `from -> to`, then check for `to -> from` and flip
    /// both to mutual if present, as one unit of work.
    async fn record_like(&self, from: UserId, to: UserId) -> Result<LikeRecord, RepositoryError>;

    /// Look up a single edge.
    async fn get_like(&self, from: UserId, to: UserId)
        -> Result<Option<LikeEdge>, RepositoryError>;

    /// Registered users with a mutual edge from `user`, in match order.
    async fn list_matches(&self, user: UserId) -> Result<Vec<User>, RepositoryError>;

    /// Point `a` and `b` at each other. Returns false (and changes nothing)
    /// if either user is missing.
    async fn pair_chat(&self, a: UserId, b: UserId) -> Result<bool, RepositoryError>;

    /// Resolve the relay target for `sender`, clearing the sender's pointer
    /// if the pairing is no longer symmetric.
    async fn relay_target(&self, sender: UserId) -> Result<RelayTarget, RepositoryError>;

    /// Clear `user`'s pointer and, if the partner still points back, the
    /// partner's pointer too. Returns None if `user` was not in a session.
    async fn unpair_chat(&self, user: UserId) -> Result<Option<Unpaired>, RepositoryError>;

    /// Aggregate counts.
    async fn stats(&self) -> Result<StoreStats, RepositoryError>;
}

/// Normalise an unordered pair so `(a, b)` and `(b, a)` share a key.
pub fn pair_key(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
