//! Profile and like-edge types shared by the store, the engine and the
//! conversational state machine.
//!
//! A `User` exists from the moment somebody enters the registration flow.
//! Its `profile` is `None` until registration completes, so "registered
//! implies every field is present" holds by construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Newtype for the platform-level identity (Telegram user id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Opaque reference to a photo already uploaded to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhotoRef(pub String);

impl From<&str> for PhotoRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PhotoRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// The gender this one is matched with.
    pub fn opposite(self) -> Self {
        match self {
            Gender::Male => Gender::Female,
            Gender::Female => Gender::Male,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = ();

    /// Accepts exactly "Male" or "Female".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Male" => Ok(Gender::Male),
            "Female" => Ok(Gender::Female),
            _ => Err(()),
        }
    }
}

/// A completed profile. Every field is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub university: String,
    pub age: u8,
    pub gender: Gender,
    pub interests: String,
    pub bio: String,
    pub photo: PhotoRef,
    /// Derived from `gender` at registration time.
    pub looking_for: Gender,
    /// Non-empty; may contain [`crate::catalog::ALL_UNIVERSITIES`].
    pub preferred_universities: Vec<String>,
}

/// One record per platform identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    /// `Some` once registration has completed.
    pub profile: Option<Profile>,
    /// Current relay-chat partner, if any.
    pub chat_partner: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_registered(&self) -> bool {
        self.profile.is_some()
    }

    /// Display name, or a placeholder for users who never finished registering.
    pub fn display_name(&self) -> &str {
        self.profile
            .as_ref()
            .map(|p| p.name.as_str())
            .unwrap_or("your match")
    }
}

/// Directional record of interest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeEdge {
    pub from: UserId,
    pub to: UserId,
    /// Set once the reciprocal edge exists; never reverted.
    pub mutual: bool,
    pub created_at: DateTime<Utc>,
}

/// Minimal view of a match used for listing and notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub id: UserId,
    pub name: String,
    pub university: String,
}

impl MatchSummary {
    pub fn from_user(user: &User) -> Option<Self> {
        let profile = user.profile.as_ref()?;
        Some(Self {
            id: user.id,
            name: profile.name.clone(),
            university: profile.university.clone(),
        })
    }
}
