//! Row decoding for the `users` and `likes` tables.

use chrono::{DateTime, Utc};
use rusqlite::Row;

use super::super::RepositoryError;
use crate::profile::{Gender, LikeEdge, PhotoRef, Profile, User, UserId};

/// Columns selected for a user, in the order [`UserRow::read`] expects.
/// Queries must alias the `users` table as `u`.
pub(super) const USER_COLUMNS: &str = "u.tg_id, u.name, u.university, u.age, u.gender, \
     u.interests, u.bio, u.photo, u.looking_for, u.match_universities, u.registered, \
     u.chatting_with, u.created_at";

/// Raw `users` row. Profile columns are nullable because stub users exist
/// before registration completes.
pub(super) struct UserRow {
    tg_id: i64,
    name: Option<String>,
    university: Option<String>,
    age: Option<i64>,
    gender: Option<String>,
    interests: Option<String>,
    bio: Option<String>,
    photo: Option<String>,
    looking_for: Option<String>,
    match_universities: Option<String>,
    registered: bool,
    chatting_with: Option<i64>,
    created_at: i64,
}

impl UserRow {
    pub(super) fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            tg_id: row.get(0)?,
            name: row.get(1)?,
            university: row.get(2)?,
            age: row.get(3)?,
            gender: row.get(4)?,
            interests: row.get(5)?,
            bio: row.get(6)?,
            photo: row.get(7)?,
            looking_for: row.get(8)?,
            match_universities: row.get(9)?,
            registered: row.get(10)?,
            chatting_with: row.get(11)?,
            created_at: row.get(12)?,
        })
    }

    pub(super) fn into_user(self) -> Result<User, RepositoryError> {
        let profile = if self.registered {
            Some(Profile {
                name: required(self.name, "user name")?,
                university: required(self.university, "user university")?,
                age: required(self.age, "user age")?
                    .try_into()
                    .map_err(|_| RepositoryError::corruption("user age"))?,
                gender: parse_gender(self.gender, "user gender")?,
                interests: required(self.interests, "user interests")?,
                bio: required(self.bio, "user bio")?,
                photo: PhotoRef(required(self.photo, "user photo")?),
                looking_for: parse_gender(self.looking_for, "user looking_for")?,
                preferred_universities: serde_json::from_str(&required(
                    self.match_universities,
                    "user match_universities",
                )?)
                .map_err(|_| RepositoryError::corruption("user match_universities"))?,
            })
        } else {
            None
        };

        Ok(User {
            id: UserId(self.tg_id),
            profile,
            chat_partner: self.chatting_with.map(UserId),
            created_at: timestamp(self.created_at, "user created_at")?,
        })
    }
}

pub(super) fn read_like(row: &Row<'_>) -> rusqlite::Result<(i64, i64, bool, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

pub(super) fn into_like(
    (from, to, matched, created_at): (i64, i64, bool, i64),
) -> Result<LikeEdge, RepositoryError> {
    Ok(LikeEdge {
        from: UserId(from),
        to: UserId(to),
        mutual: matched,
        created_at: timestamp(created_at, "like created_at")?,
    })
}

fn required<T>(value: Option<T>, what: &'static str) -> Result<T, RepositoryError> {
    value.ok_or(RepositoryError::corruption(what))
}

fn parse_gender(value: Option<String>, what: &'static str) -> Result<Gender, RepositoryError> {
    required(value, what)?
        .parse()
        .map_err(|_| RepositoryError::corruption(what))
}

fn timestamp(secs: i64, what: &'static str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::from_timestamp(secs, 0).ok_or(RepositoryError::corruption(what))
}
