//! In-memory implementation of `ProfileRepository`.
//!
//! All state is held behind one `RwLock` and lost on restart. Every
//! multi-step operation runs under a single write guard, which makes it
//! atomic with respect to every other operation.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{
    LikeRecord, ProfileRepository, RelayTarget, RepositoryError, StoreStats, Unpaired,
};
use crate::matching::first_candidate;
use crate::profile::{LikeEdge, Profile, User, UserId};

#[derive(Default)]
struct MemoryState {
    /// Users in creation order.
    users: Vec<User>,
    user_index: HashMap<UserId, usize>,
    /// Edges in creation order.
    likes: Vec<LikeEdge>,
    like_index: HashMap<(UserId, UserId), usize>,
}

impl MemoryState {
    fn user(&self, id: UserId) -> Option<&User> {
        self.user_index.get(&id).map(|&i| &self.users[i])
    }

    fn user_mut(&mut self, id: UserId) -> Option<&mut User> {
        match self.user_index.get(&id) {
            Some(&i) => Some(&mut self.users[i]),
            None => None,
        }
    }

    fn insert_stub(&mut self, id: UserId) -> usize {
        if let Some(&i) = self.user_index.get(&id) {
            return i;
        }
        self.users.push(User {
            id,
            profile: None,
            chat_partner: None,
            created_at: Utc::now(),
        });
        let i = self.users.len() - 1;
        self.user_index.insert(id, i);
        i
    }

    fn set_partner(&mut self, id: UserId, partner: Option<UserId>) {
        if let Some(user) = self.user_mut(id) {
            user.chat_partner = partner;
        }
    }
}

/// In-memory profile repository.
#[derive(Default)]
pub struct InMemoryRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileRepository for InMemoryRepository {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.user(id).cloned())
    }

    async fn ensure_user(&self, id: UserId) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.insert_stub(id);
        Ok(())
    }

    async fn upsert_profile(&self, id: UserId, profile: Profile) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        let i = state.insert_stub(id);
        let user = &mut state.users[i];
        user.profile = Some(profile);
        Ok(user.clone())
    }

    async fn next_candidate(&self, viewer: UserId) -> Result<Option<User>, RepositoryError> {
        let state = self.state.read().await;
        let Some(viewer_profile) = state.user(viewer).and_then(|u| u.profile.as_ref()) else {
            return Ok(None);
        };
        let already_liked: HashSet<UserId> = state
            .likes
            .iter()
            .filter(|edge| edge.from == viewer)
            .map(|edge| edge.to)
            .collect();
        Ok(
            first_candidate(viewer, viewer_profile, &state.users, &already_liked)
                .cloned(),
        )
    }

    async fn record_like(&self, from: UserId, to: UserId) -> Result<LikeRecord, RepositoryError> {
        let mut state = self.state.write().await;
        if state.like_index.contains_key(&(from, to)) {
            return Ok(LikeRecord::Duplicate);
        }

        let reciprocal = state.like_index.get(&(to, from)).copied();
        state.likes.push(LikeEdge {
            from,
            to,
            mutual: reciprocal.is_some(),
            created_at: Utc::now(),
        });
        let i = state.likes.len() - 1;
        state.like_index.insert((from, to), i);

        if let Some(r) = reciprocal {
            state.likes[r].mutual = true;
        }
        Ok(LikeRecord::Recorded {
            mutual: reciprocal.is_some(),
        })
    }

    async fn get_like(
        &self,
        from: UserId,
        to: UserId,
    ) -> Result<Option<LikeEdge>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .like_index
            .get(&(from, to))
            .map(|&i| state.likes[i].clone()))
    }

    async fn list_matches(&self, user: UserId) -> Result<Vec<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .likes
            .iter()
            .filter(|edge| edge.from == user && edge.mutual)
            .filter_map(|edge| state.user(edge.to))
            .filter(|u| u.is_registered())
            .cloned()
            .collect())
    }

    async fn pair_chat(&self, a: UserId, b: UserId) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        if state.user(a).is_none() || state.user(b).is_none() {
            return Ok(false);
        }
        state.set_partner(a, Some(b));
        state.set_partner(b, Some(a));
        Ok(true)
    }

    async fn relay_target(&self, sender: UserId) -> Result<RelayTarget, RepositoryError> {
        let mut state = self.state.write().await;
        let Some(partner) = state.user(sender).and_then(|u| u.chat_partner) else {
            return Ok(RelayTarget::NoPartner);
        };
        let points_back = state
            .user(partner)
            .is_some_and(|p| p.chat_partner == Some(sender));
        if points_back {
            Ok(RelayTarget::Partner(partner))
        } else {
            state.set_partner(sender, None);
            Ok(RelayTarget::Expired)
        }
    }

    async fn unpair_chat(&self, user: UserId) -> Result<Option<Unpaired>, RepositoryError> {
        let mut state = self.state.write().await;
        let Some(partner) = state.user(user).and_then(|u| u.chat_partner) else {
            return Ok(None);
        };
        state.set_partner(user, None);
        let partner_released = state
            .user(partner)
            .is_some_and(|p| p.chat_partner == Some(user));
        if partner_released {
            state.set_partner(partner, None);
        }
        Ok(Some(Unpaired {
            partner,
            partner_released,
        }))
    }

    async fn stats(&self) -> Result<StoreStats, RepositoryError> {
        let state = self.state.read().await;
        let mutual_edges = state.likes.iter().filter(|e| e.mutual).count() as u64;
        Ok(StoreStats {
            users: state.users.len() as u64,
            registered: state.users.iter().filter(|u| u.is_registered()).count() as u64,
            likes: state.likes.len() as u64,
            matches: mutual_edges / 2,
            chatting: state
                .users
                .iter()
                .filter(|u| u.chat_partner.is_some())
                .count() as u64,
        })
    }
}
