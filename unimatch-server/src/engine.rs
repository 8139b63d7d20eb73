//! Matching, like/match and relay-chat operations over the repository.
//!
//! The engine never talks to the messaging platform. Each operation returns
//! an outcome describing what happened; the state machine turns outcomes
//! into notices and the interpreter delivers them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::profile::{MatchSummary, Profile, User, UserId};
use crate::repository::{
    pair_key, LikeRecord, ProfileRepository, RelayTarget, RepositoryError, Unpaired,
};

/// Prune idle pair locks once the map grows past this many entries.
const PAIR_LOCK_PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per unordered pair of users.
///
/// Held across the whole like + reciprocity check and across chat pairing,
/// so two users acting on each other at the same moment are serialized.
#[derive(Default)]
pub struct PairLocks {
    locks: Mutex<HashMap<(UserId, UserId), Arc<AsyncMutex<()>>>>,
}

impl PairLocks {
    pub async fn lock(&self, a: UserId, b: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            if locks.len() > PAIR_LOCK_PRUNE_THRESHOLD {
                // Only the map holds a reference to an idle lock.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(pair_key(a, b)).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Result of asking for the next candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateOutcome {
    Found(User),
    Exhausted,
    NotRegistered,
}

/// Result of expressing interest in a previewed candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikeOutcome {
    /// Edge recorded, no reciprocal edge yet.
    Liked { target: UserId },
    /// Edge recorded and the reciprocal edge existed; both are now mutual.
    Matched {
        target: UserId,
        viewer_name: String,
        target_name: String,
    },
    /// The viewer had already liked this target.
    AlreadyLiked,
    /// The previewed candidate no longer exists or is no longer registered.
    TargetMissing,
    NotRegistered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartChatOutcome {
    Started { target: UserId, target_name: String },
    NotFound,
    /// The two users are not a mutual match.
    NotMatched,
    NotRegistered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// `partner_left_alone` is false when the partner had already moved on
    /// to another chat and so has nothing to be told.
    Stopped {
        partner: UserId,
        partner_left_alone: bool,
    },
    NotInSession,
}

/// Matching, like and chat operations.
pub struct Matchmaker {
    repo: Arc<dyn ProfileRepository>,
    pair_locks: PairLocks,
}

impl Matchmaker {
    pub fn new(repo: Arc<dyn ProfileRepository>) -> Self {
        Self {
            repo,
            pair_locks: PairLocks::default(),
        }
    }

    pub fn repository(&self) -> &Arc<dyn ProfileRepository> {
        &self.repo
    }

    async fn registered(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.repo.get_user(id).await?.filter(User::is_registered))
    }

    pub async fn is_registered(&self, id: UserId) -> Result<bool, RepositoryError> {
        Ok(self.registered(id).await?.is_some())
    }

    /// Deterministically pick the next candidate for `viewer`.
    pub async fn next_candidate(&self, viewer: UserId) -> Result<CandidateOutcome, RepositoryError> {
        if !self.is_registered(viewer).await? {
            return Ok(CandidateOutcome::NotRegistered);
        }
        Ok(match self.repo.next_candidate(viewer).await? {
            Some(user) => CandidateOutcome::Found(user),
            None => CandidateOutcome::Exhausted,
        })
    }

    /// Record `viewer -> target` and detect a match, serialized per pair.
    pub async fn express_like(
        &self,
        viewer: UserId,
        target: UserId,
    ) -> Result<LikeOutcome, RepositoryError> {
        let _guard = self.pair_locks.lock(viewer, target).await;

        let Some(viewer_user) = self.registered(viewer).await? else {
            return Ok(LikeOutcome::NotRegistered);
        };
        let Some(target_user) = self.registered(target).await? else {
            return Ok(LikeOutcome::TargetMissing);
        };

        let outcome = match self.repo.record_like(viewer, target).await? {
            LikeRecord::Duplicate => LikeOutcome::AlreadyLiked,
            LikeRecord::Recorded { mutual: false } => LikeOutcome::Liked { target },
            LikeRecord::Recorded { mutual: true } => {
                info!("Match between {} and {}", viewer, target);
                LikeOutcome::Matched {
                    target,
                    viewer_name: viewer_user.display_name().to_string(),
                    target_name: target_user.display_name().to_string(),
                }
            }
        };
        Ok(outcome)
    }

    /// The user's own profile, if registered.
    pub async fn own_profile(&self, user: UserId) -> Result<Option<Profile>, RepositoryError> {
        Ok(self.registered(user).await?.and_then(|u| u.profile))
    }

    /// Mutual matches of `user`, or None if the user is not registered.
    pub async fn matches(
        &self,
        user: UserId,
    ) -> Result<Option<Vec<MatchSummary>>, RepositoryError> {
        if !self.is_registered(user).await? {
            return Ok(None);
        }
        let matches = self.repo.list_matches(user).await?;
        Ok(Some(
            matches.iter().filter_map(MatchSummary::from_user).collect(),
        ))
    }

    /// Pair `user` with `target` for relay chat. Requires a mutual match.
    ///
    /// Any earlier pairing of either side is overwritten; the abandoned
    /// partner discovers this on their next relay attempt.
    pub async fn start_chat(
        &self,
        user: UserId,
        target: UserId,
    ) -> Result<StartChatOutcome, RepositoryError> {
        let _guard = self.pair_locks.lock(user, target).await;

        if !self.is_registered(user).await? {
            return Ok(StartChatOutcome::NotRegistered);
        }
        let Some(target_user) = self.repo.get_user(target).await? else {
            return Ok(StartChatOutcome::NotFound);
        };
        let matched = self
            .repo
            .get_like(user, target)
            .await?
            .is_some_and(|edge| edge.mutual);
        if !matched {
            return Ok(StartChatOutcome::NotMatched);
        }
        if !self.repo.pair_chat(user, target).await? {
            return Ok(StartChatOutcome::NotFound);
        }

        debug!("Chat started between {} and {}", user, target);
        Ok(StartChatOutcome::Started {
            target,
            target_name: target_user.display_name().to_string(),
        })
    }

    /// Where a relayed payload from `sender` goes. Self-repairs a broken pairing.
    pub async fn relay_target(&self, sender: UserId) -> Result<RelayTarget, RepositoryError> {
        self.repo.relay_target(sender).await
    }

    pub async fn stop_chat(&self, user: UserId) -> Result<StopOutcome, RepositoryError> {
        Ok(match self.repo.unpair_chat(user).await? {
            Some(Unpaired {
                partner,
                partner_released,
            }) => StopOutcome::Stopped {
                partner,
                partner_left_alone: partner_released,
            },
            None => StopOutcome::NotInSession,
        })
    }
}
