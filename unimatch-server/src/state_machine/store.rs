//! Session store for per-user conversation contexts.
//!
//! Events for one user are processed strictly one at a time under that
//! user's async mutex; events for different users run concurrently.
//! Contexts are ephemeral: nothing here survives a restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use super::event::Event;
use super::interpreter::{execute_effects, InterpreterContext};
use super::state::SessionContext;
use super::transition::{transition, TransitionResult};
use crate::profile::UserId;
use crate::repository::RepositoryError;

type Slot = Arc<AsyncMutex<SessionContext>>;

/// Thread-safe store of per-user session contexts.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<UserId, Slot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, user: UserId) -> Slot {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.entry(user).or_default().clone()
    }

    /// Current context for a user (the default if none is stored).
    pub async fn get(&self, user: UserId) -> SessionContext {
        let slot = {
            let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            sessions.get(&user).cloned()
        };
        match slot {
            Some(slot) => slot.lock().await.clone(),
            None => SessionContext::default(),
        }
    }

    /// Number of stored (non-default or in-use) contexts.
    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count of stored contexts per flow name. Contexts locked by an event in
    /// progress are counted as `processing`.
    pub fn flow_counts(&self) -> BTreeMap<&'static str, usize> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let mut counts = BTreeMap::new();
        for slot in sessions.values() {
            let name = match slot.try_lock() {
                Ok(ctx) => ctx.flow.name(),
                Err(_) => "processing",
            };
            *counts.entry(name).or_insert(0) += 1;
        }
        counts
    }

    /// Process an event for a user: transition the context and execute effects.
    ///
    /// This is the main entry point for handling events. It:
    /// 1. Locks the user's context
    /// 2. Runs the transition function
    /// 3. Executes effects via the interpreter
    /// 4. Handles result events until none are left
    /// 5. Stores the final context
    ///
    /// On a store failure the context is left exactly as it was before the
    /// event and the error is returned.
    pub async fn process_event(
        &self,
        event: Event,
        ctx: &InterpreterContext,
    ) -> Result<SessionContext, RepositoryError> {
        let user = ctx.user;
        let slot = self.slot(user);
        let mut guard = slot.lock().await;

        let result = run_event_loop(guard.clone(), event, ctx).await;
        if let Ok(final_ctx) = &result {
            *guard = final_ctx.clone();
        }
        drop(guard);
        drop(slot);

        self.forget_if_idle(user);
        result
    }

    /// Drop a default context nobody else is using, so the map only holds
    /// users who are mid-flow or previewing.
    fn forget_if_idle(&self, user: UserId) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let Some(slot) = sessions.get(&user) else {
            return;
        };
        // Only the map holds the slot, so no task can be waiting on it.
        if Arc::strong_count(slot) != 1 {
            return;
        }
        let idle = slot.try_lock().map(|ctx| ctx.is_default()).unwrap_or(false);
        if idle {
            sessions.remove(&user);
        }
    }
}

async fn run_event_loop(
    mut current: SessionContext,
    event: Event,
    ctx: &InterpreterContext,
) -> Result<SessionContext, RepositoryError> {
    // Event loop: process initial event and any result events from effects
    let mut events_to_process = vec![event];

    while let Some(event) = events_to_process.pop() {
        info!(
            "Processing event {} for user {} in flow {}",
            event.log_summary(),
            ctx.user,
            current.flow.name()
        );

        let TransitionResult { ctx: next, effects } = transition(current, event);
        current = next;

        if !effects.is_empty() {
            debug!("Executing {} effects for user {}", effects.len(), ctx.user);

            let result_events = execute_effects(ctx, effects).await?;

            // Add result events to be processed (in reverse order so they're processed in order)
            for result_event in result_events.into_iter().rev() {
                events_to_process.push(result_event);
            }
        }
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::config::ChannelConfig;
    use crate::engine::Matchmaker;
    use crate::messenger::{ChatId, Delivery, DeliveryError, MessageRef, Messenger};
    use crate::profile::{LikeEdge, Profile, User};
    use crate::repository::{
        InMemoryRepository, LikeRecord, ProfileRepository, RelayTarget, StoreStats, Unpaired,
    };
    use crate::state_machine::interpreter::Services;
    use crate::state_machine::state::{Flow, RegistrationStep};
    use async_trait::async_trait;

    struct EveryoneIsMember;

    #[async_trait]
    impl Messenger for EveryoneIsMember {
        async fn is_member(&self, _: &str, _: UserId) -> Result<bool, DeliveryError> {
            Ok(true)
        }

        async fn deliver(&self, _: &ChatId, _: &Delivery) -> Result<(), DeliveryError> {
            Ok(())
        }

        async fn replace(&self, _: &MessageRef, _: &Delivery) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    /// Repository whose every operation fails.
    struct BrokenRepository;

    #[async_trait]
    impl ProfileRepository for BrokenRepository {
        async fn get_user(&self, _: UserId) -> Result<Option<User>, RepositoryError> {
            Err(RepositoryError::storage("get user", "disk full"))
        }
        async fn ensure_user(&self, _: UserId) -> Result<(), RepositoryError> {
            Err(RepositoryError::storage("ensure user", "disk full"))
        }
        async fn upsert_profile(&self, _: UserId, _: Profile) -> Result<User, RepositoryError> {
            Err(RepositoryError::storage("upsert profile", "disk full"))
        }
        async fn next_candidate(&self, _: UserId) -> Result<Option<User>, RepositoryError> {
            Err(RepositoryError::storage("next candidate", "disk full"))
        }
        async fn record_like(&self, _: UserId, _: UserId) -> Result<LikeRecord, RepositoryError> {
            Err(RepositoryError::storage("record like", "disk full"))
        }
        async fn get_like(
            &self,
            _: UserId,
            _: UserId,
        ) -> Result<Option<LikeEdge>, RepositoryError> {
            Err(RepositoryError::storage("get like", "disk full"))
        }
        async fn list_matches(&self, _: UserId) -> Result<Vec<User>, RepositoryError> {
            Err(RepositoryError::storage("list matches", "disk full"))
        }
        async fn pair_chat(&self, _: UserId, _: UserId) -> Result<bool, RepositoryError> {
            Err(RepositoryError::storage("pair chat", "disk full"))
        }
        async fn relay_target(&self, _: UserId) -> Result<RelayTarget, RepositoryError> {
            Err(RepositoryError::storage("relay target", "disk full"))
        }
        async fn unpair_chat(&self, _: UserId) -> Result<Option<Unpaired>, RepositoryError> {
            Err(RepositoryError::storage("unpair chat", "disk full"))
        }
        async fn stats(&self) -> Result<StoreStats, RepositoryError> {
            Err(RepositoryError::storage("stats", "disk full"))
        }
    }

    fn interpreter(repo: Arc<dyn ProfileRepository>, user: UserId) -> InterpreterContext {
        InterpreterContext {
            services: Arc::new(Services {
                engine: Matchmaker::new(repo),
                messenger: Arc::new(EveryoneIsMember),
                channels: ChannelConfig::default(),
            }),
            user,
            origin: None,
        }
    }

    #[tokio::test]
    async fn test_start_enters_registration_and_is_kept() {
        let store = SessionStore::new();
        let ctx = interpreter(Arc::new(InMemoryRepository::new()), UserId(1));

        let session = store
            .process_event(Event::Command(Command::Start), &ctx)
            .await
            .unwrap();
        assert_eq!(session.flow, Flow::Registering(RegistrationStep::Name));
        assert_eq!(store.get(UserId(1)).await, session);
        assert_eq!(store.flow_counts().get("registering"), Some(&1));
    }

    #[tokio::test]
    async fn test_idle_contexts_are_dropped() {
        let store = SessionStore::new();
        let ctx = interpreter(Arc::new(InMemoryRepository::new()), UserId(1));

        store
            .process_event(Event::Command(Command::Confess), &ctx)
            .await
            .unwrap();
        assert_eq!(store.len(), 1);

        store
            .process_event(Event::Command(Command::Cancel), &ctx)
            .await
            .unwrap();
        assert!(store.is_empty());
        assert!(store.flow_counts().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_leaves_context_untouched() {
        let store = SessionStore::new();
        let ctx = interpreter(Arc::new(BrokenRepository), UserId(1));

        // Membership passes, then the registration lookup hits the store.
        let err = store
            .process_event(Event::Command(Command::Start), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Storage { .. }));
        assert_eq!(store.get(UserId(1)).await, SessionContext::default());
        assert!(store.is_empty());
    }
}
