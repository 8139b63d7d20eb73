//! Entry point from the platform layer into the conversation core.
//!
//! Updates are queued per user and drained by one worker task per user, so
//! a user's events are applied in the order they arrived even though the
//! webhook answers before processing them. Workers exit once their queue is
//! empty.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::messenger::{ChatId, MessageRef};
use crate::profile::UserId;
use crate::render::render;
use crate::state_machine::interpreter::{InterpreterContext, Services};
use crate::state_machine::store::SessionStore;
use crate::state_machine::{Event, Notice};
use crate::update::Inbound;

type Queues = Mutex<HashMap<UserId, mpsc::UnboundedSender<Inbound>>>;

/// Routes classified events to the per-user state machines.
#[derive(Clone)]
pub struct Dispatcher {
    services: Arc<Services>,
    sessions: Arc<SessionStore>,
    queues: Arc<Queues>,
}

impl Dispatcher {
    pub fn new(services: Services) -> Self {
        Self {
            services: Arc::new(services),
            sessions: Arc::new(SessionStore::new()),
            queues: Arc::default(),
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Users with a worker currently draining their queue.
    pub fn busy_users(&self) -> usize {
        self.queues.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Queue an update behind any earlier ones from the same user.
    /// Must be called inside a tokio runtime.
    pub fn enqueue(&self, inbound: Inbound) {
        let user = inbound.user;
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());

        let inbound = match queues.get(&user) {
            Some(queue) => match queue.send(inbound) {
                Ok(()) => return,
                Err(mpsc::error::SendError(inbound)) => inbound,
            },
            None => inbound,
        };

        let (queue, receiver) = mpsc::unbounded_channel();
        // The receiver is alive until the worker below exits.
        let _ = queue.send(inbound);
        queues.insert(user, queue);
        drop(queues);

        debug!("Starting update worker for user {}", user);
        tokio::spawn(self.clone().drain(user, receiver));
    }

    async fn drain(self, user: UserId, mut receiver: mpsc::UnboundedReceiver<Inbound>) {
        loop {
            let inbound = match receiver.try_recv() {
                Ok(inbound) => inbound,
                Err(_) => {
                    // Re-check under the map lock: `enqueue` only sends while
                    // holding it, so an empty queue here stays empty.
                    let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
                    match receiver.try_recv() {
                        Ok(inbound) => inbound,
                        Err(_) => {
                            queues.remove(&user);
                            return;
                        }
                    }
                }
            };
            self.handle(inbound).await;
        }
    }

    async fn handle(&self, inbound: Inbound) {
        if let Some(callback_id) = &inbound.callback_id {
            if let Err(e) = self.services.messenger.acknowledge(callback_id).await {
                debug!("Failed to acknowledge callback {}: {}", callback_id, e);
            }
        }
        self.dispatch(inbound.user, inbound.origin, inbound.event)
            .await;
    }

    /// Process one inbound event for `user`.
    ///
    /// A store failure is logged and answered with a generic notice; the
    /// user's context stays as it was so they can simply retry.
    pub async fn dispatch(&self, user: UserId, origin: Option<MessageRef>, event: Event) {
        let ctx = InterpreterContext {
            services: self.services.clone(),
            user,
            origin,
        };

        if let Err(e) = self.sessions.process_event(event, &ctx).await {
            error!("Failed to process event for user {}: {}", user, e);

            let delivery = render(&Notice::ServiceUnavailable, &self.services.channels);
            if let Err(e) = self
                .services
                .messenger
                .deliver(&ChatId::User(user), &delivery)
                .await
            {
                warn!("Failed to tell user {} about the outage: {}", user, e);
            }
        }
    }
}
