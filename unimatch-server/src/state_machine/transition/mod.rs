//! Pure state transition function.
//!
//! The transition function takes the user's session context and an event,
//! and returns the new context and a list of effects. It has NO side
//! effects - it is pure and deterministic.
//!
//! Handlers, each with co-located tests:
//! - `registration`: free-form input while a registration is in progress
//! - `confession`: free-form input while a confession is awaited
//! - `common`: commands, engine results and input outside any flow

mod common;
mod confession;
mod registration;

pub use confession::CONFESSION_MAX_CHARS;

use super::effect::Effect;
use super::event::Event;
use super::state::{Flow, RegistrationStep, SessionContext};
use crate::command::Selection;

/// Result of a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    /// The context after the transition.
    pub ctx: SessionContext,
    /// Effects to execute.
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(ctx: SessionContext, effects: Vec<Effect>) -> Self {
        Self { ctx, effects }
    }

    pub fn no_change(ctx: SessionContext) -> Self {
        Self {
            ctx,
            effects: vec![],
        }
    }
}

/// Pure state transition function.
///
/// Free-form input (text, photos, selector taps, Like/Skip labels) belongs to
/// the active flow. Everything else is handled the same way in every flow.
pub fn transition(ctx: SessionContext, event: Event) -> TransitionResult {
    match (&ctx.flow, &event) {
        (
            Flow::Registering(_),
            Event::Text(_)
            | Event::Photo(_)
            | Event::Decision(_)
            | Event::Selection(Selection::Toggle(_) | Selection::Confirm),
        ) => registration::handle(ctx, event),
        (Flow::AwaitingConfession, Event::Text(_) | Event::Photo(_) | Event::Decision(_)) => {
            confession::handle(ctx, event)
        }
        _ => common::handle(ctx, event),
    }
}

/// Context for a fresh registration.
pub(crate) fn registration_started() -> SessionContext {
    SessionContext::with_flow(Flow::Registering(RegistrationStep::Name))
}
