//! Explicit state machine for per-user conversations.
//!
//! The design separates:
//! - **Context**: What the bot remembers about a user between messages (`SessionContext`)
//! - **Events**: What happened (`Event`)
//! - **Effects**: What to do (`Effect`)
//! - **Transition**: Pure function `(SessionContext, Event) -> (SessionContext, Vec<Effect>)`
//!
//! The interpreter executes effects against the matchmaking engine and the
//! messaging platform and returns result events; the session store drives the
//! loop and owns the per-user contexts.

pub mod effect;
pub mod event;
pub mod interpreter;
pub mod state;
pub mod store;
pub mod transition;

pub use effect::*;
pub use event::*;
pub use state::*;
pub use transition::*;
