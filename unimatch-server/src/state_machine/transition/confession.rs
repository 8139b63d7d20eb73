//! Confession flow transitions.

use super::super::effect::{Effect, Recipient};
use super::super::effect::Notice;
use super::super::event::Event;
use super::super::state::{Flow, SessionContext};
use super::TransitionResult;

/// Longest accepted confession, counted in characters.
pub const CONFESSION_MAX_CHARS: usize = 500;

pub fn handle(ctx: SessionContext, event: Event) -> TransitionResult {
    let text = match event {
        Event::Text(text) => text,
        Event::Decision(decision) => decision.label().to_string(),
        Event::Photo(_) => {
            return TransitionResult::new(ctx, vec![Effect::send(Notice::ConfessionTextOnly)])
        }
        _ => return TransitionResult::no_change(ctx),
    };

    if text.chars().count() > CONFESSION_MAX_CHARS {
        return TransitionResult::new(ctx, vec![Effect::send(Notice::ConfessionTooLong)]);
    }

    let ctx = SessionContext {
        flow: Flow::Idle,
        ..ctx
    };
    TransitionResult::new(
        ctx,
        vec![
            Effect::Send {
                to: Recipient::ConfessionChannel,
                notice: Notice::ConfessionPost { text },
            },
            Effect::send(Notice::ConfessionPosted),
        ],
    )
}
