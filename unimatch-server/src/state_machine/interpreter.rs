//! Effect interpreter that executes effects against the engine and the
//! messaging platform.
//!
//! The interpreter is the boundary between the pure state machine and the
//! impure world of I/O. It takes effects (descriptions of what to do) and
//! executes them, returning result events.
//!
//! Delivery failures are logged and swallowed: a user who blocked the bot
//! must not break the conversation of the user who messaged them. Store
//! failures abort the whole event.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::effect::{Effect, GatedAction, LogLevel, Notice, Recipient};
use super::event::{Event, RelayPayload};
use crate::config::ChannelConfig;
use crate::engine::{CandidateOutcome, Matchmaker};
use crate::messenger::{ChatId, MessageRef, Messenger};
use crate::profile::{Profile, UserId};
use crate::render::render;
use crate::repository::RepositoryError;

/// Long-lived dependencies shared by every event.
pub struct Services {
    pub engine: Matchmaker,
    pub messenger: Arc<dyn Messenger>,
    pub channels: ChannelConfig,
}

/// Context needed by the interpreter to execute effects.
#[derive(Clone)]
pub struct InterpreterContext {
    pub services: Arc<Services>,
    /// The user whose event is being processed.
    pub user: UserId,
    /// The message carrying the button the user tapped, if any.
    pub origin: Option<MessageRef>,
}

/// Result of executing an effect.
pub type EffectResult = Result<Vec<Event>, RepositoryError>;

/// Execute a list of effects and collect result events.
///
/// Effects are executed sequentially. The first store failure stops
/// execution and is returned.
pub async fn execute_effects(ctx: &InterpreterContext, effects: Vec<Effect>) -> EffectResult {
    let mut result_events = Vec::new();

    for effect in effects {
        result_events.extend(execute_effect(ctx, effect).await?);
    }

    Ok(result_events)
}

/// Execute a single effect.
async fn execute_effect(ctx: &InterpreterContext, effect: Effect) -> EffectResult {
    let engine = &ctx.services.engine;

    match effect {
        Effect::CheckMembership { action } => {
            Ok(vec![execute_check_membership(ctx, action).await])
        }

        Effect::Send { to, notice } => {
            execute_send(ctx, to, &notice).await;
            Ok(vec![])
        }

        Effect::Refresh { notice } => {
            execute_refresh(ctx, &notice).await;
            Ok(vec![])
        }

        Effect::LookupRegistration => {
            engine.repository().ensure_user(ctx.user).await?;
            let registered = engine.is_registered(ctx.user).await?;
            Ok(vec![Event::RegistrationLookedUp { registered }])
        }

        Effect::SaveProfile { profile } => execute_save_profile(ctx, profile).await,

        Effect::FindCandidate => Ok(vec![match engine.next_candidate(ctx.user).await? {
            CandidateOutcome::Found(candidate) => Event::CandidateFound { candidate },
            CandidateOutcome::Exhausted => Event::NoCandidate,
            CandidateOutcome::NotRegistered => Event::NotRegistered,
        }]),

        Effect::ExpressLike { target } => {
            let outcome = engine.express_like(ctx.user, target).await?;
            Ok(vec![Event::LikeRecorded(outcome)])
        }

        Effect::ShowOwnProfile => Ok(vec![match engine.own_profile(ctx.user).await? {
            Some(profile) => Event::OwnProfileLoaded(profile),
            None => Event::NotRegistered,
        }]),

        Effect::ListMatches => Ok(vec![match engine.matches(ctx.user).await? {
            Some(matches) => Event::MatchesListed(matches),
            None => Event::NotRegistered,
        }]),

        Effect::StartChat { target } => {
            let outcome = engine.start_chat(ctx.user, target).await?;
            Ok(vec![Event::ChatStarted(outcome)])
        }

        Effect::Relay { payload } => execute_relay(ctx, payload).await,

        Effect::StopChat => {
            let outcome = engine.stop_chat(ctx.user).await?;
            Ok(vec![Event::ChatStopped(outcome)])
        }

        Effect::Log { level, message } => {
            match level {
                LogLevel::Debug => debug!("{}", message),
                LogLevel::Info => info!("{}", message),
                LogLevel::Warn => warn!("{}", message),
                LogLevel::Error => error!("{}", message),
            }
            Ok(vec![])
        }
    }
}

/// The user passes only if every required channel reports membership.
/// A failed lookup counts as "not a member".
async fn execute_check_membership(ctx: &InterpreterContext, action: GatedAction) -> Event {
    let services = &ctx.services;
    let mut is_member = true;

    for channel in &services.channels.required {
        match services.messenger.is_member(channel, ctx.user).await {
            Ok(true) => {}
            Ok(false) => {
                is_member = false;
                break;
            }
            Err(e) => {
                warn!(
                    "Membership lookup in {} failed for user {}: {}",
                    channel, ctx.user, e
                );
                is_member = false;
                break;
            }
        }
    }

    Event::MembershipChecked { action, is_member }
}

fn chat_for(ctx: &InterpreterContext, to: Recipient) -> ChatId {
    match to {
        Recipient::Sender => ChatId::User(ctx.user),
        Recipient::User(user) => ChatId::User(user),
        Recipient::ConfessionChannel => {
            ChatId::Channel(ctx.services.channels.confession.clone())
        }
    }
}

async fn execute_send(ctx: &InterpreterContext, to: Recipient, notice: &Notice) {
    let chat = chat_for(ctx, to);
    let delivery = render(notice, &ctx.services.channels);

    if let Err(e) = ctx.services.messenger.deliver(&chat, &delivery).await {
        warn!("Failed to deliver message to {:?}: {}", chat, e);
    }
}

/// Edit the message the tap came from; without one, send a fresh message.
async fn execute_refresh(ctx: &InterpreterContext, notice: &Notice) {
    let Some(origin) = ctx.origin else {
        execute_send(ctx, Recipient::Sender, notice).await;
        return;
    };

    let delivery = render(notice, &ctx.services.channels);
    if let Err(e) = ctx.services.messenger.replace(&origin, &delivery).await {
        warn!(
            "Failed to update message {} for user {}: {}",
            origin.message_id, ctx.user, e
        );
    }
}

async fn execute_save_profile(ctx: &InterpreterContext, profile: Profile) -> EffectResult {
    let user = ctx
        .services
        .engine
        .repository()
        .upsert_profile(ctx.user, profile)
        .await?;
    info!("User {} completed registration", user.id);
    Ok(vec![Event::ProfileSaved])
}

async fn execute_relay(ctx: &InterpreterContext, payload: RelayPayload) -> EffectResult {
    let target = ctx.services.engine.relay_target(ctx.user).await?;
    Ok(vec![Event::RelayResolved { target, payload }])
}
