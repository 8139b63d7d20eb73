//! Transitions shared by every flow: commands, engine results and free-form
//! input outside registration/confession.

use super::super::effect::{Effect, GatedAction, LogLevel, Notice};
use super::super::event::{Event, RelayPayload};
use super::super::state::{Flow, SessionContext};
use super::{registration_started, TransitionResult};
use crate::command::{Command, Decision, Selection};
use crate::engine::{LikeOutcome, StartChatOutcome, StopOutcome};
use crate::repository::RelayTarget;

pub fn handle(mut ctx: SessionContext, event: Event) -> TransitionResult {
    match event {
        Event::Command(command) => handle_command(ctx, command),

        // =====================================================================
        // Membership gate
        // =====================================================================
        Event::MembershipChecked {
            is_member: false, ..
        } => TransitionResult::new(ctx, vec![Effect::send(Notice::JoinChannels)]),

        Event::MembershipChecked {
            action,
            is_member: true,
        } => match action {
            GatedAction::Register => TransitionResult::new(ctx, vec![Effect::LookupRegistration]),
            GatedAction::Confess => {
                ctx.flow = Flow::AwaitingConfession;
                TransitionResult::new(ctx, vec![Effect::send(Notice::ConfessionPrompt)])
            }
            GatedAction::Decide(decision) => decide(ctx, decision),
        },

        // =====================================================================
        // Registration entry and completion
        // =====================================================================
        Event::RegistrationLookedUp { registered: true } => {
            TransitionResult::new(ctx, vec![Effect::send(Notice::WelcomeBack)])
        }

        Event::RegistrationLookedUp { registered: false } => {
            let previewing = ctx.previewing;
            let mut ctx = registration_started();
            ctx.previewing = previewing;
            TransitionResult::new(ctx, vec![Effect::send(Notice::Welcome)])
        }

        Event::ProfileSaved => TransitionResult::new(ctx, vec![Effect::send(Notice::ProfileCreated)]),

        // =====================================================================
        // Browsing
        // =====================================================================
        Event::CandidateFound { candidate } => {
            let Some(profile) = candidate.profile else {
                ctx.previewing = None;
                return TransitionResult::new(ctx, vec![Effect::send(Notice::NoCandidates)]);
            };
            ctx.previewing = Some(candidate.id);
            TransitionResult::new(
                ctx,
                vec![Effect::send(Notice::CandidatePreview { profile })],
            )
        }

        Event::NoCandidate => {
            ctx.previewing = None;
            TransitionResult::new(ctx, vec![Effect::send(Notice::NoCandidates)])
        }

        Event::NotRegistered => {
            TransitionResult::new(ctx, vec![Effect::send(Notice::NotRegistered)])
        }

        Event::Decision(decision) => TransitionResult::new(
            ctx,
            vec![Effect::CheckMembership {
                action: GatedAction::Decide(decision),
            }],
        ),

        Event::LikeRecorded(outcome) => {
            let effects = match outcome {
                LikeOutcome::Liked { target } => vec![
                    Effect::send_to(target, Notice::SomeoneLikedYou),
                    Effect::send(Notice::Liked),
                ],
                LikeOutcome::Matched {
                    target,
                    viewer_name,
                    target_name,
                } => vec![
                    Effect::send_to(target, Notice::SomeoneLikedYou),
                    Effect::send(Notice::Matched {
                        with_name: target_name,
                    }),
                    Effect::send_to(
                        target,
                        Notice::Matched {
                            with_name: viewer_name,
                        },
                    ),
                ],
                LikeOutcome::AlreadyLiked => vec![Effect::send(Notice::AlreadyLiked)],
                LikeOutcome::TargetMissing => vec![Effect::send(Notice::CandidateGone)],
                LikeOutcome::NotRegistered => vec![Effect::send(Notice::NotRegistered)],
            };
            TransitionResult::new(ctx, effects)
        }

        // =====================================================================
        // Profile and matches
        // =====================================================================
        Event::OwnProfileLoaded(profile) => {
            TransitionResult::new(ctx, vec![Effect::send(Notice::OwnProfile { profile })])
        }

        Event::MatchesListed(matches) if matches.is_empty() => {
            TransitionResult::new(ctx, vec![Effect::send(Notice::NoMatches)])
        }

        Event::MatchesListed(matches) => {
            TransitionResult::new(ctx, vec![Effect::send(Notice::MatchList { matches })])
        }

        // =====================================================================
        // Relay chat
        // =====================================================================
        Event::Selection(Selection::ChatWith(target)) => {
            TransitionResult::new(ctx, vec![Effect::StartChat { target }])
        }

        Event::ChatStarted(outcome) => {
            let notice = match outcome {
                StartChatOutcome::Started { target_name, .. } => Notice::ChatStarted {
                    with_name: target_name,
                },
                StartChatOutcome::NotFound => Notice::UserNotFound,
                StartChatOutcome::NotMatched => Notice::NotMatched,
                StartChatOutcome::NotRegistered => Notice::NotRegistered,
            };
            TransitionResult::new(ctx, vec![Effect::Refresh { notice }])
        }

        Event::Text(text) => TransitionResult::new(
            ctx,
            vec![Effect::Relay {
                payload: RelayPayload::Text(text),
            }],
        ),

        Event::Photo(photo) => TransitionResult::new(
            ctx,
            vec![Effect::Relay {
                payload: RelayPayload::Photo(photo),
            }],
        ),

        Event::RelayResolved { target, payload } => {
            let effects = match target {
                RelayTarget::Partner(partner) => {
                    let notice = match payload {
                        RelayPayload::Text(text) => Notice::RelayedText { text },
                        RelayPayload::Photo(photo) => Notice::RelayedPhoto { photo },
                    };
                    vec![Effect::send_to(partner, notice)]
                }
                RelayTarget::Expired => vec![Effect::send(Notice::SessionExpired)],
                RelayTarget::NoPartner => vec![Effect::Log {
                    level: LogLevel::Debug,
                    message: "Dropping message from user without a chat partner".to_string(),
                }],
            };
            TransitionResult::new(ctx, effects)
        }

        Event::ChatStopped(StopOutcome::Stopped {
            partner,
            partner_left_alone,
        }) => {
            let mut effects = Vec::with_capacity(2);
            if partner_left_alone {
                effects.push(Effect::send_to(partner, Notice::PartnerLeft));
            }
            effects.push(Effect::send(Notice::ChatLeft));
            TransitionResult::new(ctx, effects)
        }

        Event::ChatStopped(StopOutcome::NotInSession) => {
            TransitionResult::new(ctx, vec![Effect::send(Notice::NotInSession)])
        }

        // Selector taps with no selector open (old messages, or a flow that was
        // cancelled) and tokens this bot never issued.
        Event::Selection(selection) => TransitionResult::new(
            ctx,
            vec![Effect::Log {
                level: LogLevel::Debug,
                message: format!("Ignoring stale selection token {:?}", selection.token()),
            }],
        ),
    }
}

fn handle_command(mut ctx: SessionContext, command: Command) -> TransitionResult {
    let effects = match command {
        Command::Start => vec![Effect::CheckMembership {
            action: GatedAction::Register,
        }],
        Command::Confess => vec![Effect::CheckMembership {
            action: GatedAction::Confess,
        }],
        Command::Browse => vec![Effect::FindCandidate],
        Command::Profile => vec![Effect::ShowOwnProfile],
        Command::Matches => vec![Effect::ListMatches],
        Command::StopChat => vec![Effect::StopChat],
        Command::Help => vec![Effect::send(Notice::Help)],
        Command::Unknown(name) => vec![Effect::send(Notice::UnknownCommand { name })],
        Command::Cancel => {
            let notice = match ctx.flow {
                Flow::Registering(_) => Notice::RegistrationCancelled,
                Flow::AwaitingConfession => Notice::ConfessionCancelled,
                Flow::Idle => Notice::NothingToCancel,
            };
            ctx.flow = Flow::Idle;
            vec![Effect::send(notice)]
        }
    };
    TransitionResult::new(ctx, effects)
}

/// Apply a Like/Skip to the current preview. Either response consumes it.
fn decide(mut ctx: SessionContext, decision: Decision) -> TransitionResult {
    let Some(target) = ctx.previewing.take() else {
        return TransitionResult::new(ctx, vec![Effect::send(Notice::NoPreview)]);
    };
    let effects = match decision {
        Decision::Like => vec![Effect::ExpressLike { target }],
        Decision::Skip => vec![Effect::send(Notice::Skipped)],
    };
    TransitionResult::new(ctx, effects)
}
