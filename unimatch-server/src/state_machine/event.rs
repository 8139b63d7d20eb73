//! Events that trigger state transitions.
//!
//! Inbound events come from the user and are classified at the platform
//! boundary. Result events are produced by the interpreter after executing
//! an effect and are fed back into the transition function.

use super::effect::GatedAction;
use crate::command::{Command, Decision, Selection};
use crate::engine::{LikeOutcome, StartChatOutcome, StopOutcome};
use crate::profile::{MatchSummary, PhotoRef, Profile, User};
use crate::repository::RelayTarget;

/// Something a user sent that can be forwarded to a chat partner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayPayload {
    Text(String),
    Photo(PhotoRef),
}

/// All events that can trigger state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // =========================================================================
    // Inbound Events
    // =========================================================================
    Command(Command),
    /// Plain text that is neither a command nor a Like/Skip label.
    Text(String),
    /// A photo; carries the largest available size.
    Photo(PhotoRef),
    Selection(Selection),
    Decision(Decision),

    // =========================================================================
    // Result Events
    // =========================================================================
    MembershipChecked {
        action: GatedAction,
        is_member: bool,
    },

    /// The user's stub record exists; `registered` says whether it is complete.
    RegistrationLookedUp { registered: bool },

    ProfileSaved,

    CandidateFound { candidate: User },

    NoCandidate,

    /// The operation needs a completed profile and the user has none.
    NotRegistered,

    LikeRecorded(LikeOutcome),

    OwnProfileLoaded(Profile),

    MatchesListed(Vec<MatchSummary>),

    ChatStarted(StartChatOutcome),

    RelayResolved {
        target: RelayTarget,
        payload: RelayPayload,
    },

    ChatStopped(StopOutcome),
}

impl Event {
    /// Compact one-line description for logs. Never includes message
    /// bodies, photo ids or profile contents.
    pub fn log_summary(&self) -> String {
        match self {
            Event::Command(command) => format!("Command({})", command),
            Event::Text(text) => format!("Text {{ chars: {} }}", text.chars().count()),
            Event::Photo(_) => "Photo".to_string(),
            Event::Selection(selection) => match selection {
                Selection::Toggle(_) => "Selection(Toggle)".to_string(),
                Selection::Confirm => "Selection(Confirm)".to_string(),
                Selection::ChatWith(id) => format!("Selection(ChatWith {})", id),
                Selection::Unknown(_) => "Selection(Unknown)".to_string(),
            },
            Event::Decision(decision) => format!("Decision({:?})", decision),
            Event::MembershipChecked { action, is_member } => {
                format!(
                    "MembershipChecked {{ action: {:?}, member: {} }}",
                    action, is_member
                )
            }
            Event::RegistrationLookedUp { registered } => {
                format!("RegistrationLookedUp {{ registered: {} }}", registered)
            }
            Event::ProfileSaved => "ProfileSaved".to_string(),
            Event::CandidateFound { candidate } => {
                format!("CandidateFound {{ id: {} }}", candidate.id)
            }
            Event::NoCandidate => "NoCandidate".to_string(),
            Event::NotRegistered => "NotRegistered".to_string(),
            Event::LikeRecorded(outcome) => match outcome {
                LikeOutcome::Liked { target } => format!("LikeRecorded(Liked {})", target),
                LikeOutcome::Matched { target, .. } => {
                    format!("LikeRecorded(Matched {})", target)
                }
                other => format!("LikeRecorded({:?})", other),
            },
            Event::OwnProfileLoaded(_) => "OwnProfileLoaded".to_string(),
            Event::MatchesListed(matches) => format!("MatchesListed {{ count: {} }}", matches.len()),
            Event::ChatStarted(outcome) => match outcome {
                StartChatOutcome::Started { target, .. } => {
                    format!("ChatStarted(Started {})", target)
                }
                other => format!("ChatStarted({:?})", other),
            },
            Event::RelayResolved { target, payload } => {
                let kind = match payload {
                    RelayPayload::Text(_) => "text",
                    RelayPayload::Photo(_) => "photo",
                };
                format!("RelayResolved {{ target: {:?}, payload: {} }}", target, kind)
            }
            Event::ChatStopped(outcome) => format!("ChatStopped({:?})", outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_summary_hides_contents() {
        let secret = "my deepest secret";
        let summary = Event::Text(secret.to_string()).log_summary();
        assert!(!summary.contains(secret));
        assert_eq!(summary, "Text { chars: 17 }");

        let summary = Event::RelayResolved {
            target: RelayTarget::NoPartner,
            payload: RelayPayload::Text(secret.to_string()),
        }
        .log_summary();
        assert!(!summary.contains(secret));

        let summary = Event::Photo(PhotoRef::from("AgACAgQAAxk")).log_summary();
        assert_eq!(summary, "Photo");
    }
}
