//! Effects (side effects as data).
//!
//! Effects describe what should happen as a result of a state transition.
//! They are pure data - the interpreter executes them against the store and
//! the messaging platform.

use super::event::RelayPayload;
use crate::command::Decision;
use crate::profile::{MatchSummary, PhotoRef, Profile, UserId};

/// All effects that can be produced by state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    // =========================================================================
    // Platform Effects
    // =========================================================================
    /// Check the user has joined every required channel before `action`.
    CheckMembership { action: GatedAction },

    /// Deliver a notice. Failures are logged and swallowed.
    Send { to: Recipient, notice: Notice },

    /// Replace the message the user's button tap came from, or send a new
    /// message if there is none.
    Refresh { notice: Notice },

    // =========================================================================
    // Store Effects
    // =========================================================================
    /// Create the stub record if needed and report whether it is registered.
    LookupRegistration,

    /// Upsert the completed profile and mark the user registered.
    SaveProfile { profile: Profile },

    FindCandidate,

    ExpressLike { target: UserId },

    ShowOwnProfile,

    ListMatches,

    StartChat { target: UserId },

    Relay { payload: RelayPayload },

    StopChat,

    // =========================================================================
    // Logging Effects
    // =========================================================================
    /// Log a message (for debugging/tracing).
    Log { level: LogLevel, message: String },
}

impl Effect {
    pub fn send(notice: Notice) -> Self {
        Effect::Send {
            to: Recipient::Sender,
            notice,
        }
    }

    pub fn send_to(user: UserId, notice: Notice) -> Self {
        Effect::Send {
            to: Recipient::User(user),
            notice,
        }
    }
}

/// Actions that require channel membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatedAction {
    Register,
    Confess,
    Decide(Decision),
}

/// Who receives a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// The user whose event is being processed.
    Sender,
    User(UserId),
    /// The public confession channel.
    ConfessionChannel,
}

/// User-facing messages. Rendering to text and keyboards lives in `render`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    // Membership
    JoinChannels,

    // Registration
    Welcome,
    WelcomeBack,
    AskName,
    AskUniversity,
    InvalidUniversity,
    AskAge,
    AgeNotANumber,
    AgeOutOfRange,
    AskGender,
    InvalidGender,
    UniversitySelector {
        selected: Vec<String>,
        /// Show the "select at least one" error above the selector.
        empty_error: bool,
    },
    SelectionSummary { selected: Vec<String> },
    AskInterests,
    AskBio,
    AskPhoto,
    PhotoRequired,
    ProfileCreated,
    RegistrationCancelled,

    // Browsing and likes
    NotRegistered,
    CandidatePreview { profile: Profile },
    NoCandidates,
    NoPreview,
    Liked,
    Skipped,
    AlreadyLiked,
    CandidateGone,
    SomeoneLikedYou,
    Matched { with_name: String },

    // Profile and matches
    OwnProfile { profile: Profile },
    MatchList { matches: Vec<MatchSummary> },
    NoMatches,

    // Relay chat
    ChatStarted { with_name: String },
    UserNotFound,
    NotMatched,
    RelayedText { text: String },
    RelayedPhoto { photo: PhotoRef },
    SessionExpired,
    ChatLeft,
    PartnerLeft,
    NotInSession,

    // Confession
    ConfessionPrompt,
    ConfessionTooLong,
    ConfessionTextOnly,
    ConfessionPost { text: String },
    ConfessionPosted,
    ConfessionCancelled,

    // General
    NothingToCancel,
    Help,
    UnknownCommand { name: String },
    ServiceUnavailable,
}

/// Log level for logging effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}
