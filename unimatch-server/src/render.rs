//! Rendering of notices into platform messages.
//!
//! All user-facing wording lives here. Messages are sent as plain text, so
//! names and bios typed by users never need escaping.

use crate::catalog::{selection_label, selection_options, OTHER_UNIVERSITY, UNIVERSITIES};
use crate::command::{Decision, Selection};
use crate::config::ChannelConfig;
use crate::messenger::{Delivery, InlineButton, Keyboard};
use crate::profile::Profile;
use crate::state_machine::state::{MAX_AGE, MIN_AGE};
use crate::state_machine::transition::CONFESSION_MAX_CHARS;
use crate::state_machine::Notice;

const COMMAND_OVERVIEW: &str = "Use /browse to discover profiles, /profile to view yours, \
/matches to chat with your matches.";

const SELECTOR_PROMPT: &str = "🏫 Select all universities you are interested in for matches.\n\
Tap to select/deselect. Press ✅ Done when finished.";

/// Bot API limit for a message text, in UTF-16 code units.
pub const MAX_TEXT_LEN: usize = 4096;

/// Bot API limit for a photo caption, in UTF-16 code units.
pub const MAX_CAPTION_LEN: usize = 1024;

/// Turn a notice into the message to send, clipped to the Bot API limits.
pub fn render(notice: &Notice, channels: &ChannelConfig) -> Delivery {
    match compose(notice, channels) {
        Delivery::Text { text, keyboard } => Delivery::Text {
            text: clip(text, MAX_TEXT_LEN),
            keyboard,
        },
        Delivery::Photo {
            photo,
            caption,
            keyboard,
        } => Delivery::Photo {
            photo,
            caption: clip(caption, MAX_CAPTION_LEN),
            keyboard,
        },
    }
}

/// Cut `text` to at most `limit` UTF-16 units, marking the cut with an ellipsis.
fn clip(mut text: String, limit: usize) -> String {
    if text.encode_utf16().count() <= limit {
        return text;
    }
    let budget = limit - '…'.len_utf16();
    let mut used = 0;
    let mut end = 0;
    for (i, c) in text.char_indices() {
        if used + c.len_utf16() > budget {
            break;
        }
        used += c.len_utf16();
        end = i + c.len_utf8();
    }
    text.truncate(end);
    text.push('…');
    text
}

fn compose(notice: &Notice, channels: &ChannelConfig) -> Delivery {
    match notice {
        Notice::JoinChannels => Delivery::text(join_channels(channels)),

        Notice::Welcome => Delivery::text(
            "🎉 Welcome to Unimatch Ethio – Ethiopia's #1 University Dating Bot!\n\n\
             Let's create your profile. What's your name? 😊",
        )
        .with_keyboard(Keyboard::RemoveReply),
        Notice::WelcomeBack => Delivery::text(format!(
            "👋 Welcome back to Unimatch Ethio! Ready to find your campus match? 💘\n\n{}",
            COMMAND_OVERVIEW
        )),
        Notice::AskName => Delivery::text("😊 What's your name?"),
        Notice::AskUniversity => {
            Delivery::text("🏫 Which university do you attend? Please select from the list:")
                .with_keyboard(university_keyboard())
        }
        Notice::InvalidUniversity => Delivery::text("❗️Please select a university from the list.")
            .with_keyboard(university_keyboard()),
        Notice::AskAge => Delivery::text("🎂 How old are you?").with_keyboard(age_keyboard()),
        Notice::AgeNotANumber => {
            Delivery::text("🔢 Please select your age using the buttons.")
                .with_keyboard(age_keyboard())
        }
        Notice::AgeOutOfRange => Delivery::text(format!(
            "🔞 Please select your age using the buttons ({}-{}).",
            MIN_AGE, MAX_AGE
        ))
        .with_keyboard(age_keyboard()),
        Notice::AskGender => Delivery::text("🚻 What's your gender?").with_keyboard(gender_keyboard()),
        Notice::InvalidGender => {
            Delivery::text("❗️Please select Male or Female.").with_keyboard(gender_keyboard())
        }
        Notice::UniversitySelector {
            selected,
            empty_error,
        } => {
            let text = if *empty_error {
                format!("❗️Please select at least one university.\n\n{}", SELECTOR_PROMPT)
            } else {
                SELECTOR_PROMPT.to_string()
            };
            Delivery::text(text).with_keyboard(selector_keyboard(selected))
        }
        Notice::SelectionSummary { selected } => {
            Delivery::text(format!("Selected universities: {}", selected.join(", ")))
        }
        Notice::AskInterests => Delivery::text("🎯 What are your interests? (comma separated)")
            .with_keyboard(Keyboard::RemoveReply),
        Notice::AskBio => Delivery::text("📝 Write a short bio about yourself."),
        Notice::AskPhoto => Delivery::text("📸 Send a profile photo (photo is required)."),
        Notice::PhotoRequired => {
            Delivery::text("❗️Photo is required. Please send a profile photo.")
        }
        Notice::ProfileCreated => {
            Delivery::text("✅ Profile created! Use /browse to find matches. Good luck! 🍀")
                .with_keyboard(Keyboard::RemoveReply)
        }
        Notice::RegistrationCancelled => Delivery::text(
            "Registration cancelled. Nothing was saved. Send /start to begin again.",
        )
        .with_keyboard(Keyboard::RemoveReply),

        Notice::NotRegistered => Delivery::text("❗️You need to register first. Use /start."),
        Notice::CandidatePreview { profile } => Delivery::Photo {
            photo: profile.photo.clone(),
            caption: profile_caption("✨ Profile Preview", profile, false),
            keyboard: Keyboard::Reply(vec![vec![
                Decision::Like.label().to_string(),
                Decision::Skip.label().to_string(),
            ]]),
        },
        Notice::NoCandidates => Delivery::text(
            "😕 No more profiles match your criteria right now. Please check back later!",
        ),
        Notice::NoPreview => Delivery::text("❗️No profile selected. Use /browse."),
        Notice::Liked => Delivery::text("👍 Liked! Use /browse to see more profiles.")
            .with_keyboard(Keyboard::RemoveReply),
        Notice::Skipped => Delivery::text("⏭️ Skipped. Use /browse to see more profiles.")
            .with_keyboard(Keyboard::RemoveReply),
        Notice::AlreadyLiked => Delivery::text(
            "👍 You already liked this profile. Use /browse to see more profiles.",
        )
        .with_keyboard(Keyboard::RemoveReply),
        Notice::CandidateGone => Delivery::text(
            "❗️That profile is no longer available. Use /browse to see more profiles.",
        )
        .with_keyboard(Keyboard::RemoveReply),
        Notice::SomeoneLikedYou => Delivery::text(
            "💌 Someone just liked your profile on Unimatch Ethio!\n\
             Browse profiles to see if you like them back and get a match!",
        ),
        Notice::Matched { with_name } => Delivery::text(format!(
            "🎉 It's a match! You and {} liked each other! Start a conversation now. 🥳",
            with_name
        ))
        .with_keyboard(Keyboard::RemoveReply),

        Notice::OwnProfile { profile } => Delivery::Photo {
            photo: profile.photo.clone(),
            caption: profile_caption("👤 Your Profile", profile, true),
            keyboard: Keyboard::None,
        },
        Notice::MatchList { matches } => {
            let buttons = matches
                .iter()
                .map(|m| {
                    vec![InlineButton {
                        text: format!("{} ({})", m.name, m.university),
                        data: Selection::ChatWith(m.id).token(),
                    }]
                })
                .collect();
            Delivery::text("💑 Your matches:\nTap a name to start chatting anonymously.")
                .with_keyboard(Keyboard::Inline(buttons))
        }
        Notice::NoMatches => {
            Delivery::text("💔 You have no matches yet. Keep browsing and liking!")
        }

        Notice::ChatStarted { with_name } => Delivery::text(format!(
            "🗨️ You are now chatting anonymously with {}.\n\
             Send a message and I'll deliver it!\n\
             Send /stopchat to end this chat.",
            with_name
        )),
        Notice::UserNotFound => Delivery::text("❗️User not found."),
        Notice::NotMatched => {
            Delivery::text("❗️You can only chat with your matches. Use /matches.")
        }
        Notice::RelayedText { text } => {
            Delivery::text(format!("💬 Anonymous message from your match:\n\n{}", text))
        }
        Notice::RelayedPhoto { photo } => Delivery::Photo {
            photo: photo.clone(),
            caption: "📷 Anonymous photo from your match".to_string(),
            keyboard: Keyboard::None,
        },
        Notice::SessionExpired => {
            Delivery::text("❗️Chat session expired. Use /matches to start again.")
        }
        Notice::ChatLeft => {
            Delivery::text("🔕 You have left the chat. Use /matches to chat again.")
        }
        Notice::PartnerLeft => Delivery::text(
            "🔕 Your match has left the chat. Use /matches to start a new chat.",
        ),
        Notice::NotInSession => Delivery::text("❗️You are not in a chat session."),

        Notice::ConfessionPrompt => Delivery::text(format!(
            "💌 Write your anonymous confession (max {} characters):\nType /cancel to abort.",
            CONFESSION_MAX_CHARS
        ))
        .with_keyboard(Keyboard::RemoveReply),
        Notice::ConfessionTooLong => Delivery::text(format!(
            "❌ Confession too long (max {} characters). Try again:",
            CONFESSION_MAX_CHARS
        )),
        Notice::ConfessionTextOnly => Delivery::text(
            "❗️Confessions are text only. Write your confession or type /cancel.",
        ),
        Notice::ConfessionPost { text } => {
            Delivery::text(format!("📩 New Confession:\n\n{}", text))
        }
        Notice::ConfessionPosted => {
            Delivery::text("✅ Your confession has been posted anonymously!")
        }
        Notice::ConfessionCancelled => {
            Delivery::text("Confession cancelled.").with_keyboard(Keyboard::RemoveReply)
        }

        Notice::NothingToCancel => Delivery::text("Nothing to cancel."),
        Notice::Help => Delivery::text(HELP_TEXT),
        Notice::UnknownCommand { name } => Delivery::text(format!(
            "❓ Unknown command /{}. Send /help to see what I can do.",
            name
        )),
        Notice::ServiceUnavailable => Delivery::text(
            "⚠️ Unimatch is temporarily unavailable. Please try again in a moment.",
        ),
    }
}

const HELP_TEXT: &str = "💘 Unimatch Ethio commands:\n\
/start - create your profile\n\
/browse - discover profiles\n\
/profile - view your profile\n\
/matches - chat with your matches\n\
/stopchat - leave the current chat\n\
/confess - post an anonymous confession\n\
/cancel - abandon registration or a confession\n\
/help - show this message";

fn join_channels(channels: &ChannelConfig) -> String {
    let mut text = String::from("🚨 To use Unimatch Ethio, you must join these channels:\n");
    for channel in &channels.required {
        text.push_str("👉 ");
        text.push_str(&channel_link(channel));
        text.push('\n');
    }
    text.push_str("After joining, press /start again. 💌");
    text
}

/// Public link for an `@username` channel; numeric ids have none.
fn channel_link(channel: &str) -> String {
    match channel.strip_prefix('@') {
        Some(username) => format!("https://t.me/{}", username),
        None => channel.to_string(),
    }
}

fn profile_caption(title: &str, profile: &Profile, with_preferences: bool) -> String {
    let mut caption = format!(
        "{}\nName: {}\nUniversity: {}\nAge: {}\nGender: {}\nInterests: {}\nBio: {}",
        title,
        profile.name,
        profile.university,
        profile.age,
        profile.gender,
        profile.interests,
        profile.bio
    );
    if with_preferences {
        caption.push_str("\nInterested in: ");
        caption.push_str(&profile.preferred_universities.join(", "));
    }
    caption
}

fn university_keyboard() -> Keyboard {
    let mut rows: Vec<Vec<String>> = UNIVERSITIES
        .chunks(2)
        .map(|pair| pair.iter().map(|u| u.to_string()).collect())
        .collect();
    rows.push(vec![OTHER_UNIVERSITY.to_string()]);
    Keyboard::Reply(rows)
}

fn age_keyboard() -> Keyboard {
    Keyboard::Reply((MIN_AGE..=MAX_AGE).map(|age| vec![age.to_string()]).collect())
}

fn gender_keyboard() -> Keyboard {
    Keyboard::Reply(vec![vec!["Male".to_string()], vec!["Female".to_string()]])
}

fn selector_keyboard(selected: &[String]) -> Keyboard {
    let mut rows: Vec<Vec<InlineButton>> = selection_options()
        .map(|option| {
            let mark = if selected.iter().any(|s| s == option) {
                "✔️ "
            } else {
                ""
            };
            vec![InlineButton {
                text: format!("{}{}", mark, selection_label(option)),
                data: Selection::Toggle(option.to_string()).token(),
            }]
        })
        .collect();
    rows.push(vec![InlineButton {
        text: "✅ Done".to_string(),
        data: Selection::Confirm.token(),
    }]);
    Keyboard::Inline(rows)
}
