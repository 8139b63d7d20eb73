//! Per-user conversational state.
//!
//! Every registration step carries exactly the answers collected so far, so a
//! step can only be reached with its predecessors' answers present.

use crate::catalog::ALL_UNIVERSITIES;
use crate::profile::{Gender, PhotoRef, Profile, UserId};

pub const MIN_AGE: u8 = 18;
pub const MAX_AGE: u8 = 30;

/// Ephemeral per-user context. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub flow: Flow,
    /// Candidate currently shown to the user by `/browse`.
    pub previewing: Option<UserId>,
}

impl SessionContext {
    pub fn with_flow(flow: Flow) -> Self {
        Self {
            flow,
            previewing: None,
        }
    }

    /// True if the context carries nothing worth keeping.
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Which multi-message flow, if any, owns the user's free-form input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Flow {
    #[default]
    Idle,
    Registering(RegistrationStep),
    AwaitingConfession,
}

impl Flow {
    pub fn name(&self) -> &'static str {
        match self {
            Flow::Idle => "idle",
            Flow::Registering(_) => "registering",
            Flow::AwaitingConfession => "awaiting_confession",
        }
    }
}

/// Answers to the first three questions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Basics {
    pub name: String,
    pub university: String,
    pub age: u8,
}

/// Everything collected up to and including the university filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub basics: Basics,
    pub gender: Gender,
    pub preferred_universities: Vec<String>,
}

impl Draft {
    pub fn complete(self, interests: String, bio: String, photo: PhotoRef) -> Profile {
        Profile {
            name: self.basics.name,
            university: self.basics.university,
            age: self.basics.age,
            gender: self.gender,
            interests,
            bio,
            photo,
            looking_for: self.gender.opposite(),
            preferred_universities: self.preferred_universities,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationStep {
    Name,
    University {
        name: String,
    },
    Age {
        name: String,
        university: String,
    },
    Gender {
        basics: Basics,
    },
    UniversitySelection {
        basics: Basics,
        gender: Gender,
        selected: UniversitySelection,
    },
    Interests {
        draft: Draft,
    },
    Bio {
        draft: Draft,
        interests: String,
    },
    Photo {
        draft: Draft,
        interests: String,
        bio: String,
    },
}

impl RegistrationStep {
    pub fn name(&self) -> &'static str {
        match self {
            RegistrationStep::Name => "name",
            RegistrationStep::University { .. } => "university",
            RegistrationStep::Age { .. } => "age",
            RegistrationStep::Gender { .. } => "gender",
            RegistrationStep::UniversitySelection { .. } => "university_selection",
            RegistrationStep::Interests { .. } => "interests",
            RegistrationStep::Bio { .. } => "bio",
            RegistrationStep::Photo { .. } => "photo",
        }
    }
}

/// Working set of the university multi-select, in selection order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniversitySelection(Vec<String>);

impl UniversitySelection {
    /// Toggle `option`.
    ///
    /// Choosing the "all" sentinel replaces the set with just the sentinel;
    /// choosing anything else while the sentinel is set drops the sentinel.
    pub fn toggle(&mut self, option: &str) {
        if let Some(pos) = self.0.iter().position(|s| s == option) {
            self.0.remove(pos);
        } else if option == ALL_UNIVERSITIES {
            self.0 = vec![ALL_UNIVERSITIES.to_string()];
        } else {
            self.0.retain(|s| s != ALL_UNIVERSITIES);
            self.0.push(option.to_string());
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}
