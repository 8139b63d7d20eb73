//! Registration flow transitions.
//!
//! Invalid answers re-prompt and leave the step unchanged. The completed
//! profile is only written once a photo arrives; until then nothing the user
//! typed is persisted.

use super::super::effect::{Effect, LogLevel, Notice};
use super::super::event::Event;
use super::super::state::{
    Basics, Draft, Flow, RegistrationStep, SessionContext, UniversitySelection, MAX_AGE, MIN_AGE,
};
use super::TransitionResult;
use crate::catalog::{is_selection_option, is_valid_university};
use crate::command::Selection;
use crate::profile::{Gender, PhotoRef};

/// Input accepted by the registration flow.
enum Input {
    Text(String),
    Photo(PhotoRef),
    Toggle(String),
    Confirm,
}

pub fn handle(ctx: SessionContext, event: Event) -> TransitionResult {
    let SessionContext { flow, previewing } = ctx;
    let step = match flow {
        Flow::Registering(step) => step,
        flow => return TransitionResult::no_change(SessionContext { flow, previewing }),
    };

    let input = match event {
        Event::Text(text) => Input::Text(text),
        Event::Decision(decision) => Input::Text(decision.label().to_string()),
        Event::Photo(photo) => Input::Photo(photo),
        Event::Selection(Selection::Toggle(option)) => Input::Toggle(option),
        Event::Selection(Selection::Confirm) => Input::Confirm,
        _ => {
            return TransitionResult::no_change(SessionContext {
                flow: Flow::Registering(step),
                previewing,
            })
        }
    };

    let (next, effects) = advance(step, input);
    TransitionResult::new(
        SessionContext {
            flow: next,
            previewing,
        },
        effects,
    )
}

/// Move to (or stay at) `step` and ask its question.
fn ask(step: RegistrationStep, notice: Notice) -> (Flow, Vec<Effect>) {
    (Flow::Registering(step), vec![Effect::send(notice)])
}

/// The question asked at `step`, used to re-prompt on unexpected input.
fn prompt(step: &RegistrationStep) -> Notice {
    match step {
        RegistrationStep::Name => Notice::AskName,
        RegistrationStep::University { .. } => Notice::AskUniversity,
        RegistrationStep::Age { .. } => Notice::AskAge,
        RegistrationStep::Gender { .. } => Notice::AskGender,
        RegistrationStep::UniversitySelection { selected, .. } => Notice::UniversitySelector {
            selected: selected.as_slice().to_vec(),
            empty_error: false,
        },
        RegistrationStep::Interests { .. } => Notice::AskInterests,
        RegistrationStep::Bio { .. } => Notice::AskBio,
        RegistrationStep::Photo { .. } => Notice::PhotoRequired,
    }
}

fn parse_age(text: &str) -> Result<u8, Notice> {
    let age: i64 = text.trim().parse().map_err(|_| Notice::AgeNotANumber)?;
    u8::try_from(age)
        .ok()
        .filter(|age| (MIN_AGE..=MAX_AGE).contains(age))
        .ok_or(Notice::AgeOutOfRange)
}

fn advance(step: RegistrationStep, input: Input) -> (Flow, Vec<Effect>) {
    use RegistrationStep as Step;

    match (step, input) {
        (Step::Name, Input::Text(name)) if !name.trim().is_empty() => {
            ask(Step::University { name }, Notice::AskUniversity)
        }

        (Step::University { name }, Input::Text(university)) => {
            if is_valid_university(&university) {
                ask(Step::Age { name, university }, Notice::AskAge)
            } else {
                ask(Step::University { name }, Notice::InvalidUniversity)
            }
        }

        (Step::Age { name, university }, Input::Text(text)) => match parse_age(&text) {
            Ok(age) => ask(
                Step::Gender {
                    basics: Basics {
                        name,
                        university,
                        age,
                    },
                },
                Notice::AskGender,
            ),
            Err(notice) => ask(Step::Age { name, university }, notice),
        },

        (Step::Gender { basics }, Input::Text(text)) => match text.parse::<Gender>() {
            Ok(gender) => ask(
                Step::UniversitySelection {
                    basics,
                    gender,
                    selected: UniversitySelection::default(),
                },
                Notice::UniversitySelector {
                    selected: vec![],
                    empty_error: false,
                },
            ),
            Err(()) => ask(Step::Gender { basics }, Notice::InvalidGender),
        },

        (
            Step::UniversitySelection {
                basics,
                gender,
                mut selected,
            },
            Input::Toggle(option),
        ) => {
            if !is_selection_option(&option) {
                let step = Step::UniversitySelection {
                    basics,
                    gender,
                    selected,
                };
                return (
                    Flow::Registering(step),
                    vec![Effect::Log {
                        level: LogLevel::Warn,
                        message: "Ignoring selector token outside the catalog".to_string(),
                    }],
                );
            }
            selected.toggle(&option);
            let notice = Notice::UniversitySelector {
                selected: selected.as_slice().to_vec(),
                empty_error: false,
            };
            (
                Flow::Registering(Step::UniversitySelection {
                    basics,
                    gender,
                    selected,
                }),
                vec![Effect::Refresh { notice }],
            )
        }

        (
            Step::UniversitySelection {
                basics,
                gender,
                selected,
            },
            Input::Confirm,
        ) => {
            if selected.is_empty() {
                return ask(
                    Step::UniversitySelection {
                        basics,
                        gender,
                        selected,
                    },
                    Notice::UniversitySelector {
                        selected: vec![],
                        empty_error: true,
                    },
                );
            }
            let preferred_universities = selected.into_vec();
            let summary = Notice::SelectionSummary {
                selected: preferred_universities.clone(),
            };
            (
                Flow::Registering(Step::Interests {
                    draft: Draft {
                        basics,
                        gender,
                        preferred_universities,
                    },
                }),
                vec![
                    Effect::Refresh { notice: summary },
                    Effect::send(Notice::AskInterests),
                ],
            )
        }

        (Step::Interests { draft }, Input::Text(interests)) if !interests.trim().is_empty() => {
            ask(Step::Bio { draft, interests }, Notice::AskBio)
        }

        (Step::Bio { draft, interests }, Input::Text(bio)) if !bio.trim().is_empty() => ask(
            Step::Photo {
                draft,
                interests,
                bio,
            },
            Notice::AskPhoto,
        ),

        (
            Step::Photo {
                draft,
                interests,
                bio,
            },
            Input::Photo(photo),
        ) => {
            let profile = draft.complete(interests, bio, photo);
            (Flow::Idle, vec![Effect::SaveProfile { profile }])
        }

        // Selector taps on a step without a selector come from old messages.
        (step, Input::Toggle(_) | Input::Confirm) => (
            Flow::Registering(step),
            vec![Effect::Log {
                level: LogLevel::Debug,
                message: "Ignoring stale selector tap during registration".to_string(),
            }],
        ),

        // Wrong kind of input, or blank text: ask the same question again.
        (step, _) => {
            let notice = prompt(&step);
            ask(step, notice)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{registration_started, transition};
    use super::*;
    use crate::catalog::{ALL_UNIVERSITIES, OTHER_UNIVERSITY};
    use crate::profile::{Profile, UserId};

    const JU: &str = "Jimma University";
    const AAU: &str = "Addis Ababa University";

    fn step(result: &TransitionResult) -> &RegistrationStep {
        match &result.ctx.flow {
            Flow::Registering(step) => step,
            other => panic!("expected registration, got {other:?}"),
        }
    }

    fn text(ctx: SessionContext, s: &str) -> TransitionResult {
        transition(ctx, Event::Text(s.to_string()))
    }

    fn tap(ctx: SessionContext, token: &str) -> TransitionResult {
        transition(ctx, Event::Selection(Selection::parse(token)))
    }

    /// Drive a fresh registration up to the university selector.
    fn at_selector() -> SessionContext {
        let mut ctx = registration_started();
        for answer in ["Sara", JU, "21", "Female"] {
            ctx = text(ctx, answer).ctx;
        }
        assert_eq!(step(&TransitionResult::no_change(ctx.clone())).name(), "university_selection");
        ctx
    }

    #[test]
    fn test_name_then_university_prompt() {
        let result = text(registration_started(), "Sara");
        assert_eq!(step(&result).name(), "university");
        assert_eq!(result.effects, vec![Effect::send(Notice::AskUniversity)]);
    }

    #[test]
    fn test_blank_name_reprompts() {
        let result = text(registration_started(), "   ");
        assert_eq!(step(&result), &RegistrationStep::Name);
        assert_eq!(result.effects, vec![Effect::send(Notice::AskName)]);
    }

    #[test]
    fn test_university_must_be_in_catalog() {
        let ctx = text(registration_started(), "Sara").ctx;
        let rejected = text(ctx.clone(), "Harvard");
        assert_eq!(rejected.ctx, ctx);
        assert_eq!(rejected.effects, vec![Effect::send(Notice::InvalidUniversity)]);

        let accepted = text(ctx, OTHER_UNIVERSITY);
        assert_eq!(step(&accepted).name(), "age");
    }

    #[test]
    fn test_age_validation() {
        let mut ctx = registration_started();
        ctx = text(ctx, "Sara").ctx;
        ctx = text(ctx, JU).ctx;

        let not_number = text(ctx.clone(), "twenty");
        assert_eq!(not_number.ctx, ctx);
        assert_eq!(not_number.effects, vec![Effect::send(Notice::AgeNotANumber)]);

        for out_of_range in ["17", "31", "-20", "300"] {
            let result = text(ctx.clone(), out_of_range);
            assert_eq!(result.ctx, ctx, "age {out_of_range}");
            assert_eq!(result.effects, vec![Effect::send(Notice::AgeOutOfRange)]);
        }

        for ok in ["18", " 30 "] {
            assert_eq!(step(&text(ctx.clone(), ok)).name(), "gender");
        }
    }

    #[test]
    fn test_gender_is_exact() {
        let mut ctx = registration_started();
        for answer in ["Sara", JU, "21"] {
            ctx = text(ctx, answer).ctx;
        }
        let rejected = text(ctx.clone(), "female");
        assert_eq!(rejected.ctx, ctx);
        assert_eq!(rejected.effects, vec![Effect::send(Notice::InvalidGender)]);

        let accepted = text(ctx, "Female");
        assert_eq!(
            accepted.effects,
            vec![Effect::send(Notice::UniversitySelector {
                selected: vec![],
                empty_error: false
            })]
        );
    }

    #[test]
    fn test_selector_toggles_and_refreshes() {
        let ctx = tap(at_selector(), ALL_UNIVERSITIES).ctx;
        let result = tap(ctx, JU);
        assert_eq!(
            result.effects,
            vec![Effect::Refresh {
                notice: Notice::UniversitySelector {
                    selected: vec![JU.to_string()],
                    empty_error: false
                }
            }]
        );
    }

    #[test]
    fn test_confirm_with_empty_selection_stays_open() {
        let ctx = at_selector();
        let result = tap(ctx.clone(), "__done__");
        assert_eq!(result.ctx, ctx);
        assert_eq!(
            result.effects,
            vec![Effect::send(Notice::UniversitySelector {
                selected: vec![],
                empty_error: true
            })]
        );
    }

    #[test]
    fn test_text_at_selector_reshows_it() {
        let ctx = tap(at_selector(), AAU).ctx;
        let result = text(ctx.clone(), "done");
        assert_eq!(result.ctx, ctx);
        assert_eq!(
            result.effects,
            vec![Effect::send(Notice::UniversitySelector {
                selected: vec![AAU.to_string()],
                empty_error: false
            })]
        );
    }

    #[test]
    fn test_photo_required_at_last_step() {
        let mut ctx = tap(at_selector(), AAU).ctx;
        ctx = tap(ctx, "__done__").ctx;
        ctx = text(ctx, "coffee").ctx;
        ctx = text(ctx, "hi there").ctx;

        let rejected = text(ctx.clone(), "here is my photo");
        assert_eq!(rejected.ctx, ctx);
        assert_eq!(rejected.effects, vec![Effect::send(Notice::PhotoRequired)]);
    }

    #[test]
    fn test_photo_before_last_step_reprompts() {
        let ctx = text(registration_started(), "Sara").ctx;
        let result = transition(ctx.clone(), Event::Photo(PhotoRef::from("p")));
        assert_eq!(result.ctx, ctx);
        assert_eq!(result.effects, vec![Effect::send(Notice::AskUniversity)]);
    }

    #[test]
    fn test_full_registration_saves_profile() {
        let mut ctx = registration_started();
        ctx.previewing = Some(UserId(3));
        ctx = text(ctx, "Sara").ctx;
        // Last valid answer wins; invalid ones leave no trace.
        ctx = text(ctx, "Nowhere U").ctx;
        ctx = text(ctx, JU).ctx;
        ctx = text(ctx, "99").ctx;
        ctx = text(ctx, "22").ctx;
        ctx = text(ctx, "Female").ctx;
        ctx = tap(ctx, JU).ctx;
        ctx = tap(ctx, AAU).ctx;
        ctx = tap(ctx, JU).ctx;

        let confirmed = tap(ctx, "__done__");
        assert_eq!(
            confirmed.effects,
            vec![
                Effect::Refresh {
                    notice: Notice::SelectionSummary {
                        selected: vec![AAU.to_string()]
                    }
                },
                Effect::send(Notice::AskInterests),
            ]
        );
        ctx = confirmed.ctx;
        ctx = text(ctx, "music").ctx;
        ctx = text(ctx, "curious").ctx;

        let done = transition(ctx, Event::Photo(PhotoRef::from("photo-1")));
        assert_eq!(done.ctx.flow, Flow::Idle);
        assert_eq!(done.ctx.previewing, Some(UserId(3)));
        assert_eq!(
            done.effects,
            vec![Effect::SaveProfile {
                profile: Profile {
                    name: "Sara".into(),
                    university: JU.into(),
                    age: 22,
                    gender: Gender::Female,
                    interests: "music".into(),
                    bio: "curious".into(),
                    photo: PhotoRef::from("photo-1"),
                    looking_for: Gender::Male,
                    preferred_universities: vec![AAU.into()],
                }
            }]
        );
    }

    #[test]
    fn test_stale_confirm_before_selector_is_ignored() {
        let ctx = text(registration_started(), "Sara").ctx;
        let result = tap(ctx.clone(), "__done__");
        assert_eq!(result.ctx, ctx);
        assert!(matches!(result.effects.as_slice(), [Effect::Log { .. }]));
    }
}
