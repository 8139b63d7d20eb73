//! The closed university catalog.

/// Universities offered during registration and in the match filter.
pub const UNIVERSITIES: &[&str] = &[
    "Addis Ababa University",
    "Addis Ababa Science and Technology University",
    "Adama Science and Technology University",
    "Bahir Dar University",
    "Jimma University",
    "Hawassa University",
    "Mekelle University",
    "University of Gondar",
    "Haramaya University",
    "Arba Minch University",
];

/// Registration answer for anyone outside the catalog. Also the catch-all
/// option in the match filter, so those users can be matched.
pub const OTHER_UNIVERSITY: &str = "Other";

/// Match-filter sentinel meaning "no university restriction".
pub const ALL_UNIVERSITIES: &str = "All Universities";

/// True if `answer` is an acceptable registration answer for "which university".
pub fn is_valid_university(answer: &str) -> bool {
    answer == OTHER_UNIVERSITY || UNIVERSITIES.contains(&answer)
}

/// Every option of the match-filter multi-select, in display order.
pub fn selection_options() -> impl Iterator<Item = &'static str> {
    UNIVERSITIES
        .iter()
        .copied()
        .chain([OTHER_UNIVERSITY, ALL_UNIVERSITIES])
}

pub fn is_selection_option(option: &str) -> bool {
    selection_options().any(|o| o == option)
}

/// Label shown on the selector button for an option.
pub fn selection_label(option: &str) -> &str {
    if option == OTHER_UNIVERSITY {
        "Other institutions"
    } else {
        option
    }
}
