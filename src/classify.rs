use regex::Regex;
use std::sync::LazyLock;

pub const SOFTWARE_FAMILY: &str = "SDE";

// Customer-facing engineering tracks that share words with software roles.
static EXCLUDES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)sales engineer|solutions engineer|support engineer|field engineer|implementation|customer success|professional services",
    )
    .expect("valid exclude pattern")
});

static INCLUDES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        software\s+(engineer|developer)
        | \b(swe|sde|sre|ios)\b
        | back-?\s?end | front-?\s?end | full[\s-]?stack
        | (platform|infrastructure|mobile|compiler|kernel|systems)\s+engineer
        | (data|ml)\s+platform\s+engineer
        | distributed\s+systems
        | site\s+reliability
        | devops | android
        | developer\s+productivity
        | build\s+(&|and)\s+release
        ",
    )
    .expect("valid include pattern")
});

static GENERIC_ENGINEER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bengineer").expect("valid engineer pattern"));
static GENERIC_SOFTWARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bsoftware\b").expect("valid software pattern"));

/// Role family for a posting title, or `None` when the title is not a
/// software track.
pub fn role_family_from_title(title: &str) -> Option<&'static str> {
    let title = title.trim();
    if title.is_empty() || EXCLUDES.is_match(title) {
        return None;
    }
    if INCLUDES.is_match(title) {
        return Some(SOFTWARE_FAMILY);
    }
    // "Engineer, Software (Payments)"
    if GENERIC_ENGINEER.is_match(title) && GENERIC_SOFTWARE.is_match(title) {
        return Some(SOFTWARE_FAMILY);
    }
    None
}
