//! Slug and colour helpers for tags.

use rand::seq::SliceRandom;

/// Colours handed out to tags created without an explicit one.
pub const TAG_PALETTE: &[&str] = &[
    "#ef4444", "#f97316", "#eab308", "#22c55e", "#14b8a6", "#3b82f6", "#8b5cf6", "#ec4899",
];

/// Lowercase, replace anything non-alphanumeric with `-`, collapse runs of
/// dashes and strip them from the ends.
///
/// ```
/// use dpstash::slug::slugify;
///
/// assert_eq!(slugify("Winter Scenes"), "winter-scenes");
/// assert_eq!(slugify("  AB -- Full Drill! "), "ab-full-drill");
/// ```
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_dash = true;
    for c in input.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            out.push(c);
            prev_dash = false;
        } else if !prev_dash {
            out.push('-');
            prev_dash = true;
        }
    }
    if out.ends_with('-') {
        out.pop();
    }
    out
}

/// `#rrggbb`, case-insensitive.
pub fn is_valid_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

pub fn random_tag_color() -> String {
    TAG_PALETTE
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(TAG_PALETTE[0])
        .to_string()
}
