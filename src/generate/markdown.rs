// src/generate/markdown.rs
//! Plain-text cleanup for generated posts.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static RE_BOLD_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*\n]+?)\*\*").expect("static regex"));
static RE_BOLD_UNDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"__([^_\n]+?)__").expect("static regex"));
static RE_ITALIC_STAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*([^*\s][^*\n]*?)\*").expect("static regex"));
// `\b` on both sides keeps snake_case identifiers intact.
static RE_ITALIC_UNDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b_([^_\n]+?)_\b").expect("static regex"));
static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?:#+[ \t]+)+").expect("static regex"));
static RE_HASHTAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)(^|\W)#[A-Za-z]\w*").expect("static regex"));
static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").expect("static regex"));
static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("static regex"));

fn upper(caps: &Captures) -> String {
    caps[1].to_uppercase()
}

fn strip_once(s: &str) -> String {
    let s = RE_BOLD_STAR.replace_all(s, upper);
    let s = RE_BOLD_UNDER.replace_all(&s, upper);
    let s = RE_ITALIC_STAR.replace_all(&s, "$1");
    let s = RE_ITALIC_UNDER.replace_all(&s, "$1");
    RE_HEADING.replace_all(&s, "").into_owned()
}

/// Bold becomes upper-cased text; italic and heading markers are dropped.
///
/// Applied to a fixed point, so `strip_markdown(strip_markdown(x)) == strip_markdown(x)`.
/// Each changing pass removes at least one `*`, `_` or `#`, so the loop ends.
pub fn strip_markdown(input: &str) -> String {
    let mut cur = input.to_string();
    loop {
        let next = strip_once(&cur);
        if next == cur {
            return cur;
        }
        cur = next;
    }
}

/// Remove `#Tag` tokens after any non-word character. `# Heading`, `#1` and
/// `C#` are not hashtags.
pub fn remove_hashtags(input: &str) -> String {
    RE_HASHTAG.replace_all(input, "$1").into_owned()
}

pub fn tidy_whitespace(input: &str) -> String {
    let lines: Vec<String> = input
        .lines()
        .map(|l| RE_SPACES.replace_all(l.trim(), " ").into_owned())
        .collect();
    RE_BLANK_LINES
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// Final form of `postText`: no markdown, no embedded hashtags, tidy spacing.
///
/// Hashtag removal can expose a heading marker (`#AI # Title`), so the
/// three steps repeat until the text stops changing.
pub fn finalize_post_text(raw: &str) -> String {
    let mut cur = raw.to_string();
    loop {
        let next = tidy_whitespace(&remove_hashtags(&strip_markdown(&cur)));
        if next == cur {
            return cur;
        }
        cur = next;
    }
}
