//! Post-processing: deterministic cleanup of extracted page text.
//!
//! Vision models occasionally wrap their answer in a code fence, or answer
//! in Markdown despite being asked for plain text; OCR engines emit stray
//! zero-width characters and `\r\n`. These passes fix such quirks without
//! touching content. The renderer draws every character it is given, so
//! anything left here ends up on the handwritten page.
//!
//! Rules (applied in order):
//! 1. Strip an outer code fence
//! 2. Normalise line endings (CRLF / CR → LF)
//! 3. Remove invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! 4. Trim trailing whitespace per line
//! 5. Collapse 3+ consecutive blank lines down to one blank line
//! 6. Trim the whole text

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to raw extracted text.
pub fn clean_text(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip outer code fence ───────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ──────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fence_with_language_tag() {
        let raw = "```text\nHello\nWorld\n```";
        assert_eq!(clean_text(raw), "Hello\nWorld");
    }

    #[test]
    fn inner_fences_are_kept() {
        let raw = "Intro\n```\ncode\n```\nOutro";
        assert_eq!(clean_text(raw), raw);
    }

    #[test]
    fn crlf_and_invisible_chars() {
        let raw = "\u{FEFF}Line one  \r\nLine\u{200B} two\r\n";
        assert_eq!(clean_text(raw), "Line one\nLine two");
    }

    #[test]
    fn blank_runs_collapse_to_one_empty_line() {
        assert_eq!(clean_text("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn whitespace_only_becomes_empty() {
        assert_eq!(clean_text("  \n\t \n"), "");
    }

    #[test]
    fn leading_indentation_inside_text_is_kept() {
        assert_eq!(clean_text("Title\n    indented"), "Title\n    indented");
    }
}
