use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Hash reported for panes that normalize to nothing. Distinguishes
/// "captured, but empty" from "never captured" (empty `last_hash`).
pub const EMPTY_HASH: &str = "__empty__";

/// Braille spinner frames used by Claude Code and other CLI agents.
/// They animate every tick and must not influence the content hash.
const SPINNER_CHARS: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

/// Claude Code status line: "(45s · 1234 tokens · esc to interrupt)".
/// The elapsed counter changes every second, so the whole group is
/// replaced with a fixed placeholder.
static DYNAMIC_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^)]*\d+s\s*·[^)]*tokens[^)]*\)").expect("dynamic status regex"));

/// "Thinking…" / "Connecting…" headers with an embedded timer group.
static PROGRESS_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(Thinking|Connecting)[^(]*\([^)]*\)").expect("progress regex"));

static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("blank-line regex"));

/// Canonicalize raw pane text so its hash is insensitive to cosmetic
/// churn: color changes, animated spinners, elapsed-time counters,
/// resize padding, and cursor-position blank lines.
pub fn normalize(content: &str) -> String {
    let result = strip_ansi(content);
    let result = strip_control_chars(&result);
    let result: String = result.chars().filter(|c| !SPINNER_CHARS.contains(c)).collect();

    let result = DYNAMIC_STATUS.replace_all(&result, "(STATUS)");
    let result = PROGRESS_HEADER.replace_all(&result, "$1...");

    // tmux capture-pane -J pads lines with trailing spaces after a resize.
    let result = result
        .lines()
        .map(|line| line.trim_end_matches([' ', '\t']))
        .collect::<Vec<_>>()
        .join("\n");

    BLANK_RUNS.replace_all(&result, "\n\n").into_owned()
}

/// SHA-256 hex of normalized content; [`EMPTY_HASH`] for empty input.
pub fn content_hash(normalized: &str) -> String {
    if normalized.is_empty() {
        return EMPTY_HASH.to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Normalize then hash in one step.
pub fn hash_content(raw: &str) -> String {
    content_hash(&normalize(raw))
}

/// Strip ANSI escape sequences: CSI (`ESC [ … final-byte`), OSC
/// (`ESC ] … BEL` or `ESC \`), other two-byte escapes, and raw C1
/// control codes (U+0080..=U+009F).
pub fn strip_ansi(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            match chars.peek() {
                Some('[') => {
                    chars.next();
                    // Parameter and intermediate bytes run up to the final
                    // byte in 0x40..=0x7e.
                    for esc in chars.by_ref() {
                        if ('\u{40}'..='\u{7e}').contains(&esc) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    // OSC is terminated by BEL or ST (ESC \).
                    while let Some(esc) = chars.next() {
                        if esc == '\u{07}' {
                            break;
                        }
                        if esc == '\u{1b}' {
                            if chars.peek() == Some(&'\\') {
                                chars.next();
                            }
                            break;
                        }
                    }
                }
                Some(_) => {
                    chars.next();
                }
                None => {}
            }
            continue;
        }
        if ('\u{80}'..='\u{9f}').contains(&c) {
            continue;
        }
        out.push(c);
    }
    out
}

/// Drop ASCII control characters except TAB, LF, CR; DEL included.
fn strip_control_chars(content: &str) -> String {
    content
        .chars()
        .filter(|&c| (c >= ' ' && c != '\u{7f}') || c == '\t' || c == '\n' || c == '\r')
        .collect()
}
