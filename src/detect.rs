use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::normalize::strip_ansi;
use crate::session::Tool;

/// How long a detected tool stays cached before re-detection.
pub const TOOL_CACHE_TTL: Duration = Duration::from_secs(30);

/// Pane-content patterns tried when the launch command gives no hint.
/// Ordered: first match wins.
static TOOL_PATTERNS: Lazy<Vec<(Tool, Vec<Regex>)>> = Lazy::new(|| {
    let pack = |patterns: &[&str]| {
        patterns
            .iter()
            .map(|p| Regex::new(p).expect("tool detection regex"))
            .collect::<Vec<_>>()
    };
    vec![
        (Tool::Claude, pack(&[r"(?i)claude", r"(?i)anthropic"])),
        (Tool::Gemini, pack(&[r"(?i)gemini", r"(?i)google ai"])),
        (Tool::Aider, pack(&[r"(?i)aider"])),
        (Tool::Codex, pack(&[r"(?i)codex", r"(?i)openai"])),
    ]
});

/// Cached result of [`detect_tool_from_content`] / command inspection.
#[derive(Debug, Clone)]
pub struct ToolCache {
    pub tool: Tool,
    pub detected_at: Instant,
    pub ttl: Duration,
}

impl ToolCache {
    pub fn new(tool: Tool, now: Instant) -> Self {
        Self { tool, detected_at: now, ttl: TOOL_CACHE_TTL }
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.detected_at) < self.ttl
    }
}

/// Detect the tool from the launch command alone. Most reliable path;
/// consulted before any pane capture.
pub fn detect_tool_from_command(command: &str) -> Option<Tool> {
    let lower = command.to_lowercase();
    for tool in [Tool::Claude, Tool::Gemini, Tool::Aider, Tool::Codex] {
        if lower.contains(tool.tag()) {
            return Some(tool);
        }
    }
    None
}

/// Detect the tool from captured pane content. Falls back to shell.
pub fn detect_tool_from_content(content: &str) -> Tool {
    let clean = strip_ansi(content);
    for (tool, patterns) in TOOL_PATTERNS.iter() {
        if patterns.iter().any(|p| p.is_match(&clean)) {
            return *tool;
        }
    }
    Tool::Shell
}

/// Per-tool matcher for "the agent is sitting at an input prompt".
/// Rebuilt whenever the cached tool changes.
#[derive(Debug)]
pub struct PromptDetector {
    tool: Tool,
    patterns: &'static Lazy<Vec<Regex>>,
}

/// Number of trailing lines inspected for prompts and busy indicators.
const PROMPT_WINDOW: usize = 10;

static CLAUDE_PROMPT: Lazy<Vec<Regex>> = Lazy::new(|| prompt_pack(&[r"│\s*>\s", r"(?m)^\s*>\s*$"]));
static GEMINI_PROMPT: Lazy<Vec<Regex>> =
    Lazy::new(|| prompt_pack(&[r"(?m)^\s*>\s*$", r"(?i)type your message"]));
static AIDER_PROMPT: Lazy<Vec<Regex>> =
    Lazy::new(|| prompt_pack(&[r"(?m)^[a-z-]*>\s*$", r"(?i)\(y/n\)", r"\[y(es)?/n(o)?\]"]));
static CODEX_PROMPT: Lazy<Vec<Regex>> = Lazy::new(|| prompt_pack(&[r"(?m)^\s*>\s*$", r"▌"]));
static SHELL_PROMPT: Lazy<Vec<Regex>> = Lazy::new(|| prompt_pack(&[r"(?m)[$%#❯>]\s*$"]));

fn prompt_pack(raw: &'static [&'static str]) -> Vec<Regex> {
    raw.iter().map(|p| Regex::new(p).expect("prompt regex")).collect()
}

impl PromptDetector {
    pub fn new(tool: Tool) -> Self {
        let patterns = match tool {
            Tool::Claude => &CLAUDE_PROMPT,
            Tool::Gemini => &GEMINI_PROMPT,
            Tool::Aider => &AIDER_PROMPT,
            Tool::Codex => &CODEX_PROMPT,
            Tool::Shell => &SHELL_PROMPT,
        };
        Self { tool, patterns }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// True when the last few lines of `content` look like an input
    /// prompt for this tool.
    pub fn has_prompt(&self, content: &str) -> bool {
        let clean = strip_ansi(content);
        let tail = last_lines(&clean, PROMPT_WINDOW);
        self.patterns.iter().any(|p| p.is_match(&tail))
    }
}

const SPINNER_GLYPHS: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

/// Fast string-level check for "the agent is visibly processing".
/// Catches the case where Claude shows "esc to interrupt" but the
/// normalized content hash has not moved.
pub fn has_busy_indicator(content: &str) -> bool {
    let lines: Vec<&str> = content.lines().collect();
    let tail_start = lines.len().saturating_sub(PROMPT_WINDOW);
    let recent = lines[tail_start..].join("\n").to_lowercase();

    for indicator in ["esc to interrupt", "(esc to interrupt)", "· esc to interrupt"] {
        if recent.contains(indicator) {
            return true;
        }
    }
    if recent.contains("thinking") && recent.contains("tokens") {
        return true;
    }
    if recent.contains("connecting") && recent.contains("tokens") {
        return true;
    }

    // Spinners and standalone working indicators sit near the bottom.
    let last5_start = lines.len().saturating_sub(5);
    let last5 = &lines[last5_start..];

    if last5.iter().any(|line| line.chars().any(|c| SPINNER_GLYPHS.contains(&c))) {
        return true;
    }

    for indicator in ["processing", "loading", "please wait", "working"] {
        if last5.iter().any(|line| line.trim().to_lowercase().starts_with(indicator)) {
            return true;
        }
    }

    false
}

fn last_lines(content: &str, n: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
