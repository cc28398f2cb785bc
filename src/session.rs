use std::fmt;
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::detect::{
    detect_tool_from_command, detect_tool_from_content, has_busy_indicator, PromptDetector,
    ToolCache,
};
use crate::normalize;
use crate::tmux::Multiplexer;
use crate::tracker::Tracker;

/// Fixed prefix carried by every multiplexer session this app owns.
pub const SESSION_PREFIX: &str = "agentdeck_";

/// Scrollback lines fetched by [`Session::capture_history`].
pub const HISTORY_LINES: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Content changed within the activity cooldown (green).
    Active,
    /// Quiet and not yet acknowledged (yellow).
    Waiting,
    /// Quiet and acknowledged (gray).
    Idle,
    /// The multiplexer session is gone or unreadable.
    Inactive,
    /// Internal only; surfaces as waiting.
    Error,
}

impl Status {
    /// Collapse the internal error variant for display and persistence.
    pub fn surfaced(self) -> Status {
        match self {
            Status::Error => Status::Waiting,
            other => other,
        }
    }

    /// The string written to the snapshot file.
    pub fn storage_tag(self) -> &'static str {
        match self.surfaced() {
            Status::Active => "active",
            Status::Waiting => "waiting",
            Status::Idle => "idle",
            Status::Inactive => "inactive",
            Status::Error => unreachable!("error surfaces as waiting"),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.storage_tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Claude,
    Gemini,
    Aider,
    Codex,
    Shell,
}

impl Serialize for Tool {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> Deserialize<'de> for Tool {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Unknown tags from newer files degrade to shell.
        let tag = String::deserialize(deserializer)?;
        Ok(Tool::from_tag(&tag))
    }
}

impl Tool {
    pub fn tag(&self) -> &'static str {
        match self {
            Tool::Claude => "claude",
            Tool::Gemini => "gemini",
            Tool::Aider => "aider",
            Tool::Codex => "codex",
            Tool::Shell => "shell",
        }
    }

    /// Selection order in the new-session dialog.
    pub fn all() -> &'static [Tool] {
        &[Tool::Claude, Tool::Gemini, Tool::Aider, Tool::Codex, Tool::Shell]
    }

    /// Command sent into a fresh session for this tool; shells get none.
    pub fn default_command(&self) -> &'static str {
        match self {
            Tool::Claude => "claude",
            Tool::Gemini => "gemini",
            Tool::Aider => "aider",
            Tool::Codex => "codex",
            Tool::Shell => "",
        }
    }

    /// Parse a persisted tag; anything unrecognized is a shell.
    pub fn from_tag(tag: &str) -> Tool {
        match tag.to_lowercase().as_str() {
            "claude" => Tool::Claude,
            "gemini" => Tool::Gemini,
            "aider" => Tool::Aider,
            "codex" => Tool::Codex,
            _ => Tool::Shell,
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl Default for Tool {
    fn default() -> Self {
        Tool::Shell
    }
}

static NAME_SANITIZER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9-]+").expect("sanitize regex"));

/// Replace every run of characters tmux can't have in a session name
/// with a single hyphen. Case is preserved.
pub fn sanitize_name(name: &str) -> String {
    NAME_SANITIZER.replace_all(name, "-").into_owned()
}

/// 4-byte random hex suffix that keeps mux names unique.
fn short_id() -> String {
    hex::encode(&uuid::Uuid::new_v4().as_bytes()[..4])
}

/// Build a fresh `agentdeck_<sanitized>_<hex4>` multiplexer name.
pub fn mux_session_name(display_name: &str) -> String {
    format!("{SESSION_PREFIX}{}_{}", sanitize_name(display_name), short_id())
}

/// State-machine side of a handle, guarded by one mutex. Pane captures
/// always happen before this lock is taken.
#[derive(Debug, Default)]
struct HandleState {
    tracker: Option<Tracker>,
    tool_cache: Option<ToolCache>,
    prompt: Option<PromptDetector>,
}

/// One multiplexer session: identity, lifecycle, and ownership of the
/// activity state machine.
#[derive(Debug)]
pub struct Session {
    /// Stable opaque id, generated once, never reused.
    pub id: String,
    pub work_dir: String,
    pub created_at: DateTime<Utc>,
    display_name: Mutex<String>,
    group_path: Mutex<String>,
    command: Mutex<String>,
    tool: Mutex<Tool>,
    mux_name: Mutex<String>,
    last_status: Mutex<Status>,
    state: Mutex<HandleState>,
}

impl Session {
    pub fn new(display_name: &str, work_dir: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            work_dir: work_dir.to_string(),
            created_at: Utc::now(),
            display_name: Mutex::new(display_name.to_string()),
            group_path: Mutex::new(String::new()),
            command: Mutex::new(String::new()),
            tool: Mutex::new(Tool::Shell),
            mux_name: Mutex::new(mux_session_name(display_name)),
            last_status: Mutex::new(Status::Waiting),
            state: Mutex::new(HandleState::default()),
        }
    }

    /// Rebuild a handle from a persisted record, seeding the tracker
    /// from the prior status:
    ///
    /// - `idle`: acknowledged, cooldown expired — restores gray.
    /// - `waiting`: not acknowledged — restores yellow.
    /// - `active` or anything else: no tracker; the first poll
    ///   initializes it and reports waiting.
    #[allow(clippy::too_many_arguments)]
    pub fn rehydrate(
        id: String,
        display_name: String,
        work_dir: String,
        group_path: String,
        command: String,
        tool: Tool,
        created_at: DateTime<Utc>,
        mux_name: String,
        prior_status: &str,
    ) -> Self {
        let now = Instant::now();
        let (tracker, last_status) = match prior_status {
            "idle" => (Some(Tracker::rehydrated(true, now)), Status::Idle),
            "waiting" => (Some(Tracker::rehydrated(false, now)), Status::Waiting),
            _ => (None, Status::Waiting),
        };
        Self {
            id,
            work_dir,
            created_at,
            display_name: Mutex::new(display_name),
            group_path: Mutex::new(group_path),
            command: Mutex::new(command),
            tool: Mutex::new(tool),
            mux_name: Mutex::new(mux_name),
            last_status: Mutex::new(last_status),
            state: Mutex::new(HandleState { tracker, tool_cache: None, prompt: None }),
        }
    }

    // ── accessors ────────────────────────────────────────────────────

    pub fn display_name(&self) -> String {
        self.display_name.lock().expect("display_name lock").clone()
    }

    pub fn rename(&self, new_name: &str) {
        *self.display_name.lock().expect("display_name lock") = new_name.to_string();
    }

    pub fn mux_name(&self) -> String {
        self.mux_name.lock().expect("mux_name lock").clone()
    }

    pub fn command(&self) -> String {
        self.command.lock().expect("command lock").clone()
    }

    pub fn tool(&self) -> Tool {
        *self.tool.lock().expect("tool lock")
    }

    pub fn group_path(&self) -> String {
        self.group_path.lock().expect("group_path lock").clone()
    }

    pub fn set_group_path(&self, path: &str) {
        *self.group_path.lock().expect("group_path lock") = path.to_string();
    }

    /// The most recently emitted status, as shown in the tree.
    pub fn status(&self) -> Status {
        self.last_status.lock().expect("status lock").surfaced()
    }

    fn set_status(&self, status: Status) {
        *self.last_status.lock().expect("status lock") = status;
    }

    // ── lifecycle ────────────────────────────────────────────────────

    /// Create the detached multiplexer session and send the launch
    /// command. A mux-name collision regenerates the suffix and
    /// retries once; mouse-mode failure is ignored.
    pub async fn start(&self, mux: &dyn Multiplexer, command: &str) -> Result<()> {
        *self.command.lock().expect("command lock") = command.to_string();
        if let Some(tool) = detect_tool_from_command(command) {
            *self.tool.lock().expect("tool lock") = tool;
        }

        let mut name = self.mux_name();
        if mux.has_session(&name).await {
            name = mux_session_name(&self.display_name());
            *self.mux_name.lock().expect("mux_name lock") = name.clone();
        }

        let work_dir = if self.work_dir.is_empty() {
            std::env::var("HOME").unwrap_or_else(|_| "/".to_string())
        } else {
            self.work_dir.clone()
        };

        mux.new_session(&name, &work_dir)
            .await
            .with_context(|| format!("failed to start session '{}'", self.display_name()))?;

        // Mouse scrolling is a nicety; very old tmux lacks the option.
        let _ = mux.set_mouse(&name).await;

        if !command.is_empty() {
            mux.send_keys(&name, command).await.context("failed to send command")?;
            mux.send_enter(&name).await.context("failed to send enter")?;
        }
        Ok(())
    }

    pub async fn exists(&self, mux: &dyn Multiplexer) -> bool {
        mux.has_session(&self.mux_name()).await
    }

    pub async fn kill(&self, mux: &dyn Multiplexer) -> Result<()> {
        mux.kill_session(&self.mux_name()).await
    }

    pub async fn capture_pane(&self, mux: &dyn Multiplexer) -> Result<String> {
        mux.capture_pane(&self.mux_name()).await
    }

    pub async fn capture_history(&self, mux: &dyn Multiplexer) -> Result<String> {
        mux.capture_history(&self.mux_name(), HISTORY_LINES).await
    }

    pub async fn send_keys(&self, mux: &dyn Multiplexer, keys: &str) -> Result<()> {
        mux.send_keys(&self.mux_name(), keys).await
    }

    pub async fn send_enter(&self, mux: &dyn Multiplexer) -> Result<()> {
        mux.send_enter(&self.mux_name()).await
    }

    // ── status engine ────────────────────────────────────────────────

    /// Drive the state machine with a fresh capture and return the
    /// emitted status. A missing session or failed capture reports
    /// `inactive` without touching the tracker, so transient errors
    /// never re-baseline the state.
    pub async fn get_status(&self, mux: &dyn Multiplexer) -> Status {
        let name = self.mux_name();

        if !mux.has_session(&name).await {
            self.set_status(Status::Inactive);
            return Status::Inactive;
        }

        // Capture is a subprocess call; keep it outside the state lock.
        let content = match mux.capture_pane(&name).await {
            Ok(content) => content,
            Err(err) => {
                tracing::debug!(session = %self.display_name(), %err, "capture failed -> inactive");
                self.set_status(Status::Inactive);
                return Status::Inactive;
            }
        };

        let hash = normalize::hash_content(&content);
        let now = Instant::now();

        let mut state = self.state.lock().expect("state lock");
        let status = match state.tracker.as_mut() {
            None => {
                // First poll ever: baseline without flashing active.
                state.tracker = Some(Tracker::init(&hash, now));
                Status::Waiting
            }
            Some(tracker) => tracker.observe(&hash, now),
        };
        drop(state);

        tracing::debug!(session = %self.display_name(), %status, "poll");
        self.set_status(status);
        status
    }

    /// Mark the session as seen (attach).
    pub fn acknowledge(&self) -> Status {
        let mut state = self.state.lock().expect("state lock");
        let now = Instant::now();
        let tracker = state.tracker.get_or_insert_with(|| Tracker::empty(now));
        let status = tracker.acknowledge();
        drop(state);
        self.set_status(status);
        status
    }

    /// Mark as seen and baseline the current pane content (detach), so
    /// the next poll does not report the just-viewed content as new.
    pub async fn acknowledge_with_snapshot(&self, mux: &dyn Multiplexer) -> Status {
        let name = self.mux_name();
        let exists = mux.has_session(&name).await;
        let captured = if exists { mux.capture_pane(&name).await.ok() } else { None };

        let mut state = self.state.lock().expect("state lock");
        let now = Instant::now();
        let tracker = state.tracker.get_or_insert_with(|| Tracker::empty(now));

        let status = if !exists {
            tracker.acknowledge();
            Status::Inactive
        } else {
            match captured {
                Some(content) => tracker.acknowledge_with_snapshot(&normalize::hash_content(&content)),
                None => tracker.acknowledge(),
            }
        };
        drop(state);
        self.set_status(status);
        status
    }

    /// External signal that the agent wants attention (hook event).
    pub fn reset_acknowledged(&self) -> Status {
        let mut state = self.state.lock().expect("state lock");
        let now = Instant::now();
        let tracker = state.tracker.get_or_insert_with(|| Tracker::empty(now));
        let status = tracker.reset_acknowledged();
        drop(state);
        self.set_status(status);
        status
    }

    // ── tool & prompt detection ──────────────────────────────────────

    /// Detect the running tool, preferring the launch command and
    /// caching the result for 30 seconds.
    pub async fn detect_tool(&self, mux: &dyn Multiplexer) -> Tool {
        let now = Instant::now();
        {
            let state = self.state.lock().expect("state lock");
            if let Some(cache) = &state.tool_cache {
                if cache.is_fresh(now) {
                    return cache.tool;
                }
            }
        }

        let tool = match detect_tool_from_command(&self.command()) {
            Some(tool) => tool,
            None => match mux.capture_pane(&self.mux_name()).await {
                Ok(content) => detect_tool_from_content(&content),
                Err(_) => Tool::Shell,
            },
        };

        let mut state = self.state.lock().expect("state lock");
        state.tool_cache = Some(ToolCache::new(tool, now));
        drop(state);
        *self.tool.lock().expect("tool lock") = tool;
        tool
    }

    /// Drop the cache and detect again.
    pub async fn force_detect_tool(&self, mux: &dyn Multiplexer) -> Tool {
        self.state.lock().expect("state lock").tool_cache = None;
        self.detect_tool(mux).await
    }

    /// Rich content query: did the pane change, is a prompt showing,
    /// and is a busy indicator visible. Shares the tracker's hash slot
    /// with [`Session::get_status`], so the two can never diverge.
    pub async fn analyze_content(&self, mux: &dyn Multiplexer) -> (bool, bool, bool) {
        let name = self.mux_name();
        let content = match mux.capture_pane(&name).await {
            Ok(content) => content,
            Err(_) => return (false, false, false),
        };

        let tool = self.detect_tool(mux).await;
        let is_busy = has_busy_indicator(&content);
        let hash = normalize::hash_content(&content);
        let now = Instant::now();

        let mut state = self.state.lock().expect("state lock");
        if state.prompt.as_ref().map(PromptDetector::tool) != Some(tool) {
            state.prompt = Some(PromptDetector::new(tool));
        }
        let has_prompt =
            state.prompt.as_ref().is_some_and(|detector| detector.has_prompt(&content));

        let updated = match state.tracker.as_mut() {
            None => {
                state.tracker = Some(Tracker::init(&hash, now));
                true
            }
            Some(tracker) => {
                let changed = tracker.last_hash != hash;
                if changed {
                    // Route the baseline through the state machine so
                    // acknowledged/change-time stay consistent.
                    tracker.observe(&hash, now);
                }
                changed
            }
        };

        (updated, has_prompt, is_busy)
    }

    /// Narrow form of [`Session::analyze_content`]: `(updated, has_prompt)`.
    pub async fn has_updated_with_prompt(&self, mux: &dyn Multiplexer) -> (bool, bool) {
        let (updated, has_prompt, _) = self.analyze_content(mux).await;
        (updated, has_prompt)
    }
}
