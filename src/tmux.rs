use anyhow::{bail, Context, Result};
use std::time::Duration;
use tokio::process::Command;

/// Timeout for ordinary tmux invocations.
const CMD_TIMEOUT: Duration = Duration::from_secs(2);

/// Pane captures past this budget count as capture failures; the state
/// machine maps them to `inactive` without touching the tracker.
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(1);

/// Scrollback captures can be large.
const CAPTURE_HISTORY_TIMEOUT: Duration = Duration::from_secs(5);

/// Run a Command with a timeout, returning its Output.
pub async fn run_cmd_timeout(cmd: &mut Command, timeout: Duration) -> Result<std::process::Output> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result.context("subprocess failed to execute"),
        Err(_) => bail!("subprocess timed out after {}ms", timeout.as_millis()),
    }
}

/// Run a Command with a timeout, returning its ExitStatus.
pub async fn run_status_timeout(cmd: &mut Command) -> Result<std::process::ExitStatus> {
    match tokio::time::timeout(CMD_TIMEOUT, cmd.status()).await {
        Ok(result) => result.context("subprocess failed to execute"),
        Err(_) => bail!("subprocess timed out after {}s", CMD_TIMEOUT.as_secs()),
    }
}

/// The external terminal multiplexer, reduced to the verbs this app
/// drives. The real implementation shells out to `tmux`; tests supply
/// scripted fakes.
#[async_trait::async_trait]
pub trait Multiplexer: Send + Sync {
    /// `new-session -d -s <name> -c <dir>`.
    async fn new_session(&self, name: &str, work_dir: &str) -> Result<()>;
    /// `has-session -t <name>`.
    async fn has_session(&self, name: &str) -> bool;
    /// `kill-session -t <name>`.
    async fn kill_session(&self, name: &str) -> Result<()>;
    /// Visible pane, wrapped lines joined (`capture-pane -p -J`).
    async fn capture_pane(&self, name: &str) -> Result<String>;
    /// Last `lines` of scrollback.
    async fn capture_history(&self, name: &str, lines: u32) -> Result<String>;
    /// `send-keys -t <name> <keys>`.
    async fn send_keys(&self, name: &str, keys: &str) -> Result<()>;
    async fn send_enter(&self, name: &str) -> Result<()> {
        self.send_keys(name, "Enter").await
    }
    /// All live session names.
    async fn list_sessions(&self) -> Result<Vec<String>>;
    /// `display-message -t <name> -p <fmt>`.
    async fn display_message(&self, name: &str, format: &str) -> Result<String>;
    /// Per-session mouse mode; callers treat failure as non-fatal.
    async fn set_mouse(&self, name: &str) -> Result<()>;
}

/// Shells out to the `tmux` binary.
pub struct TmuxClient;

#[async_trait::async_trait]
impl Multiplexer for TmuxClient {
    async fn new_session(&self, name: &str, work_dir: &str) -> Result<()> {
        let output = run_cmd_timeout(
            Command::new("tmux").args(["new-session", "-d", "-s", name, "-c", work_dir]),
            CMD_TIMEOUT,
        )
        .await
        .context("failed to create tmux session")?;
        if !output.status.success() {
            bail!(
                "tmux new-session failed for '{name}': {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    async fn has_session(&self, name: &str) -> bool {
        run_status_timeout(Command::new("tmux").args(["has-session", "-t", name]))
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn kill_session(&self, name: &str) -> Result<()> {
        let status = run_status_timeout(Command::new("tmux").args(["kill-session", "-t", name]))
            .await
            .context("failed to kill tmux session")?;
        if !status.success() {
            bail!("tmux kill-session failed for '{name}'");
        }
        Ok(())
    }

    async fn capture_pane(&self, name: &str) -> Result<String> {
        let output = run_cmd_timeout(
            Command::new("tmux").args(["capture-pane", "-t", name, "-p", "-J"]),
            CAPTURE_TIMEOUT,
        )
        .await
        .context("failed to capture pane")?;
        if !output.status.success() {
            bail!("tmux capture-pane failed for '{name}'");
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn capture_history(&self, name: &str, lines: u32) -> Result<String> {
        let start = format!("-{lines}");
        let output = run_cmd_timeout(
            Command::new("tmux").args(["capture-pane", "-t", name, "-p", "-J", "-S", &start]),
            CAPTURE_HISTORY_TIMEOUT,
        )
        .await
        .context("failed to capture history")?;
        if !output.status.success() {
            bail!("tmux capture-pane -S failed for '{name}'");
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn send_keys(&self, name: &str, keys: &str) -> Result<()> {
        let status = run_status_timeout(Command::new("tmux").args(["send-keys", "-t", name, keys]))
            .await
            .context("failed to send keys")?;
        if !status.success() {
            bail!("tmux send-keys failed for '{name}'");
        }
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let output = run_cmd_timeout(
            Command::new("tmux").args(["list-sessions", "-F", "#{session_name}"]),
            CMD_TIMEOUT,
        )
        .await;

        // tmux exits nonzero when no server is running; that just means
        // no sessions.
        let output = match output {
            Ok(o) if o.status.success() => o,
            _ => return Ok(vec![]),
        };

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn display_message(&self, name: &str, format: &str) -> Result<String> {
        let output = run_cmd_timeout(
            Command::new("tmux").args(["display-message", "-t", name, "-p", format]),
            CMD_TIMEOUT,
        )
        .await
        .context("failed to run display-message")?;
        if !output.status.success() {
            bail!("tmux display-message failed for '{name}'");
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn set_mouse(&self, name: &str) -> Result<()> {
        let status = run_status_timeout(
            Command::new("tmux").args(["set-option", "-t", name, "mouse", "on"]),
        )
        .await
        .context("failed to set mouse option")?;
        if !status.success() {
            bail!("tmux set-option mouse failed for '{name}'");
        }
        Ok(())
    }
}

/// The tmux `window_activity` timestamp for a session; 0 when it can't
/// be read. Updates on every byte the pane writes.
pub async fn window_activity(mux: &dyn Multiplexer, name: &str) -> i64 {
    match mux.display_message(name, "#{window_activity}").await {
        Ok(out) => out.trim().parse().unwrap_or(0),
        Err(_) => 0,
    }
}

/// Whether the tmux binary is on PATH. Checked once at startup.
pub fn tmux_available() -> bool {
    std::process::Command::new("tmux")
        .arg("-V")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Map a crossterm KeyCode + KeyModifiers to a tmux key name, used when
/// forwarding keystrokes to an attached session.
pub fn keycode_to_tmux(
    code: crossterm::event::KeyCode,
    modifiers: crossterm::event::KeyModifiers,
) -> Option<String> {
    use crossterm::event::{KeyCode, KeyModifiers};

    if let KeyCode::Char(c) = code {
        return Some(if modifiers.contains(KeyModifiers::CONTROL) {
            format!("C-{c}")
        } else if modifiers.contains(KeyModifiers::ALT) {
            format!("M-{c}")
        } else {
            // SHIFT is already reflected in the char value.
            c.to_string()
        });
    }

    if code == KeyCode::BackTab {
        return Some("BTab".to_string());
    }

    let base = match code {
        KeyCode::Enter => "Enter",
        KeyCode::Backspace => "BSpace",
        KeyCode::Tab => "Tab",
        KeyCode::Up => "Up",
        KeyCode::Down => "Down",
        KeyCode::Left => "Left",
        KeyCode::Right => "Right",
        KeyCode::Home => "Home",
        KeyCode::End => "End",
        KeyCode::PageUp => "PageUp",
        KeyCode::PageDown => "PageDown",
        KeyCode::Delete => "DC",
        KeyCode::Insert => "IC",
        KeyCode::Esc => "Escape",
        KeyCode::F(n) => return Some(apply_tmux_modifiers(&format!("F{n}"), modifiers)),
        _ => return None,
    };

    Some(apply_tmux_modifiers(base, modifiers))
}

/// Wrap a tmux key name with modifier prefixes (C-, M-, S-).
pub fn apply_tmux_modifiers(base: &str, modifiers: crossterm::event::KeyModifiers) -> String {
    use crossterm::event::KeyModifiers;

    let mut key = base.to_string();
    if modifiers.contains(KeyModifiers::SHIFT) {
        key = format!("S-{key}");
    }
    if modifiers.contains(KeyModifiers::ALT) {
        key = format!("M-{key}");
    }
    if modifiers.contains(KeyModifiers::CONTROL) {
        key = format!("C-{key}");
    }
    key
}
