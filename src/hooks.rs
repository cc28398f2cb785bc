use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

/// Stream socket agent hooks write to. Each line is one JSON record:
/// `{"session": "<display-or-mux-name>", "event": "stop"}`.
pub const SOCKET_PATH: &str = "/tmp/agent-deck.sock";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HookEvent {
    pub session: String,
    pub event: HookKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    Stop,
    AfterAgent,
    Notification,
}

/// Parse one newline-delimited record. Malformed lines and unknown
/// event kinds yield None and are dropped.
pub fn parse_line(line: &str) -> Option<HookEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::debug!(%err, "dropping malformed hook line");
            None
        }
    }
}

/// Bind the hook socket and forward parsed events into `tx`. A stale
/// socket file from a previous run is removed first. The returned task
/// lives until the receiver side is dropped.
pub fn spawn_listener(
    path: impl Into<PathBuf>,
    tx: mpsc::Sender<HookEvent>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.into();
    if path.exists() {
        std::fs::remove_file(&path).context("failed to remove stale hook socket")?;
    }
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("failed to bind hook socket {}", path.display()))?;
    tracing::debug!(path = %path.display(), "hook socket listening");

    Ok(tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let tx = tx.clone();
                    tokio::spawn(handle_connection(stream, tx));
                }
                Err(err) => {
                    tracing::debug!(%err, "hook accept failed");
                    break;
                }
            }
        }
    }))
}

async fn handle_connection(stream: UnixStream, tx: mpsc::Sender<HookEvent>) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(event) = parse_line(&line) {
            if tx.send(event).await.is_err() {
                return;
            }
        }
    }
}

/// Remove the socket file on shutdown; best effort.
pub fn cleanup_socket(path: &Path) {
    let _ = std::fs::remove_file(path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn parse_valid_records() {
        let event = parse_line(r#"{"session": "alpha", "event": "stop"}"#).unwrap();
        assert_eq!(event.session, "alpha");
        assert_eq!(event.event, HookKind::Stop);

        let event = parse_line(r#"{"session": "agentdeck_x_1234abcd", "event": "after_agent"}"#)
            .unwrap();
        assert_eq!(event.event, HookKind::AfterAgent);

        let event = parse_line(r#"{"session": "a", "event": "notification"}"#).unwrap();
        assert_eq!(event.event, HookKind::Notification);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("not json"), None);
        assert_eq!(parse_line(r#"{"session": "a"}"#), None);
        assert_eq!(parse_line(r#"{"session": "a", "event": "unknown_kind"}"#), None);
    }

    #[test]
    fn parse_ignores_extra_fields() {
        let event =
            parse_line(r#"{"session": "a", "event": "stop", "ts": 12345, "extra": "x"}"#).unwrap();
        assert_eq!(event.session, "a");
    }

    #[tokio::test]
    async fn listener_delivers_events_and_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("hooks.sock");
        let (tx, mut rx) = mpsc::channel(16);
        let _task = spawn_listener(&socket, tx).unwrap();

        let mut stream = UnixStream::connect(&socket).await.unwrap();
        stream
            .write_all(
                b"{\"session\": \"one\", \"event\": \"stop\"}\n\
                  this line is garbage\n\
                  {\"session\": \"two\", \"event\": \"notification\"}\n",
            )
            .await
            .unwrap();
        stream.shutdown().await.unwrap();

        let first = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.session, "one");
        let second = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.session, "two");
        assert_eq!(second.event, HookKind::Notification);
    }

    #[tokio::test]
    async fn listener_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("hooks.sock");
        std::fs::write(&socket, "stale").unwrap();

        let (tx, _rx) = mpsc::channel(1);
        let task = spawn_listener(&socket, tx);
        assert!(task.is_ok());
    }
}
