use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Watches a log directory and reports the bare session name whenever
/// `<name>.log` is written or created. Dropping the watcher stops it.
pub struct LogWatcher {
    _watcher: RecommendedWatcher,
}

impl LogWatcher {
    pub fn new(log_dir: &Path, tx: mpsc::Sender<String>) -> Result<Self> {
        std::fs::create_dir_all(log_dir).context("failed to create log directory")?;

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<Event, notify::Error>| {
                let event = match res {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::debug!(%err, "log watcher error");
                        return;
                    }
                };
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    return;
                }
                for path in &event.paths {
                    if let Some(name) = session_name_from_log(path) {
                        // The UI loop drains quickly; a full queue just
                        // coalesces bursts.
                        let _ = tx.try_send(name);
                    }
                }
            },
        )
        .context("failed to create log watcher")?;

        watcher
            .watch(log_dir, RecursiveMode::NonRecursive)
            .context("failed to watch log directory")?;

        Ok(Self { _watcher: watcher })
    }
}

/// `/path/to/<name>.log` → `<name>`; anything else is ignored.
fn session_name_from_log(path: &Path) -> Option<String> {
    if path.extension()?.to_str()? != "log" {
        return None;
    }
    Some(path.file_stem()?.to_str()?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn extracts_session_name_from_log_files() {
        assert_eq!(
            session_name_from_log(&PathBuf::from("/tmp/logs/alpha.log")),
            Some("alpha".to_string())
        );
        assert_eq!(
            session_name_from_log(&PathBuf::from("/tmp/logs/agentdeck_x_1234.log")),
            Some("agentdeck_x_1234".to_string())
        );
        assert_eq!(session_name_from_log(&PathBuf::from("/tmp/logs/notes.txt")), None);
        assert_eq!(session_name_from_log(&PathBuf::from("/tmp/logs/nolog")), None);
    }

    #[tokio::test]
    async fn reports_writes_to_log_files() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let _watcher = LogWatcher::new(dir.path(), tx).unwrap();

        // Give the backend a moment to arm before writing.
        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(dir.path().join("bravo.log"), "hello").unwrap();

        let name = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher should report the write")
            .unwrap();
        assert_eq!(name, "bravo");
    }

    #[tokio::test]
    async fn ignores_non_log_files() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let _watcher = LogWatcher::new(dir.path(), tx).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(dir.path().join("readme.txt"), "hello").unwrap();

        let result = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
        assert!(result.is_err(), "no event expected for non-log files");
    }

    #[test]
    fn creates_missing_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("does/not/exist");
        let (tx, _rx) = mpsc::channel(1);
        let watcher = LogWatcher::new(&nested, tx);
        assert!(watcher.is_ok());
        assert!(nested.is_dir());
    }
}
