use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::group::{GroupRecord, GroupTree};
use crate::session::{Session, Status, Tool};

/// On-disk snapshot: every session, every group (empty ones included),
/// and the time of the last write.
#[derive(Serialize, Deserialize, Debug)]
pub struct StorageData {
    pub instances: Vec<InstanceRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupRecord>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Serializable form of one session handle. Unknown fields in older or
/// newer files are ignored on load.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct InstanceRecord {
    pub id: String,
    pub title: String,
    pub project_path: String,
    #[serde(default)]
    pub group_path: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub tool: Tool,
    pub status: Status,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "tmux_session")]
    pub mux_name: String,
}

/// Persistence shim over `$HOME/.agent-deck/sessions.json`.
pub struct Storage {
    path: PathBuf,
}

/// Snapshot file location; the parent directory is created on first use.
pub fn storage_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("failed to resolve home directory")?;
    Ok(home.join(".agent-deck").join("sessions.json"))
}

impl Storage {
    pub fn new() -> Result<Self> {
        Ok(Self { path: storage_path()? })
    }

    /// Storage rooted at an explicit file, for tests.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot and rehydrate handles with their prior status
    /// seeded into the state machine. A missing file is an empty deck;
    /// a corrupt file propagates (the caller degrades to empty with a
    /// banner).
    pub async fn load(&self) -> Result<(Vec<Arc<Session>>, Vec<GroupRecord>)> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok((Vec::new(), Vec::new()));
            }
            Err(err) => return Err(err).context("failed to read sessions file"),
        };

        let data: StorageData =
            serde_json::from_str(&contents).context("failed to parse sessions file")?;

        let sessions = data
            .instances
            .into_iter()
            .map(|record| {
                // Legacy records predate groups; derive membership from
                // the project directory name.
                let group_path = if record.group_path.is_empty() {
                    group_path_from_project(&record.project_path)
                } else {
                    record.group_path
                };
                Arc::new(Session::rehydrate(
                    record.id,
                    record.title,
                    record.project_path,
                    group_path,
                    record.command,
                    record.tool,
                    record.created_at,
                    record.mux_name,
                    record.status.storage_tag(),
                ))
            })
            .collect();

        Ok((sessions, data.groups))
    }

    /// Full rewrite of the snapshot with a fresh `updated_at`.
    pub async fn save(&self, sessions: &[Arc<Session>], tree: &GroupTree) -> Result<()> {
        let data = StorageData {
            instances: sessions.iter().map(|s| instance_record(s)).collect(),
            groups: tree.records(),
            updated_at: Utc::now(),
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("failed to create storage directory")?;
        }
        let json = serde_json::to_string_pretty(&data).context("failed to serialize sessions")?;
        tokio::fs::write(&self.path, json).await.context("failed to write sessions file")?;
        Ok(())
    }
}

fn instance_record(session: &Session) -> InstanceRecord {
    InstanceRecord {
        id: session.id.clone(),
        title: session.display_name(),
        project_path: session.work_dir.clone(),
        group_path: session.group_path(),
        command: session.command(),
        tool: session.tool(),
        status: session.status(),
        created_at: session.created_at,
        mux_name: session.mux_name(),
    }
}

/// Last component of the project path, or `default` when that yields
/// nothing usable.
fn group_path_from_project(project_path: &str) -> String {
    Path::new(project_path)
        .file_name()
        .and_then(|name| name.to_str())
        .map(crate::session::sanitize_name)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| crate::group::DEFAULT_GROUP.to_string())
}
