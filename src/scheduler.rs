use std::sync::Arc;
use std::time::Duration;

use crate::session::{Session, Status};
use crate::tmux::Multiplexer;

/// Cadence of the status refresh. One logical clock per UI instance;
/// the next tick is scheduled only after the previous pass completes,
/// so passes never overlap.
pub const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Periodic driver of the per-session state machines. The group tree
/// owns the handles; each pass borrows a snapshot of the list.
pub struct StatusScheduler {
    mux: Arc<dyn Multiplexer>,
}

impl StatusScheduler {
    pub fn new(mux: Arc<dyn Multiplexer>) -> Self {
        Self { mux }
    }

    pub fn mux(&self) -> &dyn Multiplexer {
        self.mux.as_ref()
    }

    /// One refresh pass: poll every handle and return the emitted
    /// statuses in the same order. Captures run concurrently; each
    /// handle's tracker mutation is serialized by its own mutex.
    pub async fn poll_all(&self, sessions: &[Arc<Session>]) -> Vec<Status> {
        let polls = sessions.iter().map(|session| session.get_status(self.mux.as_ref()));
        futures::future::join_all(polls).await
    }

    /// Poll one session immediately (used on return from attach and on
    /// log-watcher activity). No-op when the name matches nothing.
    pub async fn poll_matching(&self, sessions: &[Arc<Session>], name: &str) -> Option<Status> {
        let session = find_session(sessions, name)?;
        Some(session.get_status(self.mux.as_ref()).await)
    }

    /// Hook endpoint event: the agent in `name` finished or wants
    /// attention. Flips the handle back to waiting without waiting for
    /// the next tick. Unknown names are dropped.
    pub fn apply_hook(&self, sessions: &[Arc<Session>], name: &str) -> bool {
        match find_session(sessions, name) {
            Some(session) => {
                tracing::debug!(session = %session.display_name(), "hook -> reset acknowledged");
                session.reset_acknowledged();
                true
            }
            None => {
                tracing::debug!(%name, "hook for unknown session dropped");
                false
            }
        }
    }
}

/// Match by display name or multiplexer name, whichever the caller has.
fn find_session<'a>(sessions: &'a [Arc<Session>], name: &str) -> Option<&'a Arc<Session>> {
    sessions.iter().find(|s| s.display_name() == name || s.mux_name() == name)
}
