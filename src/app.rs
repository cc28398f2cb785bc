use std::sync::Arc;

use crate::group::{FlatItem, GroupTree};
use crate::hooks::HookEvent;
use crate::scheduler::StatusScheduler;
use crate::session::{Session, Tool};
use crate::storage::Storage;

/// What the main loop is currently doing with key input.
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Browse,
    /// Keystrokes are forwarded into the selected session.
    Attached,
    NewSessionName,
    NewSessionTool,
    /// Collecting a group name; `parent` is set for subgroups.
    NewGroupName { parent: Option<String> },
    RenameGroup { path: String },
    RenameSession { id: String },
    MoveSession,
    ConfirmDelete,
}

pub struct App {
    pub mode: Mode,
    pub should_quit: bool,
    /// Single-line error/info banner; never blocks input.
    pub status_message: Option<String>,
    /// Cursor position within the flat projection.
    pub cursor: usize,
    /// First visible row of the tree viewport.
    pub scroll_offset: usize,
    pub flat: Vec<FlatItem>,
    /// Shared text input for the name dialogs.
    pub input: String,
    pub tool_selection: usize,
    /// Target choices for the move-session dialog.
    pub group_choices: Vec<String>,
    pub group_selection: usize,
    pub preview: String,
    pub work_dir: String,
    tree: GroupTree,
    sessions: Vec<Arc<Session>>,
    storage: Storage,
    scheduler: StatusScheduler,
}

impl App {
    pub fn new(work_dir: String, storage: Storage, scheduler: StatusScheduler) -> Self {
        Self {
            mode: Mode::Browse,
            should_quit: false,
            status_message: None,
            cursor: 0,
            scroll_offset: 0,
            flat: Vec::new(),
            input: String::new(),
            tool_selection: 0,
            group_choices: Vec::new(),
            group_selection: 0,
            preview: String::new(),
            work_dir,
            tree: GroupTree::new(&[]),
            sessions: Vec::new(),
            storage,
            scheduler,
        }
    }

    /// Load the snapshot and rebuild the tree. Storage errors degrade
    /// to an empty deck with a banner.
    pub async fn load(&mut self) {
        match self.storage.load().await {
            Ok((sessions, groups)) => {
                self.tree = if groups.is_empty() {
                    GroupTree::new(&sessions)
                } else {
                    GroupTree::new_with_groups(&sessions, &groups)
                };
                // Mouse mode on every restored session; failures are
                // cosmetic.
                for session in &sessions {
                    let _ = self.scheduler.mux().set_mouse(&session.mux_name()).await;
                }
                self.refresh_session_list();
            }
            Err(err) => {
                self.tree = GroupTree::new(&[]);
                self.refresh_session_list();
                self.banner(format!("Failed to load sessions: {err}"));
            }
        }
        self.rebuild_flat();
    }

    /// Persist everything; called on every mutation and once on quit.
    pub async fn save(&mut self) {
        if let Err(err) = self.storage.save(&self.sessions, &self.tree).await {
            self.banner(format!("Failed to save sessions: {err}"));
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    fn banner(&mut self, message: String) {
        tracing::debug!(%message, "banner");
        self.status_message = Some(message);
    }

    // ── projection & cursor ──────────────────────────────────────────

    fn refresh_session_list(&mut self) {
        self.sessions = self.tree.all_sessions();
    }

    pub fn rebuild_flat(&mut self) {
        self.flat = self.tree.flatten();
        if self.cursor >= self.flat.len() {
            self.cursor = self.flat.len().saturating_sub(1);
        }
    }

    pub fn sessions(&self) -> &[Arc<Session>] {
        &self.sessions
    }

    pub fn mux(&self) -> &dyn crate::tmux::Multiplexer {
        self.scheduler.mux()
    }

    pub fn tree(&self) -> &GroupTree {
        &self.tree
    }

    pub fn selected_item(&self) -> Option<&FlatItem> {
        self.flat.get(self.cursor)
    }

    pub fn selected_session(&self) -> Option<Arc<Session>> {
        match self.selected_item() {
            Some(FlatItem::Session { session, .. }) => Some(Arc::clone(session)),
            _ => None,
        }
    }

    pub fn cursor_down(&mut self) {
        if !self.flat.is_empty() {
            self.cursor = (self.cursor + 1) % self.flat.len();
        }
    }

    pub fn cursor_up(&mut self) {
        if !self.flat.is_empty() {
            self.cursor = if self.cursor == 0 { self.flat.len() - 1 } else { self.cursor - 1 };
        }
    }

    /// Keep the cursor row inside a viewport of `height` rows.
    pub fn clamp_viewport(&mut self, height: usize) {
        if height == 0 {
            return;
        }
        if self.cursor < self.scroll_offset {
            self.scroll_offset = self.cursor;
        } else if self.cursor >= self.scroll_offset + height {
            self.scroll_offset = self.cursor + 1 - height;
        }
    }

    // ── status refresh ───────────────────────────────────────────────

    /// One scheduler pass over all handles (the 500 ms tick).
    pub async fn refresh_statuses(&mut self) {
        self.scheduler.poll_all(&self.sessions).await;
    }

    pub async fn refresh_preview(&mut self) {
        match self.selected_session() {
            Some(session) => {
                self.preview = match session.capture_history(self.scheduler.mux()).await {
                    Ok(content) => content,
                    Err(_) => String::from("[unable to capture pane]"),
                };
            }
            None => {
                self.preview = String::from("No session selected. Press 'n' to create one.");
            }
        }
    }

    /// Hook endpoint event: reset acknowledgement without waiting for
    /// the next tick.
    pub fn handle_hook(&mut self, event: &HookEvent) {
        self.scheduler.apply_hook(&self.sessions, &event.session);
    }

    /// Log watcher reported activity for a session: poll it now.
    pub async fn handle_log_activity(&mut self, name: &str) {
        self.scheduler.poll_matching(&self.sessions, name).await;
    }

    // ── attach / detach ──────────────────────────────────────────────

    pub fn attach_selected(&mut self) {
        if let Some(session) = self.selected_session() {
            session.acknowledge();
            self.mode = Mode::Attached;
        }
    }

    /// Detach: baseline what the user just saw, then run one immediate
    /// scheduler pass before the cadence resumes.
    pub async fn detach(&mut self) {
        if let Some(session) = self.selected_session() {
            session.acknowledge_with_snapshot(self.scheduler.mux()).await;
        }
        self.mode = Mode::Browse;
        self.refresh_statuses().await;
    }

    // ── new session flow ─────────────────────────────────────────────

    pub fn start_new_session(&mut self) {
        self.mode = Mode::NewSessionName;
        self.input.clear();
        self.status_message = None;
    }

    pub fn submit_session_name(&mut self) {
        if self.input.trim().is_empty() {
            self.banner("Session name must not be empty".into());
            return;
        }
        self.mode = Mode::NewSessionTool;
        self.tool_selection = 0;
    }

    pub async fn confirm_new_session(&mut self) {
        let tool = Tool::all()[self.tool_selection.min(Tool::all().len() - 1)];
        let name = self.input.trim().to_string();
        let session = Arc::new(Session::new(&name, &self.work_dir));
        session.set_group_path(&self.target_group());

        match session.start(self.scheduler.mux(), tool.default_command()).await {
            Ok(()) => {
                self.tree.add_session(Arc::clone(&session));
                self.refresh_session_list();
                self.rebuild_flat();
                self.select_session(&session.id);
                self.banner(format!("Created session '{name}' ({tool})"));
                self.save().await;
            }
            Err(err) => {
                self.banner(format!("Failed to create session: {err}"));
            }
        }
        self.mode = Mode::Browse;
    }

    /// Group a new session lands in: the group under the cursor, the
    /// selected session's group, or default.
    fn target_group(&self) -> String {
        match self.selected_item() {
            Some(FlatItem::Group { path, .. }) => path.clone(),
            Some(FlatItem::Session { session, .. }) => session.group_path(),
            None => crate::group::DEFAULT_GROUP.to_string(),
        }
    }

    fn select_session(&mut self, id: &str) {
        if let Some(index) = self.flat.iter().position(
            |item| matches!(item, FlatItem::Session { session, .. } if session.id == id),
        ) {
            self.cursor = index;
        }
    }

    // ── delete flow ──────────────────────────────────────────────────

    pub fn request_delete(&mut self) {
        if self.selected_item().is_some() {
            self.mode = Mode::ConfirmDelete;
            self.status_message = None;
        }
    }

    pub async fn confirm_delete(&mut self) {
        let selected = self.selected_item().cloned();
        match selected {
            Some(FlatItem::Session { session, .. }) => {
                let name = session.display_name();
                if let Err(err) = session.kill(self.scheduler.mux()).await {
                    // The handle still goes away; the mux session may
                    // already be dead.
                    self.banner(format!("Killed '{name}' (with error: {err})"));
                } else {
                    self.banner(format!("Killed session '{name}'"));
                }
                self.tree.remove_session(&session);
                self.refresh_session_list();
                self.rebuild_flat();
                self.save().await;
            }
            Some(FlatItem::Group { path, .. }) => match self.tree.delete_group(&path) {
                Ok(()) => {
                    self.refresh_session_list();
                    self.rebuild_flat();
                    self.banner(format!("Deleted group '{path}'"));
                    self.save().await;
                }
                Err(err) => self.banner(format!("{err}")),
            },
            None => {}
        }
        self.mode = Mode::Browse;
    }

    // ── group flows ──────────────────────────────────────────────────

    pub fn start_new_group(&mut self) {
        self.mode = Mode::NewGroupName { parent: None };
        self.input.clear();
        self.status_message = None;
    }

    pub fn start_new_subgroup(&mut self) {
        let selected = self.selected_item().cloned();
        if let Some(FlatItem::Group { path, .. }) = selected {
            self.mode = Mode::NewGroupName { parent: Some(path) };
            self.input.clear();
            self.status_message = None;
        }
    }

    pub async fn confirm_new_group(&mut self) {
        let parent = match &self.mode {
            Mode::NewGroupName { parent } => parent.clone(),
            _ => return,
        };
        let result = match parent {
            Some(parent) => self.tree.create_subgroup(&parent, &self.input),
            None => self.tree.create_group(&self.input),
        };
        match result {
            Ok(path) => {
                self.rebuild_flat();
                self.banner(format!("Created group '{path}'"));
                self.save().await;
            }
            Err(err) => self.banner(format!("{err}")),
        }
        self.mode = Mode::Browse;
    }

    pub fn start_rename(&mut self) {
        let selected = self.selected_item().cloned();
        match selected {
            Some(FlatItem::Group { path, .. }) => {
                self.input = path.rsplit('/').next().unwrap_or(&path).to_string();
                self.mode = Mode::RenameGroup { path };
            }
            Some(FlatItem::Session { session, .. }) => {
                self.input = session.display_name();
                self.mode = Mode::RenameSession { id: session.id.clone() };
            }
            None => {}
        }
    }

    pub async fn confirm_rename(&mut self) {
        match self.mode.clone() {
            Mode::RenameGroup { path } => {
                match self.tree.rename_group(&path, &self.input) {
                    Ok(()) => {
                        self.rebuild_flat();
                        self.save().await;
                    }
                    Err(err) => self.banner(format!("{err}")),
                }
            }
            Mode::RenameSession { id } => {
                let new_name = self.input.trim().to_string();
                if new_name.is_empty() {
                    self.banner("Session name must not be empty".into());
                } else if let Some(session) = self.sessions.iter().find(|s| s.id == id) {
                    session.rename(&new_name);
                    self.rebuild_flat();
                    self.save().await;
                }
            }
            _ => {}
        }
        self.mode = Mode::Browse;
    }

    pub fn start_move_session(&mut self) {
        if self.selected_session().is_some() {
            self.group_choices = self.tree.group_names();
            self.group_selection = 0;
            self.mode = Mode::MoveSession;
        }
    }

    pub async fn confirm_move_session(&mut self) {
        let session = self.selected_session();
        let target = self.group_choices.get(self.group_selection).cloned();
        if let (Some(session), Some(target)) = (session, target) {
            match self.tree.move_session_to_group(&session, &target) {
                Ok(()) => {
                    self.refresh_session_list();
                    self.rebuild_flat();
                    self.select_session(&session.id);
                    self.save().await;
                }
                Err(err) => self.banner(format!("{err}")),
            }
        }
        self.mode = Mode::Browse;
    }

    /// Shift the item under the cursor up within its siblings.
    pub async fn move_selected_up(&mut self) {
        let selected = self.selected_item().cloned();
        match selected {
            Some(FlatItem::Group { path, .. }) => self.tree.move_group_up(&path),
            Some(FlatItem::Session { session, .. }) => self.tree.move_session_up(&session),
            None => return,
        }
        self.after_reorder().await;
    }

    /// Shift the item under the cursor down within its siblings.
    pub async fn move_selected_down(&mut self) {
        let selected = self.selected_item().cloned();
        match selected {
            Some(FlatItem::Group { path, .. }) => self.tree.move_group_down(&path),
            Some(FlatItem::Session { session, .. }) => self.tree.move_session_down(&session),
            None => return,
        }
        self.after_reorder().await;
    }

    async fn after_reorder(&mut self) {
        // Follow the moved item with the cursor.
        let followed = self.selected_session().map(|s| s.id.clone());
        self.refresh_session_list();
        self.rebuild_flat();
        if let Some(id) = followed {
            self.select_session(&id);
        }
        self.save().await;
    }

    pub async fn toggle_selected_group(&mut self) {
        let selected = self.selected_item().cloned();
        if let Some(FlatItem::Group { path, .. }) = selected {
            self.tree.toggle_group(&path);
            self.rebuild_flat();
            self.save().await;
        }
    }

    pub async fn collapse_selected_group(&mut self) {
        let selected = self.selected_item().cloned();
        if let Some(FlatItem::Group { path, .. }) = selected {
            self.tree.collapse_group(&path);
            self.rebuild_flat();
            self.save().await;
        }
    }

    pub fn cancel_mode(&mut self) {
        self.mode = Mode::Browse;
        self.input.clear();
    }

    // ── dialog selection helpers ─────────────────────────────────────

    pub fn tool_select_next(&mut self) {
        self.tool_selection = (self.tool_selection + 1) % Tool::all().len();
    }

    pub fn tool_select_prev(&mut self) {
        let len = Tool::all().len();
        self.tool_selection = (self.tool_selection + len - 1) % len;
    }

    pub fn group_select_next(&mut self) {
        if !self.group_choices.is_empty() {
            self.group_selection = (self.group_selection + 1) % self.group_choices.len();
        }
    }

    pub fn group_select_prev(&mut self) {
        if !self.group_choices.is_empty() {
            let len = self.group_choices.len();
            self.group_selection = (self.group_selection + len - 1) % len;
        }
    }
}
