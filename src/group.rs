use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::session::{sanitize_name, Session};

/// Catch-all group: receives sessions whose owning group is deleted.
pub const DEFAULT_GROUP: &str = "default";

/// Persisted shape of a group (mirrored in the snapshot file).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GroupRecord {
    pub name: String,
    pub path: String,
    pub expanded: bool,
    pub order: usize,
}

#[derive(Debug)]
pub struct Group {
    /// Last path segment.
    pub name: String,
    /// Slash-separated, unique, non-empty.
    pub path: String,
    pub expanded: bool,
    /// Dense and unique among siblings; drives presentation order.
    pub order: usize,
    pub sessions: Vec<Arc<Session>>,
}

impl Group {
    /// Parent path, or None for root-level groups.
    pub fn parent_path(&self) -> Option<&str> {
        self.path.rsplit_once('/').map(|(parent, _)| parent)
    }

    /// Nesting depth; root is 0.
    pub fn level(&self) -> usize {
        self.path.matches('/').count()
    }
}

/// One entry of the flattened, depth-first tree projection. Rebuilt on
/// every mutation, never persisted.
#[derive(Debug, Clone)]
pub enum FlatItem {
    Group { path: String, level: usize },
    Session { session: Arc<Session>, level: usize },
}

impl FlatItem {
    pub fn level(&self) -> usize {
        match self {
            FlatItem::Group { level, .. } | FlatItem::Session { level, .. } => *level,
        }
    }
}

/// Ordered, nested groups with session membership. Single-threaded:
/// the UI loop is the only mutator.
#[derive(Debug, Default)]
pub struct GroupTree {
    groups: HashMap<String, Group>,
}

impl GroupTree {
    /// Build a tree from a flat session list, grouping by each
    /// session's `group_path` (empty means `default`).
    pub fn new(sessions: &[Arc<Session>]) -> Self {
        let mut tree = Self { groups: HashMap::new() };
        tree.ensure_group(DEFAULT_GROUP);
        for session in sessions {
            tree.add_session(Arc::clone(session));
        }
        tree
    }

    /// Build a tree from persisted group records plus the session list.
    /// Empty groups survive; persisted `expanded`/`order` are honored.
    pub fn new_with_groups(sessions: &[Arc<Session>], records: &[GroupRecord]) -> Self {
        let mut tree = Self { groups: HashMap::new() };
        for record in records {
            let group = tree.ensure_group(&record.path);
            group.expanded = record.expanded;
            group.order = record.order;
        }
        tree.ensure_group(DEFAULT_GROUP);
        tree.densify_all();
        for session in sessions {
            tree.add_session(Arc::clone(session));
        }
        tree
    }

    // ── group lookup ─────────────────────────────────────────────────

    pub fn get(&self, path: &str) -> Option<&Group> {
        self.groups.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.groups.contains_key(path)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn session_count(&self) -> usize {
        self.groups.values().map(|g| g.sessions.len()).sum()
    }

    /// All group paths, sorted for dialogs.
    pub fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every session in flatten order (ignoring `expanded`).
    pub fn all_sessions(&self) -> Vec<Arc<Session>> {
        let mut out = Vec::new();
        for path in self.ordered_children(None) {
            self.collect_sessions(&path, &mut out);
        }
        out
    }

    fn collect_sessions(&self, path: &str, out: &mut Vec<Arc<Session>>) {
        if let Some(group) = self.groups.get(path) {
            out.extend(group.sessions.iter().cloned());
        }
        for child in self.ordered_children(Some(path)) {
            self.collect_sessions(&child, out);
        }
    }

    // ── group creation ───────────────────────────────────────────────

    /// Create a root-level group. Rejects empty and duplicate names.
    pub fn create_group(&mut self, name: &str) -> Result<String> {
        let name = sanitize_name(name.trim());
        if name.is_empty() {
            bail!("group name must not be empty");
        }
        if self.groups.contains_key(&name) {
            bail!("group '{name}' already exists");
        }
        self.ensure_group(&name);
        Ok(name)
    }

    /// Create a child group under an existing parent.
    pub fn create_subgroup(&mut self, parent_path: &str, name: &str) -> Result<String> {
        if !self.groups.contains_key(parent_path) {
            bail!("parent group '{parent_path}' not found");
        }
        let name = sanitize_name(name.trim());
        if name.is_empty() {
            bail!("group name must not be empty");
        }
        let path = format!("{parent_path}/{name}");
        if self.groups.contains_key(&path) {
            bail!("group '{path}' already exists");
        }
        self.ensure_group(&path);
        Ok(path)
    }

    /// Create the group at `path` (and any missing ancestors),
    /// assigning the next order among its siblings. Returns the group.
    fn ensure_group(&mut self, path: &str) -> &mut Group {
        if let Some((parent, _)) = path.rsplit_once('/') {
            if !self.groups.contains_key(parent) {
                self.ensure_group(parent);
            }
        }
        if !self.groups.contains_key(path) {
            let parent = path.rsplit_once('/').map(|(p, _)| p.to_string());
            let order = self.ordered_children(parent.as_deref()).len();
            let name = path.rsplit('/').next().unwrap_or(path).to_string();
            self.groups.insert(
                path.to_string(),
                Group { name, path: path.to_string(), expanded: true, order, sessions: Vec::new() },
            );
        }
        self.groups.get_mut(path).expect("group just ensured")
    }

    // ── rename / delete ──────────────────────────────────────────────

    /// Rename a group, atomically rewriting the paths of every
    /// descendant group and the `group_path` of every affected session.
    pub fn rename_group(&mut self, path: &str, new_name: &str) -> Result<()> {
        let group = match self.groups.get(path) {
            Some(g) => g,
            None => bail!("group '{path}' not found"),
        };
        let new_name = sanitize_name(new_name.trim());
        if new_name.is_empty() {
            bail!("group name must not be empty");
        }
        let new_path = match group.parent_path() {
            Some(parent) => format!("{parent}/{new_name}"),
            None => new_name.clone(),
        };
        if new_path == path {
            return Ok(());
        }
        if self.groups.contains_key(&new_path) {
            bail!("group '{new_path}' already exists");
        }

        let prefix = format!("{path}/");
        let affected: Vec<String> = self
            .groups
            .keys()
            .filter(|p| p.as_str() == path || p.starts_with(&prefix))
            .cloned()
            .collect();

        for old in affected {
            let mut group = self.groups.remove(&old).expect("affected path present");
            let rewritten = if old == path {
                new_path.clone()
            } else {
                format!("{new_path}/{}", &old[prefix.len()..])
            };
            group.name = rewritten.rsplit('/').next().unwrap_or(&rewritten).to_string();
            group.path = rewritten.clone();
            for session in &group.sessions {
                session.set_group_path(&rewritten);
            }
            self.groups.insert(rewritten, group);
        }
        Ok(())
    }

    /// Delete a group and its subgroups, relocating every descendant
    /// session to `default` in depth-first order. `default` itself
    /// cannot be deleted.
    pub fn delete_group(&mut self, path: &str) -> Result<()> {
        if path == DEFAULT_GROUP {
            bail!("the default group cannot be deleted");
        }
        if !self.groups.contains_key(path) {
            bail!("group '{path}' not found");
        }

        let mut orphans = Vec::new();
        self.collect_sessions(path, &mut orphans);

        let prefix = format!("{path}/");
        self.groups.retain(|p, _| p != path && !p.starts_with(&prefix));

        let default = self.ensure_group(DEFAULT_GROUP);
        for session in orphans {
            session.set_group_path(DEFAULT_GROUP);
            default.sessions.push(session);
        }

        self.densify_all();
        Ok(())
    }

    // ── session membership ───────────────────────────────────────────

    /// Insert a session into the group named by its `group_path`
    /// (default when empty), creating the group chain as needed.
    pub fn add_session(&mut self, session: Arc<Session>) {
        let mut path = session.group_path();
        if path.is_empty() {
            path = DEFAULT_GROUP.to_string();
            session.set_group_path(&path);
        }
        let group = self.ensure_group(&path);
        if !group.sessions.iter().any(|s| s.id == session.id) {
            group.sessions.push(session);
        }
    }

    /// Drop a session from its group. The group stays, even empty.
    pub fn remove_session(&mut self, session: &Session) {
        if let Some(group) = self.groups.get_mut(&session.group_path()) {
            group.sessions.retain(|s| s.id != session.id);
        }
    }

    /// Move a session to another (existing) group, appending at the end.
    pub fn move_session_to_group(&mut self, session: &Arc<Session>, target: &str) -> Result<()> {
        if !self.groups.contains_key(target) {
            bail!("group '{target}' not found");
        }
        if session.group_path() == target {
            return Ok(());
        }
        self.remove_session(session);
        session.set_group_path(target);
        self.groups
            .get_mut(target)
            .expect("target group present")
            .sessions
            .push(Arc::clone(session));
        Ok(())
    }

    /// Reconcile membership from a fresh session list (reload path)
    /// without destroying empty groups or user ordering.
    pub fn sync_with_instances(&mut self, sessions: &[Arc<Session>]) {
        let live: std::collections::HashSet<&str> =
            sessions.iter().map(|s| s.id.as_str()).collect();
        for group in self.groups.values_mut() {
            group.sessions.retain(|s| live.contains(s.id.as_str()));
        }
        let placed: std::collections::HashSet<String> = self
            .groups
            .values()
            .flat_map(|g| g.sessions.iter().map(|s| s.id.clone()))
            .collect();
        for session in sessions {
            if !placed.contains(&session.id) {
                self.add_session(Arc::clone(session));
            }
        }
    }

    // ── ordering ─────────────────────────────────────────────────────

    /// Swap a group's order with its previous sibling. No-op at the top.
    pub fn move_group_up(&mut self, path: &str) {
        self.swap_group_order(path, -1);
    }

    /// Swap a group's order with its next sibling. No-op at the bottom.
    pub fn move_group_down(&mut self, path: &str) {
        self.swap_group_order(path, 1);
    }

    fn swap_group_order(&mut self, path: &str, direction: isize) {
        let parent = match self.groups.get(path) {
            Some(g) => g.parent_path().map(str::to_string),
            None => return,
        };
        let siblings = self.ordered_children(parent.as_deref());
        let Some(index) = siblings.iter().position(|p| p == path) else {
            return;
        };
        let other = index as isize + direction;
        if other < 0 || other as usize >= siblings.len() {
            return;
        }
        let other_path = siblings[other as usize].clone();
        let a = self.groups[path].order;
        let b = self.groups[&other_path].order;
        self.groups.get_mut(path).expect("group present").order = b;
        self.groups.get_mut(&other_path).expect("sibling present").order = a;
    }

    /// Swap a session with the previous one in its group. No-op at the top.
    pub fn move_session_up(&mut self, session: &Session) {
        if let Some(group) = self.groups.get_mut(&session.group_path()) {
            if let Some(index) = group.sessions.iter().position(|s| s.id == session.id) {
                if index > 0 {
                    group.sessions.swap(index, index - 1);
                }
            }
        }
    }

    /// Swap a session with the next one in its group. No-op at the bottom.
    pub fn move_session_down(&mut self, session: &Session) {
        if let Some(group) = self.groups.get_mut(&session.group_path()) {
            if let Some(index) = group.sessions.iter().position(|s| s.id == session.id) {
                if index + 1 < group.sessions.len() {
                    group.sessions.swap(index, index + 1);
                }
            }
        }
    }

    // ── expansion ────────────────────────────────────────────────────

    pub fn toggle_group(&mut self, path: &str) {
        if let Some(group) = self.groups.get_mut(path) {
            group.expanded = !group.expanded;
        }
    }

    pub fn collapse_group(&mut self, path: &str) {
        if let Some(group) = self.groups.get_mut(path) {
            group.expanded = false;
        }
    }

    // ── projection ───────────────────────────────────────────────────

    /// Depth-first projection honoring `expanded` and sibling order:
    /// each group, then (when expanded) its sessions, then its
    /// subgroups.
    pub fn flatten(&self) -> Vec<FlatItem> {
        let mut items = Vec::new();
        for path in self.ordered_children(None) {
            self.flatten_into(&path, 0, &mut items);
        }
        items
    }

    fn flatten_into(&self, path: &str, level: usize, items: &mut Vec<FlatItem>) {
        let Some(group) = self.groups.get(path) else {
            return;
        };
        items.push(FlatItem::Group { path: path.to_string(), level });
        if !group.expanded {
            return;
        }
        for session in &group.sessions {
            items.push(FlatItem::Session { session: Arc::clone(session), level: level + 1 });
        }
        for child in self.ordered_children(Some(path)) {
            self.flatten_into(&child, level + 1, items);
        }
    }

    /// Paths of the direct children of `parent` (root when None),
    /// sorted by order.
    fn ordered_children(&self, parent: Option<&str>) -> Vec<String> {
        let mut children: Vec<(&Group, &String)> = self
            .groups
            .iter()
            .filter(|(_, g)| g.parent_path() == parent)
            .map(|(path, g)| (g, path))
            .collect();
        children.sort_by_key(|(g, path)| (g.order, (*path).clone()));
        children.into_iter().map(|(_, path)| path.clone()).collect()
    }

    /// Re-assign dense 0..n orders within every sibling set, keeping
    /// relative order.
    fn densify_all(&mut self) {
        let mut parents: Vec<Option<String>> =
            self.groups.values().map(|g| g.parent_path().map(str::to_string)).collect();
        parents.sort();
        parents.dedup();
        for parent in parents {
            let siblings = self.ordered_children(parent.as_deref());
            for (index, path) in siblings.iter().enumerate() {
                self.groups.get_mut(path).expect("sibling present").order = index;
            }
        }
    }

    /// Snapshot group records for persistence, including empty groups.
    pub fn records(&self) -> Vec<GroupRecord> {
        let mut records: Vec<GroupRecord> = self
            .groups
            .values()
            .map(|g| GroupRecord {
                name: g.name.clone(),
                path: g.path.clone(),
                expanded: g.expanded,
                order: g.order,
            })
            .collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(name: &str, group: &str) -> Arc<Session> {
        let s = Arc::new(Session::new(name, "/tmp/proj"));
        s.set_group_path(group);
        s
    }

    fn flat_labels(tree: &GroupTree) -> Vec<String> {
        tree.flatten()
            .iter()
            .map(|item| match item {
                FlatItem::Group { path, level } => format!("{}g:{path}", "  ".repeat(*level)),
                FlatItem::Session { session, level } => {
                    format!("{}s:{}", "  ".repeat(*level), session.display_name())
                }
            })
            .collect()
    }

    // ── construction ─────────────────────────────────────────────────

    #[test]
    fn new_tree_always_has_default() {
        let tree = GroupTree::new(&[]);
        assert!(tree.contains(DEFAULT_GROUP));
        assert_eq!(tree.group_count(), 1);
    }

    #[test]
    fn sessions_with_empty_group_land_in_default() {
        let s = session("s1", "");
        let tree = GroupTree::new(&[Arc::clone(&s)]);
        assert_eq!(s.group_path(), DEFAULT_GROUP);
        assert_eq!(tree.get(DEFAULT_GROUP).unwrap().sessions.len(), 1);
    }

    #[test]
    fn nested_group_paths_create_ancestors() {
        let s = session("deep", "a/b/c");
        let tree = GroupTree::new(&[s]);
        assert!(tree.contains("a"));
        assert!(tree.contains("a/b"));
        assert!(tree.contains("a/b/c"));
        assert_eq!(tree.get("a/b/c").unwrap().name, "c");
        assert_eq!(tree.get("a/b/c").unwrap().level(), 2);
    }

    #[test]
    fn new_with_groups_keeps_empty_groups_and_order() {
        let records = vec![
            GroupRecord { name: "beta".into(), path: "beta".into(), expanded: false, order: 1 },
            GroupRecord { name: "alpha".into(), path: "alpha".into(), expanded: true, order: 0 },
            GroupRecord { name: "empty".into(), path: "empty".into(), expanded: true, order: 2 },
        ];
        let tree = GroupTree::new_with_groups(&[], &records);
        assert!(tree.contains("empty"));
        assert!(!tree.get("beta").unwrap().expanded);
        // default was not persisted, so it is appended after the
        // recorded groups.
        let labels = flat_labels(&tree);
        assert_eq!(labels, vec!["g:alpha", "g:beta", "g:empty", "g:default"]);
    }

    #[test]
    fn new_with_groups_densifies_sparse_orders() {
        let records = vec![
            GroupRecord { name: "a".into(), path: "a".into(), expanded: true, order: 7 },
            GroupRecord { name: "b".into(), path: "b".into(), expanded: true, order: 3 },
        ];
        let tree = GroupTree::new_with_groups(&[], &records);
        // default (appended at 2) then b (3) then a (7); dense orders
        // re-assigned keeping that relative order.
        assert_eq!(tree.get(DEFAULT_GROUP).unwrap().order, 0);
        assert_eq!(tree.get("b").unwrap().order, 1);
        assert_eq!(tree.get("a").unwrap().order, 2);
    }

    // ── create / duplicate rejection ─────────────────────────────────

    #[test]
    fn create_group_rejects_duplicates_and_empty() {
        let mut tree = GroupTree::new(&[]);
        tree.create_group("work").unwrap();
        assert!(tree.create_group("work").is_err());
        assert!(tree.create_group("  ").is_err());
    }

    #[test]
    fn create_subgroup_requires_parent() {
        let mut tree = GroupTree::new(&[]);
        assert!(tree.create_subgroup("missing", "x").is_err());
        tree.create_group("a").unwrap();
        assert_eq!(tree.create_subgroup("a", "b").unwrap(), "a/b");
        assert!(tree.create_subgroup("a", "b").is_err());
    }

    #[test]
    fn group_names_are_sanitized_preserving_case() {
        let mut tree = GroupTree::new(&[]);
        let path = tree.create_group("My Projects!").unwrap();
        assert_eq!(path, "My-Projects-");
    }

    // ── rename ───────────────────────────────────────────────────────

    #[test]
    fn rename_rewrites_descendants_and_sessions() {
        let s1 = session("s1", "a/b");
        let s2 = session("s2", "a/b/c");
        let mut tree = GroupTree::new(&[Arc::clone(&s1), Arc::clone(&s2)]);

        tree.rename_group("a", "z").unwrap();

        assert!(tree.contains("z"));
        assert!(tree.contains("z/b"));
        assert!(tree.contains("z/b/c"));
        assert!(!tree.contains("a"));
        assert_eq!(s1.group_path(), "z/b");
        assert_eq!(s2.group_path(), "z/b/c");
    }

    #[test]
    fn rename_matches_fresh_creation() {
        let s1 = session("s1", "a/b");
        let mut tree = GroupTree::new(&[Arc::clone(&s1)]);
        tree.rename_group("a", "z").unwrap();
        let renamed = flat_labels(&tree);

        let s2 = session("s1", "z/b");
        let fresh = GroupTree::new(&[s2]);
        assert_eq!(renamed, flat_labels(&fresh));
    }

    #[test]
    fn rename_rejects_duplicate_sibling() {
        let mut tree = GroupTree::new(&[]);
        tree.create_group("a").unwrap();
        tree.create_group("b").unwrap();
        assert!(tree.rename_group("a", "b").is_err());
        // No side effects.
        assert!(tree.contains("a"));
        assert!(tree.contains("b"));
    }

    #[test]
    fn rename_to_same_name_is_noop() {
        let mut tree = GroupTree::new(&[]);
        tree.create_group("a").unwrap();
        tree.rename_group("a", "a").unwrap();
        assert!(tree.contains("a"));
    }

    #[test]
    fn rename_missing_group_fails() {
        let mut tree = GroupTree::new(&[]);
        assert!(tree.rename_group("ghost", "x").is_err());
    }

    // ── delete ───────────────────────────────────────────────────────

    #[test]
    fn delete_moves_descendant_sessions_to_default() {
        let s1 = session("s1", "z/b");
        let s2 = session("s2", "z/b/c");
        let mut tree = GroupTree::new(&[Arc::clone(&s1), Arc::clone(&s2)]);

        tree.delete_group("z/b").unwrap();

        assert!(!tree.contains("z/b"));
        assert!(!tree.contains("z/b/c"));
        assert!(tree.contains("z"));
        assert_eq!(s1.group_path(), DEFAULT_GROUP);
        assert_eq!(s2.group_path(), DEFAULT_GROUP);
        let default = tree.get(DEFAULT_GROUP).unwrap();
        let names: Vec<String> = default.sessions.iter().map(|s| s.display_name()).collect();
        assert_eq!(names, vec!["s1", "s2"], "original relative order preserved");
    }

    #[test]
    fn delete_preserves_session_set() {
        let s1 = session("s1", "g1");
        let s2 = session("s2", "g1/sub");
        let s3 = session("s3", "other");
        let mut tree = GroupTree::new(&[s1, s2, s3]);
        assert_eq!(tree.session_count(), 3);
        tree.delete_group("g1").unwrap();
        assert_eq!(tree.session_count(), 3);
    }

    #[test]
    fn delete_default_is_rejected() {
        let mut tree = GroupTree::new(&[]);
        assert!(tree.delete_group(DEFAULT_GROUP).is_err());
        assert!(tree.contains(DEFAULT_GROUP));
    }

    #[test]
    fn delete_missing_group_fails() {
        let mut tree = GroupTree::new(&[]);
        assert!(tree.delete_group("nope").is_err());
    }

    // ── membership ───────────────────────────────────────────────────

    #[test]
    fn add_session_is_idempotent() {
        let s = session("s1", "g");
        let mut tree = GroupTree::new(&[]);
        tree.add_session(Arc::clone(&s));
        tree.add_session(Arc::clone(&s));
        assert_eq!(tree.get("g").unwrap().sessions.len(), 1);
    }

    #[test]
    fn remove_session_keeps_empty_group() {
        let s = session("s1", "g");
        let mut tree = GroupTree::new(&[Arc::clone(&s)]);
        tree.remove_session(&s);
        assert!(tree.contains("g"));
        assert_eq!(tree.session_count(), 0);
    }

    #[test]
    fn move_session_between_groups() {
        let s = session("s1", "a");
        let mut tree = GroupTree::new(&[Arc::clone(&s)]);
        tree.create_group("b").unwrap();

        tree.move_session_to_group(&s, "b").unwrap();
        assert_eq!(s.group_path(), "b");
        assert!(tree.get("a").unwrap().sessions.is_empty());
        assert_eq!(tree.get("b").unwrap().sessions.len(), 1);

        assert!(tree.move_session_to_group(&s, "missing").is_err());
    }

    #[test]
    fn sync_adds_new_and_drops_stale() {
        let s1 = session("s1", "g");
        let s2 = session("s2", "g");
        let mut tree = GroupTree::new(&[Arc::clone(&s1), Arc::clone(&s2)]);
        tree.create_group("kept-empty").unwrap();

        let s3 = session("s3", "g");
        tree.sync_with_instances(&[Arc::clone(&s1), Arc::clone(&s3)]);

        assert_eq!(tree.session_count(), 2);
        assert!(tree.contains("kept-empty"), "empty groups survive reload");
        let names: Vec<String> =
            tree.get("g").unwrap().sessions.iter().map(|s| s.display_name()).collect();
        assert_eq!(names, vec!["s1", "s3"]);
    }

    // ── ordering ─────────────────────────────────────────────────────

    #[test]
    fn group_orders_are_dense_and_unique() {
        let mut tree = GroupTree::new(&[]);
        for name in ["a", "b", "c"] {
            tree.create_group(name).unwrap();
        }
        let mut orders: Vec<usize> =
            ["default", "a", "b", "c"].iter().map(|p| tree.get(p).unwrap().order).collect();
        orders.sort();
        assert_eq!(orders, vec![0, 1, 2, 3]);
    }

    #[test]
    fn move_group_up_swaps_with_previous_sibling() {
        let mut tree = GroupTree::new(&[]);
        tree.create_group("a").unwrap();
        tree.create_group("b").unwrap();
        // order: default(0), a(1), b(2)
        tree.move_group_up("b");
        let labels = flat_labels(&tree);
        assert_eq!(labels, vec!["g:default", "g:b", "g:a"]);
    }

    #[test]
    fn move_group_at_boundary_is_noop() {
        let mut tree = GroupTree::new(&[]);
        tree.create_group("a").unwrap();
        tree.move_group_up(DEFAULT_GROUP);
        tree.move_group_down("a");
        assert_eq!(flat_labels(&tree), vec!["g:default", "g:a"]);
    }

    #[test]
    fn move_group_only_swaps_within_same_parent() {
        let mut tree = GroupTree::new(&[]);
        tree.create_group("a").unwrap();
        tree.create_subgroup("a", "child").unwrap();
        // The only child of "a" has no sibling to swap with.
        tree.move_group_up("a/child");
        tree.move_group_down("a/child");
        assert_eq!(tree.get("a/child").unwrap().order, 0);
    }

    #[test]
    fn move_session_up_down_swaps_neighbors() {
        let s1 = session("s1", "g");
        let s2 = session("s2", "g");
        let s3 = session("s3", "g");
        let mut tree = GroupTree::new(&[Arc::clone(&s1), Arc::clone(&s2), Arc::clone(&s3)]);

        tree.move_session_up(&s3);
        let names: Vec<String> =
            tree.get("g").unwrap().sessions.iter().map(|s| s.display_name()).collect();
        assert_eq!(names, vec!["s1", "s3", "s2"]);

        tree.move_session_up(&s1); // boundary no-op
        tree.move_session_down(&s2); // boundary no-op
        let names: Vec<String> =
            tree.get("g").unwrap().sessions.iter().map(|s| s.display_name()).collect();
        assert_eq!(names, vec!["s1", "s3", "s2"]);
    }

    // ── flatten ──────────────────────────────────────────────────────

    #[test]
    fn flatten_respects_expansion() {
        let s1 = session("s1", "a");
        let mut tree = GroupTree::new(&[s1]);
        assert_eq!(flat_labels(&tree), vec!["g:default", "g:a", "  s:s1"]);

        tree.collapse_group("a");
        assert_eq!(flat_labels(&tree), vec!["g:default", "g:a"]);

        tree.toggle_group("a");
        assert_eq!(flat_labels(&tree), vec!["g:default", "g:a", "  s:s1"]);
    }

    #[test]
    fn collapsed_parent_hides_whole_subtree() {
        let s = session("s", "a/b");
        let mut tree = GroupTree::new(&[s]);
        tree.collapse_group("a");
        assert_eq!(flat_labels(&tree), vec!["g:default", "g:a"]);
    }

    #[test]
    fn flatten_levels_and_nesting() {
        let s1 = session("s1", "a");
        let s2 = session("s2", "a/b");
        let tree = GroupTree::new(&[s1, s2]);
        assert_eq!(
            flat_labels(&tree),
            vec!["g:default", "g:a", "  s:s1", "  g:a/b", "    s:s2"]
        );
    }

    #[test]
    fn flatten_contains_each_session_exactly_once() {
        let sessions: Vec<Arc<Session>> = (0..6)
            .map(|i| session(&format!("s{i}"), if i % 2 == 0 { "even" } else { "odd/deep" }))
            .collect();
        let tree = GroupTree::new(&sessions);
        let mut seen: Vec<String> = tree
            .flatten()
            .iter()
            .filter_map(|item| match item {
                FlatItem::Session { session, .. } => Some(session.id.clone()),
                _ => None,
            })
            .collect();
        seen.sort();
        let mut expected: Vec<String> = sessions.iter().map(|s| s.id.clone()).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Random mutation sequences keep the flat projection
            /// consistent: every session appears exactly once and group
            /// orders stay dense per sibling set.
            #[test]
            fn mutations_preserve_projection_invariants(ops in proptest::collection::vec(0u8..5, 1..30)) {
                let sessions: Vec<Arc<Session>> =
                    (0..4).map(|i| session(&format!("s{i}"), "g")).collect();
                let mut tree = GroupTree::new(&sessions);
                tree.create_group("other").unwrap();

                for (step, op) in ops.iter().enumerate() {
                    match op {
                        0 => { let _ = tree.create_group(&format!("gen{step}")); }
                        1 => tree.move_group_up("other"),
                        2 => tree.move_group_down("other"),
                        3 => { let _ = tree.move_session_to_group(&sessions[step % 4], "other"); }
                        _ => tree.move_session_up(&sessions[step % 4]),
                    }
                }

                let mut seen: Vec<String> = Vec::new();
                for item in tree.flatten() {
                    if let FlatItem::Session { session, .. } = item {
                        prop_assert!(!seen.contains(&session.id));
                        seen.push(session.id.clone());
                    }
                }
                prop_assert_eq!(seen.len(), 4);

                // Dense orders at root.
                let mut root_orders: Vec<usize> = tree
                    .records()
                    .iter()
                    .filter(|r| !r.path.contains('/'))
                    .map(|r| r.order)
                    .collect();
                root_orders.sort();
                let expected: Vec<usize> = (0..root_orders.len()).collect();
                prop_assert_eq!(root_orders, expected);
            }
        }
    }
}
