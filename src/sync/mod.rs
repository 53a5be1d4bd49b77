//! Lazy tree synchronization between the host view, the remote service and
//! the store.
//!
//! The host asks for the children of a node; the synchronizer classifies the
//! node, fetches from the remote (or reads the store), builds tree nodes,
//! applies the persisted sort and upserts the fetched gists. `refresh` only
//! invalidates: the next `get_children` for the node does the real fetch.
//!
//! Concurrent `get_children` calls for the same node are not deduplicated and
//! started fetches are never cancelled. Overlapping store upserts are
//! last-writer-wins.

pub mod status;

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{Result, SyncError, TransportError};
use crate::model::{EntityNode, Gist, GistFile, GroupKind, NodeKey, NodeKind, TreeNode};
use crate::remote::RemoteService;
use crate::store::{MemoryStorage, StorageBackend, StorageKey, Store};

pub use status::{RefreshCompletion, StatusTracker, SyncStatus};

/// Default name of the reserved notepad gist.
pub const DEFAULT_NOTEPAD_NAME: &str = "Notepad";

const CHANGE_CAPACITY: usize = 64;

/// Behaviour switches taken from the `[tree]` config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeOptions {
    /// Fetch a child count for every root group (one extra call per group).
    pub show_decoration_counts: bool,
    /// Show the owner's avatar instead of the gist icon for foreign gists.
    pub use_owner_avatars: bool,
    /// Fetch each followed user's gist count when listing them.
    pub followed_user_counts: bool,
    pub notepad_name: String,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            show_decoration_counts: false,
            use_owner_avatars: false,
            followed_user_counts: false,
            notepad_name: DEFAULT_NOTEPAD_NAME.to_string(),
        }
    }
}

/// Change notification for the host view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeChange {
    /// Node to re-render; `None` means the whole tree.
    pub scope: Option<NodeKey>,
    /// Only the order changed; re-rendering needs no new data.
    pub is_sort_change: bool,
}

/// One failed item of a decoration batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub item: String,
    pub error: String,
}

/// Outcome of a batch of independent remote calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub attempted: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.attempted - self.failures.len()
    }

    fn record(&mut self, item: impl Into<String>, error: &SyncError) {
        self.failures.push(BatchFailure {
            item: item.into(),
            error: error.to_string(),
        });
    }

    fn log(&self, batch: &str) {
        for failure in &self.failures {
            warn!("{}: {} failed: {}", batch, failure.item, failure.error);
        }
        if !self.failures.is_empty() {
            warn!(
                "{}: {}/{} items failed",
                batch,
                self.failures.len(),
                self.attempted
            );
        }
    }
}

/// Answers "what are the children of this node" for the host tree view.
pub struct TreeSynchronizer<R: RemoteService, B: StorageBackend = MemoryStorage> {
    remote: Arc<R>,
    store: Arc<Store<B>>,
    options: TreeOptions,
    changes: broadcast::Sender<TreeChange>,
    status: StatusTracker,
}

/// Build file leaves for a gist: sorted by name, then stably by content
/// type, so files end up grouped by type and name-ordered within a type.
pub fn content_nodes(gist: &Gist, read_only: bool) -> Vec<TreeNode> {
    let mut files: Vec<&GistFile> = gist.files.iter().collect();
    files.sort_by(|a, b| a.filename.to_lowercase().cmp(&b.filename.to_lowercase()));
    files.sort_by(|a, b| a.content_type.cmp(&b.content_type));
    files
        .into_iter()
        .map(|f| TreeNode::content(&gist.id, f, read_only))
        .collect()
}

impl<R: RemoteService, B: StorageBackend> TreeSynchronizer<R, B> {
    pub fn new(remote: Arc<R>, store: Arc<Store<B>>, options: TreeOptions) -> Self {
        let (changes, _rx) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            remote,
            store,
            options,
            changes,
            status: StatusTracker::new(),
        }
    }

    pub fn store(&self) -> &Arc<Store<B>> {
        &self.store
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TreeChange> {
        self.changes.subscribe()
    }

    /// Whether any child query is running right now.
    pub fn is_refreshing(&self) -> bool {
        self.status.is_busy()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.status()
    }

    // ── Host entry points ───────────────────────────────────────────────────

    /// The fixed root groups, optionally decorated with child counts.
    pub async fn get_roots(&self) -> Vec<TreeNode> {
        let _busy = self.status.begin();
        if !self.options.show_decoration_counts {
            return GroupKind::ALL
                .into_iter()
                .map(|kind| TreeNode::group(kind, None))
                .collect();
        }
        let (roots, report) = self.decorate_groups().await;
        report.log("group counts");
        roots
    }

    /// Children of `node`, or the roots when `node` is `None`.
    ///
    /// Transport failures degrade to an empty list; configuration and storage
    /// errors are returned.
    pub async fn get_children(&self, node: Option<&TreeNode>) -> Result<Vec<TreeNode>> {
        let _busy = self.status.begin();
        let node = match node {
            None => return Ok(self.get_roots().await),
            Some(node) => node,
        };
        debug!("expanding {:?}", node.key());
        match &node.kind {
            NodeKind::Group(group) => {
                let kind = group.kind()?;
                self.group_children(kind).await
            }
            NodeKind::Gist(entity) => Ok(self.entity_children(entity).await),
            NodeKind::Notepad(_) => Ok(self.notepad_children().await),
            NodeKind::User(user) => self.user_children(&user.login).await,
            NodeKind::Content(_) => Ok(Vec::new()),
        }
    }

    /// Parent of a node as far as the store knows it. Content nodes resolve
    /// through the cached gist; an uncached gist yields `None`.
    pub fn get_parent(&self, node: &TreeNode) -> Option<TreeNode> {
        match &node.kind {
            NodeKind::Content(content) => {
                let entity = self.store.get(&content.gist_id)?;
                Some(self.entity_node(entity))
            }
            NodeKind::Gist(entity) if entity.group == GroupKind::FollowedUsers => entity
                .gist
                .owner_login()
                .map(|login| TreeNode::user(login, None, None)),
            NodeKind::Gist(entity) => Some(TreeNode::group(entity.group, None)),
            NodeKind::Notepad(_) => Some(TreeNode::group(GroupKind::Notepad, None)),
            NodeKind::User(_) => Some(TreeNode::group(GroupKind::FollowedUsers, None)),
            NodeKind::Group(_) => None,
        }
    }

    /// Invalidate `node` (or the whole tree). Emits exactly one change
    /// notification and fetches nothing; the returned completion resolves
    /// once a later `get_children` has finished.
    pub fn refresh(&self, node: Option<&TreeNode>, is_sort_change: bool) -> RefreshCompletion {
        self.refresh_key(node.map(TreeNode::key), is_sort_change)
    }

    /// Same as [`refresh`](Self::refresh), for callers holding only a key.
    pub fn refresh_key(&self, scope: Option<NodeKey>, is_sort_change: bool) -> RefreshCompletion {
        let completion = self.status.request();
        let change = TreeChange {
            scope,
            is_sort_change,
        };
        debug!("refresh {:?}", change);
        // No subscribers is fine: nothing is rendered yet.
        let _ = self.changes.send(change);
        completion
    }

    // ── Batch decoration ────────────────────────────────────────────────────

    /// Build the root groups with a child count each. Failed counts are left
    /// empty and reported; they never abort the batch.
    pub async fn decorate_groups(&self) -> (Vec<TreeNode>, BatchReport) {
        let counts = join_all(GroupKind::ALL.into_iter().map(|kind| self.group_count(kind))).await;
        let mut report = BatchReport {
            attempted: counts.len(),
            ..Default::default()
        };
        let roots = GroupKind::ALL
            .into_iter()
            .zip(counts)
            .map(|(kind, count)| match count {
                Ok(count) => TreeNode::group(kind, count),
                Err(e) => {
                    report.record(kind.label(), &e);
                    TreeNode::group(kind, None)
                }
            })
            .collect();
        (roots, report)
    }

    /// Build user nodes in the given order, fetching each user's gist count.
    pub async fn decorate_users(&self, logins: &[String]) -> (Vec<TreeNode>, BatchReport) {
        let fetched = join_all(logins.iter().map(|login| self.remote.list_for_user(login))).await;
        let mut report = BatchReport {
            attempted: logins.len(),
            ..Default::default()
        };
        let users = logins
            .iter()
            .zip(fetched)
            .map(|(login, result)| match result {
                Ok(gists) => {
                    let avatar = gists
                        .iter()
                        .find_map(|g| g.owner_avatar())
                        .map(str::to_string);
                    TreeNode::user(login, avatar, Some(gists.len()))
                }
                Err(e) => {
                    report.record(login, &SyncError::from(e));
                    TreeNode::user(login, None, None)
                }
            })
            .collect();
        (users, report)
    }

    async fn group_count(&self, kind: GroupKind) -> Result<Option<usize>> {
        let count = match kind {
            GroupKind::Notepad => return Ok(None),
            GroupKind::MyGists => self.owned_gists().await?.len(),
            GroupKind::Starred => self.remote.list_owned(true).await?.len(),
            GroupKind::FollowedUsers => self
                .store
                .read_from_global_storage(StorageKey::FollowedUsers)?
                .len(),
            GroupKind::OpenedGists => self
                .store
                .read_from_global_storage(StorageKey::OpenedGists)?
                .len(),
        };
        Ok(Some(count))
    }

    // ── Per-kind dispatch ───────────────────────────────────────────────────

    async fn group_children(&self, kind: GroupKind) -> Result<Vec<TreeNode>> {
        match kind {
            GroupKind::Notepad => Ok(match self.fetch_notepad().await {
                Some(gist) => vec![TreeNode::notepad(gist)],
                None => Vec::new(),
            }),
            GroupKind::MyGists => {
                let gists = degrade("my gists", self.owned_gists().await);
                self.classified(gists, GroupKind::MyGists)
            }
            GroupKind::Starred => {
                let gists = degrade("starred gists", self.remote.list_owned(true).await);
                self.classified(gists, GroupKind::Starred)
            }
            GroupKind::FollowedUsers => {
                // Follow order is kept as-is: this group is never sorted.
                let logins = self.store.read_from_global_storage(StorageKey::FollowedUsers)?;
                if !self.options.followed_user_counts {
                    return Ok(logins
                        .into_iter()
                        .map(|login| TreeNode::user(login, None, None))
                        .collect());
                }
                let (users, report) = self.decorate_users(&logins).await;
                report.log("followed user counts");
                Ok(users)
            }
            GroupKind::OpenedGists => {
                let ids = self.store.read_from_global_storage(StorageKey::OpenedGists)?;
                let fetched = join_all(ids.iter().map(|id| self.remote.get_by_id(id))).await;
                let mut report = BatchReport {
                    attempted: ids.len(),
                    ..Default::default()
                };
                let mut gists = Vec::with_capacity(ids.len());
                for (id, result) in ids.iter().zip(fetched) {
                    match result {
                        Ok(gist) => gists.push(gist),
                        Err(e) => report.record(id, &SyncError::from(e)),
                    }
                }
                report.log("opened gists");
                self.classified(gists, GroupKind::OpenedGists)
            }
        }
    }

    async fn entity_children(&self, entity: &EntityNode) -> Vec<TreeNode> {
        match self.remote.get_by_id(entity.id()).await {
            Ok(gist) => {
                let nodes = content_nodes(&gist, entity.read_only());
                self.store.upsert([EntityNode {
                    gist,
                    group: entity.group,
                }]);
                nodes
            }
            Err(e) => {
                warn!("failed to fetch gist {}: {}", entity.id(), e);
                Vec::new()
            }
        }
    }

    async fn notepad_children(&self) -> Vec<TreeNode> {
        match self.fetch_notepad().await {
            Some(gist) => content_nodes(&gist, false),
            None => Vec::new(),
        }
    }

    async fn user_children(&self, login: &str) -> Result<Vec<TreeNode>> {
        let gists = degrade(login, self.remote.list_for_user(login).await);
        self.classified(gists, GroupKind::FollowedUsers)
    }

    // ── Helpers ─────────────────────────────────────────────────────────────

    /// Owned gists minus the reserved notepad.
    async fn owned_gists(&self) -> std::result::Result<Vec<Gist>, TransportError> {
        let name = self.options.notepad_name.as_str();
        let gists = self.remote.list_owned(false).await?;
        Ok(gists.into_iter().filter(|g| !g.is_named(name)).collect())
    }

    async fn fetch_notepad(&self) -> Option<Gist> {
        match self.remote.notepad(&self.options.notepad_name).await {
            Ok(gist) => {
                self.store.upsert([EntityNode {
                    gist: gist.clone(),
                    group: GroupKind::Notepad,
                }]);
                Some(gist)
            }
            Err(e) => {
                warn!("failed to fetch notepad: {}", e);
                None
            }
        }
    }

    /// Classify, cache and sort a fetched gist list.
    fn classified(&self, gists: Vec<Gist>, group: GroupKind) -> Result<Vec<TreeNode>> {
        let mut entities: Vec<EntityNode> = gists
            .into_iter()
            .map(|gist| EntityNode { gist, group })
            .collect();
        self.store.upsert(entities.iter().cloned());
        self.store.apply_saved_order(&mut entities)?;
        Ok(entities
            .into_iter()
            .map(|entity| self.entity_node(entity))
            .collect())
    }

    fn entity_node(&self, entity: EntityNode) -> TreeNode {
        match entity.group {
            GroupKind::Notepad => TreeNode::notepad(entity.gist),
            GroupKind::Starred | GroupKind::OpenedGists => {
                TreeNode::gist(entity.gist, entity.group, self.options.use_owner_avatars)
            }
            group => TreeNode::gist(entity.gist, group, false),
        }
    }
}

/// Log a failed listing and fall back to nothing.
fn degrade<T>(what: &str, result: std::result::Result<Vec<T>, TransportError>) -> Vec<T> {
    result.unwrap_or_else(|e| {
        warn!("failed to list {}: {}", what, e);
        Vec::new()
    })
}
