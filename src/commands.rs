//! Mutating user commands. Each one updates the remote and/or the store and
//! then invalidates the affected part of the tree.

use std::sync::Arc;

use tracing::info;

use crate::error::{Result, SyncError};
use crate::model::{ContentNode, EntityNode, Gist, GroupKind, NodeKey};
use crate::remote::RemoteService;
use crate::store::{MemoryStorage, SortDirection, SortType, StorageBackend, StorageKey, Store};
use crate::sync::{RefreshCompletion, TreeSynchronizer};

pub struct Commands<R: RemoteService, B: StorageBackend = MemoryStorage> {
    sync: Arc<TreeSynchronizer<R, B>>,
}

impl<R: RemoteService, B: StorageBackend> Commands<R, B> {
    pub fn new(sync: Arc<TreeSynchronizer<R, B>>) -> Self {
        Self { sync }
    }

    pub fn synchronizer(&self) -> &Arc<TreeSynchronizer<R, B>> {
        &self.sync
    }

    fn store(&self) -> &Store<B> {
        self.sync.store()
    }

    fn remote(&self) -> &R {
        self.sync.remote()
    }

    fn refresh_group(&self, group: GroupKind) -> RefreshCompletion {
        self.sync.refresh_key(Some(NodeKey::Group(group)), false)
    }

    /// Drop a cached gist if it was listed under `group`.
    fn evict(&self, id: &str, group: GroupKind) {
        if self.store().get(id).is_some_and(|e| e.group == group) {
            self.store().remove(id);
        }
    }

    // ── Followed users ──────────────────────────────────────────────────────

    pub fn follow_user(&self, login: &str) -> Result<RefreshCompletion> {
        let login = login.trim();
        if login.is_empty() {
            return Err(SyncError::configuration("cannot follow an empty login"));
        }
        info!("following {}", login);
        self.store().add_to_global_storage(StorageKey::FollowedUsers, login)?;
        Ok(self.refresh_group(GroupKind::FollowedUsers))
    }

    pub fn unfollow_user(&self, login: &str) -> Result<RefreshCompletion> {
        info!("unfollowing {}", login);
        self.store()
            .remove_from_global_storage(StorageKey::FollowedUsers, login)?;
        let followed: Vec<String> = self
            .store()
            .entities()
            .into_iter()
            .filter(|e| e.group == GroupKind::FollowedUsers && e.gist.owner_login() == Some(login))
            .map(|e| e.gist.id)
            .collect();
        for id in followed {
            self.store().remove(&id);
        }
        Ok(self.refresh_group(GroupKind::FollowedUsers))
    }

    // ── Opened gists ────────────────────────────────────────────────────────

    /// Pin a gist (usually someone else's) under "Opened Gists".
    pub fn open_gist(&self, id: &str) -> Result<RefreshCompletion> {
        let id = id.trim();
        if id.is_empty() {
            return Err(SyncError::configuration("cannot open an empty gist id"));
        }
        info!("opening gist {}", id);
        self.store().add_to_global_storage(StorageKey::OpenedGists, id)?;
        Ok(self.refresh_group(GroupKind::OpenedGists))
    }

    pub fn close_gist(&self, id: &str) -> Result<RefreshCompletion> {
        info!("closing gist {}", id);
        self.store()
            .remove_from_global_storage(StorageKey::OpenedGists, id)?;
        self.evict(id, GroupKind::OpenedGists);
        Ok(self.refresh_group(GroupKind::OpenedGists))
    }

    // ── Stars, forks, deletion ──────────────────────────────────────────────

    pub async fn star(&self, id: &str) -> Result<RefreshCompletion> {
        info!("starring gist {}", id);
        self.remote().star(id).await?;
        Ok(self.refresh_group(GroupKind::Starred))
    }

    pub async fn unstar(&self, id: &str) -> Result<RefreshCompletion> {
        info!("unstarring gist {}", id);
        self.remote().unstar(id).await?;
        self.evict(id, GroupKind::Starred);
        Ok(self.refresh_group(GroupKind::Starred))
    }

    /// Fork into the authenticated account; the fork is cached as owned.
    pub async fn fork(&self, id: &str) -> Result<(EntityNode, RefreshCompletion)> {
        info!("forking gist {}", id);
        let gist = self.remote().fork(id).await?;
        let entity = EntityNode {
            gist,
            group: GroupKind::MyGists,
        };
        self.store().upsert([entity.clone()]);
        Ok((entity, self.refresh_group(GroupKind::MyGists)))
    }

    pub async fn delete_gist(&self, id: &str) -> Result<RefreshCompletion> {
        info!("deleting gist {}", id);
        self.remote().delete_gist(id).await?;
        self.store().remove(id);
        self.store()
            .remove_from_global_storage(StorageKey::OpenedGists, id)?;
        self.refresh_group(GroupKind::OpenedGists);
        Ok(self.refresh_group(GroupKind::MyGists))
    }

    // ── Files ───────────────────────────────────────────────────────────────

    fn writable<'a>(&self, node: &'a ContentNode) -> Result<&'a ContentNode> {
        if node.read_only {
            return Err(SyncError::configuration(format!(
                "{} is read-only",
                node.address()
            )));
        }
        Ok(node)
    }

    /// Whether the authenticated account owns `gist`. Ownership, not the
    /// group a gist was last listed under, decides whether it can be written.
    async fn owns(&self, gist: &Gist) -> Result<bool> {
        let user = self.remote().authenticated_user().await?;
        Ok(gist.owner_login() == Some(user.login.as_str()))
    }

    /// Re-cache a gist returned by a write. Writes only succeed on owned
    /// gists, so one without a writable classification lands in My Gists.
    fn recache(&self, gist: Gist) -> RefreshCompletion {
        let group = self
            .store()
            .get(&gist.id)
            .map(|e| e.group)
            .filter(|g| g.is_writable())
            .unwrap_or(GroupKind::MyGists);
        let key = match group {
            GroupKind::Notepad => NodeKey::Notepad(gist.id.clone()),
            _ => NodeKey::Gist(gist.id.clone()),
        };
        self.store().upsert([EntityNode { gist, group }]);
        self.sync.refresh_key(Some(key), false)
    }

    pub async fn create_file(
        &self,
        gist_id: &str,
        path: &str,
        content: &str,
    ) -> Result<RefreshCompletion> {
        if let Some(cached) = self.store().get(gist_id) {
            if cached.read_only() && !self.owns(&cached.gist).await? {
                return Err(SyncError::configuration(format!("gist {} is read-only", gist_id)));
            }
        }
        info!("creating {} in gist {}", path, gist_id);
        let gist = self
            .remote()
            .create_or_update(gist_id, path, content, None)
            .await?;
        Ok(self.recache(gist))
    }

    /// Overwrite a file using the version token of the node it came from.
    pub async fn write_file(&self, node: &ContentNode, content: &str) -> Result<RefreshCompletion> {
        let node = self.writable(node)?;
        info!("writing {}", node.address());
        let gist = self
            .remote()
            .create_or_update(&node.gist_id, &node.path, content, node.sha.as_deref())
            .await?;
        Ok(self.recache(gist))
    }

    pub async fn delete_file(&self, node: &ContentNode) -> Result<RefreshCompletion> {
        let node = self.writable(node)?;
        let sha = node.sha.as_deref().ok_or_else(|| {
            SyncError::configuration(format!("{} has no version token", node.address()))
        })?;
        info!("deleting {}", node.address());
        let gist = self
            .remote()
            .delete_file(&node.gist_id, &node.path, sha)
            .await?;
        Ok(self.recache(gist))
    }

    // ── Sorting and reset ───────────────────────────────────────────────────

    /// Persist a new order and re-render without fetching.
    pub fn sort(&self, sort_type: SortType, direction: SortDirection) -> Result<RefreshCompletion> {
        info!("sorting gists by {} ({})", sort_type, direction);
        self.store().sort_gists(sort_type, direction, None)?;
        Ok(self.sync.refresh(None, true))
    }

    pub fn toggle_sort_direction(&self) -> Result<RefreshCompletion> {
        let (sort_type, direction) = self.store().sort_order()?;
        self.sort(sort_type, direction.toggle())
    }

    /// Cycle to the next sort mode.
    pub fn cycle_sort(&self) -> Result<RefreshCompletion> {
        let (sort_type, direction) = self.store().sort_order()?;
        self.sort(sort_type.next(), direction)
    }

    /// Forget every persisted setting and redraw the whole tree.
    pub fn reset(&self) -> Result<RefreshCompletion> {
        self.store().purge_global_storage()?;
        Ok(self.sync.refresh(None, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GistFile, NodeKind, TreeNode};
    use crate::remote::MemoryRemote;
    use crate::sync::{TreeChange, TreeOptions};

    fn setup() -> (Arc<MemoryRemote>, Commands<MemoryRemote>) {
        let remote = Arc::new(MemoryRemote::new("me"));
        let mut mine = Gist::new("g1", "Mine", "me");
        mine.files = vec![GistFile::new("a.txt", "file").with_sha("s1")];
        remote.insert(mine);
        remote.insert(Gist::new("o1", "Theirs", "octocat"));
        let sync = TreeSynchronizer::new(
            remote.clone(),
            Arc::new(Store::in_memory()),
            TreeOptions::default(),
        );
        (remote, Commands::new(Arc::new(sync)))
    }

    async fn children(commands: &Commands<MemoryRemote>, node: &TreeNode) -> Vec<TreeNode> {
        commands
            .synchronizer()
            .get_children(Some(node))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn follow_then_unfollow() {
        let (_remote, commands) = setup();
        let mut rx = commands.synchronizer().subscribe();
        commands.follow_user("octocat").unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            TreeChange {
                scope: Some(NodeKey::Group(GroupKind::FollowedUsers)),
                is_sort_change: false,
            }
        );

        let user = TreeNode::user("octocat", None, None);
        children(&commands, &user).await;
        assert!(commands.synchronizer().store().get("o1").is_some());

        commands.unfollow_user("octocat").unwrap();
        assert!(commands.synchronizer().store().get("o1").is_none());
        let users = children(&commands, &TreeNode::group(GroupKind::FollowedUsers, None)).await;
        assert!(users.is_empty());
    }

    #[test]
    fn follow_rejects_blank_login() {
        let (_remote, commands) = setup();
        assert!(matches!(
            commands.follow_user("  "),
            Err(SyncError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn open_and_close_gist() {
        let (_remote, commands) = setup();
        commands.open_gist("o1").unwrap();
        let opened = children(&commands, &TreeNode::group(GroupKind::OpenedGists, None)).await;
        assert_eq!(opened.len(), 1);
        assert!(opened[0].as_entity().unwrap().read_only());

        commands.close_gist("o1").unwrap();
        assert!(commands.synchronizer().store().get("o1").is_none());
        let opened = children(&commands, &TreeNode::group(GroupKind::OpenedGists, None)).await;
        assert!(opened.is_empty());
    }

    #[tokio::test]
    async fn unstar_evicts_cached_starred_gist() {
        let (_remote, commands) = setup();
        commands.star("o1").await.unwrap();
        let starred = children(&commands, &TreeNode::group(GroupKind::Starred, None)).await;
        assert_eq!(starred.len(), 1);

        commands.unstar("o1").await.unwrap();
        assert!(commands.synchronizer().store().get("o1").is_none());
        let starred = children(&commands, &TreeNode::group(GroupKind::Starred, None)).await;
        assert!(starred.is_empty());
    }

    #[tokio::test]
    async fn star_unknown_gist_propagates_transport_error() {
        let (_remote, commands) = setup();
        let err = commands.star("missing").await.unwrap_err();
        assert!(matches!(err, SyncError::Transport { status: 404, .. }));
    }

    #[tokio::test]
    async fn fork_is_cached_as_owned() {
        let (_remote, commands) = setup();
        let (fork, _done) = commands.fork("o1").await.unwrap();
        assert!(!fork.read_only());
        let cached = commands.synchronizer().store().get(fork.id()).unwrap();
        assert_eq!(cached.group, GroupKind::MyGists);
    }

    #[tokio::test]
    async fn delete_gist_clears_cache_and_pin() {
        let (_remote, commands) = setup();
        children(&commands, &TreeNode::group(GroupKind::MyGists, None)).await;
        commands.open_gist("g1").unwrap();
        commands.delete_gist("g1").await.unwrap();
        let store = commands.synchronizer().store();
        assert!(store.get("g1").is_none());
        assert!(store
            .read_from_global_storage(StorageKey::OpenedGists)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn delete_gist_refreshes_opened_group() {
        let (_remote, commands) = setup();
        commands.open_gist("g1").unwrap();
        let mut rx = commands.synchronizer().subscribe();
        commands.delete_gist("g1").await.unwrap();
        let scopes = vec![rx.recv().await.unwrap().scope, rx.recv().await.unwrap().scope];
        assert!(scopes.contains(&Some(NodeKey::Group(GroupKind::OpenedGists))));
        assert!(scopes.contains(&Some(NodeKey::Group(GroupKind::MyGists))));
        let opened = children(&commands, &TreeNode::group(GroupKind::OpenedGists, None)).await;
        assert!(opened.is_empty());
    }

    #[tokio::test]
    async fn starred_listing_keeps_owned_gist_writable() {
        let (_remote, commands) = setup();
        commands.star("g1").await.unwrap();
        let mine = children(&commands, &TreeNode::group(GroupKind::MyGists, None)).await;
        let files = children(&commands, &mine[0]).await;
        assert!(!files[0].as_content().unwrap().read_only);

        let starred = children(&commands, &TreeNode::group(GroupKind::Starred, None)).await;
        assert_eq!(starred.len(), 1);
        assert!(starred[0].as_entity().unwrap().read_only());

        let parent = commands.synchronizer().get_parent(&files[0]).unwrap();
        assert!(!parent.as_entity().unwrap().read_only());
        commands.create_file("g1", "b.txt", "more").await.unwrap();
    }

    #[tokio::test]
    async fn owned_gist_seen_only_as_starred_accepts_writes() {
        let (remote, commands) = setup();
        commands.star("g1").await.unwrap();
        commands.star("o1").await.unwrap();
        children(&commands, &TreeNode::group(GroupKind::Starred, None)).await;
        let store = commands.synchronizer().store();
        assert!(store.get("g1").unwrap().read_only());

        commands.create_file("g1", "b.txt", "more").await.unwrap();
        assert_eq!(remote.content("g1", "b.txt").as_deref(), Some("more"));
        assert_eq!(store.get("g1").unwrap().group, GroupKind::MyGists);

        assert!(matches!(
            commands.create_file("o1", "b.txt", "nope").await,
            Err(SyncError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn write_uses_fresh_version_token() {
        let (remote, commands) = setup();
        let mine = children(&commands, &TreeNode::group(GroupKind::MyGists, None)).await;
        let files = children(&commands, &mine[0]).await;
        let file = files[0].as_content().unwrap().clone();

        commands.write_file(&file, "v2").await.unwrap();
        assert_eq!(remote.content("g1", "a.txt").as_deref(), Some("v2"));

        // The old node's token is stale now.
        let err = commands.write_file(&file, "v3").await.unwrap_err();
        assert!(matches!(err, SyncError::Transport { status: 409, .. }));

        let files = children(&commands, &mine[0]).await;
        let fresh = files[0].as_content().unwrap();
        commands.delete_file(fresh).await.unwrap();
        assert!(children(&commands, &mine[0]).await.is_empty());
    }

    #[tokio::test]
    async fn read_only_files_are_refused() {
        let (_remote, commands) = setup();
        let node = TreeNode::content("o1", &GistFile::new("x.txt", "file").with_sha("s"), true);
        let content = node.as_content().unwrap();
        assert!(matches!(
            commands.write_file(content, "nope").await,
            Err(SyncError::Configuration(_))
        ));
        assert!(matches!(
            commands.delete_file(content).await,
            Err(SyncError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn create_file_on_notepad_refreshes_notepad() {
        let (_remote, commands) = setup();
        let notepad = children(&commands, &TreeNode::group(GroupKind::Notepad, None)).await;
        let id = match &notepad[0].kind {
            NodeKind::Notepad(e) => e.id().to_string(),
            other => panic!("unexpected node {:?}", other),
        };
        let mut rx = commands.synchronizer().subscribe();
        commands.create_file(&id, "todo.md", "- [ ] ship").await.unwrap();
        let change = rx.recv().await.unwrap();
        assert_eq!(change.scope, Some(NodeKey::Notepad(id.clone())));
        let files = children(&commands, &notepad[0]).await;
        assert_eq!(files.len(), 2);
    }

    #[tokio::test]
    async fn sort_is_local_and_flagged() {
        let (remote, commands) = setup();
        let mut rx = commands.synchronizer().subscribe();
        let calls = remote.call_count();
        commands.sort(SortType::UpdateTime, SortDirection::Descending).unwrap();
        assert_eq!(remote.call_count(), calls);
        let change = rx.recv().await.unwrap();
        assert_eq!(change.scope, None);
        assert!(change.is_sort_change);

        commands.toggle_sort_direction().unwrap();
        commands.cycle_sort().unwrap();
        assert_eq!(
            commands.synchronizer().store().sort_order().unwrap(),
            (SortType::Name, SortDirection::Ascending)
        );
    }

    #[tokio::test]
    async fn reset_forgets_settings() {
        let (_remote, commands) = setup();
        commands.follow_user("octocat").unwrap();
        commands.reset().unwrap();
        assert!(commands
            .synchronizer()
            .store()
            .read_from_global_storage(StorageKey::FollowedUsers)
            .unwrap()
            .is_empty());
    }
}
