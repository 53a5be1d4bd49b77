use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{RemoteResult, RemoteService};
use crate::error::{Result, TransportError};
use crate::model::{Gist, GistFile, Owner, RemoteUser};

/// Serialized remote state, used for fixtures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    pub user: RemoteUser,
    #[serde(default)]
    pub gists: Vec<Gist>,
    /// Ids starred by `user`, in starring order.
    #[serde(default)]
    pub starred: Vec<String>,
}

#[derive(Debug)]
struct State {
    user: RemoteUser,
    gists: Vec<Gist>,
    starred: Vec<String>,
    contents: HashMap<(String, String), String>,
    next_id: u64,
}

/// An in-memory remote service, used by tests and by the demo binary.
pub struct MemoryRemote {
    state: Mutex<State>,
    /// Gist ids or user logins whose calls fail with a 500.
    failing: Mutex<HashSet<String>>,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl MemoryRemote {
    pub fn new(user: &str) -> Self {
        Self::from_snapshot(RemoteSnapshot {
            user: RemoteUser {
                login: user.to_string(),
                avatar_url: None,
            },
            gists: Vec::new(),
            starred: Vec::new(),
        })
    }

    pub fn from_snapshot(snapshot: RemoteSnapshot) -> Self {
        Self {
            state: Mutex::new(State {
                user: snapshot.user,
                gists: snapshot.gists,
                starred: snapshot.starred,
                contents: HashMap::new(),
                next_id: 1,
            }),
            failing: Mutex::new(HashSet::new()),
            latency: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Load a JSON snapshot from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let snapshot: RemoteSnapshot = serde_json::from_str(&text)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Delay every call, so overlapping requests can be observed.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, gist: Gist) {
        let mut state = self.state.lock().unwrap();
        state.gists.retain(|g| g.id != gist.id);
        state.gists.push(gist);
    }

    pub fn insert_starred(&self, gist: Gist) {
        let id = gist.id.clone();
        self.insert(gist);
        let mut state = self.state.lock().unwrap();
        if !state.starred.contains(&id) {
            state.starred.push(id);
        }
    }

    /// Make calls touching `key` (a gist id or a login) fail.
    pub fn fail_on(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    pub fn heal(&self, key: &str) {
        self.failing.lock().unwrap().remove(key);
    }

    /// Number of remote calls served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn content(&self, id: &str, path: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .contents
            .get(&(id.to_string(), path.to_string()))
            .cloned()
    }

    async fn enter(&self, key: Option<&str>) -> RemoteResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(key) = key {
            if self.failing.lock().unwrap().contains(key) {
                return Err(TransportError::new(500, format!("injected failure for {}", key)));
            }
        }
        Ok(())
    }
}

impl State {
    fn find(&self, id: &str) -> RemoteResult<&Gist> {
        self.gists
            .iter()
            .find(|g| g.id == id)
            .ok_or_else(|| TransportError::not_found(format!("gist {}", id)))
    }

    fn find_owned_mut(&mut self, id: &str) -> RemoteResult<&mut Gist> {
        let login = self.user.login.clone();
        let gist = self
            .gists
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| TransportError::not_found(format!("gist {}", id)))?;
        if gist.owner_login() != Some(login.as_str()) {
            return Err(TransportError::new(403, format!("gist {} is not owned by {}", id, login)));
        }
        Ok(gist)
    }

    fn owner(&self) -> Owner {
        Owner {
            login: self.user.login.clone(),
            avatar_url: self.user.avatar_url.clone(),
        }
    }

    fn mint_id(&mut self, prefix: &str) -> String {
        let id = format!("{}{}", prefix, self.next_id);
        self.next_id += 1;
        id
    }
}

impl RemoteService for MemoryRemote {
    async fn authenticated_user(&self) -> RemoteResult<RemoteUser> {
        self.enter(None).await?;
        Ok(self.state.lock().unwrap().user.clone())
    }

    async fn list_owned(&self, starred: bool) -> RemoteResult<Vec<Gist>> {
        self.enter(None).await?;
        let state = self.state.lock().unwrap();
        if starred {
            Ok(state
                .starred
                .iter()
                .filter_map(|id| state.find(id).ok().cloned())
                .collect())
        } else {
            let login = state.user.login.as_str();
            Ok(state
                .gists
                .iter()
                .filter(|g| g.owner_login() == Some(login))
                .cloned()
                .collect())
        }
    }

    async fn get_by_id(&self, id: &str) -> RemoteResult<Gist> {
        self.enter(Some(id)).await?;
        let state = self.state.lock().unwrap();
        state.find(id).cloned()
    }

    async fn list_for_user(&self, login: &str) -> RemoteResult<Vec<Gist>> {
        self.enter(Some(login)).await?;
        let state = self.state.lock().unwrap();
        Ok(state
            .gists
            .iter()
            .filter(|g| g.owner_login() == Some(login) && g.public)
            .cloned()
            .collect())
    }

    async fn notepad(&self, name: &str) -> RemoteResult<Gist> {
        self.enter(None).await?;
        let mut state = self.state.lock().unwrap();
        let login = state.user.login.clone();
        if let Some(existing) = state
            .gists
            .iter()
            .find(|g| g.owner_login() == Some(login.as_str()) && g.is_named(name))
        {
            return Ok(existing.clone());
        }
        let id = state.mint_id("notepad-");
        let sha = state.mint_id("sha-");
        let mut gist = Gist::new(id.clone(), name, &login);
        gist.owner = Some(state.owner());
        gist.public = false;
        gist.files = vec![GistFile::new("notes.md", "text/markdown").with_sha(sha)];
        state
            .contents
            .insert((id, "notes.md".to_string()), String::new());
        state.gists.push(gist.clone());
        Ok(gist)
    }

    async fn create_or_update(
        &self,
        id: &str,
        path: &str,
        content: &str,
        sha: Option<&str>,
    ) -> RemoteResult<Gist> {
        self.enter(Some(id)).await?;
        let mut state = self.state.lock().unwrap();
        let new_sha = state.mint_id("sha-");
        let gist = state.find_owned_mut(id)?;
        match gist.files.iter_mut().find(|f| f.path() == path) {
            Some(file) => {
                if file.sha.as_deref() != sha {
                    return Err(TransportError::new(409, format!("{} does not match {:?}", path, sha)));
                }
                file.sha = Some(new_sha);
                file.size = content.len() as u64;
            }
            None => {
                let mut file = GistFile::new(path.rsplit('/').next().unwrap_or(path), "file")
                    .with_sha(new_sha);
                file.path = Some(path.to_string());
                file.size = content.len() as u64;
                gist.files.push(file);
            }
        }
        gist.updated_at = Utc::now();
        let updated = gist.clone();
        state
            .contents
            .insert((id.to_string(), path.to_string()), content.to_string());
        Ok(updated)
    }

    async fn delete_file(&self, id: &str, path: &str, sha: &str) -> RemoteResult<Gist> {
        self.enter(Some(id)).await?;
        let mut state = self.state.lock().unwrap();
        let gist = state.find_owned_mut(id)?;
        let pos = gist
            .files
            .iter()
            .position(|f| f.path() == path)
            .ok_or_else(|| TransportError::not_found(format!("file {}", path)))?;
        if gist.files[pos].sha.as_deref() != Some(sha) {
            return Err(TransportError::new(409, format!("{} does not match {}", path, sha)));
        }
        gist.files.remove(pos);
        gist.updated_at = Utc::now();
        let updated = gist.clone();
        state.contents.remove(&(id.to_string(), path.to_string()));
        Ok(updated)
    }

    async fn delete_gist(&self, id: &str) -> RemoteResult<()> {
        self.enter(Some(id)).await?;
        let mut state = self.state.lock().unwrap();
        state.find_owned_mut(id)?;
        state.gists.retain(|g| g.id != id);
        state.starred.retain(|s| s != id);
        state.contents.retain(|(gist_id, _), _| gist_id != id);
        Ok(())
    }

    async fn star(&self, id: &str) -> RemoteResult<()> {
        self.enter(Some(id)).await?;
        let mut state = self.state.lock().unwrap();
        state.find(id)?;
        if !state.starred.iter().any(|s| s == id) {
            state.starred.push(id.to_string());
        }
        Ok(())
    }

    async fn unstar(&self, id: &str) -> RemoteResult<()> {
        self.enter(Some(id)).await?;
        let mut state = self.state.lock().unwrap();
        state.starred.retain(|s| s != id);
        Ok(())
    }

    async fn fork(&self, id: &str) -> RemoteResult<Gist> {
        self.enter(Some(id)).await?;
        let mut state = self.state.lock().unwrap();
        let source = state.find(id)?.clone();
        let fork_id = state.mint_id("fork-");
        let now = Utc::now();
        let fork = Gist {
            id: fork_id,
            owner: Some(state.owner()),
            created_at: now,
            updated_at: now,
            git_pull_url: None,
            ..source
        };
        state.gists.push(fork.clone());
        Ok(fork)
    }
}
