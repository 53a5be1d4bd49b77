//! The remote content service the synchronizer pulls from.

pub mod memory;

use std::future::Future;

use crate::error::TransportError;
use crate::model::{Gist, RemoteUser};

pub use memory::{MemoryRemote, RemoteSnapshot};

/// Result type for remote calls.
pub type RemoteResult<T> = std::result::Result<T, TransportError>;

/// Fetch, create, update and delete gists on the remote side.
///
/// Every call either yields its payload or fails with a `TransportError`
/// carrying the status code and message reported by the service.
pub trait RemoteService: Send + Sync {
    /// The account the session is authenticated as.
    fn authenticated_user(&self) -> impl Future<Output = RemoteResult<RemoteUser>> + Send;

    /// Gists owned by the authenticated user, or the ones it starred.
    fn list_owned(&self, starred: bool) -> impl Future<Output = RemoteResult<Vec<Gist>>> + Send;

    /// A single gist including its file listing.
    fn get_by_id(&self, id: &str) -> impl Future<Output = RemoteResult<Gist>> + Send;

    /// Gists owned by another user.
    fn list_for_user(&self, login: &str) -> impl Future<Output = RemoteResult<Vec<Gist>>> + Send;

    /// Fetch the reserved notepad gist by name, creating it on first use.
    fn notepad(&self, name: &str) -> impl Future<Output = RemoteResult<Gist>> + Send;

    /// Write a file. `sha` must be the file's current version token when it
    /// already exists.
    fn create_or_update(
        &self,
        id: &str,
        path: &str,
        content: &str,
        sha: Option<&str>,
    ) -> impl Future<Output = RemoteResult<Gist>> + Send;

    /// Remove one file, guarded by its version token.
    fn delete_file(
        &self,
        id: &str,
        path: &str,
        sha: &str,
    ) -> impl Future<Output = RemoteResult<Gist>> + Send;

    /// Remove a whole gist.
    fn delete_gist(&self, id: &str) -> impl Future<Output = RemoteResult<()>> + Send;

    fn star(&self, id: &str) -> impl Future<Output = RemoteResult<()>> + Send;

    fn unstar(&self, id: &str) -> impl Future<Output = RemoteResult<()>> + Send;

    /// Fork a gist into the authenticated account.
    fn fork(&self, id: &str) -> impl Future<Output = RemoteResult<Gist>> + Send;
}
