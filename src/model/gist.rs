//! Payload types returned by the remote content service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The account that owns a gist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub login: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// A remote user, as returned for the authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    pub login: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

fn default_content_type() -> String {
    "file".to_string()
}

/// One file inside a gist (or one entry of a repository listing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GistFile {
    pub filename: String,
    /// Path within the gist; defaults to the filename for flat gists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(rename = "type", default = "default_content_type")]
    pub content_type: String,
    /// Version token required to overwrite or delete this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(default)]
    pub size: u64,
}

impl GistFile {
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            path: None,
            content_type: content_type.into(),
            sha: None,
            size: 0,
        }
    }

    pub fn with_sha(mut self, sha: impl Into<String>) -> Self {
        self.sha = Some(sha.into());
        self
    }

    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.filename)
    }
}

/// A gist (or repository) as known to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gist {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub owner: Option<Owner>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_pull_url: Option<String>,
    #[serde(default)]
    pub files: Vec<GistFile>,
}

impl Gist {
    pub fn new(id: impl Into<String>, description: impl Into<String>, owner: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            description: Some(description.into()),
            public: true,
            owner: Some(Owner {
                login: owner.to_string(),
                avatar_url: None,
            }),
            created_at: now,
            updated_at: now,
            git_pull_url: None,
            files: Vec::new(),
        }
    }

    /// Description when present and non-empty, otherwise the id.
    pub fn display_name(&self) -> &str {
        match self.description.as_deref() {
            Some(d) if !d.trim().is_empty() => d,
            _ => &self.id,
        }
    }

    pub fn owner_login(&self) -> Option<&str> {
        self.owner.as_ref().map(|o| o.login.as_str())
    }

    pub fn owner_avatar(&self) -> Option<&str> {
        self.owner.as_ref().and_then(|o| o.avatar_url.as_deref())
    }

    /// Whether this gist carries the reserved notepad name.
    pub fn is_named(&self, name: &str) -> bool {
        self.description.as_deref() == Some(name)
    }
}
