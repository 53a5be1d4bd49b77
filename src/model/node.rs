use chrono::{DateTime, Utc};

use crate::error::{Result, SyncError};
use crate::model::address::ContentAddress;
use crate::model::gist::{Gist, GistFile};

/// The five fixed top-level categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    Notepad,
    MyGists,
    Starred,
    FollowedUsers,
    OpenedGists,
}

impl GroupKind {
    /// Root order shown by the tree.
    pub const ALL: [GroupKind; 5] = [
        GroupKind::Notepad,
        GroupKind::MyGists,
        GroupKind::Starred,
        GroupKind::FollowedUsers,
        GroupKind::OpenedGists,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            GroupKind::Notepad => "Notepad",
            GroupKind::MyGists => "My Gists",
            GroupKind::Starred => "Starred Gists",
            GroupKind::FollowedUsers => "Followed Users",
            GroupKind::OpenedGists => "Opened Gists",
        }
    }

    /// Parse a group label; anything unrecognized is a configuration defect.
    pub fn from_label(label: &str) -> Result<Self> {
        GroupKind::ALL
            .into_iter()
            .find(|k| k.label() == label)
            .ok_or_else(|| SyncError::configuration(format!("invalid group: {}", label)))
    }

    /// Only owned gists (and the notepad) are writable.
    pub fn is_writable(&self) -> bool {
        matches!(self, GroupKind::MyGists | GroupKind::Notepad)
    }

    fn icon(&self) -> &'static str {
        match self {
            GroupKind::Notepad => "notebook",
            GroupKind::MyGists => "gist",
            GroupKind::Starred => "star",
            GroupKind::FollowedUsers => "organization",
            GroupKind::OpenedGists => "folder-opened",
        }
    }

    fn context_value(&self) -> &'static str {
        match self {
            GroupKind::Notepad => "group.notepad",
            GroupKind::MyGists => "group.mine",
            GroupKind::Starred => "group.starred",
            GroupKind::FollowedUsers => "group.followed",
            GroupKind::OpenedGists => "group.opened",
        }
    }
}

/// Icon reference understood by the host view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Icon {
    /// Named theme icon.
    Named(&'static str),
    /// Remote image, e.g. an owner's avatar.
    Avatar(String),
}

/// Expansion state offered to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collapsible {
    None,
    Collapsed,
}

/// Command the host runs when a node is activated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCommand {
    OpenFile(ContentAddress),
}

/// Display metadata shared by every node kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMeta {
    pub label: String,
    pub description: Option<String>,
    pub tooltip: String,
    pub icon: Icon,
    pub collapsible: Collapsible,
    /// Classification tag used by the command layer (e.g. `gist.readonly`).
    pub context_value: &'static str,
    pub command: Option<NodeCommand>,
}

/// Stable identity of a node, used to scope change notifications.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKey {
    Group(GroupKind),
    /// A group whose label did not parse; kept so it can still be addressed.
    UnknownGroup(String),
    Gist(String),
    Notepad(String),
    User(String),
    Content { gist_id: String, path: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupNode {
    pub label: String,
    /// Cached child count, only filled when decoration counts are enabled.
    pub count: Option<usize>,
}

impl GroupNode {
    pub fn kind(&self) -> Result<GroupKind> {
        GroupKind::from_label(&self.label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityNode {
    pub gist: Gist,
    /// Group this entity was classified under; drives `read_only`.
    pub group: GroupKind,
}

impl EntityNode {
    pub fn id(&self) -> &str {
        &self.gist.id
    }

    pub fn read_only(&self) -> bool {
        !self.group.is_writable()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserNode {
    pub login: String,
    pub avatar_url: Option<String>,
    /// Lazily fetched number of gists owned by this user.
    pub gist_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentNode {
    pub gist_id: String,
    pub filename: String,
    pub path: String,
    pub content_type: String,
    pub sha: Option<String>,
    pub read_only: bool,
}

impl ContentNode {
    pub fn address(&self) -> ContentAddress {
        ContentAddress::new(&self.gist_id, &self.path)
    }
}

/// Variant payload of a tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Group(GroupNode),
    Gist(EntityNode),
    User(UserNode),
    Content(ContentNode),
    /// The reserved singleton notepad gist.
    Notepad(EntityNode),
}

/// A node in the gist tree: common display metadata plus a variant payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub display: DisplayMeta,
    pub kind: NodeKind,
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("1 {}", word)
    } else {
        format!("{} {}s", n, word)
    }
}

impl TreeNode {
    pub fn group(kind: GroupKind, count: Option<usize>) -> Self {
        Self::group_with_label(kind.label(), count)
    }

    /// Build a group from a raw label. The label is validated on dispatch,
    /// not here.
    pub fn group_with_label(label: impl Into<String>, count: Option<usize>) -> Self {
        let label = label.into();
        let kind = GroupKind::from_label(&label).ok();
        let display = DisplayMeta {
            label: label.clone(),
            description: count.map(|c| c.to_string()),
            tooltip: label.clone(),
            icon: Icon::Named(kind.map(|k| k.icon()).unwrap_or("question")),
            collapsible: Collapsible::Collapsed,
            context_value: kind.map(|k| k.context_value()).unwrap_or("group"),
            command: None,
        };
        Self {
            display,
            kind: NodeKind::Group(GroupNode { label, count }),
        }
    }

    /// Wrap a gist classified under `group`. With `use_avatar` the owner's
    /// avatar replaces the theme icon when one is known.
    pub fn gist(gist: Gist, group: GroupKind, use_avatar: bool) -> Self {
        let entity = EntityNode { gist, group };
        let display = Self::entity_display(&entity, use_avatar);
        Self {
            display,
            kind: NodeKind::Gist(entity),
        }
    }

    pub fn notepad(gist: Gist) -> Self {
        let entity = EntityNode {
            gist,
            group: GroupKind::Notepad,
        };
        let mut display = Self::entity_display(&entity, false);
        display.icon = Icon::Named("notebook");
        display.context_value = "notepad";
        Self {
            display,
            kind: NodeKind::Notepad(entity),
        }
    }

    pub fn user(login: impl Into<String>, avatar_url: Option<String>, gist_count: Option<usize>) -> Self {
        let login = login.into();
        let icon = match &avatar_url {
            Some(url) => Icon::Avatar(url.clone()),
            None => Icon::Named("person"),
        };
        let display = DisplayMeta {
            label: login.clone(),
            description: gist_count.map(|c| plural(c, "gist")),
            tooltip: login.clone(),
            icon,
            collapsible: Collapsible::Collapsed,
            context_value: "user",
            command: None,
        };
        Self {
            display,
            kind: NodeKind::User(UserNode {
                login,
                avatar_url,
                gist_count,
            }),
        }
    }

    pub fn content(gist_id: impl Into<String>, file: &GistFile, read_only: bool) -> Self {
        let node = ContentNode {
            gist_id: gist_id.into(),
            filename: file.filename.clone(),
            path: file.path().to_string(),
            content_type: file.content_type.clone(),
            sha: file.sha.clone(),
            read_only,
        };
        let display = DisplayMeta {
            label: node.filename.clone(),
            description: None,
            tooltip: format!("{} ({})", node.path, node.content_type),
            icon: Icon::Named(if node.content_type == "dir" {
                "file-directory"
            } else {
                "file"
            }),
            collapsible: Collapsible::None,
            context_value: if read_only {
                "file.readonly"
            } else {
                "file.writable"
            },
            command: Some(NodeCommand::OpenFile(node.address())),
        };
        Self {
            display,
            kind: NodeKind::Content(node),
        }
    }

    fn entity_display(entity: &EntityNode, use_avatar: bool) -> DisplayMeta {
        let gist = &entity.gist;
        let description = plural(gist.files.len(), "file");
        let icon = match gist.owner_avatar() {
            Some(url) if use_avatar => Icon::Avatar(url.to_string()),
            _ if !gist.public => Icon::Named("lock"),
            _ => Icon::Named("gist"),
        };
        let tooltip = format!(
            "{}\nCreated: {}\nUpdated: {}",
            description,
            format_timestamp(&gist.created_at),
            format_timestamp(&gist.updated_at)
        );
        DisplayMeta {
            label: gist.display_name().to_string(),
            description: Some(description),
            tooltip,
            icon,
            collapsible: Collapsible::Collapsed,
            context_value: if entity.read_only() {
                "gist.readonly"
            } else {
                "gist.writable"
            },
            command: None,
        }
    }

    /// Current display state for the host view.
    pub fn display_state(&self) -> DisplayMeta {
        self.display.clone()
    }

    pub fn label(&self) -> &str {
        &self.display.label
    }

    pub fn key(&self) -> NodeKey {
        match &self.kind {
            NodeKind::Group(g) => match g.kind() {
                Ok(kind) => NodeKey::Group(kind),
                Err(_) => NodeKey::UnknownGroup(g.label.clone()),
            },
            NodeKind::Gist(e) => NodeKey::Gist(e.gist.id.clone()),
            NodeKind::Notepad(e) => NodeKey::Notepad(e.gist.id.clone()),
            NodeKind::User(u) => NodeKey::User(u.login.clone()),
            NodeKind::Content(c) => NodeKey::Content {
                gist_id: c.gist_id.clone(),
                path: c.path.clone(),
            },
        }
    }

    /// Entity payload for gist and notepad nodes.
    pub fn as_entity(&self) -> Option<&EntityNode> {
        match &self.kind {
            NodeKind::Gist(e) | NodeKind::Notepad(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_content(&self) -> Option<&ContentNode> {
        match &self.kind {
            NodeKind::Content(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_expandable(&self) -> bool {
        self.display.collapsible != Collapsible::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_gist() -> Gist {
        let mut gist = Gist::new("g1", "Snippets", "octocat");
        gist.files = vec![GistFile::new("a.rs", "text/rust"), GistFile::new("b.md", "text/markdown")];
        gist
    }

    #[test]
    fn group_labels_round_trip() {
        for kind in GroupKind::ALL {
            assert_eq!(GroupKind::from_label(kind.label()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_group_label_is_configuration_error() {
        let err = GroupKind::from_label("Archived Gists").unwrap_err();
        assert!(matches!(err, SyncError::Configuration(ref m) if m.contains("Archived Gists")));
    }

    #[test]
    fn group_count_becomes_description() {
        let node = TreeNode::group(GroupKind::Starred, Some(4));
        assert_eq!(node.display.description.as_deref(), Some("4"));
        let bare = TreeNode::group(GroupKind::Starred, None);
        assert!(bare.display.description.is_none());
    }

    #[test]
    fn read_only_follows_group() {
        let owned = TreeNode::gist(sample_gist(), GroupKind::MyGists, false);
        let starred = TreeNode::gist(sample_gist(), GroupKind::Starred, false);
        assert!(!owned.as_entity().unwrap().read_only());
        assert_eq!(owned.display.context_value, "gist.writable");
        assert!(starred.as_entity().unwrap().read_only());
        assert_eq!(starred.display.context_value, "gist.readonly");
    }

    #[test]
    fn entity_tooltip_has_file_count_and_timestamps() {
        let node = TreeNode::gist(sample_gist(), GroupKind::MyGists, false);
        assert_eq!(node.display.description.as_deref(), Some("2 files"));
        assert!(node.display.tooltip.starts_with("2 files\nCreated: "));
        assert!(node.display.tooltip.contains("Updated: "));
    }

    #[test]
    fn avatar_substitution_only_when_requested() {
        let mut gist = sample_gist();
        gist.owner.as_mut().unwrap().avatar_url = Some("https://a/1.png".into());
        let plain = TreeNode::gist(gist.clone(), GroupKind::Starred, false);
        let avatar = TreeNode::gist(gist, GroupKind::Starred, true);
        assert_eq!(plain.display.icon, Icon::Named("gist"));
        assert_eq!(avatar.display.icon, Icon::Avatar("https://a/1.png".into()));
    }

    #[test]
    fn content_node_binds_open_command() {
        let file = GistFile::new("main.rs", "text/rust").with_sha("s1");
        let node = TreeNode::content("g1", &file, true);
        let content = node.as_content().unwrap();
        assert_eq!(content.sha.as_deref(), Some("s1"));
        assert!(!node.is_expandable());
        assert_eq!(
            node.display.command,
            Some(NodeCommand::OpenFile(ContentAddress::new("g1", "main.rs")))
        );
    }

    #[test]
    fn keys_identify_nodes() {
        let bogus = TreeNode::group_with_label("Bogus", None);
        assert_eq!(bogus.key(), NodeKey::UnknownGroup("Bogus".into()));
        assert_eq!(
            TreeNode::user("octocat", None, Some(1)).key(),
            NodeKey::User("octocat".into())
        );
        assert_eq!(
            TreeNode::notepad(Gist::new("n", "Notepad", "me")).key(),
            NodeKey::Notepad("n".into())
        );
    }
}
