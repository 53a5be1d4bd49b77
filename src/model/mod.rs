pub mod address;
pub mod gist;
pub mod node;

pub use address::ContentAddress;
pub use gist::{Gist, GistFile, Owner, RemoteUser};
pub use node::{
    Collapsible, ContentNode, DisplayMeta, EntityNode, GroupKind, GroupNode, Icon, NodeCommand,
    NodeKey, NodeKind, TreeNode, UserNode,
};
