//! Plain-text projection of the tree, used by the `gt` host.

use crate::error::Result;
use crate::model::{Icon, TreeNode};
use crate::remote::RemoteService;
use crate::store::StorageBackend;
use crate::sync::TreeSynchronizer;

/// A flattened node ready to print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatItem {
    pub label: String,
    pub description: Option<String>,
    pub icon: Icon,
    pub depth: usize,
    /// For each ancestor level, whether that ancestor was the last sibling.
    pub ancestors_last: Vec<bool>,
    pub is_last_sibling: bool,
}

/// Walk the tree from the roots, expanding nodes down to `max_depth`.
///
/// Depth 0 lists the roots only. Content nodes are never expanded.
pub async fn flatten<R, B>(sync: &TreeSynchronizer<R, B>, max_depth: usize) -> Result<Vec<FlatItem>>
where
    R: RemoteService,
    B: StorageBackend,
{
    let roots = sync.get_children(None).await?;
    let mut stack: Vec<(TreeNode, Vec<bool>, bool)> = Vec::new();
    push_siblings(&mut stack, roots, Vec::new());

    let mut items = Vec::new();
    while let Some((node, ancestors_last, is_last)) = stack.pop() {
        let depth = ancestors_last.len();
        items.push(FlatItem {
            label: node.display.label.clone(),
            description: node.display.description.clone(),
            icon: node.display.icon.clone(),
            depth,
            ancestors_last: ancestors_last.clone(),
            is_last_sibling: is_last,
        });
        if depth >= max_depth || !node.is_expandable() {
            continue;
        }
        let children = sync.get_children(Some(&node)).await?;
        let mut next = ancestors_last;
        next.push(is_last);
        push_siblings(&mut stack, children, next);
    }
    Ok(items)
}

fn push_siblings(stack: &mut Vec<(TreeNode, Vec<bool>, bool)>, nodes: Vec<TreeNode>, ancestors: Vec<bool>) {
    let count = nodes.len();
    // Reverse so the first sibling is popped first.
    for (i, node) in nodes.into_iter().enumerate().rev() {
        stack.push((node, ancestors.clone(), i + 1 == count));
    }
}

/// Build the prefix string for tree indentation using box-drawing characters.
fn build_prefix(item: &FlatItem) -> String {
    let mut parts: Vec<&str> = Vec::new();
    // The roots' own flags are not drawn; only deeper ancestors add a column.
    for &last in item.ancestors_last.iter().skip(1) {
        parts.push(if last { "   " } else { "│  " });
    }
    if item.depth > 0 {
        parts.push(if item.is_last_sibling { "└──" } else { "├──" });
    }
    parts.join("")
}

fn indicator(icon: &Icon, use_icons: bool) -> &'static str {
    let name = match icon {
        Icon::Avatar(_) => "avatar",
        Icon::Named(name) => name,
    };
    if use_icons {
        match name {
            "notebook" => "✎ ",
            "star" => "★ ",
            "organization" | "person" | "avatar" => "@ ",
            "folder-opened" | "file-directory" => "▸ ",
            "lock" => "⊘ ",
            "file" => "· ",
            _ => "◆ ",
        }
    } else {
        match name {
            "notebook" => "[N] ",
            "star" => "[*] ",
            "organization" | "person" | "avatar" => "[U] ",
            "folder-opened" | "file-directory" => "[D] ",
            "lock" => "[S] ",
            "file" => "[F] ",
            _ => "[G] ",
        }
    }
}

/// One printable line per item.
pub fn render_lines(items: &[FlatItem], use_icons: bool) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let mut line = format!(
                "{}{}{}",
                build_prefix(item),
                indicator(&item.icon, use_icons),
                item.label
            );
            if let Some(desc) = &item.description {
                line.push_str(&format!("  ({})", desc));
            }
            line
        })
        .collect()
}
