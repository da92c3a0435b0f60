//! Control tree inspection for finding element names before recording

use crate::element::Descriptor;
use crate::error::Result;
use crate::provider::AutomationProvider;
use serde::Serialize;
use tracing::debug;

/// Depth shown by a tree dump unless asked otherwise.
pub const DEFAULT_DEPTH: usize = 3;

/// Depth searched by name lookups; deeper than a dump since nothing is printed
/// for elements that do not match.
pub const SEARCH_DEPTH: usize = 12;

/// Stop walking once this many elements have been collected.
pub const MAX_NODES: usize = 2000;

/// One element of a dumped control tree. The root sits at depth 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub depth: usize,
    pub descriptor: Descriptor,
}

impl TreeNode {
    /// Indented one-line rendering.
    pub fn line(&self) -> String {
        let d = &self.descriptor;
        let mut line = format!("{}{} '{}'", "  ".repeat(self.depth), d.control_type, d.name);
        if let Some(id) = &d.automation_id {
            line.push_str(&format!(" #{}", id));
        }
        if let Some(class) = &d.class_name {
            line.push_str(&format!(" [{}]", class));
        }
        line
    }
}

/// Walk `root` and its descendants down to `max_depth`, parents before
/// children, siblings in order.
///
/// Only a failure on the root is an error. A descendant that cannot be
/// described or expanded is skipped; live trees change while walked.
pub fn dump_tree<P: AutomationProvider>(
    provider: &P,
    root: &P::Element,
    max_depth: usize,
) -> Result<Vec<TreeNode>> {
    let mut nodes = vec![TreeNode {
        depth: 0,
        descriptor: provider.describe(root)?,
    }];
    if max_depth == 0 {
        return Ok(nodes);
    }

    let mut stack: Vec<(P::Element, usize)> = provider
        .children(root)?
        .into_iter()
        .rev()
        .map(|child| (child, 1))
        .collect();

    while let Some((element, depth)) = stack.pop() {
        if nodes.len() >= MAX_NODES {
            debug!(limit = MAX_NODES, "tree dump truncated");
            break;
        }
        let descriptor = match provider.describe(&element) {
            Ok(d) => d,
            Err(e) => {
                debug!(error = %e, depth, "element vanished during dump");
                continue;
            }
        };
        nodes.push(TreeNode { depth, descriptor });

        if depth < max_depth {
            match provider.children(&element) {
                Ok(children) => stack.extend(children.into_iter().rev().map(|c| (c, depth + 1))),
                Err(e) => debug!(error = %e, depth, "could not list children"),
            }
        }
    }
    Ok(nodes)
}

/// Elements under `root` whose name contains `needle`, ignoring case.
pub fn search_by_name<P: AutomationProvider>(
    provider: &P,
    root: &P::Element,
    needle: &str,
    max_depth: usize,
) -> Result<Vec<TreeNode>> {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return Ok(Vec::new());
    }
    let found = dump_tree(provider, root, max_depth)?
        .into_iter()
        .filter(|n| n.depth > 0 && n.descriptor.name.to_lowercase().contains(&needle))
        .collect();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::ScriptedProvider;

    fn chat_window() -> ScriptedProvider {
        ScriptedProvider::new()
            .accepting_window("WhatsApp")
            .with_child("WhatsApp", Descriptor::new("Chats", "List"))
            .with_child("WhatsApp", Descriptor::new("Type a message", "Edit").with_automation_id("InputBar"))
            .with_child("Chats", Descriptor::new("Chat A", "ListItem"))
            .with_child("Chats", Descriptor::new("Chat B", "ListItem"))
            .with_child("Chat A", Descriptor::new("Unread", "Text"))
            .with_child("Unread", Descriptor::new("3", "Text"))
    }

    #[test]
    fn dump_is_depth_first_and_bounded() {
        let provider = chat_window();
        let root = provider.connect("WhatsApp").unwrap();
        let lines: Vec<String> = dump_tree(&provider, &root, 3)
            .unwrap()
            .iter()
            .map(TreeNode::line)
            .collect();
        assert_eq!(
            lines,
            vec![
                "Window 'WhatsApp'",
                "  List 'Chats'",
                "    ListItem 'Chat A'",
                "      Text 'Unread'",
                "    ListItem 'Chat B'",
                "  Edit 'Type a message' #InputBar",
            ]
        );
    }

    #[test]
    fn depth_zero_is_root_only() {
        let provider = chat_window();
        let root = provider.connect("WhatsApp").unwrap();
        assert_eq!(dump_tree(&provider, &root, 0).unwrap().len(), 1);
    }

    #[test]
    fn search_matches_name_fragment() {
        let provider = chat_window();
        let root = provider.connect("WhatsApp").unwrap();
        let found = search_by_name(&provider, &root, "CHAT", 5).unwrap();
        let names: Vec<&str> = found.iter().map(|n| n.descriptor.name.as_str()).collect();
        assert_eq!(names, vec!["Chats", "Chat A", "Chat B"]);
        assert_eq!(found[1].depth, 2);
        assert!(search_by_name(&provider, &root, "  ", 5).unwrap().is_empty());
        assert!(search_by_name(&provider, &root, "settings", 5).unwrap().is_empty());
    }

    #[test]
    fn root_failure_is_an_error() {
        let provider = ScriptedProvider::new().accepting_window("WhatsApp").failing_lookups();
        let root = provider.connect("WhatsApp").unwrap();
        assert!(dump_tree(&provider, &root, 3).is_err());
    }
}
