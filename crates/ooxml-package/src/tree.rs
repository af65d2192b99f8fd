//! Part hierarchy of one package.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]: a node owns the ids of its
//! children and keeps a plain index to its parent for upward lookups. Removed nodes leave a
//! vacant slot behind; ids are never reused within one tree.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Lifecycle status of a file part across reloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartStatus {
    Unchanged,
    Modified,
    Created,
    Deleted,
}

impl PartStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PartStatus::Unchanged => "unchanged",
            PartStatus::Modified => "modified",
            PartStatus::Created => "created",
            PartStatus::Deleted => "deleted",
        }
    }

    /// Status of a node created for a path seen for the first time.
    ///
    /// The first population of a package marks nothing as new.
    fn first_seen(first_population: bool) -> Self {
        if first_population {
            PartStatus::Unchanged
        } else {
            PartStatus::Created
        }
    }

    /// Status of an existing node whose path is present in the reloaded archive.
    ///
    /// A deleted part that shows up again counts as newly created.
    fn present(self, changed: bool) -> Self {
        match (self, changed) {
            (PartStatus::Deleted, _) => PartStatus::Created,
            (_, true) => PartStatus::Modified,
            (_, false) => PartStatus::Unchanged,
        }
    }
}

impl std::fmt::Display for PartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    PackageRoot,
    Folder,
    File,
}

/// What the deletion pass did with a file node missing from the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absence {
    /// First reload without the part: kept with a deleted marker.
    MarkedDeleted,
    /// Second consecutive reload without the part: node removed.
    Removed,
}

/// Result of walking a part path into the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartVisit {
    pub id: NodeId,
    /// Status before this visit; `None` when the node was just created.
    pub previous: Option<PartStatus>,
}

#[derive(Debug, Clone)]
pub struct PartNode {
    path: String,
    name: String,
    status: PartStatus,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl PartNode {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Meaningful for file nodes only; folders always report [`PartStatus::Unchanged`].
    pub fn status(&self) -> PartStatus {
        self.status
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn kind(&self) -> NodeKind {
        if self.parent.is_none() {
            NodeKind::PackageRoot
        } else if self.children.is_empty() {
            NodeKind::File
        } else {
            NodeKind::Folder
        }
    }
}

#[derive(Debug, Clone)]
pub struct PartTree {
    nodes: Vec<Option<PartNode>>,
    root: NodeId,
}

impl PartTree {
    /// Create a tree whose synthetic root is labelled with the package path.
    pub fn new(package_path: impl Into<String>) -> Self {
        let path = package_path.into();
        let root = PartNode {
            name: path.clone(),
            path,
            status: PartStatus::Unchanged,
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![Some(root)],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&PartNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn is_empty(&self) -> bool {
        self.node(self.root).map_or(true, |root| root.children.is_empty())
    }

    /// Find a node by part path, matching one segment at a time.
    pub fn find(&self, part: &str) -> Option<NodeId> {
        let mut current = self.root;
        for segment in part.split('/') {
            current = self.child_named(current, segment)?;
        }
        (current != self.root).then_some(current)
    }

    pub fn status_of(&self, part: &str) -> Option<PartStatus> {
        self.find(part).and_then(|id| self.node(id)).map(PartNode::status)
    }

    /// Walk `part` into the tree, creating missing folder and file nodes in first-seen order.
    ///
    /// Existing nodes are left untouched; the caller decides the new status through
    /// [`PartTree::apply_present`].
    pub fn visit_part(&mut self, part: &str, first_population: bool) -> PartVisit {
        let segments: Vec<&str> = part.split('/').collect();
        let mut current = self.root;
        let mut prefix = String::with_capacity(part.len());

        for (index, segment) in segments.iter().enumerate() {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);

            if let Some(child) = self.child_named(current, segment) {
                current = child;
                continue;
            }

            let is_file = index + 1 == segments.len();
            let status = if is_file {
                PartStatus::first_seen(first_population)
            } else {
                PartStatus::Unchanged
            };
            current = self.insert_child(current, prefix.clone(), segment, status);
            if is_file {
                return PartVisit {
                    id: current,
                    previous: None,
                };
            }
        }

        PartVisit {
            id: current,
            previous: self.node(current).map(PartNode::status),
        }
    }

    /// Advance an existing node whose part is present in the reloaded archive.
    pub fn apply_present(&mut self, id: NodeId, changed: bool) -> Option<PartStatus> {
        let node = self.node_mut(id)?;
        node.status = node.status.present(changed);
        Some(node.status)
    }

    /// Advance a file node whose part is missing from the reloaded archive.
    pub fn apply_absent(&mut self, id: NodeId) -> Option<Absence> {
        let node = self.node_mut(id)?;
        if node.status != PartStatus::Deleted {
            node.status = PartStatus::Deleted;
            return Some(Absence::MarkedDeleted);
        }
        self.remove(id);
        Some(Absence::Removed)
    }

    /// File nodes in depth-first order, with their part paths.
    pub fn file_nodes(&self) -> Vec<(NodeId, String)> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            if id != self.root && node.children.is_empty() {
                out.push((id, node.path.clone()));
            }
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Every node below the root in depth-first order, paired with its depth (children of the
    /// root have depth 0).
    pub fn walk(&self) -> Vec<(usize, NodeId)> {
        let mut out = Vec::new();
        let mut stack: Vec<(usize, NodeId)> = self
            .children(self.root)
            .iter()
            .rev()
            .map(|&id| (0, id))
            .collect();
        while let Some((depth, id)) = stack.pop() {
            out.push((depth, id));
            stack.extend(self.children(id).iter().rev().map(|&child| (depth + 1, child)));
        }
        out
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], PartNode::children)
    }

    /// Drop every node except the root.
    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        if let Some(root) = self.node_mut(self.root) {
            root.children.clear();
        }
    }

    /// Detach `id` and prune ancestors that are left without children, so that every
    /// remaining leaf is a file.
    fn remove(&mut self, id: NodeId) {
        let mut current = id;
        while current != self.root {
            let Some(node) = self.nodes.get_mut(current.0).and_then(Option::take) else {
                return;
            };
            let Some(parent_id) = node.parent else {
                return;
            };
            let Some(parent) = self.node_mut(parent_id) else {
                return;
            };
            parent.children.retain(|&child| child != current);
            if !parent.children.is_empty() {
                return;
            }
            current = parent_id;
        }
    }

    fn child_named(&self, parent: NodeId, segment: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&child| self.node(child).is_some_and(|n| n.name == segment))
    }

    fn insert_child(
        &mut self,
        parent: NodeId,
        path: String,
        name: &str,
        status: PartStatus,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(PartNode {
            path,
            name: name.to_string(),
            status,
            parent: Some(parent),
            children: Vec::new(),
        }));
        if let Some(parent) = self.node_mut(parent) {
            parent.children.push(id);
        }
        id
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut PartNode> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn paths(tree: &PartTree) -> Vec<String> {
        tree.file_nodes().into_iter().map(|(_, p)| p).collect()
    }

    #[test]
    fn first_population_creates_unchanged_nodes_with_folders() {
        let mut tree = PartTree::new("/tmp/a.docx");
        let visit = tree.visit_part("word/document.xml", true);
        assert_eq!(visit.previous, None);

        let word = tree.find("word").unwrap();
        assert_eq!(tree.node(word).unwrap().kind(), NodeKind::Folder);
        let doc = tree.node(visit.id).unwrap();
        assert_eq!(doc.kind(), NodeKind::File);
        assert_eq!(doc.status(), PartStatus::Unchanged);
        assert_eq!(doc.parent(), Some(word));
        assert_eq!(tree.node(tree.root()).unwrap().kind(), NodeKind::PackageRoot);
    }

    #[test]
    fn later_population_marks_new_paths_created() {
        let mut tree = PartTree::new("a.docx");
        tree.visit_part("word/document.xml", true);
        let visit = tree.visit_part("word/styles.xml", false);
        assert_eq!(tree.node(visit.id).unwrap().status(), PartStatus::Created);
    }

    #[test]
    fn children_keep_first_seen_order() {
        let mut tree = PartTree::new("a.docx");
        for part in ["z.xml", "a/b.xml", "m.xml", "a/a.xml"] {
            tree.visit_part(part, true);
        }
        assert_eq!(paths(&tree), ["z.xml", "a/b.xml", "a/a.xml", "m.xml"]);
    }

    #[test]
    fn present_transitions() {
        let mut tree = PartTree::new("a.docx");
        let id = tree.visit_part("a.xml", true).id;

        assert_eq!(tree.apply_present(id, true), Some(PartStatus::Modified));
        assert_eq!(tree.apply_present(id, false), Some(PartStatus::Unchanged));

        let revisit = tree.visit_part("a.xml", false);
        assert_eq!(revisit.id, id);
        assert_eq!(revisit.previous, Some(PartStatus::Unchanged));
    }

    #[test]
    fn absent_parts_are_deleted_then_removed_with_empty_folders() {
        let mut tree = PartTree::new("a.docx");
        tree.visit_part("[Content_Types].xml", true);
        let doc = tree.visit_part("doc/sub/document.xml", true).id;

        assert_eq!(tree.apply_absent(doc), Some(Absence::MarkedDeleted));
        assert_eq!(tree.status_of("doc/sub/document.xml"), Some(PartStatus::Deleted));

        assert_eq!(tree.apply_absent(doc), Some(Absence::Removed));
        assert_eq!(tree.find("doc/sub/document.xml"), None);
        assert_eq!(tree.find("doc"), None);
        assert_eq!(paths(&tree), ["[Content_Types].xml"]);
        assert_eq!(tree.apply_absent(doc), None);
    }

    #[test]
    fn deleted_part_that_reappears_is_created() {
        let mut tree = PartTree::new("a.docx");
        let id = tree.visit_part("a.xml", true).id;
        tree.apply_absent(id);

        let visit = tree.visit_part("a.xml", false);
        assert_eq!(visit.previous, Some(PartStatus::Deleted));
        assert_eq!(tree.apply_present(visit.id, false), Some(PartStatus::Created));
    }

    #[test]
    fn walk_reports_depths() {
        let mut tree = PartTree::new("a.docx");
        tree.visit_part("_rels/.rels", true);
        tree.visit_part("word/document.xml", true);

        let walked: Vec<_> = tree
            .walk()
            .into_iter()
            .map(|(depth, id)| (depth, tree.node(id).unwrap().name().to_string()))
            .collect();
        assert_eq!(
            walked,
            [
                (0, "_rels".to_string()),
                (1, ".rels".to_string()),
                (0, "word".to_string()),
                (1, "document.xml".to_string()),
            ]
        );
    }

    #[test]
    fn clear_empties_the_tree() {
        let mut tree = PartTree::new("a.docx");
        tree.visit_part("a.xml", true);
        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.find("a.xml"), None);
    }
}
