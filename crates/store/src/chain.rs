use crate::StoreError;
use charsnap_common::{BlobHash, GamePath};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// Logical path → blob hash.
pub type FileMap = BTreeMap<GamePath, BlobHash>;

/// One diff step in a snapshot's mapping history.
///
/// `changes` holds only the entries that differ from the parent; a root node
/// (`parent_id == None`) carries the full mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMapNode {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub changes: FileMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manipulation_override: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FileMapNode {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// How a capture should be recorded relative to the current node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileMapDiff {
    /// Added and changed keys only; the new node's parent is the current node.
    Overlay(FileMap),
    /// At least one key disappeared. Nodes have no deletion marker, so the
    /// new node is a root carrying every surviving key.
    Rebase(FileMap),
}

/// Minimal change set turning `current` into `new_full`.
pub fn diff_from_current(new_full: &FileMap, current: &FileMap) -> FileMapDiff {
    let removed = current.keys().any(|k| !new_full.contains_key(k));
    if removed {
        return FileMapDiff::Rebase(new_full.clone());
    }
    let changes = new_full
        .iter()
        .filter(|(k, v)| current.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    FileMapDiff::Overlay(changes)
}

/// Append-only arena of file-map nodes.
///
/// Parent links are looked up through the id index and followed as arena
/// indices. Links are not trusted: data read from disk may hold dangling
/// parents or cycles, which surface as `CorruptChain` on resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<FileMapNode>", into = "Vec<FileMapNode>")]
pub struct FileMapChain {
    nodes: Vec<FileMapNode>,
    index: HashMap<String, usize>,
}

impl From<Vec<FileMapNode>> for FileMapChain {
    fn from(nodes: Vec<FileMapNode>) -> Self {
        Self::from_nodes(nodes)
    }
}

impl From<FileMapChain> for Vec<FileMapNode> {
    fn from(chain: FileMapChain) -> Self {
        chain.nodes
    }
}

impl FileMapChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a chain from stored nodes. A duplicate id keeps the first node.
    pub fn from_nodes(nodes: Vec<FileMapNode>) -> Self {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.contains_key(&node.id) {
                tracing::warn!(node = %node.id, "duplicate file map node id; keeping first");
                continue;
            }
            index.insert(node.id.clone(), i);
        }
        Self { nodes, index }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in append order.
    pub fn nodes(&self) -> &[FileMapNode] {
        &self.nodes
    }

    pub fn get(&self, id: &str) -> Option<&FileMapNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Append a node. `parent_id` must name an existing node.
    pub fn append(
        &mut self,
        parent_id: Option<&str>,
        changes: FileMap,
        manipulation_override: Option<String>,
    ) -> Result<&FileMapNode, StoreError> {
        if let Some(parent) = parent_id {
            if !self.contains(parent) {
                return Err(StoreError::UnknownNode(parent.to_string()));
            }
        }
        Ok(self.push(FileMapNode {
            id: uuid::Uuid::new_v4().to_string(),
            parent_id: parent_id.map(str::to_string),
            changes,
            manipulation_override,
            created_at: Utc::now(),
        }))
    }

    /// Append a root whose id is derived from its mapping and manipulation.
    /// Rebuilding the same root from the same data yields the same id.
    pub fn append_content_root(
        &mut self,
        changes: FileMap,
        manipulation_override: Option<String>,
    ) -> Result<&FileMapNode, StoreError> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&changes)?);
        if let Some(manipulation) = &manipulation_override {
            hasher.update([0u8]);
            hasher.update(manipulation.as_bytes());
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        let id = uuid::Uuid::from_bytes(bytes).to_string();
        if let Some(&idx) = self.index.get(&id) {
            return Ok(&self.nodes[idx]);
        }
        Ok(self.push(FileMapNode {
            id,
            parent_id: None,
            changes,
            manipulation_override,
            created_at: Utc::now(),
        }))
    }

    fn push(&mut self, node: FileMapNode) -> &FileMapNode {
        tracing::debug!(
            node = %node.id,
            parent = ?node.parent_id,
            changes = node.changes.len(),
            "appended file map node"
        );
        let idx = self.nodes.len();
        self.index.insert(node.id.clone(), idx);
        self.nodes.push(node);
        &self.nodes[idx]
    }

    /// Arena indices from `id` up to its root.
    fn ancestry(&self, id: &str) -> Result<Vec<usize>, StoreError> {
        let mut idx = *self
            .index
            .get(id)
            .ok_or_else(|| StoreError::UnknownNode(id.to_string()))?;
        let mut path = vec![idx];
        while let Some(parent) = self.nodes[idx].parent_id.as_deref() {
            let next = *self.index.get(parent).ok_or_else(|| StoreError::CorruptChain {
                node: self.nodes[idx].id.clone(),
                detail: format!("dangling parent {parent}"),
            })?;
            if path.len() >= self.nodes.len() {
                return Err(StoreError::CorruptChain {
                    node: id.to_string(),
                    detail: "parent links form a cycle".into(),
                });
            }
            path.push(next);
            idx = next;
        }
        Ok(path)
    }

    /// Effective mapping of a node: its chain's `changes` folded root → node.
    pub fn resolve(&self, id: &str) -> Result<FileMap, StoreError> {
        let ancestry = self.ancestry(id)?;
        let mut mapping = FileMap::new();
        for &i in ancestry.iter().rev() {
            for (path, hash) in &self.nodes[i].changes {
                mapping.insert(path.clone(), hash.clone());
            }
        }
        Ok(mapping)
    }

    /// Nearest manipulation override walking from `id` towards the root.
    pub fn resolve_manipulation(&self, id: &str) -> Result<Option<String>, StoreError> {
        let ancestry = self.ancestry(id)?;
        Ok(ancestry
            .into_iter()
            .find_map(|i| self.nodes[i].manipulation_override.clone()))
    }

    /// Nodes from the root down to `id`.
    pub fn lineage(&self, id: &str) -> Result<Vec<&FileMapNode>, StoreError> {
        let ancestry = self.ancestry(id)?;
        Ok(ancestry.into_iter().rev().map(|i| &self.nodes[i]).collect())
    }
}
