//! Branching-story documents: one `story.json` per (user, tab).
//!
//! Documents are read-modified-written whole. Every mutation serializes
//! through a per-document async mutex, so two concurrent edits of the same
//! story cannot silently drop each other's changes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};

pub const STORY_FILE: &str = "story.json";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryNode {
    pub id: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryConnection {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// The on-disk document. Unknown top-level fields round-trip through `extra`
/// so a shallow merge never destroys data this crate does not model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoryDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub nodes: Vec<StoryNode>,
    #[serde(default)]
    pub connections: Vec<StoryConnection>,
    /// Editor canvas positions keyed by node id. Entries for deleted nodes
    /// are left behind; the editor ignores ids it cannot resolve.
    #[serde(rename = "nodePositions", default, skip_serializing_if = "HashMap::is_empty")]
    pub node_positions: HashMap<String, Position>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionAction {
    Add,
    Remove,
}

impl Default for ConnectionAction {
    fn default() -> Self {
        ConnectionAction::Add
    }
}

#[derive(Clone)]
pub struct StoryStore {
    users_dir: PathBuf,
    locks: Arc<Mutex<HashMap<(String, String), Arc<Mutex<()>>>>>,
}

impl StoryStore {
    pub fn new(users_dir: PathBuf) -> Self {
        Self {
            users_dir,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn story_path(&self, user: &str, tab: &str) -> PathBuf {
        self.users_dir.join(user).join(tab).join(STORY_FILE)
    }

    async fn doc_lock(&self, user: &str, tab: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry((user.to_owned(), tab.to_owned()))
            .or_default()
            .clone()
    }

    pub async fn exists(&self, user: &str, tab: &str) -> bool {
        tokio::fs::try_exists(self.story_path(user, tab))
            .await
            .unwrap_or(false)
    }

    pub async fn load(&self, user: &str, tab: &str) -> AppResult<StoryDocument> {
        let raw = match tokio::fs::read_to_string(self.story_path(user, tab)).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound(format!("story {user}/{tab}")));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    async fn persist(&self, user: &str, tab: &str, doc: &StoryDocument) -> AppResult<()> {
        let raw = serde_json::to_string_pretty(doc)?;
        tokio::fs::write(self.story_path(user, tab), raw).await?;
        Ok(())
    }

    /// Seeds the document for a freshly created story tab.
    pub async fn create(
        &self,
        user: &str,
        tab: &str,
        name: &str,
        description: &str,
    ) -> AppResult<StoryDocument> {
        let lock = self.doc_lock(user, tab).await;
        let _guard = lock.lock().await;

        let mut doc = StoryDocument {
            name: name.to_owned(),
            description: description.to_owned(),
            ..StoryDocument::default()
        };
        doc.extra
            .insert("type".to_owned(), serde_json::Value::from("story"));
        self.persist(user, tab, &doc).await?;
        Ok(doc)
    }

    /// Shallow top-level merge of `patch` into the stored document. Used
    /// chiefly to persist `nodePositions` after canvas drags.
    pub async fn merge_save(
        &self,
        user: &str,
        tab: &str,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> AppResult<StoryDocument> {
        let lock = self.doc_lock(user, tab).await;
        let _guard = lock.lock().await;

        let doc = self.load(user, tab).await?;
        let mut merged = match serde_json::to_value(&doc)? {
            serde_json::Value::Object(obj) => obj,
            _ => unreachable!("documents serialize to objects"),
        };
        for (key, value) in patch {
            merged.insert(key, value);
        }
        let doc: StoryDocument = serde_json::from_value(serde_json::Value::Object(merged))?;
        self.persist(user, tab, &doc).await?;
        Ok(doc)
    }

    /// Replaces the content of the node with `id`, or appends a new node.
    /// Ids compare as exact strings.
    pub async fn upsert_node(
        &self,
        user: &str,
        tab: &str,
        id: &str,
        content: &str,
    ) -> AppResult<Vec<StoryNode>> {
        let lock = self.doc_lock(user, tab).await;
        let _guard = lock.lock().await;

        let mut doc = self.load(user, tab).await?;
        match doc.nodes.iter_mut().find(|n| n.id == id) {
            Some(node) => node.content = content.to_owned(),
            None => doc.nodes.push(StoryNode {
                id: id.to_owned(),
                content: content.to_owned(),
            }),
        }
        self.persist(user, tab, &doc).await?;
        Ok(doc.nodes)
    }

    /// Removes the node and cascades over every connection touching it.
    /// The node's `nodePositions` entry is deliberately left in place.
    pub async fn delete_node(
        &self,
        user: &str,
        tab: &str,
        id: &str,
    ) -> AppResult<(Vec<StoryNode>, Vec<StoryConnection>)> {
        let lock = self.doc_lock(user, tab).await;
        let _guard = lock.lock().await;

        let mut doc = self.load(user, tab).await?;
        doc.nodes.retain(|n| n.id != id);
        doc.connections.retain(|c| c.from != id && c.to != id);
        self.persist(user, tab, &doc).await?;
        Ok((doc.nodes, doc.connections))
    }

    /// Adds or removes the directed edge (from, to). Adding is idempotent on
    /// the exact pair and requires both endpoints to be existing node ids;
    /// removing deletes every exact match.
    pub async fn set_connection(
        &self,
        user: &str,
        tab: &str,
        from: &str,
        to: &str,
        action: ConnectionAction,
    ) -> AppResult<Vec<StoryConnection>> {
        let lock = self.doc_lock(user, tab).await;
        let _guard = lock.lock().await;

        let mut doc = self.load(user, tab).await?;
        match action {
            ConnectionAction::Add => {
                for endpoint in [from, to] {
                    if !doc.nodes.iter().any(|n| n.id == endpoint) {
                        return Err(AppError::Validation(format!(
                            "connection endpoint {endpoint} is not a node"
                        )));
                    }
                }
                if !doc.connections.iter().any(|c| c.from == from && c.to == to) {
                    doc.connections.push(StoryConnection {
                        from: from.to_owned(),
                        to: to.to_owned(),
                        label: None,
                    });
                }
            }
            ConnectionAction::Remove => {
                doc.connections.retain(|c| !(c.from == from && c.to == to));
            }
        }
        self.persist(user, tab, &doc).await?;
        Ok(doc.connections)
    }

    /// Every story document across all users, tagged with its owners.
    pub async fn all_stories(&self) -> Vec<(String, String, StoryDocument)> {
        let mut stories = Vec::new();
        for user in list_dirs(&self.users_dir).await {
            for tab in list_dirs(&self.users_dir.join(&user)).await {
                if !self.exists(&user, &tab).await {
                    continue;
                }
                match self.load(&user, &tab).await {
                    Ok(doc) => stories.push((user.clone(), tab, doc)),
                    Err(err) => {
                        tracing::warn!(%user, %tab, error = %err, "skipping unreadable story");
                    }
                }
            }
        }
        stories
    }
}

async fn list_dirs(path: &std::path::Path) -> Vec<String> {
    let mut dirs = Vec::new();
    let Ok(mut rd) = tokio::fs::read_dir(path).await else {
        return dirs;
    };
    while let Ok(Some(entry)) = rd.next_entry().await {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            dirs.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    dirs.sort();
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture() -> (tempfile::TempDir, StoryStore) {
        let tmp = tempfile::tempdir().unwrap();
        let users_dir = tmp.path().join("users");
        tokio::fs::create_dir_all(users_dir.join("alice/quest"))
            .await
            .unwrap();
        let store = StoryStore::new(users_dir);
        store.create("alice", "quest", "quest", "a tale").await.unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn load_missing_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = StoryStore::new(tmp.path().join("users"));
        let err = store.load("ghost", "none").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn upsert_node_is_idempotent_and_replaces_content() {
        let (_tmp, store) = fixture().await;

        store.upsert_node("alice", "quest", "A", "x").await.unwrap();
        let nodes = store.upsert_node("alice", "quest", "A", "x").await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].content, "x");

        let nodes = store.upsert_node("alice", "quest", "A", "y").await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].content, "y");
    }

    #[tokio::test]
    async fn delete_node_cascades_connections() {
        let (_tmp, store) = fixture().await;
        for (id, content) in [("A", "a"), ("B", "b"), ("C", "c")] {
            store.upsert_node("alice", "quest", id, content).await.unwrap();
        }
        store
            .set_connection("alice", "quest", "A", "B", ConnectionAction::Add)
            .await
            .unwrap();
        store
            .set_connection("alice", "quest", "B", "C", ConnectionAction::Add)
            .await
            .unwrap();

        let (nodes, connections) = store.delete_node("alice", "quest", "B").await.unwrap();
        let ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["A", "C"]);
        assert!(connections.is_empty());
    }

    #[tokio::test]
    async fn connection_add_is_idempotent() {
        let (_tmp, store) = fixture().await;
        store.upsert_node("alice", "quest", "A", "").await.unwrap();
        store.upsert_node("alice", "quest", "B", "").await.unwrap();

        store
            .set_connection("alice", "quest", "A", "B", ConnectionAction::Add)
            .await
            .unwrap();
        let connections = store
            .set_connection("alice", "quest", "A", "B", ConnectionAction::Add)
            .await
            .unwrap();
        assert_eq!(connections.len(), 1);

        let connections = store
            .set_connection("alice", "quest", "A", "B", ConnectionAction::Remove)
            .await
            .unwrap();
        assert!(connections.is_empty());
    }

    #[tokio::test]
    async fn connection_endpoints_must_exist() {
        let (_tmp, store) = fixture().await;
        store.upsert_node("alice", "quest", "A", "").await.unwrap();

        let err = store
            .set_connection("alice", "quest", "A", "missing", ConnectionAction::Add)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // Removal never validates endpoints.
        store
            .set_connection("alice", "quest", "A", "missing", ConnectionAction::Remove)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn merge_save_updates_positions_and_keeps_unknown_fields() {
        let (_tmp, store) = fixture().await;
        store.upsert_node("alice", "quest", "start", "once").await.unwrap();

        let patch = serde_json::json!({
            "nodePositions": { "start": { "x": 10.0, "y": 20.0 } },
            "theme": "dark"
        });
        let serde_json::Value::Object(patch) = patch else { unreachable!() };
        store.merge_save("alice", "quest", patch).await.unwrap();

        let doc = store.load("alice", "quest").await.unwrap();
        assert_eq!(doc.node_positions["start"], Position { x: 10.0, y: 20.0 });
        assert_eq!(doc.extra["theme"], "dark");
        assert_eq!(doc.extra["type"], "story");
        assert_eq!(doc.nodes.len(), 1, "merge must not clobber nodes");
    }

    #[tokio::test]
    async fn deleted_node_keeps_its_position_entry() {
        let (_tmp, store) = fixture().await;
        store.upsert_node("alice", "quest", "A", "").await.unwrap();
        let patch = serde_json::json!({ "nodePositions": { "A": { "x": 1.0, "y": 2.0 } } });
        let serde_json::Value::Object(patch) = patch else { unreachable!() };
        store.merge_save("alice", "quest", patch).await.unwrap();

        store.delete_node("alice", "quest", "A").await.unwrap();
        let doc = store.load("alice", "quest").await.unwrap();
        assert!(doc.nodes.is_empty());
        assert!(doc.node_positions.contains_key("A"));
    }

    #[tokio::test]
    async fn end_to_end_story_lifecycle() {
        let (_tmp, store) = fixture().await;
        store
            .upsert_node("alice", "quest", "start", "Once upon a time")
            .await
            .unwrap();
        store
            .upsert_node("alice", "quest", "end", "The end")
            .await
            .unwrap();
        store
            .set_connection("alice", "quest", "start", "end", ConnectionAction::Add)
            .await
            .unwrap();

        let doc = store.load("alice", "quest").await.unwrap();
        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.connections.len(), 1);

        store.delete_node("alice", "quest", "end").await.unwrap();
        let doc = store.load("alice", "quest").await.unwrap();
        assert_eq!(doc.nodes.len(), 1);
        assert!(doc.connections.is_empty());
    }
}
