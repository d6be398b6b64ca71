//! Persistent memory
//!
//! Memory items are JSON documents keyed by `(namespace, id)`. A [`Memory`]
//! scopes a store to one agent and one schema and validates every item that
//! goes in or comes out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::agent::structured::validate_against_schema;
use crate::core::config::MemoryConfig;
use crate::core::{AgentError, Result, ToolSchema};

/// Default instruction for the post-run memory update
pub const DEFAULT_MEMORY_PROMPT: &str = "Based on the conversation, update the stored memory.";

/// Key-value storage for memory items
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Fetch one item
    async fn get(&self, namespace: &str, id: &str) -> Result<Option<Value>>;

    /// Insert or replace an item
    async fn put(&self, namespace: &str, id: &str, value: Value) -> Result<()>;

    /// All items in a namespace, oldest first
    async fn list(&self, namespace: &str) -> Result<Vec<(String, Value)>>;

    /// Remove an item. Returns whether it existed.
    async fn delete(&self, namespace: &str, id: &str) -> Result<bool>;
}

/// One stored item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MemoryItem {
    id: String,
    data: Value,
}

/// Items grouped by namespace, each group in insertion order
type Namespaces = BTreeMap<String, Vec<MemoryItem>>;

fn find(namespaces: &Namespaces, namespace: &str, id: &str) -> Option<Value> {
    namespaces
        .get(namespace)
        .and_then(|items| items.iter().find(|item| item.id == id))
        .map(|item| item.data.clone())
}

fn upsert(namespaces: &mut Namespaces, namespace: &str, id: &str, value: Value) {
    let items = namespaces.entry(namespace.to_string()).or_default();
    match items.iter_mut().find(|item| item.id == id) {
        Some(item) => item.data = value,
        None => items.push(MemoryItem {
            id: id.to_string(),
            data: value,
        }),
    }
}

fn remove(namespaces: &mut Namespaces, namespace: &str, id: &str) -> bool {
    let Some(items) = namespaces.get_mut(namespace) else {
        return false;
    };
    let before = items.len();
    items.retain(|item| item.id != id);
    before != items.len()
}

fn collect(namespaces: &Namespaces, namespace: &str) -> Vec<(String, Value)> {
    namespaces
        .get(namespace)
        .map(|items| {
            items
                .iter()
                .map(|item| (item.id.clone(), item.data.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    namespaces: RwLock<Namespaces>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn get(&self, namespace: &str, id: &str) -> Result<Option<Value>> {
        Ok(find(&*self.namespaces.read().await, namespace, id))
    }

    async fn put(&self, namespace: &str, id: &str, value: Value) -> Result<()> {
        upsert(&mut *self.namespaces.write().await, namespace, id, value);
        Ok(())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<(String, Value)>> {
        Ok(collect(&*self.namespaces.read().await, namespace))
    }

    async fn delete(&self, namespace: &str, id: &str) -> Result<bool> {
        Ok(remove(&mut *self.namespaces.write().await, namespace, id))
    }
}

/// Store backed by one JSON document on disk.
///
/// Writes go to a temporary sibling file which is then renamed over the
/// original, so a crash never leaves a half-written document.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Namespaces> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Namespaces::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                AgentError::memory(format!(
                    "Corrupt memory file {}: {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Namespaces::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, namespaces: &Namespaces) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(namespaces)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), "Memory file written");
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for JsonFileStore {
    async fn get(&self, namespace: &str, id: &str) -> Result<Option<Value>> {
        let _guard = self.lock.lock().await;
        Ok(find(&self.load().await?, namespace, id))
    }

    async fn put(&self, namespace: &str, id: &str, value: Value) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut namespaces = self.load().await?;
        upsert(&mut namespaces, namespace, id, value);
        self.save(&namespaces).await
    }

    async fn list(&self, namespace: &str) -> Result<Vec<(String, Value)>> {
        let _guard = self.lock.lock().await;
        Ok(collect(&self.load().await?, namespace))
    }

    async fn delete(&self, namespace: &str, id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut namespaces = self.load().await?;
        let removed = remove(&mut namespaces, namespace, id);
        if removed {
            self.save(&namespaces).await?;
        }
        Ok(removed)
    }
}

/// Schema-checked view of a store for one agent
#[derive(Clone)]
pub struct Memory {
    store: Arc<dyn MemoryStore>,
    agent_id: String,
    schema_name: String,
    schema: Value,
    update_prompt: Option<String>,
}

impl Memory {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        agent_id: impl Into<String>,
        schema_name: impl Into<String>,
        schema: Value,
    ) -> Self {
        Self {
            store,
            agent_id: agent_id.into(),
            schema_name: schema_name.into(),
            schema,
            update_prompt: None,
        }
    }

    /// Build memory from configuration: a JSON file store when a path is
    /// set, otherwise an in-process store
    pub fn from_config(config: &MemoryConfig) -> Self {
        let store: Arc<dyn MemoryStore> = match &config.path {
            Some(path) => Arc::new(JsonFileStore::new(path.clone())),
            None => Arc::new(InMemoryStore::new()),
        };
        let schema = config.schema.clone().unwrap_or_else(default_memory_schema);
        Self::new(store, config.agent_id.clone(), config.schema_name.clone(), schema)
    }

    /// Override the instruction used for post-run updates
    pub fn with_update_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.update_prompt = Some(prompt.into());
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn update_prompt(&self) -> &str {
        self.update_prompt.as_deref().unwrap_or(DEFAULT_MEMORY_PROMPT)
    }

    /// Tool the model fills in to produce the new memory item
    pub fn tool_schema(&self) -> ToolSchema {
        let description = self
            .schema
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Update memory: {}", self.schema_name));
        ToolSchema::new(self.schema_name.clone(), description, self.schema.clone())
    }

    fn namespace(&self) -> String {
        format!("{}/{}", self.agent_id, self.schema_name)
    }

    fn validate(&self, value: &Value) -> Result<()> {
        validate_against_schema(&self.schema, value)
            .map_err(|e| AgentError::memory(format!("{}: {}", self.schema_name, e)))
    }

    pub async fn get(&self, id: &str) -> Result<Option<Value>> {
        match self.store.get(&self.namespace(), id).await? {
            Some(value) => {
                self.validate(&value)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn put(&self, id: &str, value: Value) -> Result<()> {
        self.validate(&value)?;
        self.store.put(&self.namespace(), id, value).await
    }

    pub async fn list(&self) -> Result<Vec<Value>> {
        let items = self.store.list(&self.namespace()).await?;
        items
            .into_iter()
            .map(|(_, value)| {
                self.validate(&value)?;
                Ok(value)
            })
            .collect()
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.store.delete(&self.namespace(), id).await
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("agent_id", &self.agent_id)
            .field("schema_name", &self.schema_name)
            .finish()
    }
}

/// Schema used when configuration names none: a list of remembered facts
pub fn default_memory_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "description": "Facts worth remembering about the user",
        "properties": {
            "facts": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["facts"]
    })
}

/// Prefix a system prompt with a stored memory item
pub fn with_memory_block(system: &str, memory: &Value) -> Result<String> {
    let pretty = serde_json::to_string_pretty(memory)?;
    Ok(format!("<memory>\n{}\n</memory>\n\n{}", pretty, system))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "preferences": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["name"]
        })
    }

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let memory = Memory::new(Arc::new(InMemoryStore::new()), "agent-1", "UserProfile", profile_schema());
        assert!(memory.get("user-42").await.unwrap().is_none());

        memory.put("user-42", json!({"name": "Alice"})).await.unwrap();
        assert_eq!(memory.get("user-42").await.unwrap(), Some(json!({"name": "Alice"})));

        assert!(memory.delete("user-42").await.unwrap());
        assert!(!memory.delete("user-42").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_validates() {
        let memory = Memory::new(Arc::new(InMemoryStore::new()), "agent-1", "UserProfile", profile_schema());
        let err = memory.put("u", json!({"preferences": []})).await.unwrap_err();
        assert!(matches!(err, AgentError::Memory(_)));
    }

    #[tokio::test]
    async fn test_list_keeps_insertion_order_and_scope() {
        let store: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
        let a = Memory::new(store.clone(), "agent-a", "UserProfile", profile_schema());
        let b = Memory::new(store, "agent-b", "UserProfile", profile_schema());

        a.put("z", json!({"name": "Zed"})).await.unwrap();
        a.put("a", json!({"name": "Amy"})).await.unwrap();
        a.put("z", json!({"name": "Zed2"})).await.unwrap();
        b.put("x", json!({"name": "Xia"})).await.unwrap();

        let names: Vec<Value> = a.list().await.unwrap().into_iter().map(|v| v["name"].clone()).collect();
        assert_eq!(names, vec![json!("Zed2"), json!("Amy")]);
        assert_eq!(b.list().await.unwrap().len(), 1);
        assert!(a.get("x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.json");

        let store = JsonFileStore::new(&path);
        store.put("ns", "1", json!({"name": "Alice"})).await.unwrap();
        store.put("ns", "2", json!({"name": "Bob"})).await.unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.get("ns", "1").await.unwrap(), Some(json!({"name": "Alice"})));
        let ids: Vec<String> = reopened.list("ns").await.unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["1", "2"]);

        assert!(reopened.delete("ns", "1").await.unwrap());
        assert!(JsonFileStore::new(&path).get("ns", "1").await.unwrap().is_none());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_from_config_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = MemoryConfig {
            path: Some(dir.path().join("memory.json")),
            ..MemoryConfig::default()
        };

        let memory = Memory::from_config(&config);
        assert_eq!(memory.agent_id(), "basic-agent");
        assert_eq!(memory.schema_name(), "UserNotes");
        assert_eq!(
            memory.tool_schema().description,
            "Facts worth remembering about the user"
        );
        memory.put("u1", json!({"facts": ["likes tea"]})).await.unwrap();
        assert!(memory.put("u1", json!({"notes": "x"})).await.is_err());

        let reopened = Memory::from_config(&config);
        assert_eq!(
            reopened.get("u1").await.unwrap(),
            Some(json!({"facts": ["likes tea"]}))
        );
    }

    #[test]
    fn test_memory_block() {
        let prompt = with_memory_block("Be helpful.", &json!({"name": "Alice"})).unwrap();
        assert!(prompt.starts_with("<memory>\n"));
        assert!(prompt.contains("\"name\": \"Alice\""));
        assert!(prompt.ends_with("</memory>\n\nBe helpful."));
    }
}
