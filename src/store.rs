//! Persistent key-value, task, and journal storage.
//!
//! Flat serde JSON documents under a root directory (`~/.vesper` by
//! default) so they are easy to inspect, edit, and back up. Single-record
//! reads and writes are atomic at the whole-file level; nothing here
//! needs transactions.

use crate::error::{AssistantError, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A to-do item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItem {
    /// Stable task number, shown to and spoken by the user.
    pub id: u64,
    /// Task text.
    pub text: String,
    /// Whether the task is done.
    pub done: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Simple CRUD contracts the dispatcher needs from persistence.
pub trait AssistantStore: Send + Sync {
    /// Remember a key-value pair.
    fn memory_set(&self, key: &str, value: &str) -> Result<()>;
    /// Recall one value.
    fn memory_get(&self, key: &str) -> Result<Option<String>>;
    /// All remembered pairs, in key order.
    fn memory_all(&self) -> Result<Vec<(String, String)>>;

    /// Add a task, returning its number.
    fn task_add(&self, text: &str) -> Result<u64>;
    /// All tasks, oldest first.
    fn tasks(&self) -> Result<Vec<TaskItem>>;
    /// Mark a task done. Returns `false` if the id is unknown.
    fn task_done(&self, id: u64) -> Result<bool>;

    /// Append a journal line for today.
    fn journal_add(&self, text: &str) -> Result<()>;
    /// Today's journal lines, oldest first.
    fn journal_today(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TasksFile {
    next_id: u64,
    tasks: Vec<TaskItem>,
}

/// JSON-file store implementation.
pub struct JsonStore {
    root: PathBuf,
    // One write lock for the whole store; the files are tiny.
    write_lock: Mutex<()>,
}

impl JsonStore {
    /// Open (and create) a store rooted at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)
            .map_err(|e| AssistantError::Store(format!("create {}: {e}", root.display())))?;
        Ok(Self {
            root: root.to_owned(),
            write_lock: Mutex::new(()),
        })
    }

    fn memory_path(&self) -> PathBuf {
        self.root.join("memory.json")
    }

    fn tasks_path(&self) -> PathBuf {
        self.root.join("tasks.json")
    }

    fn journal_path(&self) -> PathBuf {
        self.root.join("journal.json")
    }

    fn load<T: Default + for<'de> Deserialize<'de>>(&self, path: &Path) -> Result<T> {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| AssistantError::Store(format!("parse {}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(AssistantError::Store(format!(
                "read {}: {e}",
                path.display()
            ))),
        }
    }

    fn save<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let raw = serde_json::to_string_pretty(value)
            .map_err(|e| AssistantError::Store(format!("encode {}: {e}", path.display())))?;
        std::fs::write(path, raw)
            .map_err(|e| AssistantError::Store(format!("write {}: {e}", path.display())))
    }

    fn today_key() -> String {
        Local::now().format("%Y-%m-%d").to_string()
    }
}

impl AssistantStore for JsonStore {
    fn memory_set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut memory: BTreeMap<String, String> = self.load(&self.memory_path())?;
        memory.insert(key.to_owned(), value.to_owned());
        self.save(&self.memory_path(), &memory)
    }

    fn memory_get(&self, key: &str) -> Result<Option<String>> {
        let memory: BTreeMap<String, String> = self.load(&self.memory_path())?;
        Ok(memory.get(key).cloned())
    }

    fn memory_all(&self) -> Result<Vec<(String, String)>> {
        let memory: BTreeMap<String, String> = self.load(&self.memory_path())?;
        Ok(memory.into_iter().collect())
    }

    fn task_add(&self, text: &str) -> Result<u64> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file: TasksFile = self.load(&self.tasks_path())?;
        file.next_id += 1;
        let id = file.next_id;
        file.tasks.push(TaskItem {
            id,
            text: text.to_owned(),
            done: false,
            created_at: Utc::now(),
        });
        self.save(&self.tasks_path(), &file)?;
        Ok(id)
    }

    fn tasks(&self) -> Result<Vec<TaskItem>> {
        let file: TasksFile = self.load(&self.tasks_path())?;
        Ok(file.tasks)
    }

    fn task_done(&self, id: u64) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file: TasksFile = self.load(&self.tasks_path())?;
        let Some(task) = file.tasks.iter_mut().find(|t| t.id == id) else {
            return Ok(false);
        };
        task.done = true;
        self.save(&self.tasks_path(), &file)?;
        Ok(true)
    }

    fn journal_add(&self, text: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut journal: BTreeMap<String, Vec<String>> = self.load(&self.journal_path())?;
        journal
            .entry(Self::today_key())
            .or_default()
            .push(text.to_owned());
        self.save(&self.journal_path(), &journal)
    }

    fn journal_today(&self) -> Result<Vec<String>> {
        let journal: BTreeMap<String, Vec<String>> = self.load(&self.journal_path())?;
        Ok(journal.get(&Self::today_key()).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn store() -> (tempfile::TempDir, JsonStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn memory_roundtrip() {
        let (_dir, store) = store();
        store.memory_set("ism", "Ali").unwrap();
        assert_eq!(store.memory_get("ism").unwrap(), Some("Ali".to_owned()));
        assert_eq!(store.memory_get("yo'q").unwrap(), None);
        assert_eq!(store.memory_all().unwrap().len(), 1);
    }

    #[test]
    fn tasks_lifecycle() {
        let (_dir, store) = store();
        let first = store.task_add("non olish").unwrap();
        let second = store.task_add("kod yozish").unwrap();
        assert_ne!(first, second);

        assert!(store.task_done(first).unwrap());
        assert!(!store.task_done(999).unwrap());

        let tasks = store.tasks().unwrap();
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().find(|t| t.id == first).unwrap().done);
        assert!(!tasks.iter().find(|t| t.id == second).unwrap().done);
    }

    #[test]
    fn journal_is_day_keyed() {
        let (_dir, store) = store();
        store.journal_add("ertalab yugurdim").unwrap();
        store.journal_add("kitob o'qidim").unwrap();
        assert_eq!(
            store.journal_today().unwrap(),
            vec!["ertalab yugurdim".to_owned(), "kitob o'qidim".to_owned()]
        );
    }

    #[test]
    fn store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonStore::open(dir.path()).unwrap();
            store.memory_set("shahar", "Toshkent").unwrap();
        }
        let store = JsonStore::open(dir.path()).unwrap();
        assert_eq!(
            store.memory_get("shahar").unwrap(),
            Some("Toshkent".to_owned())
        );
    }
}
