pub mod lock;

mod fsio;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{io_err, Error, Result};
use crate::models::*;

pub use lock::LockGuard;

/// Name of the workspace directory inside a project.
pub const DIR_NAME: &str = ".tasks";

const SCHEMA_VERSION: u32 = 1;

const SUBDIRS: [&str; 6] = ["epics", "specs", "tasks", "reviews", "memory", "locks"];

/// Written once by `init`; its presence marks a valid workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub schema_version: u32,
    pub setup_version: String,
    pub created_at: DateTime<Utc>,
}

/// File-backed entity store rooted at a `.tasks/` directory.
///
/// Every record write replaces the whole file atomically, so reads take no
/// locks. Writers hold the advisory lock of the entity they modify for the
/// full read-modify-write.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    /// Create the directory layout, meta record and default config.
    /// Returns `false` in the second field when the workspace already existed.
    pub fn init(dir: impl Into<PathBuf>) -> Result<(Self, bool)> {
        let store = Self { dir: dir.into() };
        for sub in SUBDIRS {
            let path = store.dir.join(sub);
            fs::create_dir_all(&path).map_err(io_err(&path))?;
        }
        let meta_path = store.meta_path();
        if meta_path.exists() {
            return Ok((store, false));
        }
        if !store.config_path().exists() {
            fsio::write_json(&store.config_path(), &Config::default())?;
        }
        let meta = Meta {
            schema_version: SCHEMA_VERSION,
            setup_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
        };
        fsio::write_json(&meta_path, &meta)?;
        tracing::info!(dir = %store.dir.display(), "initialized workspace");
        Ok((store, true))
    }

    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { dir: dir.into() };
        if !store.meta_path().is_file() {
            return Err(Error::NotInitialized(store.dir));
        }
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn meta(&self) -> Result<Meta> {
        fsio::read_json(&self.meta_path())?.ok_or_else(|| Error::NotInitialized(self.dir.clone()))
    }

    pub fn lock(&self, key: &str) -> Result<LockGuard> {
        LockGuard::exclusive(&self.dir.join("locks"), key)
    }

    pub fn lock_shared(&self, key: &str) -> Result<LockGuard> {
        LockGuard::shared(&self.dir.join("locks"), key)
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join("meta.json")
    }

    fn config_path(&self) -> PathBuf {
        self.dir.join("config.json")
    }

    fn epic_path(&self, id: &EpicId) -> PathBuf {
        self.dir.join("epics").join(format!("{id}.json"))
    }

    fn task_path(&self, id: &TaskId) -> PathBuf {
        self.dir.join("tasks").join(format!("{id}.json"))
    }

    fn spec_path(&self, id: &EntityId) -> PathBuf {
        match id {
            EntityId::Epic(id) => self.dir.join("specs").join(format!("{id}.md")),
            EntityId::Task(id) => self.dir.join("tasks").join(format!("{id}.md")),
        }
    }

    fn review_path(&self, task: &TaskId) -> PathBuf {
        self.dir.join("reviews").join(format!("{task}.jsonl"))
    }

    fn memory_path(&self, category: MemoryCategory) -> PathBuf {
        self.dir
            .join("memory")
            .join(format!("{}.jsonl", category.stream_name()))
    }

    // ============================================================
    // Epic operations
    // ============================================================

    pub fn create_epic(&self, title: &str) -> Result<Epic> {
        let title = non_empty_title(title)?;
        let _guard = self.lock(lock::EPICS)?;
        let next = self
            .epic_ids()?
            .iter()
            .map(EpicId::seq)
            .max()
            .unwrap_or(0)
            + 1;
        let now = Utc::now();
        let epic = Epic {
            id: EpicId::generate(next),
            title: title.to_string(),
            status: EpicStatus::Planning,
            created_at: now,
            updated_at: now,
        };
        fsio::write_json(&self.epic_path(&epic.id), &epic)?;
        fsio::write_text(
            &self.spec_path(&EntityId::Epic(epic.id.clone())),
            &epic_spec_template(&epic.title),
        )?;
        tracing::info!(id = %epic.id, "created epic");
        Ok(epic)
    }

    pub fn find_epic(&self, id: &EpicId) -> Result<Option<Epic>> {
        fsio::read_json(&self.epic_path(id))
    }

    pub fn get_epic(&self, id: &EpicId) -> Result<Epic> {
        self.find_epic(id)?
            .ok_or_else(|| Error::NotFound(format!("epic {id}")))
    }

    /// Look up an epic or a task by id.
    pub fn get(&self, id: &EntityId) -> Result<Entity> {
        match id {
            EntityId::Epic(id) => self.get_epic(id).map(Entity::Epic),
            EntityId::Task(id) => self.get_task(id).map(Entity::Task),
        }
    }

    /// All epics in id order.
    pub fn list_epics(&self) -> Result<Vec<Epic>> {
        let mut epics = Vec::new();
        for id in self.epic_ids()? {
            if let Some(epic) = self.find_epic(&id)? {
                epics.push(epic);
            }
        }
        Ok(epics)
    }

    /// Read-modify-write an epic under its lock. Terminal epics are frozen.
    pub fn update_epic(
        &self,
        id: &EpicId,
        apply: impl FnOnce(&mut Epic) -> Result<()>,
    ) -> Result<Epic> {
        let _guard = self.lock(&id.to_string())?;
        let mut epic = self.get_epic(id)?;
        if epic.status.is_terminal() {
            return Err(Error::terminal(id, epic.status));
        }
        apply(&mut epic)?;
        epic.updated_at = Utc::now();
        fsio::write_json(&self.epic_path(id), &epic)?;
        Ok(epic)
    }

    fn epic_ids(&self) -> Result<Vec<EpicId>> {
        let mut ids: Vec<EpicId> = fsio::list_stems(&self.dir.join("epics"), "json")?
            .into_iter()
            .filter_map(|stem| match stem.parse() {
                Ok(id) => Some(id),
                Err(_) => {
                    tracing::warn!(file = %stem, "skipping epic record with unparseable name");
                    None
                }
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    // ============================================================
    // Task operations
    // ============================================================

    /// Insert a task into `epic`. Dependency edges are taken as given; the
    /// graph engine validates them before calling this.
    pub fn create_task(&self, epic_id: &EpicId, title: &str, deps: Vec<TaskId>) -> Result<Task> {
        let title = non_empty_title(title)?;
        let _guard = self.lock(&epic_id.to_string())?;
        let epic = self.get_epic(epic_id)?;
        if epic.status.is_terminal() {
            return Err(Error::terminal(epic_id, epic.status));
        }
        let next = self
            .task_ids()?
            .iter()
            .filter(|id| id.epic() == epic_id)
            .map(TaskId::seq)
            .max()
            .unwrap_or(0)
            + 1;
        let now = Utc::now();
        let task = Task {
            id: epic_id.task(next),
            epic_id: epic_id.clone(),
            title: title.to_string(),
            status: TaskStatus::Pending,
            depends_on: deps,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            summary: None,
        };
        fsio::write_json(&self.task_path(&task.id), &task)?;
        fsio::write_text(
            &self.spec_path(&EntityId::Task(task.id.clone())),
            &task_spec_template(&task.title),
        )?;
        tracing::info!(id = %task.id, deps = task.depends_on.len(), "created task");
        Ok(task)
    }

    pub fn find_task(&self, id: &TaskId) -> Result<Option<Task>> {
        fsio::read_json(&self.task_path(id))
    }

    pub fn get_task(&self, id: &TaskId) -> Result<Task> {
        self.find_task(id)?
            .ok_or_else(|| Error::NotFound(format!("task {id}")))
    }

    /// All tasks in creation order (`created_at`, then id).
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        for id in self.task_ids()? {
            if let Some(task) = self.find_task(&id)? {
                tasks.push(task);
            }
        }
        tasks.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(tasks)
    }

    pub fn list_epic_tasks(&self, epic: &EpicId) -> Result<Vec<Task>> {
        Ok(self
            .list_tasks()?
            .into_iter()
            .filter(|t| &t.epic_id == epic)
            .collect())
    }

    /// Read-modify-write a task under its lock. Terminal tasks are frozen.
    pub fn update_task(
        &self,
        id: &TaskId,
        apply: impl FnOnce(&mut Task) -> Result<()>,
    ) -> Result<Task> {
        let _guard = self.lock(&id.to_string())?;
        let mut task = self.get_task(id)?;
        if task.status.is_terminal() {
            return Err(Error::terminal(id, task.status));
        }
        apply(&mut task)?;
        task.updated_at = Utc::now();
        fsio::write_json(&self.task_path(id), &task)?;
        Ok(task)
    }

    fn task_ids(&self) -> Result<Vec<TaskId>> {
        let mut ids: Vec<TaskId> = fsio::list_stems(&self.dir.join("tasks"), "json")?
            .into_iter()
            .filter_map(|stem| match stem.parse() {
                Ok(id) => Some(id),
                Err(_) => {
                    tracing::warn!(file = %stem, "skipping task record with unparseable name");
                    None
                }
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    // ============================================================
    // Specification bodies
    // ============================================================

    pub fn read_spec(&self, id: &EntityId) -> Result<String> {
        self.ensure_exists(id)?;
        Ok(fsio::read_text(&self.spec_path(id))?.unwrap_or_default())
    }

    /// Replace a spec body. Frozen along with its terminal entity.
    pub fn write_spec(&self, id: &EntityId, body: &str) -> Result<()> {
        let _guard = self.lock(&id.to_string())?;
        let status = match id {
            EntityId::Epic(epic) => {
                let epic = self.get_epic(epic)?;
                epic.status.is_terminal().then(|| epic.status.to_string())
            }
            EntityId::Task(task) => {
                let task = self.get_task(task)?;
                task.status.is_terminal().then(|| task.status.to_string())
            }
        };
        if let Some(status) = status {
            return Err(Error::terminal(id, status));
        }
        fsio::write_text(&self.spec_path(id), body)
    }

    fn ensure_exists(&self, id: &EntityId) -> Result<()> {
        match id {
            EntityId::Epic(epic) => self.get_epic(epic).map(drop),
            EntityId::Task(task) => self.get_task(task).map(drop),
        }
    }

    // ============================================================
    // Review receipts
    // ============================================================

    /// Lock of a task's receipt stream.
    pub fn lock_reviews(&self, task: &TaskId) -> Result<LockGuard> {
        self.lock(&format!("review-{task}"))
    }

    pub fn read_receipts(&self, task: &TaskId) -> Result<Vec<ReviewReceipt>> {
        fsio::read_lines(&self.review_path(task))
    }

    /// Append a receipt built from the receipts already recorded, holding
    /// the stream's lock so iteration numbers stay contiguous.
    pub fn append_receipt(
        &self,
        task: &TaskId,
        build: impl FnOnce(&[ReviewReceipt]) -> Result<ReviewReceipt>,
    ) -> Result<ReviewReceipt> {
        let _guard = self.lock_reviews(task)?;
        let existing = self.read_receipts(task)?;
        let receipt = build(&existing)?;
        fsio::append_line(&self.review_path(task), &receipt)?;
        Ok(receipt)
    }

    // ============================================================
    // Memory streams
    // ============================================================

    pub fn append_memory(&self, category: MemoryCategory, text: &str) -> Result<MemoryEntry> {
        let _guard = self.lock(&format!("memory-{}", category.stream_name()))?;
        let record = MemoryRecord {
            timestamp: Utc::now(),
            text: text.to_string(),
        };
        fsio::append_line(&self.memory_path(category), &record)?;
        Ok(MemoryEntry {
            category,
            timestamp: record.timestamp,
            text: record.text,
        })
    }

    pub fn read_memory(&self, category: MemoryCategory) -> Result<Vec<MemoryEntry>> {
        let records: Vec<MemoryRecord> = fsio::read_lines(&self.memory_path(category))?;
        Ok(records
            .into_iter()
            .map(|r| MemoryEntry {
                category,
                timestamp: r.timestamp,
                text: r.text,
            })
            .collect())
    }

    // ============================================================
    // Configuration
    // ============================================================

    pub fn read_config(&self) -> Result<Config> {
        Ok(fsio::read_json::<Config>(&self.config_path())?
            .unwrap_or_default()
            .normalized())
    }

    pub fn update_config(&self, apply: impl FnOnce(&mut Config) -> Result<()>) -> Result<Config> {
        let _guard = self.lock(lock::CONFIG)?;
        let mut config = self.read_config()?;
        apply(&mut config)?;
        fsio::write_json(&self.config_path(), &config)?;
        Ok(config)
    }
}

fn non_empty_title(title: &str) -> Result<&str> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::Invalid("title must not be empty".to_string()));
    }
    Ok(title)
}
