//! Record and spec persistence.
//!
//! [`RecordStore`] and [`SpecStore`] are the boundaries the generator and the
//! runtime talk to. [`JsonStore`] implements both over one workspace state
//! guarded by a single mutex, optionally mirrored to `workspace.json`; it also
//! keeps the app registry (source reference and saved field model per app).
//!
//! A file-backed store shares `workspace.json` with other processes. Every
//! access holds `workspace.lock` (shared for reads, exclusive for mutations)
//! and re-reads the file under it, so a mutation always applies to the latest
//! persisted state.

use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    data::{RecordData, display_value},
    error::{AppError, Result},
    layout::LayoutSpec,
    model::FieldModel,
    source::SourceRef,
};

pub const WORKSPACE_FILE_NAME: &str = "workspace.json";
pub const WORKSPACE_LOCK_NAME: &str = "workspace.lock";
pub const MAX_TAKE: usize = 100;

/// Records belong to one generated layout: an app at a spec version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub app: String,
    pub version: u32,
}

impl Scope {
    pub fn new(app: &str, version: u32) -> Self {
        Self {
            app: app.to_string(),
            version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub scope: Scope,
    pub data: RecordData,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Record {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Field the query is matched against; no filtering without it.
    pub search_key: Option<String>,
    pub query: Option<String>,
    pub skip: usize,
    pub take: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            search_key: None,
            query: None,
            skip: 0,
            take: MAX_TAKE,
        }
    }
}

impl ListQuery {
    pub fn search(search_key: &str, query: &str) -> Self {
        Self {
            search_key: Some(search_key.to_string()),
            query: Some(query.to_string()),
            ..Self::default()
        }
    }

    fn needle(&self) -> Option<(&str, String)> {
        let key = self.search_key.as_deref()?;
        let query = self.query.as_deref()?.trim();
        (!query.is_empty()).then(|| (key, query.to_lowercase()))
    }

    pub fn matches(&self, data: &RecordData) -> bool {
        match self.needle() {
            None => true,
            Some((key, needle)) => data
                .get(key)
                .map(|value| display_value(value).to_lowercase().contains(&needle))
                .unwrap_or(false),
        }
    }

    pub fn effective_take(&self) -> usize {
        self.take.clamp(1, MAX_TAKE)
    }
}

/// One page of live records plus the filtered total.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPage {
    pub total: usize,
    pub records: Vec<Record>,
}

pub trait RecordStore: Send + Sync {
    /// Live records of `scope` in creation order, filtered and paged.
    fn list(&self, scope: &Scope, query: &ListQuery) -> Result<RecordPage>;

    fn create(&self, scope: &Scope, data: RecordData) -> Result<Record>;

    /// Inserts every row or none of them; returns the count inserted.
    fn create_batch(&self, scope: &Scope, rows: Vec<RecordData>) -> Result<usize>;

    /// The live record `id` of `scope`, wherever it falls in the listing.
    fn fetch(&self, scope: &Scope, id: &str) -> Result<Record>;

    /// Replaces `data` wholesale. Last write wins; no concurrency token.
    fn update(&self, scope: &Scope, id: &str, data: RecordData) -> Result<Record>;

    fn soft_delete(&self, scope: &Scope, id: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpecStatus {
    Draft,
    Active,
    Archived,
}

impl SpecStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecStatus::Draft => "DRAFT",
            SpecStatus::Active => "ACTIVE",
            SpecStatus::Archived => "ARCHIVED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSpec {
    pub app: String,
    pub version: u32,
    pub status: SpecStatus,
    pub created_at: DateTime<Utc>,
    pub spec: LayoutSpec,
}

/// Builds the spec for the version the store assigned.
pub type SpecFactory<'a> = dyn FnMut(u32) -> Result<LayoutSpec> + 'a;

pub trait SpecStore: Send + Sync {
    /// Assigns `max(version) + 1` and inserts the built spec in one atomic step.
    fn create_next_version(
        &self,
        app: &str,
        status: SpecStatus,
        build: &mut SpecFactory<'_>,
    ) -> Result<StoredSpec>;

    fn get(&self, app: &str, version: u32) -> Result<StoredSpec>;

    /// Highest-versioned ACTIVE spec.
    fn active(&self, app: &str) -> Result<StoredSpec>;

    /// Every retained version, oldest first.
    fn versions(&self, app: &str) -> Result<Vec<StoredSpec>>;

    /// Makes `version` the ACTIVE spec and archives any other ACTIVE one.
    fn activate(&self, app: &str, version: u32) -> Result<StoredSpec>;
}

/// Registered app: where its rows come from and its confirmed field model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppEntry {
    pub slug: String,
    pub name: String,
    pub source: SourceRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<FieldModel>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct WorkspaceState {
    apps: BTreeMap<String, AppEntry>,
    specs: Vec<StoredSpec>,
    records: Vec<Record>,
}

/// Mutex-guarded workspace state, persisted after every mutation when file-backed.
#[derive(Debug, Default)]
pub struct JsonStore {
    path: Option<PathBuf>,
    state: Mutex<WorkspaceState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Holds `workspace.lock` until dropped; closing the file releases the lock.
#[derive(Debug)]
struct WorkspaceLock {
    _file: File,
}

impl WorkspaceLock {
    fn acquire(path: &Path, mode: LockMode) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|err| AppError::storage(format!("Opening lock file {path:?}: {err}")))?;
        // fs2's methods, not the inherent `File` locks of newer toolchains.
        let locked = match mode {
            LockMode::Shared => FileExt::lock_shared(&file),
            LockMode::Exclusive => FileExt::lock_exclusive(&file),
        };
        locked.map_err(|err| AppError::storage(format!("Locking {path:?}: {err}")))?;
        Ok(Self { _file: file })
    }
}

fn load_state(path: &Path) -> Result<WorkspaceState> {
    if !path.exists() {
        return Ok(WorkspaceState::default());
    }
    let file =
        File::open(path).map_err(|err| AppError::storage(format!("Opening {path:?}: {err}")))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|err| AppError::storage(format!("Parsing {path:?}: {err}")))
}

impl JsonStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens `<dir>/workspace.json`, creating the directory if needed.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .map_err(|err| AppError::storage(format!("Creating workspace {dir:?}: {err}")))?;
        let path = dir.join(WORKSPACE_FILE_NAME);
        let state = {
            let _lock = WorkspaceLock::acquire(&dir.join(WORKSPACE_LOCK_NAME), LockMode::Shared)?;
            load_state(&path)?
        };
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// Locks the state and, when file-backed, the lock file, then reloads from disk.
    fn lock(
        &self,
        mode: LockMode,
    ) -> Result<(MutexGuard<'_, WorkspaceState>, Option<WorkspaceLock>)> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| AppError::storage("Workspace state lock poisoned"))?;
        let Some(path) = &self.path else {
            return Ok((guard, None));
        };
        let lock = WorkspaceLock::acquire(&path.with_file_name(WORKSPACE_LOCK_NAME), mode)?;
        *guard = load_state(path)?;
        Ok((guard, Some(lock)))
    }

    fn read(&self) -> Result<MutexGuard<'_, WorkspaceState>> {
        let (guard, _lock) = self.lock(LockMode::Shared)?;
        Ok(guard)
    }

    fn persist(&self, state: &WorkspaceState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let tmp = path.with_extension("json.tmp");
        let write = || -> std::io::Result<()> {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, state)?;
            writer.flush()?;
            drop(writer);
            fs::rename(&tmp, path)
        };
        write().map_err(|err| AppError::storage(format!("Writing {path:?}: {err}")))
    }

    /// Applies `change` to the latest state and persists, holding the exclusive
    /// lock throughout; the in-memory state is rolled back if either fails.
    fn mutate<T>(&self, change: impl FnOnce(&mut WorkspaceState) -> Result<T>) -> Result<T> {
        let (mut guard, _lock) = self.lock(LockMode::Exclusive)?;
        let snapshot = self.path.is_some().then(|| guard.clone());
        let outcome = change(&mut *guard).and_then(|value| {
            self.persist(&*guard)?;
            Ok(value)
        });
        if outcome.is_err()
            && let Some(snapshot) = snapshot
        {
            *guard = snapshot;
        }
        outcome
    }

    pub fn upsert_app(&self, slug: &str, name: &str, source: SourceRef) -> Result<AppEntry> {
        self.mutate(|state| {
            let entry = state
                .apps
                .entry(slug.to_string())
                .and_modify(|entry| {
                    entry.name = name.to_string();
                    entry.source = source.clone();
                })
                .or_insert_with(|| AppEntry {
                    slug: slug.to_string(),
                    name: name.to_string(),
                    source: source.clone(),
                    model: None,
                    created_at: Utc::now(),
                });
            Ok(entry.clone())
        })
    }

    pub fn app(&self, slug: &str) -> Result<AppEntry> {
        self.read()?
            .apps
            .get(slug)
            .cloned()
            .ok_or_else(|| AppError::AppNotFound(slug.to_string()))
    }

    /// Persists the confirmed model, stamping `updatedAt`.
    pub fn save_model(&self, slug: &str, mut model: FieldModel) -> Result<FieldModel> {
        model.updated_at = Some(Utc::now());
        self.mutate(|state| {
            let entry = state
                .apps
                .get_mut(slug)
                .ok_or_else(|| AppError::AppNotFound(slug.to_string()))?;
            entry.model = Some(model.clone());
            Ok(model)
        })
    }
}

fn find_live<'a>(records: &'a mut [Record], scope: &Scope, id: &str) -> Result<&'a mut Record> {
    records
        .iter_mut()
        .find(|r| r.id == id && r.scope == *scope && r.is_live())
        .ok_or_else(|| AppError::RecordNotFound(id.to_string()))
}

fn new_record(scope: &Scope, data: RecordData) -> Record {
    let now = Utc::now();
    Record {
        id: Uuid::new_v4().to_string(),
        scope: scope.clone(),
        data,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

impl RecordStore for JsonStore {
    fn list(&self, scope: &Scope, query: &ListQuery) -> Result<RecordPage> {
        let state = self.read()?;
        let matching = state
            .records
            .iter()
            .filter(|r| r.scope == *scope && r.is_live() && query.matches(&r.data))
            .collect::<Vec<_>>();
        Ok(RecordPage {
            total: matching.len(),
            records: matching
                .into_iter()
                .skip(query.skip)
                .take(query.effective_take())
                .cloned()
                .collect(),
        })
    }

    fn fetch(&self, scope: &Scope, id: &str) -> Result<Record> {
        self.read()?
            .records
            .iter()
            .find(|r| r.id == id && r.scope == *scope && r.is_live())
            .cloned()
            .ok_or_else(|| AppError::RecordNotFound(id.to_string()))
    }

    fn create(&self, scope: &Scope, data: RecordData) -> Result<Record> {
        self.mutate(|state| {
            let record = new_record(scope, data);
            state.records.push(record.clone());
            Ok(record)
        })
    }

    fn create_batch(&self, scope: &Scope, rows: Vec<RecordData>) -> Result<usize> {
        self.mutate(|state| {
            let count = rows.len();
            state
                .records
                .extend(rows.into_iter().map(|data| new_record(scope, data)));
            Ok(count)
        })
    }

    fn update(&self, scope: &Scope, id: &str, data: RecordData) -> Result<Record> {
        self.mutate(|state| {
            let record = find_live(&mut state.records, scope, id)?;
            record.data = data;
            record.updated_at = Utc::now();
            Ok(record.clone())
        })
    }

    fn soft_delete(&self, scope: &Scope, id: &str) -> Result<()> {
        self.mutate(|state| {
            let record = find_live(&mut state.records, scope, id)?;
            let now = Utc::now();
            record.deleted_at = Some(now);
            record.updated_at = now;
            Ok(())
        })
    }
}

fn spec_not_found(app: &str, version: u32) -> AppError {
    AppError::SpecNotFound(format!("'{app}' version {version}"))
}

impl SpecStore for JsonStore {
    fn create_next_version(
        &self,
        app: &str,
        status: SpecStatus,
        build: &mut SpecFactory<'_>,
    ) -> Result<StoredSpec> {
        self.mutate(|state| {
            let version = state
                .specs
                .iter()
                .filter(|s| s.app == app)
                .map(|s| s.version)
                .max()
                .unwrap_or(0)
                + 1;
            let spec = build(version)?;
            if status == SpecStatus::Active {
                archive_active(&mut state.specs, app, version);
            }
            let stored = StoredSpec {
                app: app.to_string(),
                version,
                status,
                created_at: Utc::now(),
                spec,
            };
            state.specs.push(stored.clone());
            debug!("Stored layout spec v{version} for '{app}' as {}", status.as_str());
            Ok(stored)
        })
    }

    fn get(&self, app: &str, version: u32) -> Result<StoredSpec> {
        self.read()?
            .specs
            .iter()
            .find(|s| s.app == app && s.version == version)
            .cloned()
            .ok_or_else(|| spec_not_found(app, version))
    }

    fn active(&self, app: &str) -> Result<StoredSpec> {
        self.read()?
            .specs
            .iter()
            .filter(|s| s.app == app && s.status == SpecStatus::Active)
            .max_by_key(|s| s.version)
            .cloned()
            .ok_or_else(|| AppError::SpecNotFound(format!("'{app}' (not generated yet)")))
    }

    fn versions(&self, app: &str) -> Result<Vec<StoredSpec>> {
        let mut specs = self
            .read()?
            .specs
            .iter()
            .filter(|s| s.app == app)
            .cloned()
            .collect::<Vec<_>>();
        specs.sort_by_key(|s| s.version);
        Ok(specs)
    }

    fn activate(&self, app: &str, version: u32) -> Result<StoredSpec> {
        self.mutate(|state| {
            if !state.specs.iter().any(|s| s.app == app && s.version == version) {
                return Err(spec_not_found(app, version));
            }
            archive_active(&mut state.specs, app, version);
            let target = state
                .specs
                .iter_mut()
                .find(|s| s.app == app && s.version == version)
                .ok_or_else(|| spec_not_found(app, version))?;
            target.status = SpecStatus::Active;
            Ok(target.clone())
        })
    }
}

fn archive_active(specs: &mut [StoredSpec], app: &str, except: u32) {
    for spec in specs
        .iter_mut()
        .filter(|s| s.app == app && s.version != except && s.status == SpecStatus::Active)
    {
        spec.status = SpecStatus::Archived;
    }
}
