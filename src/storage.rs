use crate::config::Config;
use crate::model::{SuggestionKind, Suggestions};
use crate::records::{
    decode_project_records, DecodeReport, ProjectRecord, SettingsRecord, SuggestionRecord,
    COLLAPSED_SETTING_ID,
};
use anyhow::Context;
use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

pub const PROJECT_DIR_NAME: &str = ".taskpad";

const TASKS_DIR: &str = "tasks";
const SUGGESTIONS_DIR: &str = "suggestions";
const TASKS_FILE: &str = "tasks.json";
const SETTINGS_FILE: &str = "settings.json";
const SUGGESTIONS_FILE: &str = "dropdownValues.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreScope {
    Project,
    Global,
    Explicit,
}

impl StoreScope {
    pub fn label(&self) -> &'static str {
        match self {
            StoreScope::Project => "project",
            StoreScope::Global => "global",
            StoreScope::Explicit => "custom",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreLocation {
    pub dir: PathBuf,
    pub scope: StoreScope,
}

impl StoreLocation {
    pub fn log_path(&self) -> PathBuf {
        self.dir.join("taskpad.log")
    }
}

/// The two independent stores of a data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Tasks,
    Suggestions,
}

impl StoreKind {
    pub fn label(&self) -> &'static str {
        match self {
            StoreKind::Tasks => "tasks",
            StoreKind::Suggestions => "dropdownValues",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("cannot open store at {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("reading {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("store file {path:?} is not a JSON array of records")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("writing {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("encoding record")]
    Encode(#[from] serde_json::Error),
    #[error("record has no string `{0}` key")]
    MissingKey(&'static str),
}

/// A JSON file holding an array of records, each identified by the string
/// field named by `key_path`. Every write replaces the whole file.
#[derive(Debug)]
struct RecordStore {
    path: PathBuf,
    key_path: &'static str,
}

impl RecordStore {
    fn open(path: PathBuf, key_path: &'static str) -> Result<Self, StoreError> {
        let store = RecordStore { path, key_path };
        if !store.path.exists() {
            debug!(path = ?store.path, "creating record store");
            store.write_all(&[])?;
        }
        Ok(store)
    }

    fn get_all(&self) -> Result<Vec<Value>, StoreError> {
        let data = fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&data).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .get_all()?
            .into_iter()
            .find(|record| self.key_of(record) == Some(key)))
    }

    fn put(&self, record: Value) -> Result<(), StoreError> {
        let key = self
            .key_of(&record)
            .ok_or(StoreError::MissingKey(self.key_path))?
            .to_string();
        let mut records = self.get_all()?;
        match records
            .iter_mut()
            .find(|existing| self.key_of(existing) == Some(key.as_str()))
        {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.write_all(&records)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut records = self.get_all()?;
        let before = records.len();
        records.retain(|record| self.key_of(record) != Some(key));
        if records.len() == before {
            return Ok(false);
        }
        self.write_all(&records)?;
        Ok(true)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.write_all(&[])
    }

    /// Clear-then-put-all in one file replacement. A later record with the
    /// same key overwrites an earlier one in place.
    fn replace_all(&self, records: Vec<Value>) -> Result<(), StoreError> {
        let mut keyed: Vec<Value> = Vec::with_capacity(records.len());
        for record in records {
            let key = self
                .key_of(&record)
                .ok_or(StoreError::MissingKey(self.key_path))?
                .to_string();
            match keyed
                .iter_mut()
                .find(|existing| self.key_of(existing) == Some(key.as_str()))
            {
                Some(existing) => *existing = record,
                None => keyed.push(record),
            }
        }
        self.write_all(&keyed)
    }

    fn key_of<'a>(&self, record: &'a Value) -> Option<&'a str> {
        record.get(self.key_path).and_then(Value::as_str)
    }

    fn write_all(&self, records: &[Value]) -> Result<(), StoreError> {
        let write_err = |source: io::Error| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        serde_json::to_writer_pretty(&mut tmp, records)?;
        tmp.write_all(b"\n").map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|err| write_err(err.error))?;
        Ok(())
    }
}

/// The persistence service: both stores of one data directory, opened once
/// and held for the whole session.
#[derive(Debug)]
pub struct Store {
    location: StoreLocation,
    tasks: RecordStore,
    settings: RecordStore,
    suggestions: RecordStore,
}

impl Store {
    /// Opens both stores, creating any missing directory or file. A store
    /// written before settings existed gains an empty settings file here.
    pub fn open(location: StoreLocation) -> Result<Self, StoreError> {
        let tasks_dir = location.dir.join(TASKS_DIR);
        let suggestions_dir = location.dir.join(SUGGESTIONS_DIR);
        for dir in [&tasks_dir, &suggestions_dir] {
            fs::create_dir_all(dir).map_err(|source| StoreError::Open {
                path: dir.clone(),
                source,
            })?;
        }
        let store = Store {
            tasks: RecordStore::open(tasks_dir.join(TASKS_FILE), "project")?,
            settings: RecordStore::open(tasks_dir.join(SETTINGS_FILE), "id")?,
            suggestions: RecordStore::open(suggestions_dir.join(SUGGESTIONS_FILE), "type")?,
            location,
        };
        debug!(dir = ?store.location.dir, scope = store.location.scope.label(), "store opened");
        Ok(store)
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    pub fn close(self) {
        debug!(dir = ?self.location.dir, "store closed");
    }

    /// Raw records of one store, exactly as persisted.
    pub fn records(&self, kind: StoreKind) -> Result<Vec<Value>, StoreError> {
        match kind {
            StoreKind::Tasks => self.tasks.get_all(),
            StoreKind::Suggestions => self.suggestions.get_all(),
        }
    }

    /// All project records. A store that cannot be read yields nothing.
    pub fn load_tasks(&self) -> (Vec<ProjectRecord>, DecodeReport) {
        match self.tasks.get_all() {
            Ok(values) => {
                let (records, report) = decode_project_records(values);
                debug!(projects = records.len(), "tasks loaded");
                (records, report)
            }
            Err(err) => {
                warn!(error = %err, "loading tasks failed, starting empty");
                (Vec::new(), DecodeReport::default())
            }
        }
    }

    /// Replaces every task record with `records`.
    pub fn save_all(&self, records: &[ProjectRecord]) -> Result<(), StoreError> {
        let values = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        self.tasks.replace_all(values)?;
        debug!(projects = records.len(), "tasks saved");
        Ok(())
    }

    pub fn remove_project(&self, name: &str) -> Result<bool, StoreError> {
        let removed = self.tasks.delete(name)?;
        debug!(project = name, removed, "project record deleted");
        Ok(removed)
    }

    pub fn load_collapsed(&self) -> Vec<String> {
        match read_record::<SettingsRecord>(&self.settings, COLLAPSED_SETTING_ID) {
            Ok(Some(settings)) => settings.projects,
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(error = %err, "loading collapsed state failed");
                Vec::new()
            }
        }
    }

    pub fn save_collapsed(&self, projects: &[String]) -> Result<(), StoreError> {
        let record = SettingsRecord {
            id: COLLAPSED_SETTING_ID.to_string(),
            projects: projects.to_vec(),
        };
        self.settings.put(serde_json::to_value(record)?)
    }

    pub fn load_suggestions(&self, kind: SuggestionKind) -> Vec<String> {
        match read_record::<SuggestionRecord>(&self.suggestions, kind.key()) {
            Ok(Some(record)) => record.values,
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(kind = kind.key(), error = %err, "loading suggestions failed");
                Vec::new()
            }
        }
    }

    pub fn load_all_suggestions(&self) -> Suggestions {
        let mut suggestions = Suggestions::default();
        for kind in SuggestionKind::ALL {
            suggestions.set(kind, self.load_suggestions(kind));
        }
        suggestions
    }

    /// Appends `value` to the `kind` list unless it is blank or already
    /// present. Returns whether anything was written.
    pub fn put_append(&self, kind: SuggestionKind, value: &str) -> Result<bool, StoreError> {
        if value.trim().is_empty() {
            return Ok(false);
        }
        let mut values = read_record::<SuggestionRecord>(&self.suggestions, kind.key())?
            .map(|record| record.values)
            .unwrap_or_default();
        if values.iter().any(|v| v == value) {
            return Ok(false);
        }
        values.push(value.to_string());
        let record = SuggestionRecord {
            kind: kind.key().to_string(),
            values,
        };
        self.suggestions.put(serde_json::to_value(record)?)?;
        Ok(true)
    }

    /// Empties a whole store. For tasks this includes the settings records.
    pub fn delete_all(&self, kind: StoreKind) -> Result<(), StoreError> {
        match kind {
            StoreKind::Tasks => {
                self.tasks.clear()?;
                self.settings.clear()?;
            }
            StoreKind::Suggestions => self.suggestions.clear()?,
        }
        debug!(store = kind.label(), "store cleared");
        Ok(())
    }
}

fn read_record<T: DeserializeOwned>(store: &RecordStore, key: &str) -> Result<Option<T>, StoreError> {
    match store.get(key)? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Resolves where the stores live: explicit path, then the configured
/// `data_dir`, then a `.taskpad` directory above `start`, then the platform
/// data directory.
pub fn locate_store(
    explicit: Option<PathBuf>,
    config: &Config,
    start: &Path,
) -> anyhow::Result<StoreLocation> {
    if let Some(dir) = explicit.or_else(|| config.data_dir.clone()) {
        return Ok(StoreLocation {
            dir,
            scope: StoreScope::Explicit,
        });
    }
    if let Some(dir) = find_project_store(start) {
        return Ok(StoreLocation {
            dir,
            scope: StoreScope::Project,
        });
    }
    Ok(StoreLocation {
        dir: global_store_dir()?,
        scope: StoreScope::Global,
    })
}

pub fn init_project_store(cwd: &Path) -> Result<StoreLocation, StoreError> {
    let location = StoreLocation {
        dir: cwd.join(PROJECT_DIR_NAME),
        scope: StoreScope::Project,
    };
    Store::open(location.clone())?.close();
    Ok(location)
}

fn find_project_store(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        let candidate = current.join(PROJECT_DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}

fn global_store_dir() -> anyhow::Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "taskpad").context("locating data directory")?;
    Ok(dirs.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewTask, Task, TaskBook};
    use crate::records::{into_book, to_records};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn open_store(tmp: &TempDir) -> Store {
        Store::open(StoreLocation {
            dir: tmp.path().join("data"),
            scope: StoreScope::Explicit,
        })
        .unwrap()
    }

    fn sample_book() -> TaskBook {
        let mut book = TaskBook::default();
        for (project, text) in [("Acme", "Follow up"), ("Acme", "Send quote"), ("Beta", "Plan")] {
            let task = Task::new(
                &NewTask {
                    task_type: "Call".into(),
                    person: "Sam".into(),
                    project: project.into(),
                    text: text.into(),
                    ..NewTask::default()
                },
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            );
            book.add_task(project, task);
        }
        book
    }

    #[test]
    fn open_creates_both_stores() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);
        let dir = &store.location().dir;
        assert!(dir.join("tasks/tasks.json").exists());
        assert!(dir.join("tasks/settings.json").exists());
        assert!(dir.join("suggestions/dropdownValues.json").exists());
        assert!(store.records(StoreKind::Tasks).unwrap().is_empty());
    }

    #[test]
    fn open_adds_settings_file_to_older_store() {
        let tmp = TempDir::new().unwrap();
        let tasks_dir = tmp.path().join("data/tasks");
        fs::create_dir_all(&tasks_dir).unwrap();
        fs::write(
            tasks_dir.join("tasks.json"),
            r#"[{"project":"Acme","tasks":[{"taskType":"Call","taskText":"hi"}]}]"#,
        )
        .unwrap();
        let store = open_store(&tmp);
        assert!(tasks_dir.join("settings.json").exists());
        let (records, report) = store.load_tasks();
        assert!(report.is_clean());
        assert_eq!(records[0].project, "Acme");
        assert!(store.load_collapsed().is_empty());
    }

    #[test]
    fn save_all_replaces_previous_content() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);
        let mut book = sample_book();
        store.save_all(&to_records(&book)).unwrap();
        book.delete_task("Beta", 0).unwrap();
        store.save_all(&to_records(&book)).unwrap();

        let (records, _) = store.load_tasks();
        assert_eq!(records.len(), 1);
        assert_eq!(into_book(records), book);
        let raw = store.records(StoreKind::Tasks).unwrap();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0]["project"], "Acme");
    }

    #[test]
    fn saving_twice_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);
        let records = to_records(&sample_book());
        let path = store.location().dir.join("tasks/tasks.json");
        store.save_all(&records).unwrap();
        let first = fs::read_to_string(&path).unwrap();
        store.save_all(&records).unwrap();
        assert_eq!(first, fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn unreadable_tasks_file_loads_as_empty() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);
        fs::write(store.location().dir.join("tasks/tasks.json"), "{not json").unwrap();
        let (records, _) = store.load_tasks();
        assert!(records.is_empty());
        assert!(matches!(
            store.records(StoreKind::Tasks),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn remove_project_deletes_one_record() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);
        store.save_all(&to_records(&sample_book())).unwrap();
        assert!(store.remove_project("Acme").unwrap());
        assert!(!store.remove_project("Acme").unwrap());
        let (records, _) = store.load_tasks();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].project, "Beta");
    }

    #[test]
    fn collapsed_state_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);
        store.save_collapsed(&["Acme".to_string()]).unwrap();
        store.save_collapsed(&["Acme".to_string(), "Beta".to_string()]).unwrap();
        assert_eq!(store.load_collapsed(), ["Acme", "Beta"]);
        let raw = fs::read_to_string(store.location().dir.join("tasks/settings.json")).unwrap();
        assert!(raw.contains("\"collapsedProjects\""));
        assert_eq!(raw.matches("\"id\"").count(), 1);
    }

    #[test]
    fn put_append_skips_duplicates_and_blanks() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);
        assert!(store.put_append(SuggestionKind::People, "Sam").unwrap());
        assert!(!store.put_append(SuggestionKind::People, "Sam").unwrap());
        assert!(!store.put_append(SuggestionKind::People, "  ").unwrap());
        assert!(store.put_append(SuggestionKind::People, "Kim").unwrap());
        assert!(store.put_append(SuggestionKind::Projects, "Acme").unwrap());
        assert_eq!(store.load_suggestions(SuggestionKind::People), ["Sam", "Kim"]);
        let all = store.load_all_suggestions();
        assert_eq!(all.projects, ["Acme"]);
        assert!(all.task_types.is_empty());
    }

    #[test]
    fn delete_all_only_touches_its_store() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp);
        store.save_all(&to_records(&sample_book())).unwrap();
        store.save_collapsed(&["Acme".to_string()]).unwrap();
        store.put_append(SuggestionKind::TaskTypes, "Call").unwrap();

        store.delete_all(StoreKind::Tasks).unwrap();
        assert!(store.load_tasks().0.is_empty());
        assert!(store.load_collapsed().is_empty());
        assert_eq!(store.load_suggestions(SuggestionKind::TaskTypes), ["Call"]);

        store.delete_all(StoreKind::Suggestions).unwrap();
        assert!(store.records(StoreKind::Suggestions).unwrap().is_empty());
    }

    #[test]
    fn locate_prefers_explicit_then_project_directory() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("repo/src/deep");
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir_all(tmp.path().join("repo").join(PROJECT_DIR_NAME)).unwrap();

        let config = Config::default();
        let found = locate_store(None, &config, &nested).unwrap();
        assert_eq!(found.scope, StoreScope::Project);
        assert_eq!(found.dir, tmp.path().join("repo").join(PROJECT_DIR_NAME));

        let explicit = locate_store(Some(tmp.path().join("x")), &config, &nested).unwrap();
        assert_eq!(explicit.scope, StoreScope::Explicit);
        assert_eq!(explicit.dir, tmp.path().join("x"));
    }

    #[test]
    fn init_project_store_opens_stores_in_cwd() {
        let tmp = TempDir::new().unwrap();
        let location = init_project_store(tmp.path()).unwrap();
        assert_eq!(location.scope, StoreScope::Project);
        assert!(location.dir.join("tasks/tasks.json").exists());
    }
}
