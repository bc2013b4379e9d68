use crate::config::Config;
use crate::model::{today, NewTask, SuggestionKind, Suggestions, Task, TaskBook};
use crate::records::{into_book, to_records, DecodeReport};
use crate::render::{project_views, ProjectView};
use crate::storage::{Store, StoreKind, StoreLocation};
use crate::transfer::{export_all, read_import, ExportOutcome};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

/// One open store plus the in-memory model it mirrors. Every mutating call
/// updates the model first and then rewrites the affected store records.
pub struct Session {
    store: Store,
    book: TaskBook,
    suggestions: Suggestions,
    config: Config,
    load_report: DecodeReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub projects: usize,
    pub tasks: usize,
    pub report: DecodeReport,
}

impl Session {
    pub fn open(location: StoreLocation, config: Config) -> Result<Self> {
        let store = Store::open(location).context("opening task store")?;
        let (records, load_report) = store.load_tasks();
        let mut book = into_book(records);
        book.sort_completed_last();
        book.restore_collapsed(store.load_collapsed());
        let suggestions = store.load_all_suggestions();
        if !load_report.is_clean() {
            warn!(?load_report, "some stored tasks could not be read");
        }
        Ok(Session {
            store,
            book,
            suggestions,
            config,
            load_report,
        })
    }

    pub fn close(self) {
        self.store.close();
    }

    pub fn book(&self) -> &TaskBook {
        &self.book
    }

    pub fn suggestions(&self) -> &Suggestions {
        &self.suggestions
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn location(&self) -> &StoreLocation {
        self.store.location()
    }

    pub fn load_report(&self) -> DecodeReport {
        self.load_report
    }

    pub fn views(&self, reveal_completed: bool) -> Vec<ProjectView> {
        project_views(&self.book, today(), &self.config, reveal_completed)
    }

    /// Validates the input, records its suggestions, appends the task and
    /// saves. Returns the project name and the task's index.
    pub fn add_task(&mut self, input: &NewTask) -> Result<(String, usize)> {
        input.validate()?;
        let project = input.project.trim().to_string();
        for (kind, value) in [
            (SuggestionKind::TaskTypes, input.task_type.trim()),
            (SuggestionKind::People, input.person.trim()),
            (SuggestionKind::Projects, project.as_str()),
        ] {
            self.store
                .put_append(kind, value)
                .with_context(|| format!("saving {} suggestion", kind.key()))?;
            self.suggestions.insert(kind, value);
        }
        let index = self.book.add_task(&project, Task::new(input, today()));
        self.save()?;
        info!(project = %project, index, "task added");
        Ok((project, index))
    }

    pub fn toggle_complete(&mut self, project: &str, index: usize) -> Result<bool> {
        let completed = self.book.toggle_complete(project, index)?;
        self.save()?;
        Ok(completed)
    }

    /// Deletes a task; returns `true` when this removed the whole project.
    pub fn delete_task(&mut self, project: &str, index: usize) -> Result<bool> {
        let removed = self.book.delete_task(project, index)?;
        if removed {
            self.store
                .remove_project(project)
                .with_context(|| format!("removing project {}", project))?;
            self.save_collapsed()?;
            info!(project, "project removed");
        } else {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn set_notes(&mut self, project: &str, index: usize, notes: &str) -> Result<()> {
        self.book.set_notes(project, index, notes)?;
        self.save()
    }

    pub fn toggle_collapsed(&mut self, project: &str) -> Result<bool> {
        let collapsed = self.book.toggle_collapsed(project)?;
        self.save_collapsed()?;
        Ok(collapsed)
    }

    /// Replaces every task with the contents of an import file.
    pub fn import_file(&mut self, path: &Path) -> Result<ImportSummary> {
        let (records, report) =
            read_import(path).with_context(|| format!("importing {}", path.display()))?;
        let collapsed = self.book.collapsed_projects();
        let mut book = into_book(records);
        book.restore_collapsed(collapsed);
        self.book = book;
        self.save()?;
        self.save_collapsed()?;
        let summary = ImportSummary {
            projects: self.book.projects.len(),
            tasks: self.book.task_count(),
            report,
        };
        info!(?summary, "import finished");
        Ok(summary)
    }

    pub fn export_to(&self, dir: &Path) -> Result<Vec<ExportOutcome>> {
        export_all(&self.store, dir).with_context(|| format!("exporting to {}", dir.display()))
    }

    pub fn delete_all_tasks(&mut self) -> Result<()> {
        self.store
            .delete_all(StoreKind::Tasks)
            .context("deleting tasks store")?;
        self.book = TaskBook::default();
        info!("all tasks deleted");
        Ok(())
    }

    pub fn delete_all_suggestions(&mut self) -> Result<()> {
        self.store
            .delete_all(StoreKind::Suggestions)
            .context("deleting suggestions store")?;
        self.suggestions = Suggestions::default();
        info!("all suggestions deleted");
        Ok(())
    }

    fn save(&self) -> Result<()> {
        self.store
            .save_all(&to_records(&self.book))
            .context("saving tasks")
    }

    fn save_collapsed(&self) -> Result<()> {
        self.store
            .save_collapsed(&self.book.collapsed_projects())
            .context("saving collapsed state")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Priority;
    use crate::storage::StoreScope;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn open(tmp: &TempDir) -> Session {
        Session::open(
            StoreLocation {
                dir: tmp.path().join("data"),
                scope: StoreScope::Explicit,
            },
            Config::default(),
        )
        .unwrap()
    }

    fn acme_call() -> NewTask {
        NewTask {
            task_type: "Call".into(),
            person: "Sam".into(),
            project: "Acme".into(),
            priority: Priority::High,
            due_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            text: "Follow up".into(),
            notes: String::new(),
        }
    }

    #[test]
    fn added_task_is_persisted() {
        let tmp = TempDir::new().unwrap();
        let mut session = open(&tmp);
        assert_eq!(session.add_task(&acme_call()).unwrap(), ("Acme".to_string(), 0));
        session.close();

        let reopened = open(&tmp);
        let task = reopened.book().task("Acme", 0).unwrap();
        assert_eq!(task.task_type, "Call");
        assert_eq!(task.person, "Sam");
        assert_eq!(task.task_text, "Follow up");
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert!(!task.completed);
        assert_eq!(reopened.suggestions().people, ["Sam"]);
        assert_eq!(reopened.suggestions().projects, ["Acme"]);
    }

    #[test]
    fn missing_required_fields_write_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut session = open(&tmp);
        let input = NewTask {
            task_type: String::new(),
            ..acme_call()
        };
        assert!(session.add_task(&input).is_err());
        assert!(session.book().is_empty());
        assert!(session.suggestions().people.is_empty());
    }

    #[test]
    fn complete_then_collapse_hides_task_and_persists_flag() {
        let tmp = TempDir::new().unwrap();
        let mut session = open(&tmp);
        session.add_task(&acme_call()).unwrap();
        assert!(session.toggle_complete("Acme", 0).unwrap());
        assert!(session.toggle_collapsed("Acme").unwrap());

        let views = session.views(false);
        assert!(views[0].rows.is_empty());
        assert_eq!(views[0].hidden_completed, 1);
        session.close();

        let reopened = open(&tmp);
        assert!(reopened.book().is_collapsed("Acme"));
        assert!(reopened.book().task("Acme", 0).unwrap().completed);
    }

    #[test]
    fn deleting_only_task_removes_project_everywhere() {
        let tmp = TempDir::new().unwrap();
        let mut session = open(&tmp);
        session.add_task(&acme_call()).unwrap();
        session.toggle_collapsed("Acme").unwrap();
        assert!(session.delete_task("Acme", 0).unwrap());
        assert!(session.views(false).is_empty());
        session.close();

        let reopened = open(&tmp);
        assert!(reopened.book().is_empty());
        assert!(!reopened.book().is_collapsed("Acme"));
        let raw = fs::read_to_string(tmp.path().join("data/tasks/tasks.json")).unwrap();
        assert!(!raw.contains("Acme"));
    }

    #[test]
    fn dropping_one_project_keeps_the_others_stored() {
        let tmp = TempDir::new().unwrap();
        let mut session = open(&tmp);
        session.add_task(&acme_call()).unwrap();
        session
            .add_task(&NewTask {
                project: "Beta".into(),
                ..acme_call()
            })
            .unwrap();
        assert!(session.delete_task("Acme", 0).unwrap());
        let stored = session.store.records(StoreKind::Tasks).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["project"], "Beta");
        session.close();

        let reopened = open(&tmp);
        assert!(reopened.book().project("Acme").is_none());
        assert_eq!(reopened.book().task("Beta", 0).unwrap().task_text, "Follow up");
    }

    #[test]
    fn reload_sorts_completed_tasks_last() {
        let tmp = TempDir::new().unwrap();
        let mut session = open(&tmp);
        session.add_task(&acme_call()).unwrap();
        session
            .add_task(&NewTask {
                text: "Second".into(),
                ..acme_call()
            })
            .unwrap();
        session.toggle_complete("Acme", 0).unwrap();
        // No reordering within the session.
        assert_eq!(session.book().task("Acme", 0).unwrap().task_text, "Follow up");
        session.close();

        let reopened = open(&tmp);
        assert_eq!(reopened.book().task("Acme", 0).unwrap().task_text, "Second");
        assert!(reopened.book().task("Acme", 1).unwrap().completed);
    }

    #[test]
    fn notes_edit_is_saved() {
        let tmp = TempDir::new().unwrap();
        let mut session = open(&tmp);
        session.add_task(&acme_call()).unwrap();
        session.set_notes("Acme", 0, "left voicemail - call back").unwrap();
        session.close();
        let reopened = open(&tmp);
        assert_eq!(
            reopened.book().task("Acme", 0).unwrap().notes,
            "left voicemail - call back"
        );
    }

    #[test]
    fn export_then_import_round_trips() {
        let tmp = TempDir::new().unwrap();
        let mut session = open(&tmp);
        session.add_task(&acme_call()).unwrap();
        session
            .add_task(&NewTask {
                project: "Beta".into(),
                text: "Priority: low - Due: never".into(),
                ..acme_call()
            })
            .unwrap();
        session.toggle_complete("Beta", 0).unwrap();
        let before = session.book().clone();

        let out = tmp.path().join("export");
        session.export_to(&out).unwrap();
        session.delete_all_tasks().unwrap();
        assert!(session.book().is_empty());

        let summary = session.import_file(&out.join("tasks.json")).unwrap();
        assert_eq!(summary.projects, 2);
        assert_eq!(summary.tasks, 2);
        assert!(summary.report.is_clean());
        assert_eq!(session.book(), &before);
    }

    #[test]
    fn failed_import_leaves_tasks_alone() {
        let tmp = TempDir::new().unwrap();
        let mut session = open(&tmp);
        session.add_task(&acme_call()).unwrap();
        let bad = tmp.path().join("bad.json");
        fs::write(&bad, r#"{"project": "Acme"}"#).unwrap();
        let err = session.import_file(&bad).unwrap_err();
        assert!(format!("{:#}", err).contains("Expected an array"));
        assert_eq!(session.book().task_count(), 1);
    }

    #[test]
    fn clearing_suggestions_keeps_tasks() {
        let tmp = TempDir::new().unwrap();
        let mut session = open(&tmp);
        session.add_task(&acme_call()).unwrap();
        session.delete_all_suggestions().unwrap();
        session.close();
        let reopened = open(&tmp);
        assert!(reopened.suggestions().task_types.is_empty());
        assert_eq!(reopened.book().task_count(), 1);
    }
}
