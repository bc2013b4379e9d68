//! Persisted record shapes and the conversion between them and the
//! in-memory [`TaskBook`].
//!
//! Tasks are decoded one at a time so a single malformed entry only costs
//! that entry: it is swapped for [`Task::placeholder`] and counted in the
//! [`DecodeReport`].

use crate::model::{Project, Task, TaskBook};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

pub const COLLAPSED_SETTING_ID: &str = "collapsedProjects";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProjectRecord {
    pub project: String,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SettingsRecord {
    pub id: String,
    #[serde(default)]
    pub projects: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SuggestionRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecodeReport {
    pub skipped_entries: usize,
    pub placeholder_tasks: usize,
}

impl DecodeReport {
    pub fn is_clean(&self) -> bool {
        self.skipped_entries == 0 && self.placeholder_tasks == 0
    }
}

/// Records for every non-empty project, in project order.
pub fn to_records(book: &TaskBook) -> Vec<ProjectRecord> {
    book.projects
        .iter()
        .filter(|p| !p.tasks.is_empty())
        .map(|p| ProjectRecord {
            project: p.name.clone(),
            tasks: p.tasks.clone(),
        })
        .collect()
}

/// Decodes raw `{project, tasks}` values. Entries without a non-empty string
/// `project` or an array `tasks` are skipped.
pub fn decode_project_records(values: Vec<Value>) -> (Vec<ProjectRecord>, DecodeReport) {
    let mut report = DecodeReport::default();
    let mut records = Vec::with_capacity(values.len());
    for value in values {
        let project = value
            .get("project")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty());
        let tasks = value.get("tasks").and_then(Value::as_array);
        let (Some(project), Some(tasks)) = (project, tasks) else {
            warn!(entry = %value, "skipping invalid project entry");
            report.skipped_entries += 1;
            continue;
        };
        let tasks = tasks
            .iter()
            .map(|raw| match Task::deserialize(raw) {
                Ok(task) => task,
                Err(err) => {
                    warn!(project, error = %err, "replacing undecodable task with placeholder");
                    report.placeholder_tasks += 1;
                    Task::placeholder()
                }
            })
            .collect();
        records.push(ProjectRecord {
            project: project.to_string(),
            tasks,
        });
    }
    (records, report)
}

/// Builds a book from records. Records naming the same project are merged in
/// order; records with no tasks create nothing.
pub fn into_book(records: Vec<ProjectRecord>) -> TaskBook {
    let mut projects: Vec<Project> = Vec::new();
    for record in records {
        if record.tasks.is_empty() {
            continue;
        }
        match projects.iter_mut().find(|p| p.name == record.project) {
            Some(existing) => existing.tasks.extend(record.tasks),
            None => projects.push(Project {
                name: record.project,
                tasks: record.tasks,
            }),
        }
    }
    TaskBook::new(projects)
}

pub mod due_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(date) => serializer.collect_str(&date.format(FORMAT)),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => NaiveDate::parse_from_str(text, FORMAT)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

pub mod added_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%d/%m/%Y";
    const ACCEPTED: [&str; 3] = [FORMAT, "%Y-%m-%d", "%m/%d/%Y"];

    pub fn serialize<S>(value: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let text = raw.trim();
        if text.is_empty() {
            return Ok(crate::model::today());
        }
        ACCEPTED
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognized added date: {text}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewTask, Priority};
    use chrono::NaiveDate;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn task_serializes_with_legacy_field_names() {
        let task = Task::new(
            &NewTask {
                task_type: "Call".into(),
                person: "Sam".into(),
                project: "Acme".into(),
                priority: Priority::High,
                due_date: Some(date(2024, 1, 1)),
                text: "Follow up".into(),
                notes: String::new(),
            },
            date(2023, 12, 5),
        );
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(
            value,
            json!({
                "taskType": "Call",
                "person": "Sam",
                "taskText": "Follow up",
                "priority": "High",
                "dueDate": "2024-01-01",
                "notes": "",
                "addedDate": "05/12/2023",
                "completed": false
            })
        );
    }

    #[test]
    fn decoding_fills_defaults_and_accepts_aliases() {
        let (records, report) = decode_project_records(vec![json!({
            "project": "Acme",
            "tasks": [
                {"type": "Note", "text": "read me", "priority": "", "dueDate": ""},
                {"taskType": "Call", "taskText": "x", "addedDate": "2024-02-03", "completed": true}
            ]
        })]);
        assert!(report.is_clean());
        let tasks = &records[0].tasks;
        assert_eq!(tasks[0].task_type, "Note");
        assert_eq!(tasks[0].task_text, "read me");
        assert_eq!(tasks[0].priority, Priority::None);
        assert_eq!(tasks[0].due_date, None);
        assert_eq!(tasks[0].person, "");
        assert_eq!(tasks[1].added_date, date(2024, 2, 3));
        assert!(tasks[1].completed);
    }

    #[test]
    fn bad_task_becomes_placeholder_without_losing_neighbours() {
        let (records, report) = decode_project_records(vec![json!({
            "project": "Acme",
            "tasks": [
                {"taskType": "Call", "taskText": "good"},
                {"taskType": "Call", "taskText": "bad date", "dueDate": "next week"},
                42
            ]
        })]);
        assert_eq!(report.placeholder_tasks, 2);
        let texts: Vec<_> = records[0].tasks.iter().map(|t| t.task_text.as_str()).collect();
        assert_eq!(texts, ["good", "Error parsing task", "Error parsing task"]);
        assert_eq!(records[0].tasks[1].task_type, "Error");
    }

    #[test]
    fn entries_without_project_or_tasks_are_skipped() {
        let (records, report) = decode_project_records(vec![
            json!({"project": "", "tasks": []}),
            json!({"project": "Acme"}),
            json!({"tasks": []}),
            json!("junk"),
            json!({"project": "Beta", "tasks": []}),
        ]);
        assert_eq!(report.skipped_entries, 4);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].project, "Beta");
    }

    #[test]
    fn into_book_merges_duplicates_and_drops_empty_projects() {
        let task = Task::placeholder();
        let book = into_book(vec![
            ProjectRecord { project: "Acme".into(), tasks: vec![task.clone()] },
            ProjectRecord { project: "Empty".into(), tasks: vec![] },
            ProjectRecord { project: "Acme".into(), tasks: vec![task.clone()] },
        ]);
        assert_eq!(book.projects.len(), 1);
        assert_eq!(book.projects[0].tasks.len(), 2);
        assert_eq!(to_records(&book).len(), 1);
    }

    #[test]
    fn delimiter_characters_survive_the_round_trip() {
        let mut book = TaskBook::default();
        let tricky = Task::new(
            &NewTask {
                task_type: "Re-check".into(),
                person: "Anne-Marie".into(),
                project: "Acme".into(),
                text: "Priority: ship - Due: friday".into(),
                ..NewTask::default()
            },
            date(2024, 1, 1),
        );
        book.add_task("Acme", tricky.clone());
        let encoded = serde_json::to_value(to_records(&book)).unwrap();
        let values = encoded.as_array().cloned().unwrap();
        let (records, report) = decode_project_records(values);
        assert!(report.is_clean());
        assert_eq!(records[0].tasks[0], tricky);
    }
}
