use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Priority {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::None,
        Priority::Low,
        Priority::Medium,
        Priority::High,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Priority::None => "None",
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }

    pub fn cycle(self, delta: isize) -> Self {
        let idx = Self::ALL.iter().position(|p| *p == self).unwrap_or(0) as isize;
        let len = Self::ALL.len() as isize;
        Self::ALL[(idx + delta).rem_euclid(len) as usize]
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Priority {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Priority::None),
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(TaskError::UnknownPriority(other.to_string())),
        }
    }
}

// Stored files may carry anything in this slot; unknown values read as None.
impl From<String> for Priority {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl From<Priority> for String {
    fn from(value: Priority) -> Self {
        value.label().to_string()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(alias = "type")]
    pub task_type: String,
    #[serde(default)]
    pub person: String,
    #[serde(alias = "text")]
    pub task_text: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, with = "crate::records::due_date")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "today", with = "crate::records::added_date")]
    pub added_date: NaiveDate,
    #[serde(default)]
    pub completed: bool,
}

/// Raw form input for a new task, before validation.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub task_type: String,
    pub person: String,
    pub project: String,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub text: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub tasks: Vec<Task>,
}

/// All projects in display order plus the per-project collapse state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskBook {
    pub projects: Vec<Project>,
    collapsed: BTreeSet<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum TaskError {
    #[error("Task Type, Task Description, and Project are required")]
    MissingFields,
    #[error("project not found: {0}")]
    ProjectNotFound(String),
    #[error("no task #{position} in project {project}")]
    TaskNotFound { project: String, position: usize },
    #[error("unknown priority: {0} (use none, low, medium or high)")]
    UnknownPriority(String),
    #[error("invalid date format (use YYYY-MM-DD): {0}")]
    InvalidDate(String),
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn parse_due(input: &str) -> Result<Option<NaiveDate>, TaskError> {
    let raw = input.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| TaskError::InvalidDate(raw.to_string()))
}

impl Task {
    pub fn new(input: &NewTask, added: NaiveDate) -> Self {
        Task {
            task_type: input.task_type.trim().to_string(),
            person: input.person.trim().to_string(),
            task_text: input.text.trim().to_string(),
            priority: input.priority,
            due_date: input.due_date,
            notes: input.notes.trim().to_string(),
            added_date: added,
            completed: false,
        }
    }

    pub fn placeholder() -> Self {
        Task {
            task_type: "Error".into(),
            person: String::new(),
            task_text: "Error parsing task".into(),
            priority: Priority::None,
            due_date: None,
            notes: String::new(),
            added_date: today(),
            completed: false,
        }
    }
}

impl NewTask {
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.task_type.trim().is_empty()
            || self.text.trim().is_empty()
            || self.project.trim().is_empty()
        {
            return Err(TaskError::MissingFields);
        }
        Ok(())
    }
}

impl Project {
    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.completed).count()
    }

    /// Incomplete tasks first; order is otherwise preserved.
    pub fn sort_completed_last(&mut self) {
        self.tasks.sort_by_key(|t| t.completed);
    }
}

impl TaskBook {
    pub fn new(projects: Vec<Project>) -> Self {
        TaskBook {
            projects,
            collapsed: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn task_count(&self) -> usize {
        self.projects.iter().map(|p| p.tasks.len()).sum()
    }

    pub fn find_project_index(&self, name: &str) -> Option<usize> {
        self.projects.iter().position(|p| p.name == name)
    }

    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }

    pub fn task(&self, project: &str, index: usize) -> Result<&Task, TaskError> {
        let proj = self
            .project(project)
            .ok_or_else(|| TaskError::ProjectNotFound(project.to_string()))?;
        proj.tasks.get(index).ok_or_else(|| TaskError::TaskNotFound {
            project: project.to_string(),
            position: index + 1,
        })
    }

    /// Appends the task to `project`, creating the project when it is new.
    /// Returns the task's index within the project.
    pub fn add_task(&mut self, project: &str, task: Task) -> usize {
        let idx = match self.find_project_index(project) {
            Some(idx) => idx,
            None => {
                self.projects.push(Project {
                    name: project.to_string(),
                    tasks: Vec::new(),
                });
                self.projects.len() - 1
            }
        };
        self.projects[idx].tasks.push(task);
        self.projects[idx].tasks.len() - 1
    }

    pub fn toggle_complete(&mut self, project: &str, index: usize) -> Result<bool, TaskError> {
        let task = self.task_mut(project, index)?;
        task.completed = !task.completed;
        Ok(task.completed)
    }

    pub fn set_notes(&mut self, project: &str, index: usize, notes: &str) -> Result<(), TaskError> {
        let task = self.task_mut(project, index)?;
        task.notes = notes.trim().to_string();
        Ok(())
    }

    /// Removes a task. When it was the project's last task the project is
    /// dropped too (along with its collapse flag) and `true` is returned.
    pub fn delete_task(&mut self, project: &str, index: usize) -> Result<bool, TaskError> {
        let proj_idx = self
            .find_project_index(project)
            .ok_or_else(|| TaskError::ProjectNotFound(project.to_string()))?;
        let tasks = &mut self.projects[proj_idx].tasks;
        if index >= tasks.len() {
            return Err(TaskError::TaskNotFound {
                project: project.to_string(),
                position: index + 1,
            });
        }
        tasks.remove(index);
        if tasks.is_empty() {
            self.projects.remove(proj_idx);
            self.collapsed.remove(project);
            return Ok(true);
        }
        Ok(false)
    }

    pub fn is_collapsed(&self, project: &str) -> bool {
        self.collapsed.contains(project)
    }

    pub fn toggle_collapsed(&mut self, project: &str) -> Result<bool, TaskError> {
        if self.find_project_index(project).is_none() {
            return Err(TaskError::ProjectNotFound(project.to_string()));
        }
        if !self.collapsed.remove(project) {
            self.collapsed.insert(project.to_string());
            return Ok(true);
        }
        Ok(false)
    }

    /// Applies a persisted collapse list, ignoring names with no project.
    pub fn restore_collapsed<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.collapsed = names
            .into_iter()
            .map(|n| n.as_ref().to_string())
            .filter(|n| self.find_project_index(n).is_some())
            .collect();
    }

    /// Collapsed project names in project order.
    pub fn collapsed_projects(&self) -> Vec<String> {
        self.projects
            .iter()
            .filter(|p| self.collapsed.contains(&p.name))
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn sort_completed_last(&mut self) {
        for project in &mut self.projects {
            project.sort_completed_last();
        }
    }

    fn task_mut(&mut self, project: &str, index: usize) -> Result<&mut Task, TaskError> {
        let proj = self
            .projects
            .iter_mut()
            .find(|p| p.name == project)
            .ok_or_else(|| TaskError::ProjectNotFound(project.to_string()))?;
        proj.tasks.get_mut(index).ok_or_else(|| TaskError::TaskNotFound {
            project: project.to_string(),
            position: index + 1,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SuggestionKind {
    #[value(name = "types")]
    TaskTypes,
    People,
    Projects,
}

impl SuggestionKind {
    pub const ALL: [SuggestionKind; 3] = [
        SuggestionKind::TaskTypes,
        SuggestionKind::People,
        SuggestionKind::Projects,
    ];

    /// Record key inside the suggestions store.
    pub fn key(&self) -> &'static str {
        match self {
            SuggestionKind::TaskTypes => "taskTypes",
            SuggestionKind::People => "people",
            SuggestionKind::Projects => "projects",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SuggestionKind::TaskTypes => "Task types",
            SuggestionKind::People => "People",
            SuggestionKind::Projects => "Projects",
        }
    }
}

/// Append-only autocomplete lists. Matching on insert is exact, so "sam"
/// and "Sam" are both kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Suggestions {
    pub task_types: Vec<String>,
    pub people: Vec<String>,
    pub projects: Vec<String>,
}

impl Suggestions {
    pub fn values(&self, kind: SuggestionKind) -> &[String] {
        match kind {
            SuggestionKind::TaskTypes => &self.task_types,
            SuggestionKind::People => &self.people,
            SuggestionKind::Projects => &self.projects,
        }
    }

    fn values_mut(&mut self, kind: SuggestionKind) -> &mut Vec<String> {
        match kind {
            SuggestionKind::TaskTypes => &mut self.task_types,
            SuggestionKind::People => &mut self.people,
            SuggestionKind::Projects => &mut self.projects,
        }
    }

    pub fn set(&mut self, kind: SuggestionKind, values: Vec<String>) {
        *self.values_mut(kind) = values;
    }

    pub fn insert(&mut self, kind: SuggestionKind, value: &str) -> bool {
        if value.trim().is_empty() {
            return false;
        }
        let list = self.values_mut(kind);
        if list.iter().any(|v| v == value) {
            return false;
        }
        list.push(value.to_string());
        true
    }

    /// Values starting with `prefix`, ignoring case for the match only.
    pub fn matching(&self, kind: SuggestionKind, prefix: &str) -> Vec<&str> {
        let needle = prefix.trim().to_lowercase();
        self.values(kind)
            .iter()
            .filter(|v| v.to_lowercase().starts_with(&needle))
            .map(String::as_str)
            .collect()
    }
}
