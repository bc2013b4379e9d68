//! Pure projection of a [`TaskBook`] into display rows. Both the TUI and the
//! plain `list` output draw from these; nothing here is ever parsed back.

use crate::config::Config;
use crate::model::{Priority, Task, TaskBook};
use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Plain,
    Alert,
    Good,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
    /// Position of the task inside its project.
    pub index: usize,
    pub headline: String,
    pub priority: Priority,
    pub priority_tone: Tone,
    pub due_label: String,
    pub due_tone: Tone,
    pub notes: String,
    pub added_label: String,
    pub completed: bool,
    pub is_note: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectView {
    pub name: String,
    pub collapsed: bool,
    pub rows: Vec<TaskRow>,
    pub hidden_completed: usize,
    pub total: usize,
}

/// One view per project. Completed tasks of collapsed projects are left
/// out unless `reveal_completed` is set.
pub fn project_views(
    book: &TaskBook,
    today: NaiveDate,
    config: &Config,
    reveal_completed: bool,
) -> Vec<ProjectView> {
    book.projects
        .iter()
        .map(|project| {
            let collapsed = book.is_collapsed(&project.name);
            let hide_completed = collapsed && !reveal_completed;
            let rows: Vec<TaskRow> = project
                .tasks
                .iter()
                .enumerate()
                .filter(|(_, task)| !(hide_completed && task.completed))
                .map(|(idx, task)| task_row(idx, task, today, config))
                .collect();
            ProjectView {
                name: project.name.clone(),
                collapsed,
                hidden_completed: project.tasks.len() - rows.len(),
                total: project.tasks.len(),
                rows,
            }
        })
        .collect()
}

pub fn task_row(index: usize, task: &Task, today: NaiveDate, config: &Config) -> TaskRow {
    let due_soon = task
        .due_date
        .map(|due| days_until(due, today) <= config.due_soon_days)
        .unwrap_or(false);
    TaskRow {
        index,
        headline: headline(task),
        priority: task.priority,
        priority_tone: priority_tone(task.priority),
        due_label: task
            .due_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "none".into()),
        due_tone: if due_soon { Tone::Alert } else { Tone::Plain },
        notes: task.notes.clone(),
        added_label: format!("Added on: {}", task.added_date.format(&config.date_display)),
        completed: task.completed,
        is_note: task.task_type == "Note",
    }
}

/// `"<type> <person> - <text>"`, skipping an empty person.
pub fn headline(task: &Task) -> String {
    let lead = [task.task_type.as_str(), task.person.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    format!("{} - {}", lead, task.task_text)
}

pub fn details_line(row: &TaskRow) -> String {
    format!("Priority: {}, Due: {}", row.priority, row.due_label)
}

pub fn priority_tone(priority: Priority) -> Tone {
    match priority {
        Priority::High => Tone::Alert,
        Priority::Medium => Tone::Good,
        Priority::Low => Tone::Warn,
        Priority::None => Tone::Plain,
    }
}

pub fn days_until(due: NaiveDate, today: NaiveDate) -> i64 {
    (due - today).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewTask;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn task(kind: &str, person: &str, text: &str, due: Option<NaiveDate>) -> Task {
        Task::new(
            &NewTask {
                task_type: kind.into(),
                person: person.into(),
                project: "Acme".into(),
                priority: Priority::High,
                due_date: due,
                text: text.into(),
                notes: String::new(),
            },
            date(2024, 1, 2),
        )
    }

    #[test]
    fn headline_joins_type_person_and_text() {
        assert_eq!(headline(&task("Call", "Sam", "Follow up", None)), "Call Sam - Follow up");
        assert_eq!(headline(&task("Email", "", "Draft", None)), "Email - Draft");
    }

    #[test]
    fn due_within_window_or_overdue_is_alert() {
        let config = Config::default();
        let today = date(2024, 1, 10);
        let soon = task_row(0, &task("Call", "", "x", Some(date(2024, 1, 17))), today, &config);
        let later = task_row(0, &task("Call", "", "x", Some(date(2024, 1, 18))), today, &config);
        let overdue = task_row(0, &task("Call", "", "x", Some(date(2023, 12, 1))), today, &config);
        let none = task_row(0, &task("Call", "", "x", None), today, &config);
        assert_eq!(soon.due_tone, Tone::Alert);
        assert_eq!(later.due_tone, Tone::Plain);
        assert_eq!(overdue.due_tone, Tone::Alert);
        assert_eq!(none.due_tone, Tone::Plain);
        assert_eq!(none.due_label, "none");
    }

    #[test]
    fn row_carries_details_and_added_date() {
        let config = Config::default();
        let row = task_row(3, &task("Note", "", "x", Some(date(2024, 1, 1))), date(2024, 1, 1), &config);
        assert_eq!(row.index, 3);
        assert!(row.is_note);
        assert_eq!(row.priority_tone, Tone::Alert);
        assert_eq!(details_line(&row), "Priority: High, Due: 2024-01-01");
        assert_eq!(row.added_label, "Added on: 02/01/2024");
    }

    #[test]
    fn collapsed_projects_hide_completed_rows() {
        let config = Config::default();
        let mut book = TaskBook::default();
        book.add_task("Acme", task("Call", "Sam", "open", None));
        book.add_task("Acme", task("Call", "Sam", "done", None));
        book.toggle_complete("Acme", 1).unwrap();

        let expanded = project_views(&book, date(2024, 1, 1), &config, false);
        assert_eq!(expanded[0].rows.len(), 2);
        assert_eq!(expanded[0].hidden_completed, 0);

        book.toggle_collapsed("Acme").unwrap();
        let collapsed = project_views(&book, date(2024, 1, 1), &config, false);
        assert!(collapsed[0].collapsed);
        assert_eq!(collapsed[0].rows.len(), 1);
        assert_eq!(collapsed[0].rows[0].index, 0);
        assert_eq!(collapsed[0].hidden_completed, 1);
        assert_eq!(collapsed[0].total, 2);

        let revealed = project_views(&book, date(2024, 1, 1), &config, true);
        assert!(revealed[0].collapsed);
        assert_eq!(revealed[0].rows.len(), 2);
        assert_eq!(revealed[0].hidden_completed, 0);
    }
}
