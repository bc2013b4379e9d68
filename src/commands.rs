use crate::config::Config;
use crate::model::{parse_due, NewTask, Priority, SuggestionKind};
use crate::render::{details_line, ProjectView, TaskRow};
use crate::session::Session;
use crate::storage::{init_project_store, StoreLocation, StoreScope, PROJECT_DIR_NAME};
use crate::ui;
use anyhow::{bail, Context, Result};
use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Resolved configuration and store location shared by every command.
pub struct AppContext {
    pub config: Config,
    pub location: StoreLocation,
}

impl AppContext {
    fn open(&self) -> Result<Session> {
        Session::open(self.location.clone(), self.config.clone())
    }
}

pub fn init(ctx: &AppContext) -> Result<()> {
    let cwd = env::current_dir()?;
    if ctx.location.scope == StoreScope::Explicit {
        println!(
            "Ignoring data directory {}: init always creates {} in the current directory",
            ctx.location.dir.display(),
            PROJECT_DIR_NAME
        );
    }
    let location = init_project_store(&cwd).context("creating project store")?;
    println!("Initialized store at {}", location.dir.display());
    Ok(())
}

pub fn list(ctx: &AppContext, project: Option<String>, all: bool) -> Result<()> {
    let session = ctx.open()?;
    println!(
        "Store: {} ({})",
        session.location().dir.display(),
        session.location().scope.label()
    );
    let report = session.load_report();
    if report.placeholder_tasks > 0 {
        println!(
            "warning: {} stored task(s) could not be read",
            report.placeholder_tasks
        );
    }
    let mut views = session.views(all);
    if let Some(ref filter) = project {
        views.retain(|v| &v.name == filter);
        if views.is_empty() {
            bail!("project not found: {}", filter);
        }
    }
    if views.is_empty() {
        println!("No tasks yet");
    }
    for view in &views {
        print_project(view);
    }
    session.close();
    Ok(())
}

pub fn add(
    ctx: &AppContext,
    text: String,
    task_type: String,
    project: String,
    person: Option<String>,
    priority: Option<Priority>,
    due: Option<String>,
    notes: Option<String>,
) -> Result<()> {
    let mut session = ctx.open()?;
    let input = NewTask {
        task_type,
        person: person.unwrap_or_default(),
        project,
        priority: priority.unwrap_or(ctx.config.default_priority),
        due_date: parse_due(due.as_deref().unwrap_or_default())?,
        text,
        notes: notes.unwrap_or_default(),
    };
    let (project, index) = session.add_task(&input)?;
    println!("Added task #{} to {}", index + 1, project);
    session.close();
    Ok(())
}

pub fn complete(ctx: &AppContext, project: String, position: usize) -> Result<()> {
    let mut session = ctx.open()?;
    let completed = session.toggle_complete(&project, to_index(position)?)?;
    println!(
        "Marked task #{} in {} as {}",
        position,
        project,
        if completed { "completed" } else { "open" }
    );
    session.close();
    Ok(())
}

pub fn delete(ctx: &AppContext, project: String, position: usize) -> Result<()> {
    let mut session = ctx.open()?;
    let removed = session.delete_task(&project, to_index(position)?)?;
    println!("Deleted task #{} from {}", position, project);
    if removed {
        println!("Project {} has no tasks left and was removed", project);
    }
    session.close();
    Ok(())
}

pub fn notes(ctx: &AppContext, project: String, position: usize, notes: String) -> Result<()> {
    let mut session = ctx.open()?;
    session.set_notes(&project, to_index(position)?, &notes)?;
    println!("Updated notes for task #{} in {}", position, project);
    session.close();
    Ok(())
}

pub fn collapse(ctx: &AppContext, project: String) -> Result<()> {
    let mut session = ctx.open()?;
    let collapsed = session.toggle_collapsed(&project)?;
    println!(
        "{} completed tasks in {}",
        if collapsed { "Hiding" } else { "Showing" },
        project
    );
    session.close();
    Ok(())
}

pub fn suggestions(ctx: &AppContext, kind: Option<SuggestionKind>) -> Result<()> {
    let session = ctx.open()?;
    let kinds: Vec<SuggestionKind> = match kind {
        Some(k) => vec![k],
        None => SuggestionKind::ALL.to_vec(),
    };
    for kind in kinds {
        println!("{}", kind.label());
        let values = session.suggestions().values(kind);
        if values.is_empty() {
            println!("  (empty)");
        }
        for value in values {
            println!("  {}", value);
        }
    }
    session.close();
    Ok(())
}

pub fn export(ctx: &AppContext, dir: Option<PathBuf>) -> Result<()> {
    let session = ctx.open()?;
    let dir = match dir {
        Some(d) => d,
        None => env::current_dir()?,
    };
    for outcome in session.export_to(&dir)? {
        println!("{}", outcome.describe());
    }
    session.close();
    Ok(())
}

pub fn import(ctx: &AppContext, file: PathBuf) -> Result<()> {
    let mut session = ctx.open()?;
    let summary = session.import_file(&file)?;
    println!(
        "Imported {} task(s) in {} project(s)",
        summary.tasks, summary.projects
    );
    if summary.report.skipped_entries > 0 {
        println!("Skipped {} invalid project entr(ies)", summary.report.skipped_entries);
    }
    if summary.report.placeholder_tasks > 0 {
        println!(
            "{} task(s) could not be read and were replaced with placeholders",
            summary.report.placeholder_tasks
        );
    }
    session.close();
    Ok(())
}

pub fn clear_tasks(ctx: &AppContext, yes: bool) -> Result<()> {
    if !yes && !confirm("Are you sure you want to delete all tasks? This cannot be undone.")? {
        println!("Canceled");
        return Ok(());
    }
    let mut session = ctx.open()?;
    session.delete_all_tasks()?;
    println!("Tasks store deleted");
    session.close();
    Ok(())
}

pub fn clear_suggestions(ctx: &AppContext, yes: bool) -> Result<()> {
    if !yes
        && !confirm("Are you sure you want to delete all dropdown values? This cannot be undone.")?
    {
        println!("Canceled");
        return Ok(());
    }
    let mut session = ctx.open()?;
    session.delete_all_suggestions()?;
    println!("Suggestions store deleted");
    session.close();
    Ok(())
}

pub fn tui(ctx: &AppContext) -> Result<()> {
    let session = ctx.open()?;
    ui::run(session)
}

fn to_index(position: usize) -> Result<usize> {
    if position == 0 {
        bail!("task numbers start at 1");
    }
    Ok(position - 1)
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "YES"))
}

fn print_project(view: &ProjectView) {
    let marker = if view.collapsed { " [collapsed]" } else { "" };
    println!("{}{} ({})", view.name, marker, view.total);
    for row in &view.rows {
        print_row(row);
    }
    if view.hidden_completed > 0 {
        println!("  ({} completed hidden)", view.hidden_completed);
    }
    println!();
}

fn print_row(row: &TaskRow) {
    let check = if row.completed { "x" } else { " " };
    println!("  {:>2}. [{}] {}", row.index + 1, check, row.headline);
    println!("      {}", details_line(row));
    if !row.notes.is_empty() {
        for line in row.notes.lines() {
            println!("      > {}", line);
        }
    }
    println!("      {}", row.added_label);
}
