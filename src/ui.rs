use crate::model::{parse_due, NewTask, Priority, SuggestionKind, Suggestions};
use crate::render::{details_line, priority_tone, ProjectView, TaskRow, Tone};
use crate::session::Session;
use crate::transfer::ExportOutcome;
use anyhow::Result;
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement, EnterAlternateScreen,
    LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::{Alignment, Color, Modifier, Rect, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Terminal;
use std::io::{stdout, Stdout};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::error;

const MAX_SUGGESTION_HINTS: usize = 6;

pub fn run(session: Session) -> Result<()> {
    let (mut terminal, enhanced_keys) = setup_terminal()?;
    let mut app = App::new(session);
    let result = app.event_loop(&mut terminal);
    teardown_terminal(&mut terminal, enhanced_keys)?;
    app.session.close();
    result
}

struct App {
    session: Session,
    views: Vec<ProjectView>,
    selected_project: usize,
    selected_task: usize,
    task_state: ListState,
    last_save: Instant,
    status: String,
    mode: Mode,
    last_project: String,
}

enum Mode {
    Normal,
    Adding(TaskForm),
    EditingNotes {
        project: String,
        index: usize,
        field: FieldValue,
    },
    Prompt {
        action: PromptAction,
        field: FieldValue,
    },
    Confirm(ConfirmAction),
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum PromptAction {
    Export,
    Import,
}

#[derive(Clone)]
enum ConfirmAction {
    DeleteTask {
        project: String,
        index: usize,
        headline: String,
    },
    ClearTasks,
    ClearSuggestions,
}

struct TaskForm {
    task_type: FieldValue,
    person: FieldValue,
    project: FieldValue,
    priority: Priority,
    due: FieldValue,
    description: FieldValue,
    notes: FieldValue,
    field: FormField,
    pick: Option<SuggestionPick>,
}

/// Position in the suggestion list while cycling with Up/Down. `prefix` is
/// what was typed before cycling began.
struct SuggestionPick {
    prefix: String,
    idx: usize,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum FormField {
    Type,
    Person,
    Project,
    Priority,
    Due,
    Description,
    Notes,
}

impl FormField {
    const ORDER: [FormField; 7] = [
        FormField::Type,
        FormField::Person,
        FormField::Project,
        FormField::Priority,
        FormField::Due,
        FormField::Description,
        FormField::Notes,
    ];

    fn step(self, delta: isize) -> Self {
        let idx = Self::ORDER.iter().position(|f| *f == self).unwrap_or(0) as isize;
        let len = Self::ORDER.len() as isize;
        Self::ORDER[(idx + delta).rem_euclid(len) as usize]
    }

    fn suggestion_kind(&self) -> Option<SuggestionKind> {
        match self {
            FormField::Type => Some(SuggestionKind::TaskTypes),
            FormField::Person => Some(SuggestionKind::People),
            FormField::Project => Some(SuggestionKind::Projects),
            _ => None,
        }
    }
}

#[derive(Clone)]
struct FieldValue {
    value: String,
    cursor: usize,
}

impl FieldValue {
    fn new(value: &str) -> Self {
        FieldValue {
            value: value.to_string(),
            cursor: value.len(),
        }
    }

    fn move_left(&mut self) {
        self.cursor = prev_char_boundary(self.cursor, &self.value);
    }

    fn move_right(&mut self) {
        self.cursor = next_char_boundary(self.cursor, &self.value);
    }

    fn move_up(&mut self) {
        let (line_starts, line_idx, col) = line_state(&self.value, self.cursor);
        if line_idx == 0 {
            return;
        }
        self.cursor = index_at_col(&self.value, line_starts[line_idx - 1], col);
    }

    fn move_down(&mut self) {
        let (line_starts, line_idx, col) = line_state(&self.value, self.cursor);
        if line_idx + 1 >= line_starts.len() {
            return;
        }
        self.cursor = index_at_col(&self.value, line_starts[line_idx + 1], col);
    }

    fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let prev = prev_char_boundary(self.cursor, &self.value);
        self.value.drain(prev..self.cursor);
        self.cursor = prev;
    }

    fn insert_char(&mut self, ch: char) {
        self.value.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
    }

    fn with_caret(&self) -> String {
        let mut text = self.value.clone();
        text.insert_str(self.cursor, "▌");
        text
    }
}

impl App {
    fn new(session: Session) -> Self {
        let report = session.load_report();
        let status = if report.placeholder_tasks > 0 {
            format!(
                "{} stored task(s) could not be read and show as placeholders",
                report.placeholder_tasks
            )
        } else {
            format!(
                "Loaded {} task(s) from {}",
                session.book().task_count(),
                session.location().dir.display()
            )
        };
        let last_project = session
            .suggestions()
            .projects
            .last()
            .cloned()
            .unwrap_or_default();
        let mut app = App {
            session,
            views: Vec::new(),
            selected_project: 0,
            selected_task: 0,
            task_state: ListState::default(),
            last_save: Instant::now(),
            status,
            mode: Mode::Normal,
            last_project,
        };
        app.refresh();
        app
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        loop {
            terminal.draw(|f| self.draw(f))?;
            if event::poll(Duration::from_millis(200))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key) {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns `true` when the user asked to quit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        match self.mode {
            Mode::Normal => return self.handle_normal_key(key),
            Mode::Adding(_) => self.handle_form_key(key),
            Mode::EditingNotes { .. } => self.handle_notes_key(key),
            Mode::Prompt { .. } => self.handle_prompt_key(key),
            Mode::Confirm(_) => self.handle_confirm_key(key),
        }
        false
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Left | KeyCode::Char('h') | KeyCode::BackTab => self.prev_project(),
            KeyCode::Right | KeyCode::Char('l') | KeyCode::Tab => self.next_project(),
            KeyCode::Up | KeyCode::Char('k') => self.prev_task(),
            KeyCode::Down | KeyCode::Char('j') => self.next_task(),
            KeyCode::Char('n') => {
                let project = self
                    .current_project()
                    .map(|v| v.name.clone())
                    .unwrap_or_else(|| self.last_project.clone());
                let priority = self.session.config().default_priority;
                self.mode = Mode::Adding(TaskForm::new(&project, priority));
                self.status =
                    "New task (Tab/Shift-Tab move, ↑↓ suggestions, Enter or Ctrl+S save, Esc close)"
                        .into();
            }
            KeyCode::Char('c') | KeyCode::Char(' ') => self.toggle_selected(),
            KeyCode::Char('e') | KeyCode::Enter => self.start_notes(),
            KeyCode::Char('d') => match self.current_row() {
                Some((view, row)) => {
                    let action = ConfirmAction::DeleteTask {
                        project: view.name.clone(),
                        index: row.index,
                        headline: row.headline.clone(),
                    };
                    self.mode = Mode::Confirm(action);
                    self.status = "Delete task? (y to confirm, n/Esc to cancel)".into();
                }
                None => self.status = "No task selected to delete".into(),
            },
            KeyCode::Char('z') => self.toggle_collapse(),
            KeyCode::Char('x') => {
                self.mode = Mode::Prompt {
                    action: PromptAction::Export,
                    field: FieldValue::new("."),
                };
                self.status = "Export to which directory? (Enter to export, Esc to cancel)".into();
            }
            KeyCode::Char('i') => {
                self.mode = Mode::Prompt {
                    action: PromptAction::Import,
                    field: FieldValue::new("tasks.json"),
                };
                self.status =
                    "Import which file? This replaces all tasks (Enter to import, Esc to cancel)"
                        .into();
            }
            KeyCode::Char('X') => {
                self.mode = Mode::Confirm(ConfirmAction::ClearTasks);
                self.status = "Delete all tasks? (y to confirm, n/Esc to cancel)".into();
            }
            KeyCode::Char('S') => {
                self.mode = Mode::Confirm(ConfirmAction::ClearSuggestions);
                self.status = "Delete all dropdown values? (y to confirm, n/Esc to cancel)".into();
            }
            _ => {}
        }
        false
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        let mut mode = std::mem::replace(&mut self.mode, Mode::Normal);
        let mut close_form = false;
        if let Mode::Adding(form) = &mut mode {
            close_form = self.process_form_key(form, key);
        }
        if !close_form {
            self.mode = mode;
        }
    }

    fn process_form_key(&mut self, form: &mut TaskForm, key: KeyEvent) -> bool {
        let control = key.modifiers.contains(KeyModifiers::CONTROL);
        let on_priority = form.field == FormField::Priority;
        match key.code {
            KeyCode::Esc => {
                self.status = "Closed task form".into();
                return true;
            }
            KeyCode::Char('s') if control => self.submit_form(form),
            KeyCode::Tab => form.step_field(1),
            KeyCode::BackTab => form.step_field(-1),
            KeyCode::Enter if form.field == FormField::Notes && !control => {
                form.edit(|f| f.insert_char('\n'))
            }
            KeyCode::Enter => self.submit_form(form),
            KeyCode::Up | KeyCode::Down => {
                let delta = if key.code == KeyCode::Up { -1 } else { 1 };
                if let Some(kind) = form.field.suggestion_kind() {
                    if !form.cycle_suggestion(self.session.suggestions(), kind, delta) {
                        self.status = format!("No saved {} match", kind.label().to_lowercase());
                    }
                } else if on_priority {
                    form.priority = form.priority.cycle(delta);
                } else if delta < 0 {
                    form.edit(FieldValue::move_up);
                } else {
                    form.edit(FieldValue::move_down);
                }
            }
            KeyCode::Left if on_priority => form.priority = form.priority.cycle(-1),
            KeyCode::Right | KeyCode::Char(' ') if on_priority => {
                form.priority = form.priority.cycle(1)
            }
            KeyCode::Left => form.edit(FieldValue::move_left),
            KeyCode::Right => form.edit(FieldValue::move_right),
            KeyCode::Backspace => form.edit(FieldValue::backspace),
            KeyCode::Char(c) => {
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
                {
                    form.edit(|f| f.insert_char(c));
                }
            }
            _ => {}
        }
        false
    }

    /// The form stays open after a successful add for quick entry.
    fn submit_form(&mut self, form: &mut TaskForm) {
        let result = form
            .to_input()
            .and_then(|input| self.session.add_task(&input));
        match result {
            Ok((project, index)) => {
                self.last_project = project.clone();
                form.reset_after_add(self.session.config().default_priority);
                self.finish(Ok(format!(
                    "Added task #{} to {} (Esc closes the form)",
                    index + 1,
                    project
                )));
                self.select_task(&project, index);
            }
            Err(err) => self.finish(Err(err)),
        }
    }

    fn handle_notes_key(&mut self, key: KeyEvent) {
        let mut mode = std::mem::replace(&mut self.mode, Mode::Normal);
        let mut close = false;
        if let Mode::EditingNotes {
            project,
            index,
            field,
        } = &mut mode
        {
            let newline = key
                .modifiers
                .intersects(KeyModifiers::SHIFT | KeyModifiers::ALT);
            match key.code {
                KeyCode::Enter if newline => field.insert_char('\n'),
                // Leaving the editor saves, whichever way it is left.
                KeyCode::Enter | KeyCode::Esc => {
                    let result = self
                        .session
                        .set_notes(project, *index, &field.value)
                        .map(|_| format!("Saved notes in {}", project));
                    self.finish(result);
                    close = true;
                }
                KeyCode::Left => field.move_left(),
                KeyCode::Right => field.move_right(),
                KeyCode::Up => field.move_up(),
                KeyCode::Down => field.move_down(),
                KeyCode::Backspace => field.backspace(),
                KeyCode::Char(c) => {
                    if !key
                        .modifiers
                        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
                    {
                        field.insert_char(c);
                    }
                }
                _ => {}
            }
        }
        if !close {
            self.mode = mode;
        }
    }

    fn handle_prompt_key(&mut self, key: KeyEvent) {
        let mut mode = std::mem::replace(&mut self.mode, Mode::Normal);
        let mut close = false;
        if let Mode::Prompt { action, field } = &mut mode {
            match key.code {
                KeyCode::Esc => {
                    self.status = "Canceled".into();
                    close = true;
                }
                KeyCode::Enter => {
                    let raw = field.value.trim();
                    let result = match action {
                        PromptAction::Export => {
                            let dir = PathBuf::from(if raw.is_empty() { "." } else { raw });
                            self.session.export_to(&dir).map(|outcomes| {
                                outcomes
                                    .iter()
                                    .map(ExportOutcome::describe)
                                    .collect::<Vec<_>>()
                                    .join("; ")
                            })
                        }
                        PromptAction::Import => {
                            self.session
                                .import_file(&PathBuf::from(raw))
                                .map(|summary| {
                                    format!(
                                        "Imported {} task(s) in {} project(s)",
                                        summary.tasks, summary.projects
                                    )
                                })
                        }
                    };
                    self.finish(result);
                    close = true;
                }
                KeyCode::Left => field.move_left(),
                KeyCode::Right => field.move_right(),
                KeyCode::Backspace => field.backspace(),
                KeyCode::Char(c) => {
                    if !key
                        .modifiers
                        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
                    {
                        field.insert_char(c);
                    }
                }
                _ => {}
            }
        }
        if !close {
            self.mode = mode;
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) {
        let action = match &self.mode {
            Mode::Confirm(action) => action.clone(),
            _ => return,
        };
        match key.code {
            KeyCode::Char('y') | KeyCode::Enter => {
                self.mode = Mode::Normal;
                let result = match action {
                    ConfirmAction::DeleteTask { project, index, .. } => self
                        .session
                        .delete_task(&project, index)
                        .map(|removed| {
                            if removed {
                                format!("Deleted last task; project {} removed", project)
                            } else {
                                format!("Deleted task from {}", project)
                            }
                        }),
                    ConfirmAction::ClearTasks => self
                        .session
                        .delete_all_tasks()
                        .map(|_| "Tasks store deleted".to_string()),
                    ConfirmAction::ClearSuggestions => self
                        .session
                        .delete_all_suggestions()
                        .map(|_| "Dropdown values deleted".to_string()),
                };
                self.finish(result);
            }
            KeyCode::Char('n') | KeyCode::Esc => {
                self.status = "Canceled".into();
                self.mode = Mode::Normal;
            }
            _ => {}
        }
    }

    fn toggle_selected(&mut self) {
        let Some((project, index)) = self.current_target() else {
            self.status = "No task selected".into();
            return;
        };
        let result = self
            .session
            .toggle_complete(&project, index)
            .map(|completed| {
                if completed {
                    format!("Completed task in {}", project)
                } else {
                    format!("Reopened task in {}", project)
                }
            });
        self.finish(result);
    }

    fn toggle_collapse(&mut self) {
        let Some(project) = self.current_project().map(|v| v.name.clone()) else {
            self.status = "No project selected".into();
            return;
        };
        let result = self.session.toggle_collapsed(&project).map(|collapsed| {
            if collapsed {
                format!("Hiding completed tasks in {}", project)
            } else {
                format!("Showing completed tasks in {}", project)
            }
        });
        self.finish(result);
    }

    fn start_notes(&mut self) {
        let Some((project, index)) = self.current_target() else {
            self.status = "No task selected".into();
            return;
        };
        let notes = match self.session.book().task(&project, index) {
            Ok(task) => task.notes.clone(),
            Err(err) => {
                self.status = err.to_string();
                return;
            }
        };
        self.mode = Mode::EditingNotes {
            project,
            index,
            field: FieldValue::new(&notes),
        };
        self.status = "Editing notes (Enter/Esc save, Alt+Enter or Shift+Enter newline)".into();
    }

    /// Reports the outcome of one store-touching action and re-projects
    /// the view.
    fn finish(&mut self, result: Result<String>) {
        match result {
            Ok(message) => {
                self.last_save = Instant::now();
                self.status = message;
            }
            Err(err) => {
                error!("action failed: {:#}", err);
                self.status = format!("Error: {:#}", err);
            }
        }
        self.refresh();
    }

    fn refresh(&mut self) {
        self.views = self.session.views(false);
        self.selected_project = self
            .selected_project
            .min(self.views.len().saturating_sub(1));
        let rows = self
            .views
            .get(self.selected_project)
            .map(|v| v.rows.len())
            .unwrap_or(0);
        self.selected_task = self.selected_task.min(rows.saturating_sub(1));
    }

    fn select_task(&mut self, project: &str, index: usize) {
        if let Some(p_idx) = self.views.iter().position(|v| v.name == project) {
            self.selected_project = p_idx;
            self.selected_task = self.views[p_idx]
                .rows
                .iter()
                .position(|r| r.index == index)
                .unwrap_or(0);
        }
    }

    fn prev_project(&mut self) {
        if self.selected_project > 0 {
            self.selected_project -= 1;
            self.selected_task = 0;
            self.task_state = ListState::default();
        }
    }

    fn next_project(&mut self) {
        if self.selected_project + 1 < self.views.len() {
            self.selected_project += 1;
            self.selected_task = 0;
            self.task_state = ListState::default();
        }
    }

    fn prev_task(&mut self) {
        self.selected_task = self.selected_task.saturating_sub(1);
    }

    fn next_task(&mut self) {
        let rows = self
            .current_project()
            .map(|v| v.rows.len())
            .unwrap_or(0);
        if self.selected_task + 1 < rows {
            self.selected_task += 1;
        }
    }

    fn current_project(&self) -> Option<&ProjectView> {
        self.views.get(self.selected_project)
    }

    fn current_row(&self) -> Option<(&ProjectView, &TaskRow)> {
        let view = self.current_project()?;
        let row = view.rows.get(self.selected_task)?;
        Some((view, row))
    }

    fn current_target(&self) -> Option<(String, usize)> {
        self.current_row()
            .map(|(view, row)| (view.name.clone(), row.index))
    }

    fn draw(&mut self, f: &mut ratatui::Frame<'_>) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(8),
                Constraint::Length(4),
            ])
            .split(f.size());

        self.draw_header(f, layout[0]);
        self.draw_main(f, layout[1]);
        self.draw_footer(f, layout[2]);

        match &self.mode {
            Mode::Adding(form) => self.draw_form(f, form),
            Mode::EditingNotes { project, field, .. } => self.draw_notes_editor(f, project, field),
            Mode::Prompt { action, field } => self.draw_prompt(f, *action, field),
            Mode::Confirm(action) => self.draw_confirm(f, action),
            Mode::Normal => {}
        }
    }

    fn draw_header(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let location = self.session.location();
        let title = Line::from(vec![
            Span::styled(
                "taskpad ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("{} task(s)", self.session.book().task_count()),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw("  •  "),
            Span::styled(location.scope.label(), Style::default().fg(Color::Green)),
            Span::raw("  •  "),
            Span::styled(
                format!("{}", location.dir.display()),
                Style::default().fg(Color::DarkGray),
            ),
            Span::raw("  •  "),
            Span::styled(
                format!("saved {}", format_elapsed(self.last_save)),
                Style::default().fg(Color::Gray),
            ),
        ]);

        let block = Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(Color::DarkGray));
        let paragraph = Paragraph::new(title)
            .alignment(Alignment::Center)
            .block(block);
        f.render_widget(paragraph, area);
    }

    fn draw_main(&mut self, f: &mut ratatui::Frame<'_>, area: Rect) {
        if self.views.is_empty() {
            let msg = Paragraph::new("No tasks yet. Press n to add one, i to import a file.")
                .alignment(Alignment::Center)
                .block(Block::default().borders(Borders::ALL).title("taskpad"));
            f.render_widget(Clear, area);
            f.render_widget(msg, area);
            return;
        }
        let panes = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(28), Constraint::Percentage(72)])
            .split(area);
        self.draw_projects(f, panes[0]);
        self.draw_tasks(f, panes[1]);
    }

    fn draw_projects(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let items = self
            .views
            .iter()
            .map(|view| {
                let done = self
                    .session
                    .book()
                    .project(&view.name)
                    .map(|p| p.completed_count())
                    .unwrap_or(0);
                let mut spans = vec![
                    Span::styled(
                        truncate_text(&view.name, area.width.saturating_sub(14) as usize),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(
                        format!(" {}/{}", done, view.total),
                        Style::default().fg(Color::DarkGray),
                    ),
                ];
                if view.collapsed {
                    spans.push(Span::styled(" ▾", Style::default().fg(Color::LightMagenta)));
                }
                ListItem::new(Line::from(spans))
            })
            .collect::<Vec<_>>();
        let mut state = ListState::default();
        state.select(Some(self.selected_project));
        let list = List::new(items)
            .block(
                Block::default()
                    .title(Span::styled(
                        "Projects",
                        Style::default()
                            .fg(Color::Cyan)
                            .add_modifier(Modifier::BOLD),
                    ))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan)),
            )
            .highlight_style(
                Style::default()
                    .bg(Color::LightCyan)
                    .fg(Color::Black)
                    .add_modifier(Modifier::BOLD),
            );
        f.render_stateful_widget(list, area, &mut state);
    }

    fn draw_tasks(&mut self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let Some(view) = self.views.get(self.selected_project) else {
            return;
        };
        let width = area.width.saturating_sub(2);
        let items = view
            .rows
            .iter()
            .enumerate()
            .map(|(idx, row)| task_item(row, width, idx == self.selected_task))
            .collect::<Vec<_>>();
        let mut title = format!("{} ({})", view.name, view.total);
        if view.collapsed {
            title.push_str(&format!(" • {} completed hidden", view.hidden_completed));
        }
        let accent = if view.collapsed {
            Color::LightMagenta
        } else {
            Color::LightGreen
        };
        let block = Block::default()
            .title(Span::styled(
                title,
                Style::default()
                    .fg(accent)
                    .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(accent))
            .style(Style::default().bg(Color::Rgb(16, 18, 24)));
        if view.rows.is_empty() {
            let msg = Paragraph::new("All tasks completed (z shows them)")
                .alignment(Alignment::Center)
                .block(block);
            f.render_widget(msg, area);
            return;
        }
        self.task_state.select(Some(self.selected_task));
        let list = List::new(items).block(block);
        f.render_stateful_widget(list, area, &mut self.task_state);
    }

    fn draw_footer(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(2), Constraint::Length(2)])
            .split(area);

        let help_bar = Paragraph::new(footer_help_line())
            .alignment(Alignment::Center)
            .block(
                Block::default()
                    .borders(Borders::TOP)
                    .border_style(Style::default().fg(Color::DarkGray)),
            );
        f.render_widget(help_bar, rows[0]);

        let bottom = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(rows[1]);

        let status = Paragraph::new(self.status.clone())
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::TOP)
                    .border_style(Style::default().fg(Color::DarkGray)),
            );
        f.render_widget(status, bottom[0]);

        let detail = match self.current_row() {
            Some((_, row)) => selected_task_detail(row),
            None => Line::from("No task selected"),
        };
        let detail = Paragraph::new(detail).wrap(Wrap { trim: true }).block(
            Block::default()
                .borders(Borders::TOP)
                .border_style(Style::default().fg(Color::DarkGray))
                .title("Selected"),
        );
        f.render_widget(detail, bottom[1]);
    }

    fn draw_form(&self, f: &mut ratatui::Frame<'_>, form: &TaskForm) {
        let area = centered_rect(70, 70, f.size());
        let mut lines = Vec::new();
        lines.extend(field_lines("Type", &form.task_type, form.field == FormField::Type));
        lines.extend(field_lines("Person", &form.person, form.field == FormField::Person));
        lines.extend(field_lines("Project", &form.project, form.field == FormField::Project));
        lines.push(priority_line(form.priority, form.field == FormField::Priority));
        lines.extend(field_lines(
            "Due (YYYY-MM-DD)",
            &form.due,
            form.field == FormField::Due,
        ));
        lines.extend(field_lines(
            "Description",
            &form.description,
            form.field == FormField::Description,
        ));
        lines.extend(field_lines("Notes", &form.notes, form.field == FormField::Notes));
        lines.push(Line::from(""));
        if let Some(kind) = form.field.suggestion_kind() {
            lines.push(suggestion_hint(self.session.suggestions(), kind, form));
        }
        lines.push(Line::from(Span::styled(
            "Enter/Ctrl+S save • Esc close • Tab/Shift-Tab move • ↑↓ pick suggestion • Enter adds newline in Notes",
            Style::default().fg(Color::Gray),
        )));
        let dialog = Paragraph::new(lines)
            .block(
                Block::default()
                    .title(Span::styled(
                        "New Task",
                        Style::default()
                            .fg(Color::Cyan)
                            .add_modifier(Modifier::BOLD),
                    ))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan)),
            )
            .wrap(Wrap { trim: true });

        f.render_widget(Clear, area);
        f.render_widget(dialog, area);
    }

    fn draw_notes_editor(&self, f: &mut ratatui::Frame<'_>, project: &str, field: &FieldValue) {
        let area = centered_rect(60, 40, f.size());
        let mut lines = field_lines("Notes", field, true);
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Enter or Esc saves • Alt+Enter (or Shift+Enter) adds a newline",
            Style::default().fg(Color::Gray),
        )));
        let dialog = Paragraph::new(lines)
            .block(
                Block::default()
                    .title(Span::styled(
                        format!("Notes • {}", project),
                        Style::default()
                            .fg(Color::LightYellow)
                            .add_modifier(Modifier::BOLD),
                    ))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::LightYellow)),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(Clear, area);
        f.render_widget(dialog, area);
    }

    fn draw_prompt(&self, f: &mut ratatui::Frame<'_>, action: PromptAction, field: &FieldValue) {
        let area = centered_rect(60, 20, f.size());
        let (title, label) = match action {
            PromptAction::Export => ("Export", "Directory"),
            PromptAction::Import => ("Import", "File"),
        };
        let dialog = Paragraph::new(field_lines(label, field, true)).block(
            Block::default()
                .title(Span::styled(
                    title,
                    Style::default()
                        .fg(Color::LightBlue)
                        .add_modifier(Modifier::BOLD),
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::LightBlue)),
        );
        f.render_widget(Clear, area);
        f.render_widget(dialog, area);
    }

    fn draw_confirm(&self, f: &mut ratatui::Frame<'_>, action: &ConfirmAction) {
        let area = centered_rect(50, 30, f.size());
        let question = match action {
            ConfirmAction::DeleteTask { headline, .. } => format!("Delete \"{}\"?", headline),
            ConfirmAction::ClearTasks => {
                "Delete all tasks? This cannot be undone.".to_string()
            }
            ConfirmAction::ClearSuggestions => {
                "Delete all dropdown values? This cannot be undone.".to_string()
            }
        };
        let body = vec![
            Line::from(Span::styled(
                question,
                Style::default()
                    .fg(Color::LightRed)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from("Press y to confirm, n or Esc to cancel"),
        ];
        let dialog = Paragraph::new(body)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .title(Span::styled(
                        "Confirm Delete",
                        Style::default()
                            .fg(Color::LightRed)
                            .add_modifier(Modifier::BOLD),
                    ))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::LightRed)),
            );
        f.render_widget(Clear, area);
        f.render_widget(dialog, area);
    }
}

impl TaskForm {
    fn new(project: &str, priority: Priority) -> Self {
        TaskForm {
            task_type: FieldValue::new(""),
            person: FieldValue::new(""),
            project: FieldValue::new(project),
            priority,
            due: FieldValue::new(""),
            description: FieldValue::new(""),
            notes: FieldValue::new(""),
            field: FormField::Type,
            pick: None,
        }
    }

    fn to_input(&self) -> Result<NewTask> {
        Ok(NewTask {
            task_type: self.task_type.value.clone(),
            person: self.person.value.clone(),
            project: self.project.value.clone(),
            priority: self.priority,
            due_date: parse_due(&self.due.value)?,
            text: self.description.value.clone(),
            notes: self.notes.value.clone(),
        })
    }

    /// Keeps the project, resets priority, clears the rest.
    fn reset_after_add(&mut self, default_priority: Priority) {
        let project = self.project.value.clone();
        *self = TaskForm::new(&project, default_priority);
    }

    fn step_field(&mut self, delta: isize) {
        self.field = self.field.step(delta);
        self.pick = None;
    }

    fn active_field_mut(&mut self) -> Option<&mut FieldValue> {
        match self.field {
            FormField::Type => Some(&mut self.task_type),
            FormField::Person => Some(&mut self.person),
            FormField::Project => Some(&mut self.project),
            FormField::Priority => None,
            FormField::Due => Some(&mut self.due),
            FormField::Description => Some(&mut self.description),
            FormField::Notes => Some(&mut self.notes),
        }
    }

    fn edit(&mut self, f: impl FnOnce(&mut FieldValue)) {
        if let Some(field) = self.active_field_mut() {
            f(field);
        }
        self.pick = None;
    }

    /// Replaces the active field with the next suggestion matching what was
    /// typed. Returns `false` when nothing matches.
    fn cycle_suggestion(
        &mut self,
        suggestions: &Suggestions,
        kind: SuggestionKind,
        delta: isize,
    ) -> bool {
        let prefix = match &self.pick {
            Some(pick) => pick.prefix.clone(),
            None => self
                .active_field_mut()
                .map(|f| f.value.clone())
                .unwrap_or_default(),
        };
        let candidates = suggestions.matching(kind, &prefix);
        if candidates.is_empty() {
            return false;
        }
        let len = candidates.len() as isize;
        let idx = match &self.pick {
            Some(pick) => (pick.idx as isize + delta).rem_euclid(len) as usize,
            None if delta < 0 => candidates.len() - 1,
            None => 0,
        };
        let value = candidates[idx].to_string();
        if let Some(field) = self.active_field_mut() {
            *field = FieldValue::new(&value);
        }
        self.pick = Some(SuggestionPick { prefix, idx });
        true
    }

    fn typed_prefix(&self) -> &str {
        if let Some(pick) = &self.pick {
            return &pick.prefix;
        }
        match self.field {
            FormField::Type => &self.task_type.value,
            FormField::Person => &self.person.value,
            FormField::Project => &self.project.value,
            _ => "",
        }
    }
}

/// Also returns whether keyboard enhancement was pushed. Without it most
/// terminals send Shift+Enter as a plain Enter.
fn setup_terminal() -> Result<(Terminal<CrosstermBackend<Stdout>>, bool)> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let enhanced_keys = supports_keyboard_enhancement().unwrap_or(false);
    if enhanced_keys {
        execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        )?;
    }
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok((terminal, enhanced_keys))
}

fn teardown_terminal(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    enhanced_keys: bool,
) -> Result<()> {
    if enhanced_keys {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)?;
    }
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn tone_color(tone: Tone) -> Color {
    match tone {
        Tone::Alert => Color::LightRed,
        Tone::Good => Color::LightGreen,
        Tone::Warn => Color::Rgb(255, 165, 0),
        Tone::Plain => Color::Gray,
    }
}

fn footer_help_line() -> Line<'static> {
    Line::from(vec![
        Span::styled("←→ / h l", Style::default().fg(Color::LightCyan)),
        Span::raw(" project  "),
        Span::styled("↑↓ / j k", Style::default().fg(Color::LightCyan)),
        Span::raw(" task  "),
        Span::styled("n", Style::default().fg(Color::LightMagenta)),
        Span::raw(" new  "),
        Span::styled("c", Style::default().fg(Color::LightGreen)),
        Span::raw(" complete  "),
        Span::styled("e", Style::default().fg(Color::LightYellow)),
        Span::raw(" notes  "),
        Span::styled("z", Style::default().fg(Color::LightMagenta)),
        Span::raw(" collapse  "),
        Span::styled("d", Style::default().fg(Color::LightRed)),
        Span::raw(" delete  "),
        Span::styled("x/i", Style::default().fg(Color::LightBlue)),
        Span::raw(" export/import  "),
        Span::styled("X/S", Style::default().fg(Color::LightRed)),
        Span::raw(" clear tasks/values  "),
        Span::styled("q", Style::default().fg(Color::LightRed)),
        Span::raw(" quit"),
    ])
}

fn task_item(row: &TaskRow, width: u16, selected: bool) -> ListItem<'static> {
    let inner = width.saturating_sub(4).max(10) as usize;
    let mut headline_style = Style::default()
        .fg(Color::White)
        .add_modifier(Modifier::BOLD);
    if row.is_note {
        headline_style = headline_style.bg(Color::Rgb(252, 214, 112)).fg(Color::Black);
    }
    if row.completed {
        headline_style = headline_style
            .fg(Color::DarkGray)
            .add_modifier(Modifier::CROSSED_OUT);
    }
    let check = if row.completed { "[x] " } else { "[ ] " };
    let mut lines = vec![
        Line::from(vec![
            Span::styled(
                format!("{:>2}. ", row.index + 1),
                Style::default().fg(Color::DarkGray),
            ),
            Span::raw(check),
            Span::styled(truncate_text(&row.headline, inner.saturating_sub(8)), headline_style),
        ]),
        Line::from(vec![
            Span::raw("      Priority: "),
            Span::styled(
                row.priority.label(),
                Style::default().fg(tone_color(row.priority_tone)),
            ),
            Span::raw(", Due: "),
            Span::styled(
                row.due_label.clone(),
                Style::default().fg(tone_color(row.due_tone)),
            ),
        ]),
    ];
    for note in row.notes.lines() {
        lines.push(Line::from(Span::styled(
            format!("      > {}", truncate_text(note, inner.saturating_sub(8))),
            Style::default().fg(Color::Gray).add_modifier(Modifier::DIM),
        )));
    }
    lines.push(Line::from(Span::styled(
        format!("      {}", row.added_label),
        Style::default().fg(Color::DarkGray),
    )));
    lines.push(Line::from(""));
    let mut item = ListItem::new(lines).style(Style::default().bg(Color::Rgb(22, 24, 30)));
    if selected {
        item = item.style(Style::default().bg(Color::Rgb(44, 52, 70)));
    }
    item
}

fn priority_line(priority: Priority, active: bool) -> Line<'static> {
    let label_style = Style::default()
        .fg(Color::Gray)
        .add_modifier(Modifier::BOLD | Modifier::DIM);
    let value = if active {
        format!("◂ {} ▸", priority)
    } else {
        priority.to_string()
    };
    let mut value_style = Style::default().fg(tone_color(priority_tone(priority)));
    if active {
        value_style = value_style.add_modifier(Modifier::BOLD);
    }
    Line::from(vec![
        Span::styled("Priority: ", label_style),
        Span::styled(value, value_style),
    ])
}

fn suggestion_hint(suggestions: &Suggestions, kind: SuggestionKind, form: &TaskForm) -> Line<'static> {
    let matches = suggestions.matching(kind, form.typed_prefix());
    let mut spans = vec![Span::styled(
        format!("{}: ", kind.label()),
        Style::default().fg(Color::Gray),
    )];
    if matches.is_empty() {
        spans.push(Span::styled("(none saved)", Style::default().fg(Color::DarkGray)));
    }
    let picked = form.pick.as_ref().map(|p| p.idx);
    for (idx, value) in matches.iter().take(MAX_SUGGESTION_HINTS).enumerate() {
        let style = if picked == Some(idx) {
            Style::default().fg(Color::Black).bg(Color::LightCyan)
        } else {
            Style::default().fg(Color::LightCyan)
        };
        spans.push(Span::styled((*value).to_string(), style));
        spans.push(Span::raw("  "));
    }
    if matches.len() > MAX_SUGGESTION_HINTS {
        spans.push(Span::styled(
            format!("+{} more", matches.len() - MAX_SUGGESTION_HINTS),
            Style::default().fg(Color::DarkGray),
        ));
    }
    Line::from(spans)
}

fn field_lines(label: &str, field: &FieldValue, active: bool) -> Vec<Line<'static>> {
    let label_style = Style::default()
        .fg(Color::Gray)
        .add_modifier(Modifier::BOLD | Modifier::DIM);
    let value_style = Style::default().fg(if active { Color::Cyan } else { Color::White });
    let prefix = format!("{}: ", label);
    let spacer = " ".repeat(prefix.chars().count());
    let text = if active {
        field.with_caret()
    } else {
        field.value.clone()
    };
    text.split('\n')
        .enumerate()
        .map(|(idx, line)| {
            Line::from(vec![
                Span::styled(
                    if idx == 0 {
                        prefix.clone()
                    } else {
                        spacer.clone()
                    },
                    label_style,
                ),
                Span::styled(line.to_string(), value_style),
            ])
        })
        .collect()
}

fn selected_task_detail(row: &TaskRow) -> Line<'static> {
    let mut spans = vec![Span::styled(
        row.headline.clone(),
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    )];
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
        details_line(row),
        Style::default().fg(tone_color(row.due_tone)),
    ));
    if !row.notes.is_empty() {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            row.notes.replace('\n', " / "),
            Style::default().fg(Color::Gray).add_modifier(Modifier::DIM),
        ));
    }
    Line::from(spans)
}

fn prev_char_boundary(cursor: usize, text: &str) -> usize {
    text[..cursor]
        .char_indices()
        .next_back()
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

fn next_char_boundary(cursor: usize, text: &str) -> usize {
    text[cursor..]
        .chars()
        .next()
        .map(|ch| cursor + ch.len_utf8())
        .unwrap_or(text.len())
}

/// Line start offsets, the cursor's line and its column in chars.
fn line_state(text: &str, cursor: usize) -> (Vec<usize>, usize, usize) {
    let mut starts = vec![0];
    starts.extend(
        text.char_indices()
            .filter(|(_, ch)| *ch == '\n')
            .map(|(idx, _)| idx + 1),
    );
    let line_idx = starts
        .iter()
        .rposition(|start| *start <= cursor)
        .unwrap_or(0);
    let col = text[starts[line_idx]..cursor].chars().count();
    (starts, line_idx, col)
}

fn index_at_col(text: &str, start: usize, target_col: usize) -> usize {
    let slice = &text[start..];
    let limit = slice.find('\n').unwrap_or(slice.len());
    slice[..limit]
        .char_indices()
        .nth(target_col)
        .map(|(idx, _)| start + idx)
        .unwrap_or(start + limit)
}

fn truncate_text(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max <= 3 {
        return text.chars().take(max).collect();
    }
    let mut out: String = text.chars().take(max - 3).collect();
    out.push_str("...");
    out
}

fn format_elapsed(last: Instant) -> String {
    let secs = last.elapsed().as_secs();
    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{}h ago", secs / 3600)
    }
}
