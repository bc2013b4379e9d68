mod cli;
mod commands;
mod config;
mod logging;
mod model;
mod records;
mod render;
mod session;
mod storage;
mod transfer;
mod ui;

use anyhow::Result;
use clap::Parser;
use std::env;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let command = args.command.unwrap_or(cli::Command::Tui);
    let config = config::load_config(args.config.as_deref())?;
    let cwd = env::current_dir()?;
    let location = storage::locate_store(args.data_dir, &config, &cwd)?;
    let sink = match command {
        cli::Command::Tui => logging::LogSink::File(location.log_path()),
        _ => logging::LogSink::Stderr,
    };
    logging::init(args.verbose, sink)?;
    let ctx = commands::AppContext { config, location };

    match command {
        cli::Command::Init => commands::init(&ctx),
        cli::Command::List { project, all } => commands::list(&ctx, project, all),
        cli::Command::Add {
            text,
            task_type,
            project,
            person,
            priority,
            due,
            notes,
        } => commands::add(&ctx, text, task_type, project, person, priority, due, notes),
        cli::Command::Complete { project, position } => {
            commands::complete(&ctx, project, position)
        }
        cli::Command::Delete { project, position } => commands::delete(&ctx, project, position),
        cli::Command::Notes {
            project,
            position,
            notes,
        } => commands::notes(&ctx, project, position, notes),
        cli::Command::Collapse { project } => commands::collapse(&ctx, project),
        cli::Command::Suggestions { kind } => commands::suggestions(&ctx, kind),
        cli::Command::Export { dir } => commands::export(&ctx, dir),
        cli::Command::Import { file } => commands::import(&ctx, file),
        cli::Command::ClearTasks { yes } => commands::clear_tasks(&ctx, yes),
        cli::Command::ClearSuggestions { yes } => commands::clear_suggestions(&ctx, yes),
        cli::Command::Tui => commands::tui(&ctx),
    }
}
