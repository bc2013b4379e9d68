use crate::model::Priority;
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

/// User preferences read from `config.yml`. Every key is optional.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub data_dir: Option<PathBuf>,
    pub default_priority: Priority,
    pub due_soon_days: i64,
    pub date_display: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: None,
            default_priority: Priority::Medium,
            due_soon_days: 7,
            date_display: "%d/%m/%Y".into(),
        }
    }
}

/// Loads `explicit` when given, otherwise the platform config file. A
/// missing file means defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) => path,
            None => return Ok(Config::default()),
        },
    };
    if !path.exists() {
        return Ok(Config::default());
    }
    let data = fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?;
    parse_config(&data).with_context(|| format!("parsing config file {:?}", path))
}

pub fn parse_config(data: &str) -> Result<Config> {
    if data.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(data)?;
    // Added dates carry no time, so time specifiers fail here too.
    let mut sample = String::new();
    if write!(sample, "{}", NaiveDate::MIN.format(&config.date_display)).is_err() {
        bail!("invalid date_display format: {}", config.date_display);
    }
    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "taskpad").map(|dirs| dirs.config_dir().join("config.yml"))
}
