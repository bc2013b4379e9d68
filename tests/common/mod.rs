//! Shared helpers for taskpad integration tests.

#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

/// An isolated working directory and data directory. Every command gets
/// `TASKPAD_DATA_DIR` and `TASKPAD_CONFIG` pointed inside them, so tests
/// never touch the user's real stores.
pub struct TestEnv {
    pub work_dir: TempDir,
    pub data_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            work_dir: TempDir::new().unwrap(),
            data_dir: TempDir::new().unwrap(),
        }
    }

    pub fn taskpad(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_taskpad"));
        cmd.current_dir(self.work_dir.path());
        cmd.env("TASKPAD_DATA_DIR", self.data_dir.path());
        cmd.env("TASKPAD_CONFIG", self.config_path());
        cmd.env_remove("TASKPAD_LOG");
        cmd
    }

    /// Adds a task, asserting success.
    pub fn add(&self, args: &[&str]) {
        self.taskpad().arg("add").args(args).assert().success();
    }

    pub fn list(&self) -> String {
        let output = self.taskpad().arg("list").output().unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout).unwrap()
    }

    pub fn write_config(&self, yaml: &str) {
        fs::write(self.config_path(), yaml).unwrap();
    }

    pub fn config_path(&self) -> PathBuf {
        self.work_dir.path().join("config.yml")
    }

    pub fn work_path(&self) -> &Path {
        self.work_dir.path()
    }

    pub fn data_path(&self) -> &Path {
        self.data_dir.path()
    }

    pub fn read_data(&self, relative: &str) -> String {
        fs::read_to_string(self.data_path().join(relative)).unwrap()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
