//! Summaries of the build result files written by the build plugins.
//!
//! The plugins record one entry per `buildtool` task under `taskDetails`. A
//! build with a single task writes the entry as an object instead of an array.

use core::result::Result as CoreResult;
use std::fmt;
use std::fs;
use std::path::Path;

use matlab_ci_core::{Error, Result};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TaskDetails {
    Many(Vec<TaskResult>),
    One(TaskResult),
}

#[derive(Debug, Deserialize)]
struct BuildResultFile {
    #[serde(rename = "taskDetails")]
    task_details: TaskDetails,
}

/// Outcome of one `buildtool` task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskResult {
    /// Task name
    pub name: String,
    /// Task description
    pub description: String,
    /// Time the task took, as reported by MATLAB
    #[serde(deserialize_with = "display_text")]
    pub duration: String,
    /// Whether the task failed
    pub failed: bool,
    /// Whether the task was skipped
    pub skipped: bool,
    skip_reason: Option<String>,
}

impl TaskResult {
    /// Human-readable reason the task was skipped.
    pub fn skip_reason(&self) -> Option<&str> {
        let reason = self.skip_reason.as_deref()?;
        Some(match reason {
            "UpToDate" => "up-to-date",
            "UserSpecified" | "UserRequested" => "user requested",
            "DependencyFailed" => "dependency failed",
            other => other,
        })
    }
}

/// Task counts of one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    tasks: Vec<TaskResult>,
}

impl BuildSummary {
    /// Reads a build result file.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be read, or `Artifact` if it is
    /// not a build result document.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
            .map_err(|error| Error::Artifact(format!("{}: {error}", path.display())))
    }

    /// Parses the JSON text of a build result file.
    ///
    /// # Errors
    /// Returns `Artifact` if `taskDetails` is missing or malformed.
    pub fn parse(text: &str) -> Result<Self> {
        let file: BuildResultFile =
            serde_json::from_str(text).map_err(|error| Error::Artifact(error.to_string()))?;
        let tasks = match file.task_details {
            TaskDetails::Many(tasks) => tasks,
            TaskDetails::One(task) => vec![task],
        };
        Ok(Self { tasks })
    }

    /// Every task in the order MATLAB ran them.
    pub fn tasks(&self) -> &[TaskResult] {
        &self.tasks
    }

    /// Number of tasks.
    pub fn total(&self) -> usize {
        self.tasks.len()
    }

    /// Number of failed tasks.
    pub fn failed(&self) -> usize {
        self.tasks.iter().filter(|task| task.failed).count()
    }

    /// Number of skipped tasks that did not also fail.
    pub fn skipped(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| !task.failed && task.skipped)
            .count()
    }
}

impl fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} task(s) run, {} failed, {} skipped",
            self.total(),
            self.failed(),
            self.skipped()
        )
    }
}

/// Accepts a string or any other JSON scalar and keeps its text.
fn display_text<'de, D>(deserializer: D) -> CoreResult<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const THREE_TASKS: &str = r#"{
        "taskDetails": [
            {"name": "check", "description": "Identify code issues", "failed": false, "skipped": false, "duration": "00:00:02"},
            {"name": "test", "description": "Run tests", "failed": true, "skipped": false, "duration": "00:00:10"},
            {"name": "package", "description": "Package toolbox", "failed": false, "skipped": true, "skipReason": "DependencyFailed", "duration": "00:00:00"}
        ]
    }"#;

    #[test]
    fn test_counts_tasks() {
        let summary = BuildSummary::parse(THREE_TASKS).expect("valid summary");
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.to_string(), "3 task(s) run, 1 failed, 1 skipped");
        assert_eq!(summary.tasks()[1].name, "test");
    }

    #[test]
    fn test_single_task_object() {
        let summary = BuildSummary::parse(
            r#"{"taskDetails": {"name": "build", "failed": false, "skipped": true, "skipReason": "UpToDate", "duration": 1.5}}"#,
        )
        .expect("valid summary");
        assert_eq!(summary.total(), 1);
        let task = &summary.tasks()[0];
        assert_eq!(task.skip_reason(), Some("up-to-date"));
        assert_eq!(task.duration, "1.5");
        assert_eq!(task.description, "");
    }

    #[test]
    fn test_skip_reason_text() {
        let reason = |raw: &str| TaskResult {
            skip_reason: Some(raw.to_owned()),
            ..TaskResult::default()
        };
        assert_eq!(reason("UserSpecified").skip_reason(), Some("user requested"));
        assert_eq!(reason("UserRequested").skip_reason(), Some("user requested"));
        assert_eq!(reason("Other").skip_reason(), Some("Other"));
        assert_eq!(TaskResult::default().skip_reason(), None);
    }

    #[test]
    fn test_failed_task_is_not_skipped() {
        let summary = BuildSummary::parse(
            r#"{"taskDetails": [{"name": "a", "failed": true, "skipped": true}]}"#,
        )
        .expect("valid summary");
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.skipped(), 0);
    }

    #[test]
    fn test_malformed_file() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("buildArtifact.json");
        fs::write(&path, r#"{"tasks": []}"#).expect("Failed to write");
        let error = BuildSummary::load(&path).expect_err("missing taskDetails");
        assert!(matches!(error, Error::Artifact(_)));
        assert!(error.to_string().contains("buildArtifact.json"));
    }
}
