use anyhow::{Context, Result};
use billbot::{BatchSummary, BillingTask, TaskResult, TaskResultStatus};
use chrono::{DateTime, Local};
use colored::Colorize;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// JSON document written after every run.
#[derive(Debug, Serialize)]
pub struct BatchReport<'a> {
    pub generated_at: DateTime<Local>,
    pub profile: &'a Path,
    pub summary: BatchSummary,
    pub results: &'a [TaskResult],
}

impl<'a> BatchReport<'a> {
    pub fn new(profile: &'a Path, results: &'a [TaskResult]) -> Self {
        Self {
            generated_at: Local::now(),
            profile,
            summary: BatchSummary::from_results(results),
            results,
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating report directory {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(self).context("serializing report")?;
        fs::write(path, json).with_context(|| format!("writing report {}", path.display()))
    }
}

/// `data/output/report_<YYYYmmdd_HHMMSS>.json`
pub fn default_report_path(now: DateTime<Local>) -> PathBuf {
    PathBuf::from("data/output").join(format!("report_{}.json", now.format("%Y%m%d_%H%M%S")))
}

/// Read the ordered task list produced by the data pipeline.
pub fn load_tasks(path: &Path) -> Result<Vec<BillingTask>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading task file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing task file {}", path.display()))
}

pub fn print_summary(results: &[TaskResult]) {
    for result in results {
        let status = format!("{:?}", result.status);
        let status = match result.status {
            TaskResultStatus::Success => status.green(),
            TaskResultStatus::Cancelled => status.yellow(),
            _ => status.red(),
        };
        match (&result.failed_at_state, &result.message) {
            (Some(state), Some(message)) => {
                println!("  {} {} at {}: {}", status, result.task_identifier, state, message)
            }
            _ => println!("  {} {}", status, result.task_identifier),
        }
    }

    let summary = BatchSummary::from_results(results);
    println!(
        "\n{} {} total, {} succeeded, {} failed, {} cancelled",
        "Batch finished:".bold(),
        summary.total,
        summary.succeeded.to_string().green(),
        summary.failed().to_string().red(),
        summary.cancelled.to_string().yellow()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use billbot::TaskState;
    use chrono::TimeZone;

    #[test]
    fn test_report_contains_summary_and_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/report.json");
        let results = vec![
            TaskResult::success("ID-1", 3),
            TaskResult {
                status: TaskResultStatus::FailedUnrecoverable,
                task_identifier: "ID-2".into(),
                message: Some("mismatch".into()),
                failed_at_state: Some(TaskState::FindingRecord),
                error_code: Some("E2001_ID_MISMATCH".into()),
                attempts: 2,
            },
        ];

        BatchReport::new(Path::new("profile.toml"), &results)
            .write_to(&path)
            .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["summary"]["total"], 2);
        assert_eq!(json["summary"]["failed_unrecoverable"], 1);
        assert_eq!(json["results"][1]["status"], "FAILED_UNRECOVERABLE");
        assert_eq!(json["results"][1]["failed_at_state"], "FINDING_RECORD");
        assert!(json["results"][0].get("message").is_none());
    }

    #[test]
    fn test_default_report_path_is_timestamped() {
        let now = Local.with_ymd_and_hms(2025, 7, 14, 18, 30, 0).unwrap();
        assert_eq!(
            default_report_path(now),
            PathBuf::from("data/output/report_20250714_183000.json")
        );
    }

    #[test]
    fn test_load_tasks_reads_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        fs::write(
            &path,
            r#"[{
                "record_id": "ID-12345",
                "validation_id": "CC-98765",
                "insurer": "Test Insurer",
                "contract": "Contract 1",
                "stratum": "2",
                "primary_diagnosis": "A001",
                "additional_diagnoses": ["B002", "C003"],
                "attending_physician": "Dr. Mock",
                "admission_date": "2025-07-14"
            }]"#,
        )
        .unwrap();

        let tasks = load_tasks(&path).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].additional_diagnoses, ["B002", "C003"]);
    }

    #[test]
    fn test_load_tasks_reports_file_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{not json").unwrap();
        let err = load_tasks(&path).unwrap_err();
        assert!(format!("{err:#}").contains("broken.json"));
    }
}
