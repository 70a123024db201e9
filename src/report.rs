//! Run report aggregation and export.
//!
//! - `CaseResult`: verdict for one data type within a scenario
//! - `ScenarioReport`: every case run under one configuration-of-the-day
//! - `RunReport`: all scenarios of a run, exportable as JSON, CSV or markdown

use crate::acquisition::AcquisitionConfig;
use crate::config::ReportFormat;
use crate::error::HarnessError;
use crate::oracle::Verdict;
use crate::params::DataType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of one data-type case. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    /// Element type under test
    pub data_type: DataType,
    /// Pass, or the failure that ended the case
    pub verdict: Verdict,
    /// When the case started
    pub started_at: DateTime<Utc>,
    /// Wall time from configuration to verdict
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl CaseResult {
    /// Record a finished case
    pub fn new(data_type: DataType, verdict: Verdict, started_at: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            data_type,
            verdict,
            started_at,
            duration,
        }
    }

    /// Whether the case passed
    pub fn passed(&self) -> bool {
        self.verdict.is_pass()
    }

    /// `PASS` or the failure category
    pub fn status(&self) -> &'static str {
        match self.verdict.failure() {
            None => "PASS",
            Some(failure) => failure.category(),
        }
    }

    /// Failure description, if the case failed
    pub fn detail(&self) -> Option<String> {
        self.verdict.failure().map(|f| f.to_string())
    }
}

/// Results for one scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name from the configuration
    pub name: String,
    /// Configuration applied at scenario setup
    pub config: AcquisitionConfig,
    /// Cases in the order they ran
    pub cases: Vec<CaseResult>,
}

impl ScenarioReport {
    /// Empty report for a scenario applied with `config`
    pub fn new(name: impl Into<String>, config: AcquisitionConfig) -> Self {
        Self {
            name: name.into(),
            config,
            cases: Vec::new(),
        }
    }

    /// Append a finished case
    pub fn add_case(&mut self, case: CaseResult) {
        self.cases.push(case);
    }

    /// Number of cases run
    pub fn total_count(&self) -> usize {
        self.cases.len()
    }

    /// Number of passing cases
    pub fn passed_count(&self) -> usize {
        self.cases.iter().filter(|c| c.passed()).count()
    }

    /// Number of failing cases
    pub fn failed_count(&self) -> usize {
        self.total_count() - self.passed_count()
    }

    /// Logical AND of the per-type verdicts
    pub fn passed(&self) -> bool {
        self.cases.iter().all(CaseResult::passed)
    }

    /// Pass rate as a percentage
    pub fn pass_rate(&self) -> f64 {
        if self.cases.is_empty() {
            return 100.0;
        }
        (self.passed_count() as f64 / self.total_count() as f64) * 100.0
    }

    /// Sum of case durations
    pub fn total_duration(&self) -> Duration {
        self.cases.iter().map(|c| c.duration).sum()
    }

    /// Case for `data_type`, if it was run
    pub fn case(&self, data_type: DataType) -> Option<&CaseResult> {
        self.cases.iter().find(|c| c.data_type == data_type)
    }

    /// Failed cases, in run order
    pub fn failures(&self) -> Vec<&CaseResult> {
        self.cases.iter().filter(|c| !c.passed()).collect()
    }
}

/// Complete run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// When the run started
    pub generated_at: DateTime<Utc>,
    /// Harness name and endpoint prefix
    pub system_id: String,
    /// One section per scenario
    pub scenarios: Vec<ScenarioReport>,
}

impl RunReport {
    /// Empty report stamped with the current time
    pub fn new(system_id: impl Into<String>) -> Self {
        Self {
            generated_at: Utc::now(),
            system_id: system_id.into(),
            scenarios: Vec::new(),
        }
    }

    /// Append a finished scenario
    pub fn add_scenario(&mut self, scenario: ScenarioReport) {
        self.scenarios.push(scenario);
    }

    /// Cases across all scenarios
    pub fn total_cases(&self) -> usize {
        self.scenarios.iter().map(|s| s.total_count()).sum()
    }

    /// Passing cases across all scenarios
    pub fn total_passed(&self) -> usize {
        self.scenarios.iter().map(|s| s.passed_count()).sum()
    }

    /// Failing cases across all scenarios
    pub fn total_failed(&self) -> usize {
        self.scenarios.iter().map(|s| s.failed_count()).sum()
    }

    /// True when every case of every scenario passed
    pub fn all_passed(&self) -> bool {
        self.scenarios.iter().all(ScenarioReport::passed)
    }

    /// Pass rate over every case, as a percentage
    pub fn overall_pass_rate(&self) -> f64 {
        if self.total_cases() == 0 {
            return 100.0;
        }
        (self.total_passed() as f64 / self.total_cases() as f64) * 100.0
    }

    /// Sum of scenario durations
    pub fn total_duration(&self) -> Duration {
        self.scenarios.iter().map(|s| s.total_duration()).sum()
    }

    /// Failed cases with their scenario name
    pub fn all_failures(&self) -> Vec<(&str, &CaseResult)> {
        self.scenarios
            .iter()
            .flat_map(|s| s.failures().into_iter().map(move |c| (s.name.as_str(), c)))
            .collect()
    }

    /// Scenario by name
    pub fn scenario(&self, name: &str) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    /// Render in `format`
    pub fn render(&self, format: ReportFormat) -> Result<String, HarnessError> {
        Ok(match format {
            ReportFormat::Json => self.to_json()?,
            ReportFormat::Csv => self.to_csv(),
            ReportFormat::Markdown => self.to_markdown(),
        })
    }

    /// Export report as JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export report as CSV, one row per case
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("Scenario,DataType,Status,DurationMS,Detail\n");
        for scenario in &self.scenarios {
            for case in &scenario.cases {
                csv.push_str(&format!(
                    "{},{},{},{},{}\n",
                    escape_csv_field(&scenario.name),
                    case.data_type,
                    case.status(),
                    case.duration.as_millis(),
                    escape_csv_field(&case.detail().unwrap_or_default()),
                ));
            }
        }
        csv
    }

    /// Export report as markdown
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "# Acquisition Round-Trip Report\n\n**Date**: {}\n**System**: {}\n\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S"),
            self.system_id
        ));

        md.push_str("## Summary\n\n");
        md.push_str(&format!("- **Total Cases**: {}\n", self.total_cases()));
        md.push_str(&format!(
            "- **Passed**: {} ({:.1}%)\n",
            self.total_passed(),
            self.overall_pass_rate()
        ));
        md.push_str(&format!("- **Failed**: {}\n", self.total_failed()));
        md.push_str(&format!(
            "- **Duration**: {}\n\n",
            format_duration(self.total_duration())
        ));

        for scenario in &self.scenarios {
            let c = &scenario.config;
            md.push_str(&format!("## {}\n\n", scenario.name));
            md.push_str(&format!(
                "`{}` image, `{}` array, `{}` color, `{}` trigger, {} geometry\n\n",
                c.image_mode, c.array_mode, c.color_mode, c.trigger_mode, c.shape
            ));
            md.push_str("| Data type | Result | Duration | Detail |\n");
            md.push_str("|---|---|---|---|\n");
            for case in &scenario.cases {
                md.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    case.data_type,
                    case.status(),
                    format_duration(case.duration),
                    case.detail().unwrap_or_default().replace('|', "\\|")
                ));
            }
            md.push('\n');
        }

        md
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}.{:03}s", secs, duration.subsec_millis())
    }
}

fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
