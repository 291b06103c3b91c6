// src/outcome/exporter.rs
//! Export outcomes for external tooling
//!
//! Supports:
//! - JSON (single document)
//! - JSON Lines (one report per line, for log shippers)
//! - JUnit XML (one test case per agent, for CI)

use crate::agent::AgentId;
use crate::outcome::{FailurePhase, Outcome, OutcomeStatus};
use crate::utils::errors::{KernelError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    JsonLines,
    JUnit,
}

/// Serializable view of an outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub sequence: u64,
    pub agent_id: AgentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<AgentId>,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<FailurePhase>,
    /// Rendered cause chain, outermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

impl From<&Outcome> for OutcomeReport {
    fn from(outcome: &Outcome) -> Self {
        Self {
            sequence: outcome.sequence,
            agent_id: outcome.agent_id,
            parent_id: outcome.parent_id,
            status: outcome.status,
            phase: outcome.failure.as_ref().map(|failure| failure.phase()),
            causes: outcome.cause_messages(),
            recorded_at: outcome.recorded_at,
        }
    }
}

/// Exporter for outcome logs
pub struct OutcomeExporter {
    format: ExportFormat,
}

impl OutcomeExporter {
    pub fn new(format: ExportFormat) -> Self {
        Self { format }
    }

    /// Export outcomes to a string
    pub fn export(&self, outcomes: &[Arc<Outcome>]) -> Result<String> {
        debug!("Exporting {} outcomes to {:?} format", outcomes.len(), self.format);

        let reports: Vec<OutcomeReport> = outcomes
            .iter()
            .map(|outcome| OutcomeReport::from(outcome.as_ref()))
            .collect();

        match self.format {
            ExportFormat::Json => self.export_json(&reports),
            ExportFormat::JsonLines => self.export_json_lines(&reports),
            ExportFormat::JUnit => Ok(self.export_junit(&reports)),
        }
    }

    fn export_json(&self, reports: &[OutcomeReport]) -> Result<String> {
        serde_json::to_string_pretty(reports)
            .map_err(|e| KernelError::ExportFailed(format!("JSON serialization error: {}", e)))
    }

    fn export_json_lines(&self, reports: &[OutcomeReport]) -> Result<String> {
        let mut output = String::new();

        for report in reports {
            let line = serde_json::to_string(report).map_err(|e| {
                KernelError::ExportFailed(format!("JSON serialization error: {}", e))
            })?;
            output.push_str(&line);
            output.push('\n');
        }

        Ok(output)
    }

    fn export_junit(&self, reports: &[OutcomeReport]) -> String {
        let failures = reports
            .iter()
            .filter(|report| report.status == OutcomeStatus::Failed)
            .count();

        let cases: Vec<String> = reports
            .iter()
            .map(|report| {
                let failure = if report.status == OutcomeStatus::Failed {
                    let message = report.causes.last().map(String::as_str).unwrap_or("failed");
                    format!(
                        "    <failure message=\"{}\">{}</failure>\n",
                        escape_xml(message),
                        escape_xml(&report.causes.join("\ncaused by: "))
                    )
                } else {
                    String::new()
                };

                format!(
                    "  <testcase name=\"{}\" classname=\"agent\">\n{}  </testcase>",
                    report.agent_id, failure
                )
            })
            .collect();

        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<testsuite name=\"agent-microkernel\" tests=\"{}\" failures=\"{}\">\n{}\n</testsuite>",
            reports.len(),
            failures,
            cases.join("\n")
        )
    }
}

fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::AgentFailure;

    #[derive(Debug, thiserror::Error)]
    #[error("Error in the agent <init>")]
    struct InitError;

    fn sample() -> Vec<Arc<Outcome>> {
        let ok = Outcome::completed(AgentId::new(), None);
        let mut bad = Outcome::failed(
            None,
            AgentFailure::Raised {
                agent_id: AgentId::new(),
                phase: FailurePhase::Initialization,
                source: InitError.into(),
            },
        );
        bad.sequence = 1;
        vec![Arc::new(ok), Arc::new(bad)]
    }

    #[test]
    fn test_json_export() {
        let outcomes = sample();
        let json = OutcomeExporter::new(ExportFormat::Json)
            .export(&outcomes)
            .unwrap();

        let reports: Vec<OutcomeReport> = serde_json::from_str(&json).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].status, OutcomeStatus::Completed);
        assert!(reports[0].causes.is_empty());
        assert_eq!(reports[1].phase, Some(FailurePhase::Initialization));
        assert_eq!(reports[1].causes.last().unwrap(), "Error in the agent <init>");
    }

    #[test]
    fn test_json_lines_export() {
        let outcomes = sample();
        let lines = OutcomeExporter::new(ExportFormat::JsonLines)
            .export(&outcomes)
            .unwrap();

        assert_eq!(lines.lines().count(), 2);
        for line in lines.lines() {
            let report: OutcomeReport = serde_json::from_str(line).unwrap();
            assert!(report.sequence <= 1);
        }
    }

    #[test]
    fn test_junit_export() {
        let outcomes = sample();
        let xml = OutcomeExporter::new(ExportFormat::JUnit)
            .export(&outcomes)
            .unwrap();

        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("tests=\"2\" failures=\"1\""));
        assert!(xml.contains(&outcomes[1].agent_id.to_string()));
        assert!(xml.contains("Error in the agent &lt;init&gt;"));
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&apos;");
    }
}
