use crate::models::{CheckStatus, CheckSummary, HealthReport};
use clap::ValueEnum;
use snafu::{ResultExt, Snafu};
use std::io::Write;

#[derive(Debug, Snafu)]
pub enum ReporterError {
    #[snafu(display("Failed to write output: {}", source))]
    OutputError { source: std::io::Error },

    #[snafu(display("Failed to serialize report: {}", source))]
    SerializeError { source: serde_json::Error },
}

type Result<T, E = ReporterError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReportFormat {
    /// Markdown formatted report
    Markdown,
    /// JSON formatted report
    Json,
    /// Plain text summary
    Text,
}

pub struct Reporter {
    format: ReportFormat,
}

impl Reporter {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    /// Writes `reports` to stdout.
    pub fn report(&self, reports: &[HealthReport]) -> Result<()> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        self.write(&mut handle, reports)
    }

    pub fn write<W: Write>(&self, out: &mut W, reports: &[HealthReport]) -> Result<()> {
        match self.format {
            ReportFormat::Markdown => self.report_markdown(out, reports)?,
            ReportFormat::Json => self.report_json(out, reports)?,
            ReportFormat::Text => self.report_text(out, reports)?,
        }
        Ok(())
    }

    fn report_markdown<W: Write>(&self, out: &mut W, reports: &[HealthReport]) -> Result<()> {
        writeln!(out, "# PostgreSQL Schema Health Report\n").context(OutputSnafu)?;

        for report in reports {
            writeln!(out, "## {} (schema `{}`)\n", report.database, report.schema)
                .context(OutputSnafu)?;

            writeln!(out, "- **Checks**: {}", report.checks.len()).context(OutputSnafu)?;
            for status in [
                CheckStatus::Passed,
                CheckStatus::Violations,
                CheckStatus::Failed,
            ] {
                writeln!(
                    out,
                    "- **{}** {}: {}",
                    status.as_str(),
                    self.format_status_badge(status),
                    report.count(status)
                )
                .context(OutputSnafu)?;
            }
            writeln!(out).context(OutputSnafu)?;

            if report.checks.is_empty() {
                continue;
            }

            writeln!(out, "| Check | Status | Records |").context(OutputSnafu)?;
            writeln!(out, "|-------|--------|---------|").context(OutputSnafu)?;
            for check in &report.checks {
                writeln!(
                    out,
                    "| {} | {} | {} |",
                    check.label,
                    check.status.as_str(),
                    check.records.len()
                )
                .context(OutputSnafu)?;
            }
            writeln!(out).context(OutputSnafu)?;

            // Details only for checks that did not pass
            for check in report
                .checks
                .iter()
                .filter(|check| check.status != CheckStatus::Passed)
            {
                self.write_check_markdown(out, check)?;
            }
        }

        Ok(())
    }

    fn write_check_markdown<W: Write>(&self, out: &mut W, check: &CheckSummary) -> Result<()> {
        writeln!(
            out,
            "### {} {}\n",
            check.label,
            self.format_status_badge(check.status)
        )
        .context(OutputSnafu)?;

        if let Some(message) = &check.message {
            writeln!(out, "```text").context(OutputSnafu)?;
            writeln!(out, "{}", message.trim_end()).context(OutputSnafu)?;
            writeln!(out, "```").context(OutputSnafu)?;
        }
        writeln!(out).context(OutputSnafu)?;

        Ok(())
    }

    fn format_status_badge(&self, status: CheckStatus) -> &'static str {
        match status {
            CheckStatus::Passed => "![PASSED](https://img.shields.io/badge/PASSED-green)",
            CheckStatus::Violations => {
                "![VIOLATIONS](https://img.shields.io/badge/VIOLATIONS-orange)"
            }
            CheckStatus::Failed => "![FAILED](https://img.shields.io/badge/FAILED-red)",
        }
    }

    fn report_json<W: Write>(&self, out: &mut W, reports: &[HealthReport]) -> Result<()> {
        serde_json::to_writer_pretty(&mut *out, reports).context(SerializeSnafu)?;
        writeln!(out).context(OutputSnafu)?;
        Ok(())
    }

    fn report_text<W: Write>(&self, out: &mut W, reports: &[HealthReport]) -> Result<()> {
        writeln!(out, "PostgreSQL Schema Health Report").context(OutputSnafu)?;
        writeln!(out, "===============================\n").context(OutputSnafu)?;

        for report in reports {
            let title = format!("{} / {}", report.database, report.schema);
            writeln!(out, "{}", title).context(OutputSnafu)?;
            writeln!(out, "{}", "-".repeat(title.len())).context(OutputSnafu)?;
            writeln!(
                out,
                "  Passed: {}  Violations: {}  Failed: {}",
                report.count(CheckStatus::Passed),
                report.violation_count(),
                report.failure_count()
            )
            .context(OutputSnafu)?;
            writeln!(out).context(OutputSnafu)?;

            for check in &report.checks {
                writeln!(
                    out,
                    "  [{}] {}",
                    self.format_status_text(check.status),
                    check.label
                )
                .context(OutputSnafu)?;
                if let Some(message) = &check.message {
                    for line in message.lines() {
                        writeln!(out, "      {}", line).context(OutputSnafu)?;
                    }
                }
            }
            writeln!(out).context(OutputSnafu)?;
        }

        Ok(())
    }

    fn format_status_text(&self, status: CheckStatus) -> &'static str {
        match status {
            CheckStatus::Passed => "PASS",
            CheckStatus::Violations => "VIOL",
            CheckStatus::Failed => "FAIL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn sample() -> Vec<HealthReport> {
        vec![HealthReport {
            database: "app".into(),
            schema: "public".into(),
            checks: vec![
                CheckSummary {
                    label: "tables_without_primary_key".into(),
                    status: CheckStatus::Passed,
                    message: None,
                    records: Vec::new(),
                },
                CheckSummary {
                    label: "bloated_tables".into(),
                    status: CheckStatus::Violations,
                    message: Some(
                        "DETECTED BLOATED TABLES: #0: orders\n#1: order_lines\n".into(),
                    ),
                    records: vec![json!({"table_name": "orders"}), json!({"table_name": "order_lines"})],
                },
                CheckSummary::unknown("no_such_check"),
            ],
        }]
    }

    fn render(format: ReportFormat) -> String {
        let mut out = Vec::new();
        Reporter::new(format).write(&mut out, &sample()).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn text_report_lists_every_check_with_messages() {
        let text = render(ReportFormat::Text);

        assert!(text.contains("app / public"));
        assert!(text.contains("Passed: 1  Violations: 1  Failed: 1"));
        assert!(text.contains("  [PASS] tables_without_primary_key"));
        assert!(text.contains("  [VIOL] bloated_tables"));
        assert!(text.contains("      DETECTED BLOATED TABLES: #0: orders"));
        assert!(text.contains("      #1: order_lines"));
        assert!(text.contains("  [FAIL] no_such_check"));
    }

    #[test]
    fn markdown_report_details_only_unhealthy_checks() {
        let markdown = render(ReportFormat::Markdown);

        assert!(markdown.starts_with("# PostgreSQL Schema Health Report"));
        assert!(markdown.contains("| bloated_tables | VIOLATIONS | 2 |"));
        assert!(markdown.contains("### bloated_tables ![VIOLATIONS]"));
        assert!(markdown.contains("### no_such_check ![FAILED]"));
        assert!(!markdown.contains("### tables_without_primary_key"));
    }

    #[test]
    fn json_report_round_trips_summary_fields() {
        let json: serde_json::Value = serde_json::from_str(&render(ReportFormat::Json)).unwrap();

        assert_eq!(json[0]["database"], "app");
        assert_eq!(json[0]["checks"][1]["status"], "violations");
        assert_eq!(json[0]["checks"][1]["records"][0]["table_name"], "orders");
        assert!(json[0]["checks"][0]["message"].is_null());
    }

    #[rstest]
    #[case(ReportFormat::Text)]
    #[case(ReportFormat::Markdown)]
    #[case(ReportFormat::Json)]
    fn empty_input_still_renders(#[case] format: ReportFormat) {
        let mut out = Vec::new();
        Reporter::new(format).write(&mut out, &[]).unwrap();
        assert!(!out.is_empty());
    }
}
