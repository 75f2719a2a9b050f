//! Validation report files.
//!
//! Every feature test writes a report with the same shape: a header line
//! naming the test, one `GOOD:` or `BAD:` line per check, and a summary
//! line carrying the conjunction of all checks. The regression runner
//! greps the summary line, so its format is fixed.

use std::path::Path;

use super::SftError;

/// File name the regression runner looks for in a test's output directory.
pub const REPORT_FILE_NAME: &str = "scientific_feature_report.txt";

/// Accumulates check results for one feature test.
#[derive(Debug, Clone)]
pub struct Report {
    lines: Vec<String>,
    success: bool,
}

impl Report {
    /// Opens a report for the named test, stamped with the local time.
    pub fn new(name: &str) -> Self {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        Report {
            lines: vec![format!(
                "Beginning validation for {name} at time {timestamp}."
            )],
            success: true,
        }
    }

    /// Records one check and returns its outcome. The summary stays true
    /// only while every recorded check passes.
    pub fn record(&mut self, passed: bool, message: impl AsRef<str>) -> bool {
        let prefix = if passed { "GOOD" } else { "BAD" };
        self.lines.push(format!("{prefix}: {}", message.as_ref()));
        self.success &= passed;
        passed
    }

    /// Records a passing check.
    pub fn good(&mut self, message: impl AsRef<str>) {
        self.record(true, message);
    }

    /// Records a failing check.
    pub fn bad(&mut self, message: impl AsRef<str>) {
        self.record(false, message);
    }

    /// Adds a context line without recording a check.
    pub fn note(&mut self, message: impl AsRef<str>) {
        self.lines.push(message.as_ref().to_string());
    }

    /// Conjunction of every check recorded so far.
    pub fn success(&self) -> bool {
        self.success
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The full report text, summary line included.
    pub fn render(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        let summary = if self.success { "True" } else { "False" };
        text.push_str(&format!("SUMMARY: Success={summary}\n"));
        text
    }

    pub fn write(&self, path: &Path) -> Result<(), SftError> {
        std::fs::write(path, self.render())?;
        Ok(())
    }
}
