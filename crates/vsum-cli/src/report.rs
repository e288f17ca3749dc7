//! Markdown summary reports.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tracing::info;
use uuid::Uuid;
use vsum_models::SummaryReport;

use crate::error::{PipelineError, PipelineResult};

/// Persists a finished report somewhere.
pub trait ReportWriter: Send + Sync {
    /// Write `report`, returning where it landed.
    fn write(&self, report: &SummaryReport) -> PipelineResult<PathBuf>;
}

/// Writes one markdown file per run into a directory.
#[derive(Debug, Clone)]
pub struct MarkdownReportWriter {
    dir: PathBuf,
}

impl MarkdownReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for `report`: `<slug>-<YYYYmmdd-HHMMSS>-<suffix>.md`.
    /// The random suffix keeps runs within the same second apart.
    pub fn file_name(report: &SummaryReport) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "{}-{}-{}.md",
            report.reference.slug(),
            report.generated_at.format("%Y%m%d-%H%M%S"),
            &suffix[..8]
        )
    }
}

impl ReportWriter for MarkdownReportWriter {
    fn write(&self, report: &SummaryReport) -> PipelineResult<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            PipelineError::report(format!("cannot create {}: {}", self.dir.display(), e))
        })?;

        let target = self.dir.join(Self::file_name(report));

        let body = render_markdown(report);

        // Write into the target directory first so the rename stays on one
        // filesystem; a failure drops the temp file and leaves nothing behind.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| PipelineError::report(format!("cannot create temp file: {}", e)))?;
        tmp.write_all(body.as_bytes())
            .and_then(|_| tmp.flush())
            .map_err(|e| PipelineError::report(format!("cannot write report: {}", e)))?;
        tmp.persist_noclobber(&target).map_err(|e| {
            PipelineError::report(format!("cannot persist {}: {}", target.display(), e.error))
        })?;

        info!(path = %target.display(), "Report written");
        Ok(target)
    }
}

/// Render `report` as markdown.
pub fn render_markdown(report: &SummaryReport) -> String {
    let mut out = String::new();

    let title = report
        .context
        .get(vsum_models::context::keys::TITLE)
        .unwrap_or(report.reference.as_str());
    let _ = writeln!(out, "# Video summary: {}", title);
    out.push('\n');
    let _ = writeln!(out, "- **Source:** {}", report.reference);
    let _ = writeln!(
        out,
        "- **Generated:** {}",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "- **Model:** {}", report.model);
    let _ = writeln!(
        out,
        "- **Frames:** {} of {}{}",
        report.frames_used,
        report.frames_requested,
        if report.is_partial() { " (partial)" } else { "" }
    );

    if !report.context.is_empty() {
        out.push_str("\n## Context\n\n");
        for (key, value) in report.context.iter() {
            // Descriptions can run over many lines; keep the list flat.
            let value = value.lines().collect::<Vec<_>>().join(" ");
            let _ = writeln!(out, "- **{}:** {}", key, value);
        }
    }

    out.push_str("\n## Summary\n\n");
    out.push_str(report.summary.trim_end());
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use vsum_models::context::keys;
    use vsum_models::{VideoContext, VideoReference};

    fn sample_report() -> SummaryReport {
        SummaryReport {
            reference: VideoReference::parse("https://youtu.be/dQw4w9WgXcQ").unwrap(),
            summary: "A man sings and dances.\n".to_string(),
            generated_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap(),
            model: "gemini-1.5-pro".to_string(),
            frames_used: 4,
            frames_requested: 5,
            context: VideoContext::new()
                .with(keys::TITLE, "Never Gonna Give You Up")
                .with(keys::DESCRIPTION, "line one\nline two"),
        }
    }

    #[test]
    fn test_render_markdown() {
        let md = render_markdown(&sample_report());

        assert!(md.starts_with("# Video summary: Never Gonna Give You Up\n"));
        assert!(md.contains("- **Source:** https://youtu.be/dQw4w9WgXcQ"));
        assert!(md.contains("- **Generated:** 2024-03-01 12:30:05 UTC"));
        assert!(md.contains("- **Model:** gemini-1.5-pro"));
        assert!(md.contains("- **Frames:** 4 of 5 (partial)"));
        assert!(md.contains("- **description:** line one line two"));
        assert!(md.ends_with("## Summary\n\nA man sings and dances.\n"));
    }

    #[test]
    fn test_file_name() {
        let name = MarkdownReportWriter::file_name(&sample_report());
        let suffix = name
            .strip_prefix("dQw4w9WgXcQ-20240301-123005-")
            .and_then(|rest| rest.strip_suffix(".md"))
            .unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_same_second_reports_do_not_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = MarkdownReportWriter::new(tmp.path());
        let report = sample_report();

        let first = writer.write(&report).unwrap();
        let second = writer.write(&report).unwrap();

        assert_ne!(first, second);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_write_creates_dir_and_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("reports");
        let writer = MarkdownReportWriter::new(&dir);

        let path = tokio_test::assert_ok!(writer.write(&sample_report()));

        assert_eq!(path.parent(), Some(dir.as_path()));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("dQw4w9WgXcQ-20240301-123005-"));
        assert!(name.ends_with(".md"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("A man sings and dances."));

        // Only the report itself remains in the directory.
        let entries: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_unwritable_dir_is_report_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let writer = MarkdownReportWriter::new(blocker.join("reports"));
        let err = writer.write(&sample_report()).unwrap_err();
        assert!(matches!(err, PipelineError::Report(_)));
    }
}
