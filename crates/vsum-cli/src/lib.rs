//! Command-line video summarizer.
//!
//! Wires media acquisition, frame sampling, encoding and model inference
//! into one sequential run, then prints the summary and writes a markdown
//! report.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod pipeline;
pub mod report;

pub use cli::Args;
pub use config::{check_tools, RunConfig};
pub use error::{ConfigError, PipelineError, PipelineResult, Stage};
pub use logging::{build_env_filter, init_tracing, RunLogger};
pub use metadata::{fetch_context, ContextProvider, MetadataError, NoContext, YouTubeDataProvider};
pub use pipeline::{Pipeline, RunOutcome};
pub use report::{render_markdown, MarkdownReportWriter, ReportWriter};
