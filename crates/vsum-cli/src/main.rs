//! Video summarizer binary.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};

use vsum_cli::cli::prompt_reference;
use vsum_cli::{
    check_tools, init_tracing, Args, ContextProvider, MarkdownReportWriter, NoContext, Pipeline,
    ReportWriter, RunConfig, RunLogger, YouTubeDataProvider,
};
use vsum_inference::EndpointConfig;
use vsum_media::FrameEncoder;
use vsum_models::{ReferenceKind, RunId, VideoReference};

/// Startup problems: bad configuration or unusable input.
const EXIT_CONFIG: u8 = 2;
/// A pipeline stage failed.
const EXIT_FAILURE: u8 = 1;
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    // Install rustls crypto provider (required for TLS/HTTPS). A provider
    // that is already installed is fine.
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing();

    info!("Starting vsum");
    ExitCode::from(run(args).await)
}

async fn run(args: Args) -> u8 {
    // Configuration and credentials are checked before any pipeline work.
    let config = match RunConfig::from_env().and_then(|c| c.with_args(&args)) {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            eprintln!("configuration: ConfigurationError: {}", e);
            return EXIT_CONFIG;
        }
    };
    let endpoint_config = match EndpointConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid inference configuration: {}", e);
            eprintln!("configuration: ConfigurationError: {}", e);
            return EXIT_CONFIG;
        }
    };
    info!("Run config: {:?}", config);
    info!("Endpoint config: {:?}", endpoint_config);

    let client = match endpoint_config.build_client() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create inference client: {}", e);
            eprintln!("configuration: ConfigurationError: {}", e);
            return EXIT_CONFIG;
        }
    };

    let raw_reference = match args.reference.clone() {
        Some(r) => r,
        None => match prompt_reference().await {
            Ok(r) => r,
            Err(e) => {
                eprintln!("input: {:#}", e);
                return EXIT_CONFIG;
            }
        },
    };
    let reference = match VideoReference::parse(&raw_reference) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("input: {}", e);
            return EXIT_CONFIG;
        }
    };

    if let Err(e) = check_tools(reference.kind() != ReferenceKind::LocalPath) {
        error!("Missing external tool: {}", e);
        eprintln!("configuration: ConfigurationError: {}", e);
        return EXIT_CONFIG;
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received interrupt, cancelling run");
            let _ = cancel_tx.send(true);
        }
    });

    let provider: Arc<dyn ContextProvider> = if config.fetch_context {
        match YouTubeDataProvider::from_env() {
            Some(p) => Arc::new(
                p.with_encoder(
                    FrameEncoder::new()
                        .with_quality(config.jpeg_quality)
                        .with_max_dimension(config.max_dimension),
                ),
            ),
            None => Arc::new(NoContext),
        }
    } else {
        Arc::new(NoContext)
    };

    let pipeline = Pipeline::from_config(
        &config,
        client.with_cancel(cancel_rx.clone()),
        Some(cancel_rx),
    )
    .with_context_provider(provider);

    let run_id = RunId::new();
    let logger = RunLogger::new(&run_id, reference.as_str());
    let span = logger.create_span();

    let writer = config
        .write_report
        .then(|| MarkdownReportWriter::new(&config.report_dir));
    let outcome = match pipeline
        .run_and_report(&reference, &logger, writer.as_ref().map(|w| w as &dyn ReportWriter))
        .instrument(span)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            logger.log_error(e.stage().as_str(), &e.to_string());
            eprintln!("{}: {}: {}", e.stage(), e.kind(), e);
            return if e.is_cancelled() {
                EXIT_CANCELLED
            } else {
                EXIT_FAILURE
            };
        }
    };

    println!("{}", outcome.report.summary);
    if let Some(path) = &outcome.report_path {
        eprintln!("Report written to {}", path.display());
    }

    0
}
