//! `medexplain` command line.
//!
//! Logs go to stderr (filter with `RUST_LOG`); results go to stdout as JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use medexplain_core::{mock_analysis, redact_input, DocumentType, ProvenanceSource, ReadingLevel};
use medexplain_runtime::{AnalysisPipeline, AnalysisRequest, PipelineConfig};

#[derive(Parser)]
#[command(name = "medexplain", version, about = "Explain medical documents in plain language")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a document and print the validated result.
    Analyze {
        /// Document file, or `-` for stdin.
        file: PathBuf,
        #[arg(long = "type", short = 't')]
        document_type: DocumentType,
        #[arg(long, short = 'l', default_value = "standard")]
        level: ReadingLevel,
        /// YAML pipeline configuration.
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
        /// Key used for rate limiting.
        #[arg(long, default_value = "cli")]
        caller: String,
        /// Where the text came from.
        #[arg(long, default_value = "text")]
        source: ProvenanceSource,
    },
    /// Print the redacted text that would be sent to a provider.
    Redact {
        file: PathBuf,
        #[arg(long, default_value_t = 50_000)]
        max_chars: usize,
    },
    /// Print the mock analysis for a document type.
    Fixture {
        #[arg(long = "type", short = 't')]
        document_type: DocumentType,
        #[arg(long, short = 'l', default_value = "standard")]
        level: ReadingLevel,
    },
    /// Print the analysis JSON Schema.
    Schema,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<ExitCode> {
    match command {
        Command::Analyze {
            file,
            document_type,
            level,
            config,
            caller,
            source,
        } => {
            let config = match config {
                Some(path) => PipelineConfig::from_yaml_file(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => PipelineConfig::default(),
            };
            let text = read_document(&file)?;
            let request = AnalysisRequest::new(text, document_type, level).with_source(source);

            let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
            runtime.block_on(analyze(config, &caller, request))
        }
        Command::Redact { file, max_chars } => {
            let text = read_document(&file)?;
            let (redacted, report) = redact_input(&text, max_chars);
            println!("{redacted}");
            eprintln!("{}", serde_json::to_string(&report)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Fixture {
            document_type,
            level,
        } => {
            let fixture = mock_analysis(document_type, level);
            println!("{}", serde_json::to_string_pretty(&fixture.to_value()?)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Schema => {
            println!("{}", medexplain_core::contract::schema_source());
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn analyze(config: PipelineConfig, caller: &str, request: AnalysisRequest) -> Result<ExitCode> {
    let pipeline = AnalysisPipeline::from_config(config).context("configuring provider")?;
    match pipeline.provider_name() {
        Some(name) => tracing::info!(provider = name, "using provider"),
        None => tracing::info!("no provider configured, running in mock mode"),
    }

    match pipeline.analyze_request(caller, request).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result.to_value()?)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            let body = serde_json::json!({
                "error": err.kind(),
                "message": err.user_message(),
                "status": err.http_status(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(ExitCode::from(2))
        }
    }
}

fn read_document(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}
