use clap::{Parser, Subcommand};
use lc_intake::config::{Config, DEFAULT_CONFIG_PATH, LlmBackend};
use lc_intake::heuristics::HeuristicExtractor;
use lc_intake::llm_extract::LlmExtractor;
use lc_intake::merge::{self, missing_by_section};
use lc_intake::{LcExtractor, LcPipeline, LcRecord, SchemaRegistry};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::{fs, io};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lc-intake")]
#[command(
    about = "Letter of Credit intake: extraction, merge and sanctions screening.",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract an LC from a PDF and screen it.
    ExtractPdf {
        file: PathBuf,
        /// JSON object with fields already known; it wins over extracted values.
        #[arg(long, value_name = "JSON")]
        provided: Option<PathBuf>,
    },
    /// Extract an LC from plain document text, such as an MT700 message.
    ExtractText {
        file: PathBuf,
        #[arg(long, value_name = "JSON")]
        provided: Option<PathBuf>,
    },
    /// Extract an LC from a call transcript.
    Voice {
        transcript: PathBuf,
        #[arg(long, value_name = "JSON")]
        provided: Option<PathBuf>,
    },
    /// Normalize and screen a JSON record.
    Check { record: PathBuf },
    /// Fill-only merge of two JSON records; the first one wins.
    Merge { base: PathBuf, incoming: PathBuf },
    /// List fields that still need a value.
    Missing { record: PathBuf },
    /// Screen a single country.
    Country { name: String },
    /// Screen a destination port.
    Port {
        name: String,
        #[arg(long)]
        country: Option<String>,
    },
    /// List sanctioned countries, the critical-risk ones and dual-use keywords.
    Sanctions,
}

#[derive(Serialize)]
struct MissingSection<'a> {
    section: String,
    fields: Vec<&'a merge::MissingField>,
}

#[derive(Serialize)]
struct ReferenceListing<'a> {
    sanctioned_countries: Vec<&'a str>,
    critical_risk_countries: Vec<&'a str>,
    dual_use_keywords: &'a [String],
}

fn read_json_object(path: &Path) -> Result<Map<String, Value>, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&content)? {
        Value::Object(map) => Ok(map),
        _ => Err(format!("{} does not hold a JSON object", path.display()).into()),
    }
}

fn read_provided(
    path: Option<&PathBuf>,
) -> Result<Option<Map<String, Value>>, Box<dyn std::error::Error>> {
    path.map(|p| read_json_object(p)).transpose()
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    serde_json::to_writer_pretty(io::stdout().lock(), value)?;
    println!();
    Ok(())
}

/// The configured LLM, or the offline MT700 extractor when it is unavailable.
async fn build_extractor(cfg: &Config) -> Box<dyn LcExtractor> {
    if cfg.llm.backend == LlmBackend::Heuristics {
        info!("Backend set to heuristics, using MT700 tag extraction");
        return Box::new(HeuristicExtractor);
    }
    match SchemaRegistry::lc_form() {
        Ok(registry) => match LlmExtractor::connect(&cfg.llm, registry).await {
            Ok(llm) => return Box::new(llm),
            Err(e) => warn!(error = %e, "LLM backend unavailable, falling back to heuristics"),
        },
        Err(e) => warn!(error = %e, "Schema failed to build, falling back to heuristics"),
    }
    Box::new(HeuristicExtractor)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load_or_default(&cli.config)?;
    let pipeline = LcPipeline::new(SchemaRegistry::lc_form()?, cfg.reference.load()?);

    match cli.command {
        Command::ExtractPdf { file, provided } => {
            let provided = read_provided(provided.as_ref())?;
            let bytes = fs::read(&file)?;
            let extractor = build_extractor(&cfg).await;
            let report = pipeline
                .process_pdf(extractor.as_ref(), &bytes, provided.as_ref())
                .await?;
            print_json(&report)?;
        }
        Command::ExtractText { file, provided } => {
            let provided = read_provided(provided.as_ref())?;
            let text = fs::read_to_string(&file)?;
            let extractor = build_extractor(&cfg).await;
            let report = pipeline
                .process_document_text(extractor.as_ref(), &text, provided.as_ref())
                .await?;
            print_json(&report)?;
        }
        Command::Voice {
            transcript,
            provided,
        } => {
            let provided = read_provided(provided.as_ref())?;
            let text = fs::read_to_string(&transcript)?;
            let extractor = build_extractor(&cfg).await;
            let report = pipeline
                .process_transcript(extractor.as_ref(), &text, provided.as_ref())
                .await?;
            print_json(&report)?;
        }
        Command::Check { record } => {
            let raw = read_json_object(&record)?;
            print_json(&pipeline.process_form(&raw))?;
        }
        Command::Merge { base, incoming } => {
            let registry = pipeline.registry();
            let base = registry.normalize(&read_json_object(&base)?);
            let incoming = registry.normalize(&read_json_object(&incoming)?);
            let merged: LcRecord = merge::merge(&base.record, &incoming.record);
            print_json(&merged)?;
        }
        Command::Missing { record } => {
            let normalized = pipeline.registry().normalize(&read_json_object(&record)?);
            let missing = merge::missing_fields(pipeline.registry(), &normalized.record);
            let grouped: Vec<MissingSection> = missing_by_section(&missing)
                .into_iter()
                .map(|(section, fields)| MissingSection { section, fields })
                .collect();
            print_json(&grouped)?;
        }
        Command::Country { name } => {
            print_json(&pipeline.evaluator().quick_country_check(&name))?;
        }
        Command::Port { name, country } => {
            print_json(&pipeline.evaluator().quick_port_check(&name, country.as_deref()))?;
        }
        Command::Sanctions => {
            let reference = pipeline.evaluator().reference();
            print_json(&ReferenceListing {
                sanctioned_countries: reference.sanctioned_country_names(),
                critical_risk_countries: reference.critical_risk_countries(),
                dual_use_keywords: reference.dual_use_keywords(),
            })?;
        }
    }

    Ok(())
}
