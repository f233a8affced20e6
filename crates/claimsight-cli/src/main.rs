use std::io::Read;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use claimsight_core::{validate_request, CaseRequest, CaseShape, ResponseDecoder, Ruleset};
use claimsight_runtime::prelude::*;

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "claimsight=debug,claimsight_core=debug,claimsight_runtime=debug"
    } else {
        "claimsight=info,claimsight_core=info,claimsight_runtime=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Logs go to stderr; stdout carries the JSON result.
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Returns whether the command succeeded.
async fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::Run {
            case,
            ruleset,
            config,
            prompts,
            pretty,
        } => cmd_run(&case, &ruleset, config.as_deref(), prompts.as_deref(), pretty).await,
        Commands::Validate { case } => cmd_validate(&case),
        Commands::Decode { input } => cmd_decode(&input),
    }
}

async fn cmd_run(
    case: &Path,
    ruleset: &Path,
    config: Option<&Path>,
    prompts: Option<&Path>,
    pretty: bool,
) -> Result<bool> {
    let request = load_case(case)?;
    let ruleset = Ruleset::from_file(ruleset)
        .with_context(|| format!("reading ruleset {}", ruleset.display()))?;
    let config = match config {
        Some(path) => RuntimeConfig::from_yaml_file(path)?,
        None => RuntimeConfig::default(),
    };
    let prompts = match prompts {
        Some(path) => PromptLibrary::from_yaml_file(path)?,
        None => PromptLibrary::default(),
    };

    let (processors, adjudicator) = match &config.job_endpoint {
        Some(endpoint) => job_backends(endpoint, &config),
        None => model_backends(&config, prompts)?,
    };

    let orchestrator = CaseOrchestrator::builder()
        .processors(processors)
        .adjudicator(adjudicator)
        .ruleset(ruleset)
        .config(config)
        .build()?;

    let outcome = orchestrator.submit(request).await;
    print_json(&outcome, pretty)?;
    Ok(outcome.ok())
}

type Backends = (Vec<Arc<dyn ModalityProcessor>>, Arc<dyn Adjudicator>);

fn model_backends(config: &RuntimeConfig, prompts: PromptLibrary) -> Result<Backends> {
    let provider = ProviderRegistry::with_defaults()
        .create(&config.provider)
        .context("creating model provider")?;
    let provider: Arc<dyn LlmProvider> =
        Arc::new(RetryingProvider::new(provider, config.retry.clone()));
    let store: Arc<dyn EvidenceStore> = Arc::new(CompositeStore::with_defaults());

    let processors = LlmModalityProcessor::for_all_modalities(
        provider.clone(),
        store,
        &prompts,
        &config.processing_model,
        config.unit_timeout,
        &config.labels,
    );
    let adjudicator = LlmAdjudicator::new(provider, prompts)
        .with_model(config.adjudication_model.clone())
        .with_timeout(config.adjudication_timeout)
        .with_labels(config.labels.clone());
    Ok((processors, Arc::new(adjudicator)))
}

fn job_backends(endpoint: &str, config: &RuntimeConfig) -> Backends {
    tracing::info!(endpoint, "Running analyses as external jobs");
    let backend: Arc<dyn JobBackend> = Arc::new(HttpJobBackend::from_env(endpoint));
    let poller = JobPoller::from_config(&config.polling);
    (
        JobProcessor::for_all_modalities(backend.clone(), poller),
        Arc::new(JobAdjudicator::new(backend, poller)),
    )
}

#[derive(Serialize)]
struct ValidationReport {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    shape: Option<CaseShape>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn cmd_validate(case: &Path) -> Result<bool> {
    let request = load_case(case)?;
    let report = match validate_request(&request) {
        Ok(shape) => ValidationReport {
            ok: true,
            shape: Some(shape),
            error: None,
        },
        Err(e) => ValidationReport {
            ok: false,
            shape: None,
            error: Some(e.to_string()),
        },
    };
    print_json(&report, true)?;
    Ok(report.ok)
}

fn cmd_decode(input: &Path) -> Result<bool> {
    let raw = if input == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("reading stdin")?;
        raw
    } else {
        std::fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?
    };

    match ResponseDecoder::new().decode_with_step(&raw) {
        Ok((decision, step)) => {
            tracing::debug!(?step, "Decoded");
            print_json(&decision, true)?;
            Ok(true)
        }
        Err(e) => {
            eprintln!("{}", e);
            Ok(false)
        }
    }
}

fn load_case(path: &Path) -> Result<CaseRequest> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading case {}", path.display()))?;
    CaseRequest::from_json(&json).with_context(|| format!("parsing case {}", path.display()))
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}
