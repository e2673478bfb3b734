// support-eval
//
// Design Decision: Use clap derive with env fallbacks; .env is loaded first.
// Design Decision: The agent client is OpenAI wrapped in retry, then an optional shared call budget.
// Design Decision: Judges get their own retrying client outside the call budget.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracecheck_core::telemetry::{init_with, TelemetryConfig};
use tracecheck_core::{
    support_registry, AgentConfig, BoxedLlmClient, BudgetedClient, ConversationLoop,
    ModelCallBudget, OpenAiClient, RetryPolicy, RetryingClient, SupportStore,
};
use tracecheck_eval::{
    code_scorers, judge, Dataset, EvalProgress, EvalRunner, JsonFileDataset, PathMatch,
    RunnerConfig, Scorers,
};

#[derive(Parser, Debug)]
#[command(name = "support-eval")]
#[command(about = "Run the Acme support agent over an eval dataset and score its traces")]
#[command(version)]
struct Args {
    /// JSON dataset file (defaults to the built-in support cases)
    #[arg(long, short = 'd')]
    dataset: Option<PathBuf>,

    /// Number of cases to evaluate (default: all)
    #[arg(long, short = 's')]
    sample: Option<usize>,

    /// Maximum concurrent cases
    #[arg(long, env = "TRACECHECK_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Per-case timeout in seconds
    #[arg(long, env = "TRACECHECK_CASE_TIMEOUT_SECS", default_value_t = 120)]
    case_timeout: u64,

    /// Tool rounds before the model is forced to answer
    #[arg(long, default_value_t = 3)]
    max_rounds: usize,

    /// Total model calls allowed across the run (default: unlimited)
    #[arg(long)]
    max_model_calls: Option<usize>,

    /// How expected_tool_path compares tool paths
    #[arg(long, value_enum, default_value_t = PathMatch::Set)]
    path_match: PathMatch,

    /// Skip the LLM judge scorers
    #[arg(long)]
    no_judges: bool,

    /// Agent model
    #[arg(long, env = "OPENAI_MODEL", default_value = tracecheck_core::openai::DEFAULT_MODEL)]
    model: String,

    /// Judge model (defaults to the agent model)
    #[arg(long, env = "TRACECHECK_JUDGE_MODEL")]
    judge_model: Option<String>,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// OpenAI-compatible base URL
    #[arg(long, env = "OPENAI_BASE_URL")]
    base_url: Option<String>,

    /// LLM request timeout in seconds
    #[arg(long, default_value_t = 60)]
    llm_timeout: u64,

    /// Write the full report as JSON
    #[arg(long)]
    output_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("concurrency must be greater than 0");
        }
        if self.case_timeout == 0 {
            bail!("case timeout must be greater than 0");
        }
        if self.api_key.trim().is_empty() {
            bail!("OPENAI_API_KEY is empty");
        }
        Ok(())
    }

    fn openai(&self, model: &str) -> Result<OpenAiClient> {
        let mut client = OpenAiClient::new(self.api_key.clone())
            .with_model(model)
            .with_timeout(Duration::from_secs(self.llm_timeout))?;
        if let Some(base_url) = &self.base_url {
            client = client.with_base_url(base_url.clone());
        }
        Ok(client)
    }

    fn agent_client(&self) -> Result<BoxedLlmClient> {
        let client: BoxedLlmClient = Arc::new(RetryingClient::new(
            Arc::new(self.openai(&self.model)?),
            RetryPolicy::exponential(),
        ));
        let Some(limit) = self.max_model_calls else {
            return Ok(client);
        };
        Ok(Arc::new(BudgetedClient::new(client, ModelCallBudget::new(limit))))
    }

    fn judge_client(&self) -> Result<BoxedLlmClient> {
        let model = self.judge_model.as_deref().unwrap_or(&self.model);
        Ok(Arc::new(RetryingClient::new(
            Arc::new(self.openai(model)?.with_temperature(0.0)),
            RetryPolicy::exponential(),
        )))
    }

    fn scorers(&self) -> Result<Scorers> {
        let mut scorers = code_scorers(self.path_match);
        if !self.no_judges {
            for judge in judge::all_judges(self.judge_client()?) {
                scorers = scorers.add(judge);
            }
        }
        Ok(scorers)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut telemetry = TelemetryConfig::from_env();
    if args.verbose {
        telemetry.log_filter = Some("tracecheck_core=debug,tracecheck_eval=debug".to_string());
    }
    init_with(telemetry);

    args.validate()?;

    let registry = support_registry(Arc::new(SupportStore::acme()))?;
    let agent = ConversationLoop::new(
        args.agent_client()?,
        Arc::new(registry),
        AgentConfig::default().with_max_rounds(args.max_rounds),
    );

    let config = RunnerConfig::new()
        .with_concurrency(args.concurrency)
        .with_case_timeout(Duration::from_secs(args.case_timeout));
    let runner = EvalRunner::new(agent, args.scorers()?, config);

    let dataset: Box<dyn Dataset> = match &args.dataset {
        Some(path) => Box::new(JsonFileDataset::new(path.clone())),
        None => Box::new(tracecheck_eval::workshop_dataset()),
    };

    let summary = runner
        .run_with_progress(dataset.as_ref(), args.sample, |progress| match progress {
            EvalProgress::Started { total } => eprintln!("Evaluating {} cases...", total),
            EvalProgress::CaseCompleted {
                completed,
                total,
                success,
                ..
            } => eprintln!(
                "[{}/{}] {}",
                completed,
                total,
                if success { "ok" } else { "errored" }
            ),
        })
        .await?;

    summary.print_summary();

    if let Some(path) = &args.output_file {
        summary
            .write_json(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("\nReport written to {}", path.display());
    }

    Ok(())
}
