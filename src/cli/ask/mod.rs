//! Ask command - answers one question over a passage corpus

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::domain::generation::GenerationPort;
use crate::domain::strategy::StrategyName;
use crate::domain::workflow::{ExecutionOptions, Ports};
use crate::infrastructure::llm::{HttpClient, OpenAiGenerator};
use crate::infrastructure::logging;
use crate::infrastructure::rerank::LlmReranker;
use crate::infrastructure::retrieval::InMemoryRetriever;
use crate::infrastructure::services::{AnswerResult, RagEngine};
use crate::infrastructure::verification::LlmFactVerifier;

/// Arguments for the ask command
#[derive(Args, Clone)]
pub struct AskArgs {
    /// Question to answer
    pub question: String,

    /// Strategy to run (overrides config)
    #[arg(long, short)]
    pub strategy: Option<StrategyName>,

    /// JSON passage file (overrides config)
    #[arg(long)]
    pub corpus: Option<String>,

    /// Passages per retrieval
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Answer with the fixed no-information text instead of general knowledge
    #[arg(long)]
    pub no_fallback: bool,

    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the ask command
pub async fn run(args: AskArgs) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    logging::init_logging(&config.logging);

    let strategy = args.strategy.unwrap_or(config.engine.default_strategy);
    let mut strategy_config = config.engine.strategy.clone();
    if let Some(top_k) = args.top_k {
        strategy_config = strategy_config.with_top_k(top_k);
    }
    if args.no_fallback {
        strategy_config = strategy_config.with_use_fallback(false);
    }

    let engine = RagEngine::new(build_ports(&args, &config).await?);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, returning the best answer so far");
            on_interrupt.cancel();
        }
    });

    let mut options = ExecutionOptions::new().with_cancel(cancel);
    if let Some(timeout) = config.engine.step_timeout() {
        options = options.with_step_timeout(timeout);
    }
    if let Some(deadline) = config.engine.deadline() {
        options = options.with_deadline(deadline);
    }

    info!("Answering with strategy '{}'", strategy);
    let result = engine
        .generate_answer_with(&args.question, strategy, &strategy_config, &options)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_answer(&result);
    }

    Ok(())
}

async fn build_ports(args: &AskArgs, config: &AppConfig) -> anyhow::Result<Ports> {
    let corpus = args
        .corpus
        .clone()
        .or_else(|| config.retrieval.corpus_path.clone())
        .context("No corpus given; pass --corpus or set RAG__RETRIEVAL__CORPUS_PATH")?;
    let retriever = InMemoryRetriever::from_json_file(&corpus).await?;

    let settings = &config.generation;
    let api_key = settings
        .api_key
        .clone()
        .context("No API key; set RAG__GENERATION__API_KEY")?;
    let client = HttpClient::with_timeout(Duration::from_secs(settings.timeout_secs))?;
    let generation: Arc<dyn GenerationPort> = Arc::new(
        OpenAiGenerator::with_base_url(client, api_key, &settings.model, &settings.base_url)
            .with_max_tool_rounds(settings.max_tool_rounds),
    );

    let mut ports = Ports::new(Arc::new(retriever), generation.clone());
    if settings.llm_reranker {
        ports = ports.with_reranker(Arc::new(LlmReranker::new(generation.clone())));
    }
    if settings.llm_verifier {
        ports = ports.with_verifier(Arc::new(LlmFactVerifier::new(generation)));
    }
    Ok(ports)
}

fn print_answer(result: &AnswerResult) {
    println!("{}", result.answer);
    println!();

    let confidence = result
        .confidence
        .map(|c| format!("{:.2}", c))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "strategy: {}  steps: {}  passages: {}  confidence: {}  time: {}ms",
        result.strategy,
        result.trace.len(),
        result.context.len(),
        confidence,
        result.execution_time_ms
    );
    if result.cancelled {
        println!("(partial answer: run was interrupted)");
    }
    for note in &result.degradations {
        println!("degraded: {}", note);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;

    #[test]
    fn test_parse_ask_args() {
        let cli = Cli::parse_from([
            "pmp-rag-engine",
            "ask",
            "what is tokio",
            "--strategy",
            "self-reflective",
            "--top-k",
            "7",
            "--no-fallback",
        ]);

        let Command::Ask(args) = cli.command else {
            panic!("expected ask");
        };
        assert_eq!(args.question, "what is tokio");
        assert_eq!(args.strategy, Some(StrategyName::SelfReflective));
        assert_eq!(args.top_k, Some(7));
        assert!(args.no_fallback);
        assert!(!args.json);
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let parsed = Cli::try_parse_from(["pmp-rag-engine", "ask", "q", "--strategy", "nope"]);
        assert!(parsed.is_err());
    }

    #[tokio::test]
    async fn test_missing_corpus_is_reported() {
        let args = AskArgs {
            question: "q".to_string(),
            strategy: None,
            corpus: None,
            top_k: None,
            no_fallback: false,
            json: false,
        };

        let err = build_ports(&args, &AppConfig::default()).await.unwrap_err();
        assert!(err.to_string().contains("No corpus"));
    }
}
