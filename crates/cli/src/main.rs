//! `llm-batch`: run one LLM batch node over a JSON batch.
//!
//! This binary stands in for the surrounding pipeline engine for a single
//! node. Responsibilities:
//!
//! 1. **Parse configuration**: command-line flags (with environment fallbacks)
//!    layered over an optional JSON node configuration file.
//! 2. **Wire observability**: see [`observability`].
//! 3. **Construct infrastructure**: build the OpenAI-compatible provider from
//!    the environment and inject it into the selected node.
//! 4. **Run one invocation**: read a `{ "field": [values...] }` batch from a
//!    file or stdin, execute the node, and print the published output batch
//!    to stdout. Ctrl-C cancels every in-flight row and prints nothing.

mod observability;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use llm::{OpenAiConfig, OpenAiProvider};
use nodes::{ChatNode, ChatNodeConfig, GenerateNode, GenerateNodeConfig};
use pipeline::{Batch, BatchNode, ExecutionContext, LlmProvider, ModelSettings, NodeError, NodeId};
use serde::de::DeserializeOwned;

use observability::LogFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum NodeKind {
    /// `user` (+ `assistant`) → `message`
    Chat,
    /// `prompt` → `response`
    Generate,
}

#[derive(Debug, Parser)]
#[command(name = "llm-batch", version, about = "Run an LLM batch node over a JSON batch")]
struct Args {
    /// Which node to run.
    #[arg(long, value_enum, default_value_t = NodeKind::Chat, env = "LLM_BATCH_NODE")]
    node: NodeKind,

    /// JSON file holding the node configuration. Flags below override it.
    #[arg(long, env = "LLM_BATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Back-end model identifier.
    #[arg(long, env = "LLM_BATCH_MODEL")]
    model: Option<String>,

    /// Chat node: declare `assistant` as an input and send it as the prior turn.
    #[arg(long)]
    include_prior_turn: bool,

    /// Let the provider answer repeated prompts from its response cache.
    #[arg(long)]
    cache: bool,

    /// System message placed before every prompt.
    #[arg(long)]
    system_prompt: Option<String>,

    /// Input batch file. Reads stdin when omitted.
    #[arg(long)]
    input: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "LLM_BATCH_LOG_FORMAT")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let telemetry = observability::init(args.log_format)?;

    let result = run(args).await;
    if let Err(e) = &result {
        tracing::error!("llm-batch failed: {e:#}");
    }

    telemetry.shutdown();
    result
}

async fn run(args: Args) -> anyhow::Result<()> {
    let (id, node): (&'static str, Box<dyn BatchNode>) = match args.node {
        NodeKind::Chat => ("chat", Box::new(build_chat(&args)?) as Box<dyn BatchNode>),
        NodeKind::Generate => ("generate", Box::new(build_generate(&args)?) as Box<dyn BatchNode>),
    };
    let inputs = read_batch(args.input.as_deref())?;

    let mut context = ExecutionContext::new(NodeId::from_static(id), inputs);
    tracing::info!(node = id, invocation = %context.invocation(), "starting invocation");

    tokio::select! {
        result = node.execute(&mut context) => result.context("batch execution failed")?,
        _ = tokio::signal::ctrl_c() => bail!("interrupted; no output was published"),
    }

    let output = context.take_output()?;
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &output).context("failed to write output")?;
    writeln!(stdout)?;
    Ok(())
}

fn build_chat(args: &Args) -> anyhow::Result<ChatNode> {
    let mut config: ChatNodeConfig = load_config(args.config.as_deref())?.unwrap_or_default();
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(prompt) = &args.system_prompt {
        config.system_prompt = prompt.clone();
    }
    config.include_prior_turn |= args.include_prior_turn;
    config.cache |= args.cache;

    let provider = connect(config.model_settings()?)?;
    Ok(ChatNode::builder(config).provider(provider).build()?)
}

fn build_generate(args: &Args) -> anyhow::Result<GenerateNode> {
    if args.include_prior_turn {
        bail!("--include-prior-turn only applies to the chat node");
    }

    let mut config: GenerateNodeConfig =
        load_config(args.config.as_deref())?.unwrap_or_default();
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(prompt) = &args.system_prompt {
        config.system_prompt = Some(prompt.clone());
    }
    config.cache |= args.cache;

    let provider = connect(config.model_settings()?)?;
    Ok(GenerateNode::builder(config).provider(provider).build()?)
}

/// Builds the provider from the environment. A missing API key is reported
/// as a missing capability, before any batch is read.
fn connect(settings: ModelSettings) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let config = OpenAiConfig::from_env(settings).map_err(|e| NodeError::MissingCapability {
        capability: e.to_string(),
    })?;
    Ok(Arc::new(OpenAiProvider::new(config)?))
}

fn load_config<T: DeserializeOwned>(path: Option<&Path>) -> anyhow::Result<Option<T>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = serde_json::from_str(&text)
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(Some(config))
}

fn read_batch(path: Option<&Path>) -> anyhow::Result<Batch> {
    let text = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input {}", path.display()))?,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read input from stdin")?;
            text
        }
    };
    serde_json::from_str(&text).context("input must be a JSON object of field name to value array")
}
