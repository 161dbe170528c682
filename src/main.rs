use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use sightline_artifact::FsStore;
use sightline_config::{SightlineConfig, StatementChain};
use sightline_detection::DetectionClient;
use sightline_pipeline::{PipelineOrchestrator, Ports, PromptContext, RunSettings};
use sightline_ports::{
  ChatClassifier, ChatClient, ChatDescriber, ChatTransformer, ClassifierPort, HeuristicClassifier,
  ImageRef,
};

/// Sightline - find what a prompt is about in an image
#[derive(Parser)]
#[command(name = "sightline")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the config file (default: ~/.sightline/config.json)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the pipeline once on a prompt and an image
  Run(RunArgs),

  /// Print the effective configuration with secrets redacted
  Config,
}

#[derive(Args)]
struct RunArgs {
  /// Question or description of what to find
  #[arg(long)]
  prompt: String,

  /// Local path of the input image
  #[arg(long)]
  image: PathBuf,

  /// Public URL of the same image, sent to remote services instead of the file
  #[arg(long)]
  image_url: Option<String>,

  /// Where to write the final image (overrides output.path)
  #[arg(long)]
  output: Option<PathBuf>,

  /// Detection service token for this run
  #[arg(long)]
  token: Option<String>,

  /// Transform chain for statement prompts
  #[arg(long, value_enum)]
  chain: Option<ChainArg>,

  /// How prompts are classified as questions
  #[arg(long, value_enum, default_value_t = ClassifierArg::Heuristic)]
  classifier: ClassifierArg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ChainArg {
  Direct,
  Elaborate,
}

impl From<ChainArg> for StatementChain {
  fn from(arg: ChainArg) -> Self {
    match arg {
      ChainArg::Direct => StatementChain::Direct,
      ChainArg::Elaborate => StatementChain::Elaborate,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ClassifierArg {
  /// Punctuation and leading-word rules
  Heuristic,
  /// Ask the transform model
  Chat,
}

fn main() -> Result<()> {
  init_tracing();
  let cli = Cli::parse();

  let config_path = match cli.config {
    Some(path) => path,
    None => default_config_path()?,
  };

  let mut config = SightlineConfig::load(&config_path)
    .with_context(|| format!("failed to load config: {}", config_path.display()))?;
  config.apply_env();

  match cli.command {
    Some(Commands::Run(args)) => {
      run(config, args)?;
    }
    Some(Commands::Config) => {
      println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    }
    None => {
      println!("sightline - use --help to see available commands");
    }
  }

  Ok(())
}

fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();
}

fn default_config_path() -> Result<PathBuf> {
  let home = dirs::home_dir().context("could not determine home directory")?;
  Ok(home.join(".sightline").join("config.json"))
}

fn run(mut config: SightlineConfig, args: RunArgs) -> Result<()> {
  if let Some(chain) = args.chain {
    config.pipeline.statement_chain = chain.into();
  }
  if let Some(output) = &args.output {
    config.output.path = output.display().to_string();
  }
  config.validate().context("invalid configuration")?;

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_async(config, args).await })
}

async fn run_async(config: SightlineConfig, args: RunArgs) -> Result<()> {
  let (output_dir, output_key) = split_output(Path::new(&config.output.path))?;

  let chat = ChatClient::new(&config.chat);
  let classifier: Arc<dyn ClassifierPort> = match args.classifier {
    ClassifierArg::Heuristic => Arc::new(HeuristicClassifier),
    ClassifierArg::Chat => Arc::new(ChatClassifier::new(
      chat.clone(),
      &config.chat.transform_model,
    )),
  };
  let ports = Ports {
    classifier,
    describer: Arc::new(ChatDescriber::new(
      chat.clone(),
      &config.chat.describer_model,
      config.prompts.describer.clone(),
    )),
    transformer: Arc::new(ChatTransformer::new(chat, &config.chat.transform_model)),
  };

  let detection =
    DetectionClient::new(&config.detection).context("failed to create detection client")?;
  let store = Arc::new(FsStore::new(output_dir));
  let orchestrator = PipelineOrchestrator::new(
    ports,
    detection,
    store,
    RunSettings::from_config(&config, output_key),
  );

  let mut image = ImageRef::local(&args.image);
  if let Some(url) = args.image_url {
    image = image.with_url(url);
  }
  let mut context = PromptContext::new(args.prompt, image);
  if let Some(token) = args.token {
    context = context.with_token(token);
  }

  let cancel = CancellationToken::new();
  let interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupt_received");
      interrupt.cancel();
    }
  });

  let artifact = orchestrator
    .run(&context, &cancel)
    .await
    .context("pipeline run failed")?;

  println!("{}", serde_json::to_string_pretty(&artifact)?);

  Ok(())
}

/// Split an output path into the store directory and the artifact key.
fn split_output(path: &Path) -> Result<(PathBuf, String)> {
  let key = path
    .file_name()
    .and_then(|n| n.to_str())
    .with_context(|| format!("output path has no file name: {}", path.display()))?
    .to_string();
  let dir = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
    _ => PathBuf::from("."),
  };
  Ok((dir, key))
}
