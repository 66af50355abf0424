use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use layerforge::{DriveStore, InMemoryStore, PipelineConfig, TransferSummary};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "layerforge", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Composite every planned item into its batch image directory.
    Generate(GenerateArgs),
    /// Upload rendered batches to remote storage.
    Upload(UploadArgs),
    /// Generate, then upload.
    Run(RunArgs),
    /// Print both checkpoints without changing anything.
    Status(ConfigArgs),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Pipeline config JSON.
    #[arg(long)]
    config: PathBuf,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[command(flatten)]
    common: ConfigArgs,

    /// Ignore the generation checkpoint and render from index 1.
    #[arg(long)]
    force: bool,

    /// Worker count (0 = host concurrency minus one).
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Args, Debug)]
struct UploadArgs {
    #[command(flatten)]
    common: ConfigArgs,

    /// Upload into an in-process store instead of Google Drive.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    generate: GenerateArgs,

    /// Upload into an in-process store instead of Google Drive.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Generate(args) => cmd_generate(&args).map(|_| ()),
        Command::Upload(args) => {
            let cfg = PipelineConfig::from_path(&args.common.config)?;
            cmd_upload(&cfg, args.dry_run)
        }
        Command::Run(args) => {
            let cfg = cmd_generate(&args.generate)?;
            cmd_upload(&cfg, args.dry_run)
        }
        Command::Status(args) => {
            let cfg = PipelineConfig::from_path(&args.config)?;
            println!("{}", layerforge::status(&cfg)?);
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_generate(args: &GenerateArgs) -> anyhow::Result<PipelineConfig> {
    let mut cfg = PipelineConfig::from_path(&args.common.config)?;
    if args.force {
        cfg.force_regenerate = true;
    }
    if let Some(n) = args.workers {
        cfg.num_workers = n;
    }

    let summary = layerforge::generate(&cfg)?;
    eprintln!("{summary}");
    Ok(cfg)
}

fn cmd_upload(cfg: &PipelineConfig, dry_run: bool) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;

    let summary: TransferSummary = if dry_run {
        let store = Arc::new(InMemoryStore::new());
        let summary = rt.block_on(layerforge::transfer_dry_run(cfg, store.clone()))?;
        eprintln!("dry run: {} file(s) held in memory, nothing recorded", store.files().len());
        summary
    } else {
        let remote = cfg
            .remote
            .as_ref()
            .context("config has no 'remote' section; use --dry-run to upload nowhere")?;
        let store = Arc::new(DriveStore::from_config(remote)?);
        rt.block_on(layerforge::transfer(cfg, store))?
    };

    eprintln!("{summary}");
    Ok(())
}
