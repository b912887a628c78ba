use anyhow::Context;
use clap::{Parser, Subcommand};
use folio::build::{self, BuildOptions};
use folio::pipeline::Stage;
use folio::{config, output, plugins};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Shared flags for commands that consult the build cache.
#[derive(clap::Args, Clone)]
struct CacheArgs {
    /// Ignore the build cache and rebuild everything
    #[arg(long)]
    no_cache: bool,
}

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Staged plugin pipeline for static sites")]
#[command(long_about = "\
Staged plugin pipeline for static sites

Every build runs six fixed stages in order:

  Glob → Configure → Collect → Transform → Render → Write

Plugins opt into stages and run by ascending priority within each one.
A build cache in the output directory lets unchanged feeds skip publication.

Site structure:

  site/
  ├── config.toml          # Site config (optional, layered over defaults)
  ├── content/             # Sources matched by `patterns`
  │   ├── 010-intro.md     # NNN- prefixes order files, dropped from slugs
  │   └── posts/
  │       └── hello.md
  └── public/              # Output, including .build-cache.json

Run 'folio gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Site root containing config.toml
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline and write the site
    Build(CacheArgs),
    /// Show which plugins run in each stage, in order
    Plan,
    /// Run every stage except Write and report what would be built
    Check,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Build(cache_args) => {
            let config = config::load_config(&cli.root)
                .with_context(|| format!("loading config from {}", cli.root.display()))?;
            let mut pipeline = plugins::default_pipeline();
            let options = BuildOptions {
                no_cache: cache_args.no_cache,
            };
            println!("==> Building {}", cli.root.display());
            let report = build::build(&cli.root, config, &mut pipeline, &options)?;
            output::print_build_report(&report, &cli.root);
        }
        Command::Plan => {
            let mut pipeline = plugins::default_pipeline();
            let plan: Vec<_> = Stage::ALL
                .into_iter()
                .map(|stage| (stage, pipeline.plan(stage)))
                .collect();
            output::print_plan(&plan);
        }
        Command::Check => {
            let config = config::load_config(&cli.root)
                .with_context(|| format!("loading config from {}", cli.root.display()))?;
            let mut pipeline = plugins::default_pipeline();
            println!("==> Checking {}", cli.root.display());
            let report = build::check(&cli.root, config, &mut pipeline)?;
            output::print_inventory(&report);
            println!("==> Site is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}
