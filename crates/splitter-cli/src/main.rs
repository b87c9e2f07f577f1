mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::exit_code_for;
use splitter_core::{install_signal_handler, CutRequest, SplitterConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(
    name = "splitter",
    version,
    about = "Cut minimal file slices out of openEuler packages"
)]
struct Cli {
    /// Path to a splitter.toml (default: <home>/splitter.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Cut slices and their dependencies into an output directory.
    Cut {
        /// Release to cut from, e.g. 24.03-LTS-SP1.
        #[arg(short, long)]
        release: String,
        /// Target architecture (x86_64, amd64, aarch64, arm64, linux/amd64, linux/arm64).
        #[arg(short, long)]
        arch: String,
        /// Directory the slices are extracted into.
        #[arg(short, long)]
        output: PathBuf,
        /// Resolve and print the plan without downloading anything.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Slices to cut, as <package>_<slice>.
        #[arg(required = true)]
        slices: Vec<String>,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the given directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
    /// Check host tools and show the resolved configuration.
    Doctor,
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SPLITTER_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let json_output = cli.json;
    let load_config = || {
        let config =
            SplitterConfig::load_or_default(cli.config.as_deref()).map_err(|e| e.to_string())?;
        debug!("backend '{}', home {}", config.backend, config.home_dir().display());
        Ok::<_, String>(config)
    };

    let result = match cli.command {
        Commands::Cut {
            release,
            arch,
            output,
            dry_run,
            slices,
        } => load_config().and_then(|config| {
            if config.backend == "rpm" && std::env::var("SPLITTER_SKIP_PREREQS").as_deref() != Ok("1")
            {
                let missing = splitter_runtime::check_prereqs();
                if !missing.is_empty() {
                    return Err(splitter_runtime::format_missing(&missing));
                }
            }
            install_signal_handler();
            let request = CutRequest {
                release,
                arch,
                output,
                slices,
                dry_run,
            };
            commands::cut::run(&config, &request, json_output)
        }),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
        Commands::Doctor => {
            load_config().and_then(|config| commands::doctor::run(&config, json_output))
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}
