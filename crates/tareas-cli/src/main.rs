mod config;
#[cfg(test)]
mod test_util;
mod tui;

use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;

use anyhow::{Context, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use config::{Overrides, TareasConfig};

#[derive(Parser)]
#[command(name = "tareas", version, about = "Terminal client for a session-gated task list")]
struct Cli {
    /// Task API base URL (overrides TAREAS_BACKEND_URL env var)
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// Supabase project URL (overrides TAREAS_AUTH_URL env var)
    #[arg(long, global = true)]
    auth_url: Option<String>,

    /// Supabase anon key (overrides TAREAS_ANON_KEY env var)
    #[arg(long, global = true)]
    anon_key: Option<String>,

    /// Defaults to `run`
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file from --backend-url, --auth-url and --anon-key
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Print the resolved configuration
    Config,
    /// Launch the interactive task list
    Run,
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

impl Cli {
    fn overrides(&self) -> Overrides<'_> {
        Overrides {
            backend_url: self.backend_url.as_deref(),
            auth_url: self.auth_url.as_deref(),
            anon_key: self.anon_key.as_deref(),
        }
    }
}

/// Install the global subscriber.
///
/// The terminal UI owns the screen, so while it runs logs go to a file
/// instead of stderr.
fn init_tracing(to_file: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if to_file {
        let path = config::log_path();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    } else {
        builder.with_writer(io::stderr).init();
    }
    Ok(())
}

/// Execute the `tareas init` command: write config file.
fn cmd_init(cli: &Cli, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let (Some(auth_url), Some(anon_key)) = (cli.auth_url.as_deref(), cli.anon_key.as_deref())
    else {
        bail!("`tareas init` needs --auth-url and --anon-key");
    };

    // Validate before writing anything.
    let api = tareas_core::ApiConfig::new(
        cli.backend_url
            .as_deref()
            .unwrap_or(tareas_core::ApiConfig::DEFAULT_URL),
    )
    .context("invalid --backend-url")?;
    let auth = tareas_core::AuthConfig::new(auth_url, anon_key).context("invalid auth settings")?;

    let cfg = config::ConfigFile {
        backend: config::BackendSection {
            url: api.base_url.to_string(),
        },
        auth: config::AuthSection {
            url: auth.url.to_string(),
            anon_key: auth.anon_key.clone(),
        },
    };
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  backend.url = {}", cfg.backend.url);
    println!("  auth.url = {}", cfg.auth.url);
    println!("  auth.anon_key = {}", auth.redacted_key());
    println!();
    println!("Next: run `tareas` to sign in.");

    Ok(())
}

/// Execute the `tareas config` command.
fn cmd_config(cli: &Cli) -> anyhow::Result<()> {
    let resolved = TareasConfig::resolve(cli.overrides())?;
    match &resolved.source {
        Some(path) => println!("# from {}", path.display()),
        None => println!("# no config file at {}", config::config_path().display()),
    }
    println!("backend.url = {}", resolved.api.base_url);
    println!("auth.url = {}", resolved.auth.url);
    println!("auth.anon_key = {}", resolved.auth.redacted_key());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.as_ref().unwrap_or(&Commands::Run);

    init_tracing(matches!(command, Commands::Run))?;

    match command {
        Commands::Init { force } => cmd_init(&cli, *force)?,
        Commands::Config => cmd_config(&cli)?,
        Commands::Run => {
            let resolved = TareasConfig::resolve(cli.overrides())?;
            tui::run(resolved).await?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "tareas", &mut io::stdout());
        }
    }

    Ok(())
}
