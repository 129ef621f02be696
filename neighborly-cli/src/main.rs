mod commands;
mod config;
mod tracing_setup;

use anyhow::Result;
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};

use commands::admin::AdminArgs;
use commands::migrate::MigrateArgs;
use commands::serve::ServeArgs;
use config::FileConfig;

#[derive(Parser, Debug)]
#[command(name = "neighborly", author, version, about = "Neighborly community engagement backend")]
struct Cli {
    /// Debug logging (RUST_LOG still wins)
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    debug: bool,

    /// Export traces over OTLP (needs the `telemetry` feature)
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    otel: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API
    Serve(ServeArgs),
    /// Create or update the database schema
    Migrate(MigrateArgs),
    /// One-shot operator scripts
    Admin(AdminArgs),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

impl From<CompletionShell> for Shell {
    fn from(shell: CompletionShell) -> Self {
        match shell {
            CompletionShell::Bash => Shell::Bash,
            CompletionShell::Zsh => Shell::Zsh,
            CompletionShell::Fish => Shell::Fish,
            CompletionShell::PowerShell => Shell::PowerShell,
            CompletionShell::Elvish => Shell::Elvish,
        }
    }
}

fn run_completions(args: CompletionsArgs) {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    generate(
        Shell::from(args.shell),
        &mut command,
        name,
        &mut std::io::stdout(),
    );
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Serve(args) => commands::run_serve(args, &FileConfig::load()?).await,
        Commands::Migrate(args) => commands::run_migrate(args, &FileConfig::load()?).await,
        Commands::Admin(args) => commands::run_admin(args, &FileConfig::load()?).await,
        Commands::Completions(args) => {
            run_completions(args);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before parsing, so `.env` values reach clap's `env` fallbacks
    let dotenv_files = config::load_dotenv();
    let cli = Cli::parse();

    tracing_setup::init(&tracing_setup::TracingConfig {
        debug: cli.debug,
        otel: cli.otel,
    })
    .ok();

    for path in &dotenv_files {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    let result = run(cli.command).await;

    tracing_setup::shutdown_otel();
    result
}
