use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "git-copy",
    version,
    about = "Replicate a private git repository to public mirrors with its history scrubbed"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrub and publish every configured target (or one)
    Sync(commands::sync::SyncArgs),
    /// Audit the scrubbed cache or the published mirror
    Audit(commands::audit::AuditArgs),
    /// Show per-target sync state
    Status(commands::status::StatusArgs),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.cmd {
        Command::Sync(args) => commands::sync::run(args),
        Command::Audit(args) => commands::audit::run(args),
        Command::Status(args) => commands::status::run(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
