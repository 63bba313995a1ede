use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    siteaudit::logging::init().context("init logging")?;

    let cli = siteaudit::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        siteaudit::cli::Command::Walk(args) => {
            siteaudit::walk::run(args).await.context("walk")?;
        }
        siteaudit::cli::Command::Audit(args) => {
            siteaudit::audit::run(args).await.context("audit")?;
        }
    }

    Ok(())
}
