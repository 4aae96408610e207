//! `agentrt` binary entry point: dispatches to the interactive chat REPL,
//! one-shot `run`, `doctor`, `config` subcommands, or the `--subagent`
//! child-process path.

mod bootstrap;
mod cli;

use clap::Parser;
use cli::{Cli, Command, ConfigCommand};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    if args.subagent {
        init_tracing();
        return cli::subagent::run(args).await;
    }

    match args.command {
        None | Some(Command::Chat) => {
            init_tracing();
            let (config, _path) = cli::load_config()?;
            cli::repl::run(config).await
        }
        Some(Command::Run { message, session, model, json }) => {
            init_tracing();
            let (config, _path) = cli::load_config()?;
            cli::run::run(config, message, session, model, json).await
        }
        Some(Command::Doctor) => {
            let (config, path) = cli::load_config()?;
            let passed = cli::doctor::run(&config, &path).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, path) = cli::load_config()?;
            if !cli::config::validate(&config, &path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _path) = cli::load_config()?;
            cli::config::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("agentrt {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,agentrt_cli=debug")))
        .json()
        .init();
}
