//! CLI binary entry point for db-writer-snowflake

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use db_writer_snowflake::cli::CliError;
use db_writer_snowflake::cli::commands::{RunArgs, handle_run, handle_test_connection};
use db_writer_snowflake::cli::error::EXIT_APPLICATION_ERROR;
use db_writer_snowflake::config::ENV_DATA_DIR;
use db_writer_snowflake::logging;

#[derive(Parser)]
#[command(name = "db-writer-snowflake")]
#[command(about = "Load storage-exported tables into Snowflake")]
#[command(version)]
struct Cli {
    /// Data directory containing config.json and in/tables/
    #[arg(long, env = ENV_DATA_DIR, default_value = "/data")]
    data_dir: PathBuf,
    /// Log every executed statement
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Perform the action configured in config.json (default)
    Run,
    /// Only check the connection, warehouse and schema
    TestConnection,
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let args = RunArgs {
        data_dir: cli.data_dir,
    };
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => handle_run(&args)
            .with_context(|| format!("Load from {} failed", args.data_dir.display()))?,
        Commands::TestConnection => handle_test_connection(&args)?,
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli) {
        let code = e
            .downcast_ref::<CliError>()
            .map(CliError::exit_code)
            .unwrap_or(EXIT_APPLICATION_ERROR);
        eprintln!("Error: {}", e.root_cause());
        std::process::exit(code);
    }
}
