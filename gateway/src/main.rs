//! Entrypoint of the gateway binary
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr,
    clippy::future_not_send
)]

use dotenvy::dotenv;
use gateway_clap_blocks::tokio::TokioRuntimeConfig;
use gateway_logging::cli::LoggingConfig;

mod commands {
    pub mod bench;
    pub mod query;
    pub mod serve;
    pub mod tickets;
}

enum ReturnCode {
    Failure = 1,
}

#[derive(Debug, clap::Parser)]
#[clap(
    name = "gateway",
    version,
    disable_help_flag = true,
    arg(
        clap::Arg::new("help")
            .short('h')
            .long("help")
            .help("Print help information")
            .action(clap::ArgAction::Help)
            .global(true)
    ),
    about = "Sensor gateway server and command line tools",
    long_about = r#"Sensor gateway server and command line tools

Serves sensor readings held in a relational store, a document store and an
embedded analytical store over a single Arrow Flight endpoint.

Examples:
    # Run the gateway against local stores
    gateway serve

    # Run the gateway with debug logging
    gateway serve -vv

    # Fetch the readings held in the relational store
    gateway query postgres

    # List the tickets a running gateway serves
    gateway tickets

    # Compare the three stores through a running gateway
    gateway bench --iterations 10
"#
)]
struct Config {
    #[clap(flatten)]
    runtime_config: TokioRuntimeConfig,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, clap::Parser)]
#[allow(clippy::large_enum_variant)]
enum Command {
    /// Run the gateway server
    Serve(commands::serve::Config),

    /// Fetch one ticket from a running gateway and print the table
    Query(commands::query::Config),

    /// List the tickets a running gateway serves
    Tickets(commands::tickets::Config),

    /// Benchmark the backends behind a running gateway
    Bench(commands::bench::Config),
}

fn main() -> Result<(), std::io::Error> {
    // .env must be applied before clap reads the environment
    load_dotenv();

    let config: Config = clap::Parser::parse();

    let tokio_runtime = config.runtime_config.builder()?.build()?;

    tokio_runtime.block_on(async move {
        match config.command {
            None => println!("command required, -h/--help for help"),
            Some(Command::Serve(config)) => {
                init_logs(&config.logging_config);
                if let Err(e) = commands::serve::command(config).await {
                    eprintln!("Serve command failed: {e}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
            Some(Command::Query(config)) => {
                if let Err(e) = commands::query::command(config).await {
                    eprintln!("Query command failed: {e}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
            Some(Command::Tickets(config)) => {
                if let Err(e) = commands::tickets::command(config).await {
                    eprintln!("Tickets command failed: {e}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
            Some(Command::Bench(config)) => {
                init_logs(&config.logging_config);
                if let Err(e) = commands::bench::command(config).await {
                    eprintln!("Bench command failed: {e}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
        }
    });

    Ok(())
}

/// Export the variables of a `.env` file in the working directory, if there
/// is one. Variables already set in the environment win.
fn load_dotenv() {
    match dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            // a missing env file is fine, clap applies the defaults
        }
        Err(e) => {
            eprintln!("Cannot load .env file: {e}");
            std::process::exit(ReturnCode::Failure as _);
        }
    };
}

/// Install the global subscriber, exiting the process if the logging
/// options are unusable.
fn init_logs(config: &LoggingConfig) {
    let installed = gateway_logging::Builder::new()
        .with_default_log_filter("info")
        .and_then(|builder| config.with_builder(builder))
        .and_then(|builder| builder.install_global());

    if let Err(e) = installed {
        eprintln!("Initializing logs failed: {e}");
        std::process::exit(ReturnCode::Failure as _);
    }
}
