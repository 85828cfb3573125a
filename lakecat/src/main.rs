//! Entrypoint of the lakecat binary
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr,
    clippy::future_not_send
)]

use std::num::NonZeroUsize;

use dotenvy::dotenv;

mod commands {
    pub(crate) mod common;
    pub(crate) mod serve;
    pub(crate) mod show;
}
mod logging;

enum ReturnCode {
    Failure = 1,
}

#[derive(Debug, clap::Parser)]
#[clap(
    name = "lakecat",
    version,
    about = "lakecat catalog server and command line tools",
    long_about = r#"lakecat catalog server and command line tools

Examples:
    # Run the catalog server with an in-memory warehouse
    lakecat serve --bearer-token my-token

    # Keep the warehouse on the local filesystem
    lakecat serve --bearer-token my-token --object-store file --data-dir ~/.lakecat

    # List the databases of a running server
    lakecat show databases --token my-token

    # Run the server with debug logging
    LOG_FILTER=debug lakecat serve --bearer-token my-token
"#
)]
struct Config {
    /// Number of worker threads of the tokio runtime, defaults to the number of cores.
    #[clap(long = "num-threads", env = "LAKECAT_NUM_THREADS", action)]
    num_threads: Option<NonZeroUsize>,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, clap::Parser)]
enum Command {
    /// Run the lakecat catalog server
    Serve(commands::serve::Config),

    /// List resources of a running lakecat server
    Show(commands::show::Config),
}

fn main() -> Result<(), std::io::Error> {
    // load all environment variables from .env before doing anything
    load_dotenv();

    let config: Config = clap::Parser::parse();

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all().thread_name("lakecat-tokio");
    if let Some(num_threads) = config.num_threads {
        builder.worker_threads(num_threads.get());
    }
    let tokio_runtime = builder.build()?;

    tokio_runtime.block_on(async move {
        match config.command {
            None => println!("command required, -h/--help for help"),
            Some(Command::Serve(config)) => {
                if let Err(e) = logging::init(&config.logging_config) {
                    eprintln!("Initializing logs failed: {e}");
                    std::process::exit(ReturnCode::Failure as _);
                }
                if let Err(e) = commands::serve::command(config).await {
                    eprintln!("Serve command failed: {e}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
            Some(Command::Show(config)) => {
                if let Err(e) = commands::show::command(config).await {
                    eprintln!("Show command failed: {e}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
        }
    });

    Ok(())
}

/// Source the .env file before initialising the Config struct - this sets
/// any envs in the file, which the Config struct then uses.
///
/// Precedence is given to existing env variables.
fn load_dotenv() {
    match dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            // a missing env file is not an error
        }
        Err(e) => {
            eprintln!("FATAL Error loading config from: {e}");
            eprintln!("Aborting");
            std::process::exit(1);
        }
    };
}
