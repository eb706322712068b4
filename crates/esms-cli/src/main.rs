#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::needless_pass_by_value)]

mod commands;
mod logging;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

use commands::serve::ServeAction;

#[derive(Parser, Debug)]
#[command(name = "esms")]
#[command(author, version, about = "Serve a project to the browser as native ES modules", long_about = None)]
struct Cli {
    /// Project root to serve
    #[arg(value_name = "ROOT", default_value = ".")]
    root: PathBuf,

    /// Port to listen on [default: 3000]
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind [default: 127.0.0.1]
    #[arg(long)]
    host: Option<String>,

    /// Page `/` redirects to [default: index.html]
    #[arg(long, value_name = "FILE")]
    index: Option<String>,

    /// Config file (default: esms.config.{json,ts,js} in ROOT)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json);

    let action = ServeAction {
        root: cli.root,
        port: cli.port,
        host: cli.host,
        index: cli.index,
        config: cli.config,
    };

    let rt = tokio::runtime::Runtime::new().into_diagnostic()?;
    rt.block_on(commands::serve::run(action))
}
