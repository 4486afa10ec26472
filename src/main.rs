mod caption;
mod cli;
mod commands;
mod common;
mod config;
mod external;
mod job;
mod ui;

use clap::Parser;

use crate::cli::Cli;
use crate::ui::prelude::*;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    ui::init(format, !cli.no_color);
    ui::set_debug_mode(cli.debug);

    if let Err(err) = commands::dispatch(cli.command, cli.config.as_deref()).await {
        emit(
            Level::Error,
            "captiongen.error",
            &format!("Error: {err:#}"),
            None,
        );
        std::process::exit(1);
    }
}
