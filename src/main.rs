mod cache;
mod cli;
mod config;
mod database;
mod error;
mod html;
mod notify;
mod parser;
mod render;
mod schema;
mod service;
mod timetable;
mod watch;

use cli::Cli;
use log::error;

fn main() {
    if let Err(err) = Cli::handle_command_line() {
        error!("{err}");
        eprintln!("{err}");
        std::process::exit(1);
    }
}
