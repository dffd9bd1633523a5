mod actions;
mod classifier;
mod cli;
mod config;
mod deck;
mod error;
mod gestures;
mod landmarks;
mod logging;
mod provider;
mod server;
mod session;
mod smoothing;
mod stats;
mod viz;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
