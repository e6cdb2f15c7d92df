use std::{error::Error, net::TcpListener, path::PathBuf};

use clap::Parser;
use log::{info, warn};

use odnp_server::{CommandServer, ConfigError, Hardware, ServerConfig, SystemClock};

#[derive(Parser, Debug)]
#[command(name = "odnp-server", version)]
#[command(
    about = "TCP command server for ODNP field and microwave control",
    long_about = "Serves the ODNP bench over TCP: magnet field ramps, staged microwave power \
        ramps, dip locking and a log of the microwave detectors.\n\n\
        Settings are read from a TOML file. A missing file falls back to the defaults."
)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "odnp_server.toml")]
    config: PathBuf,

    /// Listen address, overrides the configuration.
    #[arg(short, long)]
    listen: Option<String>,

    /// Run against the simulated bench instead of the instruments.
    #[arg(long)]
    simulate: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match ServerConfig::load(&args.config) {
        Ok(config) => config,
        Err(ConfigError::Io { path, source }) => {
            warn!("Using default configuration, {} not readable: {source}", path.display());
            ServerConfig::default()
        }
        Err(e) => return Err(e.into()),
    };
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }

    let hardware = if args.simulate {
        info!("Running against the simulated bench");
        Hardware::simulated()
    } else {
        Hardware::connect(&config.instruments)?
    };

    let listener = TcpListener::bind(&config.server.listen)?;
    let mut server = CommandServer::new(hardware, config, SystemClock);
    server.serve(&listener)?;
    Ok(())
}
