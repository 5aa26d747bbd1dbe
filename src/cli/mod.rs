use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use hookbus::{
    config::{load_env_file, BridgeConfig, BusKind},
    protocol::Flavor,
};

pub mod client;
pub mod flavors;
pub mod host;

use client::ClientArgs;
use flavors::FlavorsArgs;
use host::HostArgs;

#[derive(Parser, Debug)]
#[command(
    name = "hookbus",
    about = "Bridge an IRC client's plugin hooks onto D-Bus",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve a scripted console host on the bus
    Host(HostArgs),

    /// Connect to a host and log the events it delivers
    Client(ClientArgs),

    /// List the known flavors and their bus names
    Flavors(FlavorsArgs),
}

/// Flags shared by every command; they win over the environment.
#[derive(Args, Debug, Default)]
pub struct CommonArgs {
    /// xchat, hexchat or weechat
    #[arg(long, global = true)]
    pub flavor: Option<Flavor>,

    /// session or system
    #[arg(long, global = true)]
    pub bus: Option<BusKind>,

    /// Log filter (e.g. error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Also write rolling log files into this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// A .env file to load before reading the environment
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,
}

impl CommonArgs {
    /// `.env`, then the environment, then these flags. Also returns the
    /// `.env` file that was loaded, if any.
    pub fn resolve(&self) -> Result<(BridgeConfig, Option<PathBuf>)> {
        let env_file = load_env_file(self.env_file.as_deref())?;
        let mut config = BridgeConfig::from_env()?;
        self.apply(&mut config);
        Ok((config, env_file))
    }

    fn apply(&self, config: &mut BridgeConfig) {
        if let Some(flavor) = self.flavor {
            config.flavor = flavor;
        }
        if let Some(bus) = self.bus {
            config.bus = bus;
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.log.dir = Some(dir.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_environment() {
        let cli = Cli::try_parse_from(["hookbus", "client", "--flavor", "weechat", "--print", "Your Message"]).unwrap();
        let mut config = BridgeConfig::default();
        cli.common.apply(&mut config);
        assert_eq!(config.flavor, Flavor::Weechat);
        assert_eq!(config.bus, BusKind::Session);
        let Commands::Client(args) = cli.command else { panic!("expected client") };
        assert_eq!(args.print, vec!["Your Message"]);
    }

    #[test]
    fn unknown_flavor_is_rejected() {
        assert!(Cli::try_parse_from(["hookbus", "--flavor", "irssi", "flavors"]).is_err());
    }
}
