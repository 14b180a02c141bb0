use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gauthctl::Operation;

#[derive(Parser, Debug)]
#[command(name = "gauthctl", version, about = "Manage secure gauth configs")]
pub struct Args {
    #[command(subcommand)]
    pub sub: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Enable gauth using specified config
    #[command(long_flag = "enable", short_flag = 'e')]
    Enable {
        /// Config file to install; must be owned by you and not readable by others
        config_path: PathBuf,
    },
    /// Disable gauth for the user
    #[command(long_flag = "disable", short_flag = 'd')]
    Disable,
}

impl From<Cmd> for Operation {
    fn from(cmd: Cmd) -> Self {
        match cmd {
            Cmd::Enable { config_path } => Operation::Enable {
                config: config_path,
            },
            Cmd::Disable => Operation::Disable,
        }
    }
}
