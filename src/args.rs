use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::srv::SrvConfig;

#[derive(Parser, Debug)]
#[command(name = "tilery", about, version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Runs the tilery server
    Run(RunArgs),
    /// Prints out the version
    Version,
}

#[derive(clap::Args, Debug, Default)]
pub struct RunArgs {
    /// Server configuration file
    #[arg(short = 'f', long, env = "TILERY_CONFIG_FILE", default_value = "tilery.yml")]
    pub config_file: PathBuf,
    /// Port to serve tiles on
    #[arg(short, long, env = "TILERY_PORT", default_value_t = 3000)]
    pub port: u16,
    /// Port for internal healthchecks
    #[arg(short, long, env = "TILERY_INTERNAL_PORT", default_value_t = 3001)]
    pub internal_port: u16,
    /// Enables cross-origin resource sharing (CORS)
    #[arg(short = 'x', long, env = "TILERY_ENABLE_CORS")]
    pub enable_cors: bool,
    /// Simplifies geometries based on zoom level
    #[arg(short, long, env = "TILERY_SIMPLIFY_SHAPES")]
    pub simplify_shapes: bool,
    /// Number of web server workers (0 = one per core)
    #[arg(short, long, env = "TILERY_NUM_PROCESSES", default_value_t = 0)]
    pub num_processes: usize,
    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

impl RunArgs {
    #[must_use]
    pub fn srv_config(&self) -> SrvConfig {
        SrvConfig {
            port: self.port,
            internal_port: self.internal_port,
            enable_cors: self.enable_cors,
            simplify: self.simplify_shapes,
            worker_processes: self.num_processes,
        }
    }
}
