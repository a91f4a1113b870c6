//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Kubeblog: serve a blog straight from BlogPost/BlogPage resources
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Config file path (default: kubeblog.toml)
    #[arg(short = 'C', long, default_value = "kubeblog.toml")]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Shared source arguments for Serve and Check commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Namespace to watch
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Manifest directory used as the resource source
    #[arg(short, long)]
    pub manifests: Option<PathBuf>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Mirror resources into memory and serve the blog over HTTP
    Serve {
        #[command(flatten)]
        source: SourceArgs,

        /// Interface to bind on
        #[arg(short, long)]
        interface: Option<String>,

        /// The port you should provide
        #[arg(short, long)]
        port: Option<u16>,

        /// Blog name shown in page headers and the feed
        #[arg(long = "blog-name")]
        blog_name: Option<String>,
    },

    /// Convert every manifest once and report records that would be dropped
    Check {
        #[command(flatten)]
        source: SourceArgs,
    },
}

impl Cli {
    pub const fn source_args(&self) -> &SourceArgs {
        match &self.command {
            Commands::Serve { source, .. } | Commands::Check { source } => source,
        }
    }
}
