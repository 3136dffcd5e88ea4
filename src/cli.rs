use clap::{Parser, Subcommand, ValueEnum};
use std::ffi::OsString;

#[derive(Debug, Clone, Parser)]
#[command(name = "class-scan")]
#[command(about = "Scan a Java classpath for classes by annotation or supertype")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Classpath entries joined with the platform path separator.
    #[arg(long, visible_alias = "cp", value_name = "PATHS", global = true)]
    pub classpath: Option<OsString>,

    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json, global = true)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    Scan {
        #[arg(required = true, value_name = "PACKAGES")]
        packages: Vec<String>,

        #[arg(short = 'a', long = "annotation", value_name = "FQN")]
        annotations: Vec<String>,

        #[arg(short = 's', long, value_name = "FQN", conflicts_with = "annotations")]
        supertype: Option<String>,

        #[arg(long)]
        no_recurse: bool,
    },
    Packages {
        #[arg(value_name = "INPUT")]
        input: Vec<String>,
    },
    Inspect {
        class_name: String,

        #[arg(long)]
        superclasses: bool,
    },
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
