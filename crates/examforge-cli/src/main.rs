//! examforge CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;
mod feeds;

#[derive(Parser)]
#[command(
    name = "examforge",
    version,
    about = "Exam paper analysis: item statistics and duplicate detection"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a question paper into a normalized exam
    Normalize {
        /// Plain-text question paper
        #[arg(long)]
        input: PathBuf,

        /// Exam title (defaults to the file name)
        #[arg(long)]
        title: Option<String>,

        /// Write the normalized exam as JSON to this path
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Detect duplicate and near-duplicate questions
    Similarity {
        /// Question paper (.txt) or normalized exam (.json)
        #[arg(long)]
        input: PathBuf,

        /// Write the report as JSON to this path
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Compute item statistics from a response sheet
    Stats {
        /// Question paper (.txt) or normalized exam (.json)
        #[arg(long)]
        input: PathBuf,

        /// Response sheet (.csv wide or long form, or .json)
        #[arg(long)]
        responses: PathBuf,

        /// Answer key: "1:C,2:A", or a path to a .json / .txt key file
        #[arg(long)]
        key: Option<String>,

        /// Write the report as JSON to this path
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run the full pipeline over one or more papers
    Analyze {
        /// Question papers (.txt)
        #[arg(long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Response sheet applied to every paper
        #[arg(long)]
        responses: Option<PathBuf>,

        /// Answer key: "1:C,2:A", or a path to a .json / .txt key file
        #[arg(long)]
        key: Option<String>,

        /// Max concurrent documents
        #[arg(long, default_value = "4")]
        parallelism: usize,

        /// Output directory
        #[arg(long, default_value = "./examforge-results")]
        output: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create a starter examforge.toml
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("examforge=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Normalize {
            input,
            title,
            output,
            format,
            config,
        } => commands::normalize::execute(input, title, output, format, config),
        Commands::Similarity {
            input,
            output,
            format,
            config,
        } => commands::similarity::execute(input, output, format, config),
        Commands::Stats {
            input,
            responses,
            key,
            output,
            format,
            config,
        } => commands::stats::execute(input, responses, key, output, format, config),
        Commands::Analyze {
            input,
            responses,
            key,
            parallelism,
            output,
            config,
        } => commands::analyze::execute(input, responses, key, parallelism, output, config).await,
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
