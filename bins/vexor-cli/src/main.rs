mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vexor-cli")]
#[command(about = "Vexor CLI - Run JavaScript test bundles in the sandbox without the HTTP API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a test file against a code file in a fresh isolate
    Run {
        /// JavaScript file with the code under test
        #[arg(short, long)]
        code: PathBuf,

        /// JavaScript file with describe/test/expect tests
        #[arg(short, long)]
        tests: PathBuf,

        /// Binding the tests target (defaults to the first declaration)
        #[arg(short, long, default_value = "")]
        function: String,

        /// Wall-clock limit in milliseconds (defaults to the configured value)
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Memory limit in MB (defaults to the configured value)
        #[arg(long)]
        memory_mb: Option<u32>,

        /// Print the raw ExecutionResult as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Print the bundled script the sandbox would execute
    Bundle {
        #[arg(short, long)]
        code: PathBuf,

        #[arg(short, long)]
        tests: Option<PathBuf>,

        #[arg(short, long, default_value = "")]
        function: String,
    },

    /// Validate configuration, and optionally the bindings of a code file
    Check {
        /// Config file (defaults to VEXOR_CONFIG or config/vexor.json)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Code file whose declarations should be listed
        #[arg(short, long)]
        code: Option<PathBuf>,

        #[arg(short, long, default_value = "")]
        function: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            code,
            tests,
            function,
            timeout_ms,
            memory_mb,
            json,
        } => {
            let all_passed =
                commands::run_tests(&code, &tests, &function, timeout_ms, memory_mb, json).await?;
            if !all_passed {
                std::process::exit(1);
            }
        }
        Commands::Bundle {
            code,
            tests,
            function,
        } => {
            commands::print_bundle(&code, tests.as_deref(), &function)?;
        }
        Commands::Check {
            config,
            code,
            function,
        } => {
            commands::check(config.as_deref(), code.as_deref(), &function)?;
        }
    }

    Ok(())
}
