//! htmlpluck CLI - run one download-and-extract job from a JSON request

use clap::{Parser, Subcommand};
use htmlpluck::{ExtractService, JobError, JobResponse, Tool, TOOL_LLMTXT};
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

/// htmlpluck - read exact bytes over TCP and extract HTML with XPath
#[derive(Parser, Debug)]
#[command(name = "htmlpluck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Print full help with examples (llmtxt)
    #[arg(long)]
    llmtxt: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one job, reading the JSON request from stdin or a file
    Run {
        /// Read the request from this file instead of stdin
        #[arg(long, short)]
        input: Option<PathBuf>,
    },
    /// Print the JSON Schema of the request
    Schema {
        /// Print the response schema instead
        #[arg(long)]
        output: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.llmtxt {
        write_safe(format!("{}\n", TOOL_LLMTXT).as_bytes());
        std::process::exit(0);
    }

    match cli.command {
        Some(Commands::Schema { output }) => print_schema(output),
        Some(Commands::Run { input }) => run_job(input).await,
        None => run_job(None).await,
    }
}

fn print_schema(output: bool) {
    let tool = Tool::default();
    let schema = if output {
        tool.output_schema()
    } else {
        tool.input_schema()
    };
    let json = serde_json::to_string_pretty(&schema).unwrap_or_else(|e| {
        eprintln!("Error serializing schema: {}", e);
        std::process::exit(1);
    });
    write_safe(format!("{}\n", json).as_bytes());
}

async fn run_job(input: Option<PathBuf>) {
    let line = respond(input).await.unwrap_or_else(|e| {
        eprintln!("Error serializing response: {}", e);
        std::process::exit(1);
    });
    write_safe(&line);
}

/// Produce the response line for one request, read from `input` or stdin
async fn respond(input: Option<PathBuf>) -> serde_json::Result<Vec<u8>> {
    let body = match read_request(input).await {
        Ok(body) => body,
        Err(e) => return JobResponse::failure(&JobError::Decode(e.to_string())).to_json_line(),
    };
    tracing::debug!(bytes = body.len(), "Request read");
    ExtractService::with_defaults().handle(&body).await
}

async fn read_request(input: Option<PathBuf>) -> io::Result<Vec<u8>> {
    match input {
        Some(path) => tokio::fs::read(path).await,
        None => {
            let mut body = Vec::new();
            tokio::io::stdin().read_to_end(&mut body).await?;
            Ok(body)
        }
    }
}

/// Write to stdout, exit silently on broken pipe
fn write_safe(bytes: &[u8]) {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = handle.write_all(bytes).and_then(|_| handle.flush()) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        eprintln!("Error writing to stdout: {}", e);
        std::process::exit(1);
    }
}
