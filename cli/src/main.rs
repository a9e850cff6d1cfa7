use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

mod commands;
mod util;

#[derive(Parser)]
#[command(name = "formcall", version, about = "formcall CLI: fill forms by talking to a voice agent")]
struct Cli {
    /// Voice server base URL (HTTP)
    #[arg(long, env = "FORMCALL_API_URL", default_value = "http://localhost:8081")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check voice server health
    Health,
    /// Print the agent instructions generated for a form
    Instructions {
        /// Form schema JSON file (defaults to the built-in form)
        #[arg(long)]
        schema: Option<PathBuf>,
        /// Also print the tool definitions registered with the agent
        #[arg(long)]
        tools: bool,
    },
    /// Form schema utilities
    Form {
        #[command(subcommand)]
        command: FormCommands,
    },
    /// Start a text-mode call: type instead of speaking
    Call {
        /// Call websocket URL
        #[arg(long, env = "FORMCALL_CALL_URL", default_value = "ws://localhost:8081/call")]
        url: String,
        /// Form schema JSON file (defaults to the built-in form)
        #[arg(long)]
        schema: Option<PathBuf>,
        /// Seconds to wait after the agent ends the call
        #[arg(long, default_value_t = 5)]
        end_call_delay: u64,
    },
}

#[derive(Subcommand)]
enum FormCommands {
    /// Print the default form as session parameters
    Default,
    /// Validate a form schema file
    Validate {
        /// Form schema JSON file
        schema: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Health => commands::health::run(&cli.api_url).await,
        Commands::Instructions { schema, tools } => {
            commands::instructions::run(schema.as_deref(), tools)
        }
        Commands::Form { command } => match command {
            FormCommands::Default => commands::form::default_form(),
            FormCommands::Validate { schema } => commands::form::validate(&schema),
        },
        Commands::Call {
            url,
            schema,
            end_call_delay,
        } => {
            if url.trim().is_empty() {
                util::exit_error(
                    "call url is required",
                    Some("Set --url or FORMCALL_CALL_URL"),
                );
            }
            commands::call::run(&url, schema.as_deref(), Duration::from_secs(end_call_delay)).await
        }
    };

    std::process::exit(code);
}
