//! PromptLora CLI - Prompt directive LoRA loader
//!
//! Runs the PromptLora node outside a graph host for inspection and testing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

/// PromptLora - apply `<lora:name:weight>` directives from a prompt
#[derive(Parser)]
#[command(name = "promptlora")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging (also enabled by COMFY_DEBUG)
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the directives found in a prompt
    Parse {
        /// Prompt text
        prompt: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List adapter files in the search paths
    List {
        /// Adapter directory (repeatable; replaces the defaults)
        #[arg(short = 'd', long = "lora-dir")]
        lora_dirs: Vec<PathBuf>,
    },

    /// Load an adapter by name and summarize it
    Inspect {
        /// Adapter name as written in a directive
        name: String,

        /// Adapter directory (repeatable; replaces the defaults)
        #[arg(short = 'd', long = "lora-dir")]
        lora_dirs: Vec<PathBuf>,
    },

    /// Run the node with the in-memory reference model
    Apply {
        /// Positive prompt (directives are read from here)
        #[arg(short, long)]
        positive: String,

        /// Negative prompt
        #[arg(short, long, default_value = "")]
        negative: String,

        /// Base model weights (safetensors)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Text encoder weights (safetensors)
        #[arg(long)]
        clip: Option<PathBuf>,

        /// Embedding dimension when the encoder has no projection weight
        #[arg(long, default_value = "768")]
        dim: usize,

        /// Adapter directory (repeatable; replaces the defaults)
        #[arg(short = 'd', long = "lora-dir")]
        lora_dirs: Vec<PathBuf>,

        /// Maximum number of cached adapters
        #[arg(long)]
        cache_capacity: Option<usize>,

        /// Allow non-safetensors file extensions
        #[arg(long)]
        unsafe_load: bool,
    },

    /// Print the node contract as JSON
    Schema,
}

/// Debug output when asked for, or when `COMFY_DEBUG` holds a non-empty value
fn debug_logging(verbose: bool, comfy_debug: Option<&str>) -> bool {
    verbose || comfy_debug.is_some_and(|v| !v.is_empty())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging
    let comfy_debug = std::env::var("COMFY_DEBUG").ok();
    let log_level = if debug_logging(cli.verbose, comfy_debug.as_deref()) {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_ansi(!cli.no_color)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Parse { prompt, json } => commands::parse::run(&prompt, json)?,

        Commands::List { lora_dirs } => commands::lora::list(&lora_dirs),

        Commands::Inspect { name, lora_dirs } => commands::lora::inspect(&name, &lora_dirs)?,

        Commands::Apply {
            positive,
            negative,
            model,
            clip,
            dim,
            lora_dirs,
            cache_capacity,
            unsafe_load,
        } => {
            let args = commands::apply::ApplyArgs {
                positive,
                negative,
                model,
                clip,
                dim,
                lora_dirs,
                cache_capacity,
                safe_load: !unsafe_load,
            };
            commands::apply::run(args)?;
        }

        Commands::Schema => commands::schema::run()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_logging_switch() {
        assert!(debug_logging(true, None));
        assert!(debug_logging(false, Some("1")));
        assert!(!debug_logging(false, Some("")));
        assert!(!debug_logging(false, None));
    }
}
