//! Modux CLI - inspect and manage persisted stores

use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::Confirm;
use modux_cli::{
    clear, default_config_path, init_config, init_logging, list_keys, load_config, run_demo,
    show_module,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "modux")]
#[command(about = "Modux - modular state store tools")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides the config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List persisted module keys
    Keys,

    /// Print the persisted state of a module
    Show {
        /// Module name
        module: String,
    },

    /// Remove every persisted key under the configured prefix
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Run a demo session against the data directory
    Demo,

    /// Write a default configuration file
    InitConfig {
        /// Output file path (defaults to the user config directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    init_logging(&config.log_level);

    match cli.command {
        Commands::Keys => {
            let keys = list_keys(&config).await?;
            if keys.is_empty() {
                println!("No persisted modules under {:?}", config.persistence.key_prefix);
            }
            for key in keys {
                println!("{}", key);
            }
        }

        Commands::Show { module } => match show_module(&config, &module).await? {
            Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
            None => {
                eprintln!("{} nothing persisted for {}", "Error:".red(), module);
                std::process::exit(1);
            }
        },

        Commands::Clear { yes } => {
            let confirmed = yes
                || Confirm::new()
                    .with_prompt(format!(
                        "Remove every key under {:?} in {}?",
                        config.persistence.key_prefix,
                        config.data_dir.display()
                    ))
                    .default(false)
                    .interact()?;
            if confirmed {
                let removed = clear(&config).await?;
                println!("{} removed {} keys", "✔".green(), removed);
            }
        }

        Commands::Demo => run_demo(&config).await?,

        Commands::InitConfig { output } => {
            let path = output
                .or_else(default_config_path)
                .ok_or_else(|| anyhow::anyhow!("no config directory; pass --output"))?;
            init_config(&path)?;
            println!("Configuration saved to: {}", path.display());
        }
    }

    Ok(())
}
