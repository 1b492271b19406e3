mod client;
mod commands;
mod config;
mod llm;
mod retry;
mod server;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::client::PantryClient;
use crate::commands::{
    FoodForm, SaveChoice, cmd_food_add, cmd_food_delete, cmd_food_edit, cmd_food_list,
    cmd_food_show, cmd_recipe_delete, cmd_recipe_generate, cmd_recipe_list, cmd_recipe_save,
    cmd_recipe_show, json_error,
};
use crate::config::Config;
use crate::llm::CompletionClient;
use crate::retry::RetryPolicy;
use crate::server::ServeOptions;
use pantry_core::service::PantryService;

#[derive(Parser)]
#[command(
    name = "pantry",
    version,
    about = "Track what's in your pantry and get recipe ideas from it"
)]
struct Cli {
    /// Pantry server URL (default: $PANTRY_SERVER_URL or http://127.0.0.1:8000)
    #[arg(long, global = true, value_name = "URL")]
    server: Option<String>,
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Require a bearer API key (generated in the data directory on first use)
        #[arg(long)]
        require_api_key: bool,
        /// Allowed CORS origin for a browser frontend; repeatable (default: any)
        #[arg(long = "allow-origin", value_name = "ORIGIN")]
        allow_origins: Vec<String>,
    },
    /// Manage the food items in your pantry
    Food {
        #[command(subcommand)]
        command: FoodCommands,
    },
    /// Generate and manage recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
}

#[derive(Subcommand)]
enum FoodCommands {
    /// Add a food item
    Add {
        /// Food name
        name: String,
        /// Whole-number quantity
        #[arg(allow_hyphen_values = true)]
        quantity: String,
        /// Unit of measure (e.g. kg, g, L, un)
        unit: String,
    },
    /// Change a food item; unset fields keep their current value
    Edit {
        /// Food item ID
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        quantity: Option<String>,
        #[arg(long)]
        unit: Option<String>,
    },
    /// List food items, most recently updated first
    List,
    /// Show a single food item
    Show {
        /// Food item ID
        id: i64,
    },
    /// Delete a food item
    Delete {
        /// Food item ID
        id: i64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Generate a recipe from the current pantry
    Generate {
        /// Save the recipe without asking
        #[arg(long, conflicts_with = "discard")]
        save: bool,
        /// Discard the recipe without asking
        #[arg(long)]
        discard: bool,
        /// Title to store with the recipe (default: "Generated Recipe")
        #[arg(long)]
        title: Option<String>,
    },
    /// Save a markdown recipe from a file, or `-` for stdin
    Save {
        /// Markdown file path
        file: PathBuf,
        /// Title to store with the recipe (default: "Generated Recipe")
        #[arg(long)]
        title: Option<String>,
    },
    /// List saved recipes, newest first
    List,
    /// Print a saved recipe
    Show {
        /// Recipe ID
        id: i64,
    },
    /// Delete a saved recipe
    Delete {
        /// Recipe ID
        id: i64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = run(cli).await {
        if json {
            println!("{}", json_error(&format!("{e:#}")));
        } else {
            eprintln!("Error: {e:#}");
        }
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let Cli {
        server,
        json,
        command,
    } = cli;
    let config = Config::load()?;

    match command {
        Commands::Serve {
            port,
            bind,
            require_api_key,
            allow_origins,
        } => {
            let api_key = if require_api_key {
                Some(config.load_or_create_api_key()?)
            } else {
                None
            };
            config.llm.warn_if_unauthenticated();
            let service = PantryService::new(&config.db_path)?;
            let llm = CompletionClient::new(&config.llm)?;
            server::start_server(
                service,
                llm,
                ServeOptions {
                    port,
                    bind,
                    api_key,
                    allowed_origins: allow_origins,
                },
            )
            .await
        }
        Commands::Food { command } => {
            let client = connect(server, &config)?;
            match command {
                FoodCommands::Add {
                    name,
                    quantity,
                    unit,
                } => {
                    let form = FoodForm {
                        name,
                        quantity,
                        unit,
                    };
                    cmd_food_add(&client, form, json).await
                }
                FoodCommands::Edit {
                    id,
                    name,
                    quantity,
                    unit,
                } => cmd_food_edit(&client, id, name, quantity, unit, json).await,
                FoodCommands::List => cmd_food_list(&client, json).await,
                FoodCommands::Show { id } => cmd_food_show(&client, id, json).await,
                FoodCommands::Delete { id, yes } => {
                    cmd_food_delete(&client, id, yes, json, &mut io::stdin().lock()).await
                }
            }
        }
        Commands::Recipe { command } => {
            let client = connect(server, &config)?;
            match command {
                RecipeCommands::Generate {
                    save,
                    discard,
                    title,
                } => {
                    cmd_recipe_generate(
                        &client,
                        &RetryPolicy::default(),
                        SaveChoice::from_flags(save, discard),
                        title.as_deref(),
                        json,
                        &mut io::stdin().lock(),
                    )
                    .await
                }
                RecipeCommands::Save { file, title } => {
                    cmd_recipe_save(&client, &file, title.as_deref(), json).await
                }
                RecipeCommands::List => cmd_recipe_list(&client, json).await,
                RecipeCommands::Show { id } => cmd_recipe_show(&client, id, json).await,
                RecipeCommands::Delete { id, yes } => {
                    cmd_recipe_delete(&client, id, yes, json, &mut io::stdin().lock()).await
                }
            }
        }
    }
}

fn connect(server: Option<String>, config: &Config) -> Result<PantryClient> {
    let url = server.unwrap_or_else(|| config.server_url.clone());
    PantryClient::new(&url, config.api_key.clone())
}
