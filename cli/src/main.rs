mod commands;
mod config;
mod gemini;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;

use crate::commands::{
    cmd_pantry_add, cmd_pantry_expiring, cmd_pantry_list, cmd_pantry_remove, cmd_pantry_update,
    cmd_plan_add, cmd_plan_remove, cmd_plan_stats, cmd_plan_upcoming, cmd_plan_week,
    cmd_recipe_delete, cmd_recipe_generate, cmd_recipe_list, cmd_recipe_show, cmd_recipe_suggest,
    cmd_shop_add, cmd_shop_clear, cmd_shop_generate, cmd_shop_list, cmd_shop_remove,
    cmd_shop_to_pantry, cmd_shop_toggle,
};
use crate::config::{Config, DEFAULT_USER};
use crate::gemini::GeminiClient;
use larder_core::service::LarderService;

#[derive(Parser)]
#[command(
    name = "larder",
    version,
    about = "Meal planning, pantry tracking, and shopping lists"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage pantry items
    Pantry {
        #[command(subcommand)]
        command: PantryCommands,
    },
    /// Manage recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Plan meals on the calendar
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Manage the shopping list
    Shop {
        #[command(subcommand)]
        command: ShopCommands,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum PantryCommands {
    /// Add an item to the pantry
    Add {
        /// Item name
        name: String,
        /// Quantity on hand
        quantity: f64,
        /// Unit (free text: g, cup, piece, ...)
        unit: String,
        /// Category for grouping
        #[arg(short, long, default_value = "Uncategorized")]
        category: String,
        /// Expiry date (YYYY-MM-DD or today/tomorrow)
        #[arg(long)]
        expires: Option<String>,
        /// Mark as running low
        #[arg(long)]
        running_low: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List pantry items
    List {
        /// Filter by category
        #[arg(short, long)]
        category: Option<String>,
        /// Only items marked running low
        #[arg(long)]
        running_low: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update a pantry item
    Update {
        /// Pantry item ID
        id: i64,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New quantity
        #[arg(short, long)]
        quantity: Option<f64>,
        /// New unit
        #[arg(long)]
        unit: Option<String>,
        /// New category
        #[arg(long)]
        category: Option<String>,
        /// New expiry date (YYYY-MM-DD, or "none" to clear)
        #[arg(long)]
        expires: Option<String>,
        /// Set or clear the running-low flag
        #[arg(long)]
        running_low: Option<bool>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a pantry item
    Remove {
        /// Pantry item ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show items expiring soon
    Expiring {
        /// Days ahead to look
        #[arg(short, long, default_value = "7")]
        days: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Generate a recipe with AI and save it
    Generate {
        /// Ingredients to build the recipe around
        #[arg(short, long, value_delimiter = ',')]
        ingredients: Vec<String>,
        /// Dietary restrictions (e.g. vegetarian, gluten-free)
        #[arg(short, long, value_delimiter = ',')]
        dietary: Vec<String>,
        /// Cuisine style
        #[arg(short, long)]
        cuisine: Option<String>,
        /// Number of servings
        #[arg(short, long)]
        servings: Option<i64>,
        /// Total cooking time (e.g. "30 minutes")
        #[arg(short, long)]
        time: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Suggest complementary ingredients with AI
    Suggest {
        /// Ingredients you already have
        #[arg(value_delimiter = ',')]
        ingredients: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List saved recipes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recipe details
    Show {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe (unplans it everywhere)
    Delete {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Assign a recipe to a meal slot
    Add {
        /// Recipe ID
        recipe_id: i64,
        /// Meal type: breakfast, lunch, dinner
        meal: String,
        /// Date (YYYY-MM-DD or today/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the plan for a week
    Week {
        /// Week start date (YYYY-MM-DD or today, default: today)
        start: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show upcoming planned meals
    Upcoming {
        /// Maximum number of meals to show
        #[arg(short, long, default_value = "5")]
        limit: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show planning statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a meal slot from the plan
    Remove {
        /// Meal slot ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ShopCommands {
    /// Regenerate the shopping list from the meal plan
    Generate {
        /// Plan start date (YYYY-MM-DD or today, default: today)
        start: Option<String>,
        /// Plan end date (default: start + 6 days)
        #[arg(long)]
        end: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the shopping list
    List {
        /// Group items by category
        #[arg(short, long)]
        grouped: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a manual item to the shopping list
    Add {
        /// Ingredient name
        name: String,
        /// Quantity to buy
        quantity: f64,
        /// Unit (free text)
        unit: String,
        /// Category for grouping
        #[arg(short, long)]
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Toggle an item's checked state
    Toggle {
        /// Shopping item ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an item from the shopping list
    Remove {
        /// Shopping item ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove checked items
    ClearChecked {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove every item
    ClearAll {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move checked items into the pantry
    ToPantry {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let service = LarderService::open(&config.db_path)?;
    let user = service.default_user(DEFAULT_USER)?;
    let user_id = user.id;

    match cli.command {
        Commands::Pantry { command } => match command {
            PantryCommands::Add {
                name,
                quantity,
                unit,
                category,
                expires,
                running_low,
                json,
            } => cmd_pantry_add(
                &service,
                user_id,
                &name,
                quantity,
                &unit,
                &category,
                expires,
                running_low,
                json,
            ),
            PantryCommands::List {
                category,
                running_low,
                json,
            } => cmd_pantry_list(&service, user_id, category, running_low, json),
            PantryCommands::Update {
                id,
                name,
                quantity,
                unit,
                category,
                expires,
                running_low,
                json,
            } => cmd_pantry_update(
                &service,
                user_id,
                id,
                name,
                quantity,
                unit,
                category,
                expires,
                running_low,
                json,
            ),
            PantryCommands::Remove { id, json } => cmd_pantry_remove(&service, user_id, id, json),
            PantryCommands::Expiring { days, json } => {
                cmd_pantry_expiring(&service, user_id, days, json)
            }
        },
        Commands::Recipe { command } => match command {
            RecipeCommands::Generate {
                ingredients,
                dietary,
                cuisine,
                servings,
                time,
                json,
            } => {
                let gemini = GeminiClient::from_env()?;
                cmd_recipe_generate(
                    &service,
                    user_id,
                    &gemini,
                    ingredients,
                    dietary,
                    cuisine,
                    servings,
                    time,
                    json,
                )
                .await
            }
            RecipeCommands::Suggest { ingredients, json } => {
                let gemini = GeminiClient::from_env()?;
                cmd_recipe_suggest(&gemini, ingredients, json).await
            }
            RecipeCommands::List { json } => cmd_recipe_list(&service, user_id, json),
            RecipeCommands::Show { id, json } => cmd_recipe_show(&service, user_id, id, json),
            RecipeCommands::Delete { id, json } => cmd_recipe_delete(&service, user_id, id, json),
        },
        Commands::Plan { command } => match command {
            PlanCommands::Add {
                recipe_id,
                meal,
                date,
                json,
            } => cmd_plan_add(&service, user_id, recipe_id, date, &meal, json),
            PlanCommands::Week { start, json } => cmd_plan_week(&service, user_id, start, json),
            PlanCommands::Upcoming { limit, json } => {
                cmd_plan_upcoming(&service, user_id, limit, json)
            }
            PlanCommands::Stats { json } => cmd_plan_stats(&service, user_id, json),
            PlanCommands::Remove { id, json } => cmd_plan_remove(&service, user_id, id, json),
        },
        Commands::Shop { command } => match command {
            ShopCommands::Generate { start, end, json } => {
                cmd_shop_generate(&service, user_id, start, end, json)
            }
            ShopCommands::List { grouped, json } => cmd_shop_list(&service, user_id, grouped, json),
            ShopCommands::Add {
                name,
                quantity,
                unit,
                category,
                json,
            } => cmd_shop_add(&service, user_id, &name, quantity, &unit, category, json),
            ShopCommands::Toggle { id, json } => cmd_shop_toggle(&service, user_id, id, json),
            ShopCommands::Remove { id, json } => cmd_shop_remove(&service, user_id, id, json),
            ShopCommands::ClearChecked { json } => cmd_shop_clear(&service, user_id, true, json),
            ShopCommands::ClearAll { json } => cmd_shop_clear(&service, user_id, false, json),
            ShopCommands::ToPantry { json } => cmd_shop_to_pantry(&service, user_id, json),
        },
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                let (key, _new) = config.load_or_create_api_key()?;
                Some(key)
            };
            server::start_server(service, user_id, port, &bind, api_key).await
        }
    }
}
