use anyhow::Result;
use std::process;

use larder_core::models::GenerateRecipeRequest;
use larder_core::service::LarderService;

use crate::gemini::GeminiClient;

use super::helpers::{json_error, print_recipe_table};

#[allow(clippy::too_many_arguments)]
pub(crate) async fn cmd_recipe_generate(
    service: &LarderService,
    user_id: i64,
    gemini: &GeminiClient,
    ingredients: Vec<String>,
    dietary: Vec<String>,
    cuisine: Option<String>,
    servings: Option<i64>,
    time: Option<String>,
    json: bool,
) -> Result<()> {
    let request = GenerateRecipeRequest {
        ingredients,
        dietary_restrictions: dietary,
        cuisine_type: cuisine,
        servings,
        cooking_time: time,
    };

    let recipe = gemini.generate_async(&request).await?;
    let detail = service.add_recipe(user_id, &recipe)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        let id = detail.recipe.id;
        let name = &detail.recipe.name;
        let lines = detail.ingredients.len();
        println!("Saved recipe {id}: {name} ({lines} ingredients)");
    }
    Ok(())
}

pub(crate) async fn cmd_recipe_suggest(
    gemini: &GeminiClient,
    ingredients: Vec<String>,
    json: bool,
) -> Result<()> {
    let suggestions = gemini.suggest_ingredients_async(&ingredients).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&suggestions)?);
    } else if suggestions.is_empty() {
        println!("No suggestions");
    } else {
        for s in &suggestions {
            println!("  - {s}");
        }
    }
    Ok(())
}

pub(crate) fn cmd_recipe_list(service: &LarderService, user_id: i64, json: bool) -> Result<()> {
    let recipes = service.list_recipes(user_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
    } else if recipes.is_empty() {
        println!("No recipes saved yet");
    } else {
        print_recipe_table(&recipes);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_show(
    service: &LarderService,
    user_id: i64,
    id: i64,
    json: bool,
) -> Result<()> {
    let Ok(detail) = service.recipe_detail(id, user_id) else {
        if json {
            println!("{}", json_error(&format!("Recipe {id} not found")));
        } else {
            eprintln!("Recipe {id} not found");
        }
        process::exit(2);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let name = &detail.recipe.name;
    println!("{name}");
    if let Some(desc) = &detail.recipe.description {
        println!("{desc}");
    }
    println!();
    println!("Ingredients:");
    for line in &detail.ingredients {
        let qty = line.quantity;
        let unit = &line.unit;
        let ing = &line.name;
        println!("  - {qty} {unit} {ing}");
    }
    if !detail.instructions.is_empty() {
        println!();
        println!("Instructions:");
        for (i, step) in detail.instructions.iter().enumerate() {
            let n = i + 1;
            println!("  {n}. {step}");
        }
    }
    if let Some(n) = &detail.nutrition {
        let cal = n.calories;
        println!();
        println!("Per serving: {cal:.0} kcal");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_delete(
    service: &LarderService,
    user_id: i64,
    id: i64,
    json: bool,
) -> Result<()> {
    if service.delete_recipe(id, user_id)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": id }));
        } else {
            println!("Deleted recipe {id}");
        }
        Ok(())
    } else {
        if json {
            println!("{}", json_error(&format!("Recipe {id} not found")));
        } else {
            eprintln!("Recipe {id} not found");
        }
        process::exit(2);
    }
}
