use serde::Deserialize;

use crate::models::{NewIngredientLine, NewRecipe, RecipeNutrition};

/// Recipe shape the AI provider is asked to return. Quantities arrive as
/// loose JSON (number or string), so they are parsed leniently.
#[derive(Debug, Deserialize)]
pub struct GeneratedRecipe {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<GeneratedIngredient>,
    #[serde(default)]
    pub instructions: Vec<String>,
    pub cuisine_type: Option<String>,
    pub difficulty: Option<String>,
    pub prep_time: Option<i64>,
    pub cook_time: Option<i64>,
    pub servings: Option<i64>,
    #[serde(default)]
    pub dietary_tags: Vec<String>,
    pub nutrition: Option<GeneratedNutrition>,
}

#[derive(Debug, Deserialize)]
pub struct GeneratedIngredient {
    pub name: Option<String>,
    pub quantity: Option<serde_json::Value>,
    pub unit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GeneratedNutrition {
    pub calories: Option<f64>,
    pub protein_g: Option<f64>,
    pub carbs_g: Option<f64>,
    pub fat_g: Option<f64>,
}

/// Parse a loose JSON quantity. Strings are read by their leading numeric
/// prefix ("2 cups" is 2); non-numeric or missing values count as 0.
#[must_use]
pub fn quantity_to_f64(value: Option<&serde_json::Value>) -> f64 {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => leading_number(s),
        _ => 0.0,
    }
}

fn leading_number(s: &str) -> f64 {
    let trimmed = s.trim();
    let mut end = 0;
    for (i, c) in trimmed.char_indices() {
        if c.is_ascii_digit() || c == '.' || (i == 0 && (c == '+' || c == '-')) {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    trimmed[..end].parse().unwrap_or(0.0)
}

/// Convert an AI response into a `NewRecipe`, or `None` when it lacks the
/// minimum (a name). Lines without a name are skipped; missing units fall
/// back to "piece".
#[must_use]
pub fn generated_to_recipe(g: GeneratedRecipe) -> Option<NewRecipe> {
    let name = g.name.filter(|n| !n.trim().is_empty())?;

    let ingredients = g
        .ingredients
        .into_iter()
        .filter_map(|line| {
            let name = line.name.filter(|n| !n.trim().is_empty())?;
            let quantity = quantity_to_f64(line.quantity.as_ref()).max(0.0);
            let unit = line
                .unit
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| "piece".to_string());
            Some(NewIngredientLine {
                name,
                quantity,
                unit,
            })
        })
        .collect();

    let nutrition = g.nutrition.and_then(|n| {
        n.calories.map(|calories| RecipeNutrition {
            calories,
            protein_g: n.protein_g,
            carbs_g: n.carbs_g,
            fat_g: n.fat_g,
        })
    });

    Some(NewRecipe {
        name,
        description: g.description.filter(|d| !d.trim().is_empty()),
        cuisine_type: g.cuisine_type.filter(|c| !c.trim().is_empty()),
        difficulty: g.difficulty.unwrap_or_else(|| "medium".to_string()),
        prep_time: g.prep_time,
        cook_time: g.cook_time,
        servings: g.servings.filter(|&s| s > 0).unwrap_or(4),
        image_url: None,
        source: "gemini".to_string(),
        ingredients,
        instructions: g.instructions,
        dietary_tags: g.dietary_tags,
        nutrition,
    })
}
