use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const MEAL_TYPES: &[&str] = &["breakfast", "lunch", "dinner"];

/// Category assigned when an item has none.
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recipe {
    pub id: i64,
    pub uuid: String,
    pub user_id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cuisine_type: Option<String>,
    pub difficulty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prep_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cook_time: Option<i64>,
    pub servings: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub source: String,
    pub created_at: String,
    pub updated_at: String,
}

/// One ingredient line of a saved recipe. `unit` is free text and is never
/// normalized here; aggregation folds the name but compares units as given.
#[derive(Debug, Clone, Serialize)]
pub struct IngredientLine {
    pub id: i64,
    pub recipe_id: i64,
    pub name: String,
    pub quantity: f64,
    pub unit: String,
}

/// Per-serving nutrition estimate attached to a recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeNutrition {
    pub calories: f64,
    pub protein_g: Option<f64>,
    pub carbs_g: Option<f64>,
    pub fat_g: Option<f64>,
}

/// Full read-side projection of a recipe: the row plus ingredient lines,
/// instructions, tags, and nutrition flattened into one shape.
#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub ingredients: Vec<IngredientLine>,
    pub instructions: Vec<String>,
    pub dietary_tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nutrition: Option<RecipeNutrition>,
}

#[derive(Debug, Clone)]
pub struct NewIngredientLine {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
}

#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub name: String,
    pub description: Option<String>,
    pub cuisine_type: Option<String>,
    pub difficulty: String,
    pub prep_time: Option<i64>,
    pub cook_time: Option<i64>,
    pub servings: i64,
    pub image_url: Option<String>,
    pub source: String,
    pub ingredients: Vec<NewIngredientLine>,
    pub instructions: Vec<String>,
    pub dietary_tags: Vec<String>,
    pub nutrition: Option<RecipeNutrition>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MealSlot {
    pub id: i64,
    pub uuid: String,
    pub user_id: i64,
    pub recipe_id: i64,
    pub meal_date: String,
    pub meal_type: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Meal slot joined with the recipe's display fields for calendar views.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedMeal {
    pub id: i64,
    pub user_id: i64,
    pub recipe_id: i64,
    pub meal_date: String,
    pub meal_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prep_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cook_time: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewMealSlot {
    pub recipe_id: i64,
    pub meal_date: NaiveDate,
    pub meal_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MealPlanStats {
    pub total_planned_meals: i64,
    pub this_week_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PantryItem {
    pub id: i64,
    pub uuid: String,
    pub user_id: i64,
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    pub is_running_low: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewPantryItem {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    pub category: String,
    pub expiry_date: Option<NaiveDate>,
    pub is_running_low: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePantryItem {
    pub name: Option<String>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub category: Option<String>,
    pub expiry_date: Option<Option<NaiveDate>>,
    pub is_running_low: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct PantryFilter {
    pub category: Option<String>,
    pub is_running_low: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShoppingItem {
    pub id: i64,
    pub uuid: String,
    pub user_id: i64,
    pub ingredient_name: String,
    pub quantity: f64,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub is_checked: bool,
    pub from_meal_plan: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewShoppingItem {
    pub ingredient_name: String,
    pub quantity: f64,
    pub unit: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateShoppingItem {
    pub ingredient_name: Option<String>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub category: Option<String>,
    pub is_checked: Option<bool>,
}

/// Shopping list partitioned by category for display.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryGroup {
    pub category: String,
    pub items: Vec<ShoppingItem>,
}

/// Request sent to the AI recipe provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateRecipeRequest {
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub dietary_restrictions: Vec<String>,
    #[serde(default)]
    pub cuisine_type: Option<String>,
    #[serde(default)]
    pub servings: Option<i64>,
    #[serde(default)]
    pub cooking_time: Option<String>,
}

pub fn validate_meal_type(meal: &str) -> Result<String> {
    let lower = meal.to_lowercase();
    if MEAL_TYPES.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        bail!(
            "Invalid meal type '{meal}'. Must be one of: {}",
            MEAL_TYPES.join(", ")
        )
    }
}

/// Fixed calendar ordering for meal types: breakfast < lunch < dinner.
/// Not alphabetical, which would put dinner before lunch.
#[must_use]
pub fn meal_type_rank(meal_type: &str) -> i64 {
    match meal_type {
        "breakfast" => 0,
        "lunch" => 1,
        _ => 2,
    }
}

pub fn parse_iso_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("Invalid date '{s}'. Must be YYYY-MM-DD"))
}

/// A week is exactly 7 consecutive calendar days from the given start.
#[must_use]
pub fn week_end(start: NaiveDate) -> NaiveDate {
    start + chrono::Duration::days(6)
}

pub fn validate_date_range(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if end < start {
        bail!("End date {end} is before start date {start}");
    }
    Ok(())
}

pub fn validate_item_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        bail!("Name must not be empty");
    }
    Ok(trimmed.to_string())
}

pub fn validate_quantity(quantity: f64) -> Result<()> {
    if !quantity.is_finite() || quantity < 0.0 {
        bail!("Quantity must be a non-negative number");
    }
    Ok(())
}

pub fn validate_new_recipe(recipe: &NewRecipe) -> Result<()> {
    if recipe.name.trim().is_empty() {
        bail!("Recipe name must not be empty");
    }
    if recipe.servings <= 0 {
        bail!("Recipe servings must be greater than 0");
    }
    for line in &recipe.ingredients {
        if line.name.trim().is_empty() {
            bail!("Ingredient name must not be empty");
        }
        validate_quantity(line.quantity)?;
        if line.unit.trim().is_empty() {
            bail!("Ingredient unit must not be empty");
        }
    }
    Ok(())
}

pub fn validate_new_pantry_item(item: &NewPantryItem) -> Result<()> {
    validate_item_name(&item.name)?;
    validate_quantity(item.quantity)?;
    if item.unit.trim().is_empty() {
        bail!("Unit must not be empty");
    }
    if item.category.trim().is_empty() {
        bail!("Category must not be empty");
    }
    Ok(())
}

pub fn validate_new_shopping_item(item: &NewShoppingItem) -> Result<()> {
    validate_item_name(&item.ingredient_name)?;
    validate_quantity(item.quantity)?;
    if item.unit.trim().is_empty() {
        bail!("Unit must not be empty");
    }
    Ok(())
}
