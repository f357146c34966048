use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;

use crate::db::Database;
use crate::models::{
    CategoryGroup, GenerateRecipeRequest, MealPlanStats, MealSlot, NewMealSlot, NewPantryItem,
    NewRecipe, NewShoppingItem, PantryFilter, PantryItem, PlannedMeal, Recipe, RecipeDetail,
    ShoppingItem, UpdatePantryItem, UpdateShoppingItem, User, parse_iso_date, validate_date_range,
    validate_meal_type, validate_new_pantry_item, validate_new_recipe, validate_new_shopping_item,
    week_end,
};

/// Produces a recipe from a free-form request. Implemented by the Gemini
/// client in the CLI crate and by mocks in tests.
pub trait RecipeGenerator {
    fn generate(&self, request: &GenerateRecipeRequest) -> Result<NewRecipe>;
}

/// Validation and orchestration over the store. Takes strings where callers
/// have strings (dates, meal types) and owns the parse-then-act sequence so
/// the CLI and the HTTP server cannot drift apart.
pub struct LarderService {
    db: Database,
}

impl LarderService {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            db: Database::open(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db: Database::open_in_memory()?,
        })
    }

    #[must_use]
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn default_user(&self, name: &str) -> Result<User> {
        self.db.get_or_create_user(name)
    }

    // --- Recipes ---

    pub fn add_recipe(&self, user_id: i64, recipe: &NewRecipe) -> Result<RecipeDetail> {
        validate_new_recipe(recipe)?;
        self.db.insert_recipe(user_id, recipe)
    }

    /// Ask the provider for a recipe and persist it in one step. Nothing is
    /// written when generation or validation fails.
    pub fn generate_and_save_recipe(
        &self,
        user_id: i64,
        generator: &dyn RecipeGenerator,
        request: &GenerateRecipeRequest,
    ) -> Result<RecipeDetail> {
        let recipe = generator
            .generate(request)
            .context("Recipe generation failed")?;
        self.add_recipe(user_id, &recipe)
    }

    pub fn list_recipes(&self, user_id: i64) -> Result<Vec<Recipe>> {
        self.db.list_recipes(user_id)
    }

    pub fn recipe_detail(&self, id: i64, user_id: i64) -> Result<RecipeDetail> {
        self.db.get_recipe_detail(id, user_id)
    }

    pub fn delete_recipe(&self, id: i64, user_id: i64) -> Result<bool> {
        self.db.delete_recipe(id, user_id)
    }

    // --- Meal plan ---

    /// Plan a recipe into a slot. The recipe must exist and belong to the
    /// user; the meal type is folded to lowercase before the slot lookup.
    pub fn plan_meal(
        &self,
        user_id: i64,
        date: &str,
        meal_type: &str,
        recipe_id: i64,
    ) -> Result<MealSlot> {
        let meal_type = validate_meal_type(meal_type)?;
        let meal_date = parse_iso_date(date)?;
        if self.db.get_recipe(recipe_id, user_id)?.is_none() {
            bail!("Recipe {recipe_id} not found");
        }
        self.db.upsert_slot(
            user_id,
            &NewMealSlot {
                recipe_id,
                meal_date,
                meal_type,
            },
        )
    }

    pub fn weekly_plan(&self, user_id: i64, start: &str) -> Result<Vec<PlannedMeal>> {
        let start = parse_iso_date(start)?;
        self.db.weekly_plan(user_id, start)
    }

    pub fn plan_range(&self, user_id: i64, start: &str, end: &str) -> Result<Vec<PlannedMeal>> {
        let start = parse_iso_date(start)?;
        let end = parse_iso_date(end)?;
        validate_date_range(start, end)?;
        self.db.slots_in_range(user_id, start, end)
    }

    pub fn upcoming_meals(
        &self,
        user_id: i64,
        today: NaiveDate,
        limit: i64,
    ) -> Result<Vec<PlannedMeal>> {
        self.db.upcoming_meals(user_id, today, limit)
    }

    pub fn meal_plan_stats(&self, user_id: i64, today: NaiveDate) -> Result<MealPlanStats> {
        self.db.meal_plan_stats(user_id, today)
    }

    pub fn unplan_meal(&self, id: i64, user_id: i64) -> Result<Option<MealSlot>> {
        self.db.delete_slot(id, user_id)
    }

    // --- Pantry ---

    pub fn add_pantry_item(&self, user_id: i64, item: &NewPantryItem) -> Result<PantryItem> {
        validate_new_pantry_item(item)?;
        self.db.insert_pantry_item(user_id, item)
    }

    pub fn list_pantry(&self, user_id: i64, filter: &PantryFilter) -> Result<Vec<PantryItem>> {
        self.db.list_pantry_items(user_id, filter)
    }

    pub fn update_pantry_item(
        &self,
        id: i64,
        user_id: i64,
        update: &UpdatePantryItem,
    ) -> Result<Option<PantryItem>> {
        if let Some(quantity) = update.quantity {
            crate::models::validate_quantity(quantity)?;
        }
        if let Some(name) = &update.name {
            crate::models::validate_item_name(name)?;
        }
        self.db.update_pantry_item(id, user_id, update)
    }

    pub fn remove_pantry_item(&self, id: i64, user_id: i64) -> Result<bool> {
        self.db.delete_pantry_item(id, user_id)
    }

    pub fn expiring_soon(
        &self,
        user_id: i64,
        today: NaiveDate,
        days: i64,
    ) -> Result<Vec<PantryItem>> {
        if days < 0 {
            bail!("Days must be non-negative");
        }
        self.db.expiring_soon(user_id, today, days)
    }

    // --- Shopping list ---

    pub fn add_shopping_item(&self, user_id: i64, item: &NewShoppingItem) -> Result<ShoppingItem> {
        validate_new_shopping_item(item)?;
        self.db.insert_shopping_item(user_id, item)
    }

    pub fn update_shopping_item(
        &self,
        id: i64,
        user_id: i64,
        update: &UpdateShoppingItem,
    ) -> Result<Option<ShoppingItem>> {
        if let Some(quantity) = update.quantity {
            crate::models::validate_quantity(quantity)?;
        }
        self.db.update_shopping_item(id, user_id, update)
    }

    pub fn shopping_list(&self, user_id: i64) -> Result<Vec<ShoppingItem>> {
        self.db.list_shopping_items(user_id)
    }

    pub fn shopping_list_by_category(&self, user_id: i64) -> Result<Vec<CategoryGroup>> {
        self.db.grouped_by_category(user_id)
    }

    pub fn toggle_shopping_item(&self, id: i64, user_id: i64) -> Result<Option<ShoppingItem>> {
        self.db.toggle_checked(id, user_id)
    }

    pub fn remove_shopping_item(&self, id: i64, user_id: i64) -> Result<Option<ShoppingItem>> {
        self.db.delete_shopping_item(id, user_id)
    }

    pub fn clear_checked(&self, user_id: i64) -> Result<Vec<ShoppingItem>> {
        self.db.clear_checked(user_id)
    }

    pub fn clear_all(&self, user_id: i64) -> Result<Vec<ShoppingItem>> {
        self.db.clear_all(user_id)
    }

    pub fn move_checked_to_pantry(&self, user_id: i64) -> Result<Vec<ShoppingItem>> {
        self.db.add_checked_to_pantry(user_id)
    }

    /// Regenerate the shopping list from the plan in `[start, end]`.
    pub fn generate_shopping_list(
        &self,
        user_id: i64,
        start: &str,
        end: &str,
    ) -> Result<Vec<ShoppingItem>> {
        let start = parse_iso_date(start)?;
        let end = parse_iso_date(end)?;
        validate_date_range(start, end)?;
        self.db.generate_from_meal_plan(user_id, start, end)
    }

    /// Convenience form covering the week starting at `start`.
    pub fn generate_shopping_list_for_week(
        &self,
        user_id: i64,
        start: &str,
    ) -> Result<Vec<ShoppingItem>> {
        let start = parse_iso_date(start)?;
        self.db
            .generate_from_meal_plan(user_id, start, week_end(start))
    }
}
