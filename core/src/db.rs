use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::aggregate::AggregateMap;
use crate::models::{
    CategoryGroup, IngredientLine, MealPlanStats, MealSlot, NewMealSlot, NewPantryItem, NewRecipe,
    NewShoppingItem, PantryFilter, PantryItem, PlannedMeal, Recipe, RecipeDetail, RecipeNutrition,
    ShoppingItem, UNCATEGORIZED, UpdatePantryItem, UpdateShoppingItem, User,
};
use crate::reconcile::{StockRow, reconcile};

/// SQL rank used everywhere slots are ordered: calendar order, not
/// alphabetical (which would sort dinner before lunch).
const MEAL_TYPE_RANK: &str =
    "CASE meal_type WHEN 'breakfast' THEN 1 WHEN 'lunch' THEN 2 WHEN 'dinner' THEN 3 END";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        // Cascades from users and recipes depend on this pragma.
        self.conn.pragma_update(None, "foreign_keys", "ON")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    description TEXT,
                    cuisine_type TEXT,
                    difficulty TEXT NOT NULL DEFAULT 'medium',
                    prep_time INTEGER,
                    cook_time INTEGER,
                    servings INTEGER NOT NULL DEFAULT 4,
                    instructions TEXT NOT NULL DEFAULT '[]',
                    dietary_tags TEXT NOT NULL DEFAULT '[]',
                    image_url TEXT,
                    source TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipe_ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    quantity REAL NOT NULL,
                    unit TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipe_nutrition (
                    recipe_id INTEGER PRIMARY KEY REFERENCES recipes(id) ON DELETE CASCADE,
                    calories REAL NOT NULL,
                    protein_g REAL,
                    carbs_g REAL,
                    fat_g REAL
                );

                CREATE TABLE IF NOT EXISTS meal_slots (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    meal_date TEXT NOT NULL,
                    meal_type TEXT NOT NULL CHECK (meal_type IN ('breakfast', 'lunch', 'dinner')),
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (user_id, meal_date, meal_type)
                );

                CREATE TABLE IF NOT EXISTS pantry_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    quantity REAL NOT NULL,
                    unit TEXT NOT NULL,
                    category TEXT NOT NULL,
                    expiry_date TEXT,
                    is_running_low INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS shopping_list_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    ingredient_name TEXT NOT NULL,
                    quantity REAL NOT NULL,
                    unit TEXT NOT NULL,
                    category TEXT,
                    is_checked INTEGER NOT NULL DEFAULT 0,
                    from_meal_plan INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_recipes_user ON recipes(user_id);
                CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_recipe ON recipe_ingredients(recipe_id);
                CREATE INDEX IF NOT EXISTS idx_meal_slots_user_date ON meal_slots(user_id, meal_date);
                CREATE INDEX IF NOT EXISTS idx_pantry_user ON pantry_items(user_id);
                CREATE INDEX IF NOT EXISTS idx_shopping_user_source ON shopping_list_items(user_id, from_meal_plan);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: row.get(2)?,
        })
    }

    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        Ok(Recipe {
            id: row.get(0)?,
            uuid: row.get(1)?,
            user_id: row.get(2)?,
            name: row.get(3)?,
            description: row.get(4)?,
            cuisine_type: row.get(5)?,
            difficulty: row.get(6)?,
            prep_time: row.get(7)?,
            cook_time: row.get(8)?,
            servings: row.get(9)?,
            image_url: row.get(10)?,
            source: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn slot_from_row(row: &rusqlite::Row) -> rusqlite::Result<MealSlot> {
        Ok(MealSlot {
            id: row.get(0)?,
            uuid: row.get(1)?,
            user_id: row.get(2)?,
            recipe_id: row.get(3)?,
            meal_date: row.get(4)?,
            meal_type: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    // Expects columns:
    // 0: ms.id, 1: ms.user_id, 2: ms.recipe_id, 3: ms.meal_date, 4: ms.meal_type,
    // 5: r.name, 6: r.image_url, 7: r.prep_time, 8: r.cook_time
    fn planned_meal_from_row(row: &rusqlite::Row) -> rusqlite::Result<PlannedMeal> {
        Ok(PlannedMeal {
            id: row.get(0)?,
            user_id: row.get(1)?,
            recipe_id: row.get(2)?,
            meal_date: row.get(3)?,
            meal_type: row.get(4)?,
            recipe_name: row.get(5)?,
            image_url: row.get(6)?,
            prep_time: row.get(7)?,
            cook_time: row.get(8)?,
        })
    }

    fn pantry_from_row(row: &rusqlite::Row) -> rusqlite::Result<PantryItem> {
        Ok(PantryItem {
            id: row.get(0)?,
            uuid: row.get(1)?,
            user_id: row.get(2)?,
            name: row.get(3)?,
            quantity: row.get(4)?,
            unit: row.get(5)?,
            category: row.get(6)?,
            expiry_date: row.get(7)?,
            is_running_low: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn shopping_from_row(row: &rusqlite::Row) -> rusqlite::Result<ShoppingItem> {
        Ok(ShoppingItem {
            id: row.get(0)?,
            uuid: row.get(1)?,
            user_id: row.get(2)?,
            ingredient_name: row.get(3)?,
            quantity: row.get(4)?,
            unit: row.get(5)?,
            category: row.get(6)?,
            is_checked: row.get(7)?,
            from_meal_plan: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    // --- Users ---

    pub fn create_user(&self, name: &str) -> Result<User> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO users (name, created_at) VALUES (?1, ?2)",
            params![name, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)
    }

    pub fn get_user(&self, id: i64) -> Result<User> {
        self.conn
            .query_row(
                "SELECT id, name, created_at FROM users WHERE id = ?1",
                params![id],
                Self::user_from_row,
            )
            .context("User not found")
    }

    pub fn get_or_create_user(&self, name: &str) -> Result<User> {
        let existing = self
            .conn
            .query_row(
                "SELECT id, name, created_at FROM users WHERE name = ?1",
                params![name],
                Self::user_from_row,
            )
            .optional()?;
        match existing {
            Some(user) => Ok(user),
            None => self.create_user(name),
        }
    }

    /// Delete a user; FK cascades remove every row they own.
    pub fn delete_user(&self, id: i64) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    // --- Recipes ---

    pub fn insert_recipe(&self, user_id: i64, recipe: &NewRecipe) -> Result<RecipeDetail> {
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        let instructions = serde_json::to_string(&recipe.instructions)?;
        let dietary_tags = serde_json::to_string(&recipe.dietary_tags)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO recipes (uuid, user_id, name, description, cuisine_type, difficulty,
                prep_time, cook_time, servings, instructions, dietary_tags, image_url, source,
                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                uuid,
                user_id,
                recipe.name,
                recipe.description,
                recipe.cuisine_type,
                recipe.difficulty,
                recipe.prep_time,
                recipe.cook_time,
                recipe.servings,
                instructions,
                dietary_tags,
                recipe.image_url,
                recipe.source,
                now,
                now,
            ],
        )?;
        let recipe_id = tx.last_insert_rowid();

        for line in &recipe.ingredients {
            tx.execute(
                "INSERT INTO recipe_ingredients (recipe_id, name, quantity, unit)
                 VALUES (?1, ?2, ?3, ?4)",
                params![recipe_id, line.name, line.quantity, line.unit],
            )?;
        }

        if let Some(n) = &recipe.nutrition {
            tx.execute(
                "INSERT INTO recipe_nutrition (recipe_id, calories, protein_g, carbs_g, fat_g)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![recipe_id, n.calories, n.protein_g, n.carbs_g, n.fat_g],
            )?;
        }

        tx.commit()?;
        self.get_recipe_detail(recipe_id, user_id)
    }

    pub fn get_recipe(&self, id: i64, user_id: i64) -> Result<Option<Recipe>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, uuid, user_id, name, description, cuisine_type, difficulty,
                        prep_time, cook_time, servings, image_url, source, created_at, updated_at
                 FROM recipes WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                Self::recipe_from_row,
            )
            .optional()?)
    }

    pub fn get_recipe_detail(&self, id: i64, user_id: i64) -> Result<RecipeDetail> {
        let recipe = self
            .get_recipe(id, user_id)?
            .context("Recipe not found")?;

        let (instructions, dietary_tags): (String, String) = self.conn.query_row(
            "SELECT instructions, dietary_tags FROM recipes WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let instructions: Vec<String> = serde_json::from_str(&instructions).unwrap_or_default();
        let dietary_tags: Vec<String> = serde_json::from_str(&dietary_tags).unwrap_or_default();

        let mut stmt = self.conn.prepare(
            "SELECT id, recipe_id, name, quantity, unit FROM recipe_ingredients
             WHERE recipe_id = ?1 ORDER BY id",
        )?;
        let ingredients = stmt
            .query_map(params![id], |row| {
                Ok(IngredientLine {
                    id: row.get(0)?,
                    recipe_id: row.get(1)?,
                    name: row.get(2)?,
                    quantity: row.get(3)?,
                    unit: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let nutrition = self
            .conn
            .query_row(
                "SELECT calories, protein_g, carbs_g, fat_g FROM recipe_nutrition
                 WHERE recipe_id = ?1",
                params![id],
                |row| {
                    Ok(RecipeNutrition {
                        calories: row.get(0)?,
                        protein_g: row.get(1)?,
                        carbs_g: row.get(2)?,
                        fat_g: row.get(3)?,
                    })
                },
            )
            .optional()?;

        Ok(RecipeDetail {
            recipe,
            ingredients,
            instructions,
            dietary_tags,
            nutrition,
        })
    }

    pub fn list_recipes(&self, user_id: i64) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, user_id, name, description, cuisine_type, difficulty,
                    prep_time, cook_time, servings, image_url, source, created_at, updated_at
             FROM recipes WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let recipes = stmt
            .query_map(params![user_id], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    /// Delete a recipe; cascades remove its ingredient lines, nutrition row,
    /// and any meal slots that referenced it.
    pub fn delete_recipe(&self, id: i64, user_id: i64) -> Result<bool> {
        let n = self.conn.execute(
            "DELETE FROM recipes WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(n > 0)
    }

    /// Ingredient lines of one recipe, in insertion order.
    pub fn get_recipe_ingredients(&self, recipe_id: i64) -> Result<Vec<IngredientLine>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, recipe_id, name, quantity, unit FROM recipe_ingredients
             WHERE recipe_id = ?1 ORDER BY id",
        )?;
        let lines = stmt
            .query_map(params![recipe_id], |row| {
                Ok(IngredientLine {
                    id: row.get(0)?,
                    recipe_id: row.get(1)?,
                    name: row.get(2)?,
                    quantity: row.get(3)?,
                    unit: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lines)
    }

    // --- Meal slots ---

    /// Assign a recipe to a (date, meal type) slot. At most one slot exists
    /// per (user, date, meal type): a second assignment overwrites the slot's
    /// recipe in place, keeping the slot id stable. Assigning the same recipe
    /// again performs no write.
    pub fn upsert_slot(&self, user_id: i64, slot: &NewMealSlot) -> Result<MealSlot> {
        let date_str = slot.meal_date.format("%Y-%m-%d").to_string();

        let existing = self
            .conn
            .query_row(
                "SELECT id, uuid, user_id, recipe_id, meal_date, meal_type, created_at, updated_at
                 FROM meal_slots WHERE user_id = ?1 AND meal_date = ?2 AND meal_type = ?3",
                params![user_id, date_str, slot.meal_type],
                Self::slot_from_row,
            )
            .optional()?;

        if let Some(current) = existing {
            if current.recipe_id == slot.recipe_id {
                return Ok(current);
            }
            let now = Local::now().to_rfc3339();
            self.conn.execute(
                "UPDATE meal_slots SET recipe_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![slot.recipe_id, now, current.id],
            )?;
            return self.get_slot(current.id, user_id)?.context("Slot vanished");
        }

        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO meal_slots (uuid, user_id, recipe_id, meal_date, meal_type, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![uuid, user_id, slot.recipe_id, date_str, slot.meal_type, now, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_slot(id, user_id)?.context("Slot vanished")
    }

    pub fn get_slot(&self, id: i64, user_id: i64) -> Result<Option<MealSlot>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, uuid, user_id, recipe_id, meal_date, meal_type, created_at, updated_at
                 FROM meal_slots WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                Self::slot_from_row,
            )
            .optional()?)
    }

    /// Slots in `[start, end]` inclusive, date ascending then breakfast <
    /// lunch < dinner, with the recipe's display fields flattened in.
    pub fn slots_in_range(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PlannedMeal>> {
        let sql = format!(
            "SELECT ms.id, ms.user_id, ms.recipe_id, ms.meal_date, ms.meal_type,
                    r.name, r.image_url, r.prep_time, r.cook_time
             FROM meal_slots ms
             LEFT JOIN recipes r ON r.id = ms.recipe_id
             WHERE ms.user_id = ?1 AND ms.meal_date BETWEEN ?2 AND ?3
             ORDER BY ms.meal_date ASC, {MEAL_TYPE_RANK} ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let meals = stmt
            .query_map(
                params![
                    user_id,
                    start.format("%Y-%m-%d").to_string(),
                    end.format("%Y-%m-%d").to_string()
                ],
                Self::planned_meal_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    /// Seven consecutive calendar days starting at `start`.
    pub fn weekly_plan(&self, user_id: i64, start: NaiveDate) -> Result<Vec<PlannedMeal>> {
        self.slots_in_range(user_id, start, crate::models::week_end(start))
    }

    pub fn upcoming_meals(
        &self,
        user_id: i64,
        today: NaiveDate,
        limit: i64,
    ) -> Result<Vec<PlannedMeal>> {
        let limit = limit.clamp(1, 50);
        let sql = format!(
            "SELECT ms.id, ms.user_id, ms.recipe_id, ms.meal_date, ms.meal_type,
                    r.name, r.image_url, r.prep_time, r.cook_time
             FROM meal_slots ms
             LEFT JOIN recipes r ON r.id = ms.recipe_id
             WHERE ms.user_id = ?1 AND ms.meal_date >= ?2
             ORDER BY ms.meal_date ASC, {MEAL_TYPE_RANK} ASC
             LIMIT ?3"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let meals = stmt
            .query_map(
                params![user_id, today.format("%Y-%m-%d").to_string(), limit],
                Self::planned_meal_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    pub fn meal_plan_stats(&self, user_id: i64, today: NaiveDate) -> Result<MealPlanStats> {
        let total_planned_meals: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM meal_slots WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        let this_week_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM meal_slots WHERE user_id = ?1 AND meal_date BETWEEN ?2 AND ?3",
            params![
                user_id,
                today.format("%Y-%m-%d").to_string(),
                crate::models::week_end(today).format("%Y-%m-%d").to_string()
            ],
            |row| row.get(0),
        )?;
        Ok(MealPlanStats {
            total_planned_meals,
            this_week_count,
        })
    }

    /// Remove a slot scoped to its owner, returning the deleted record.
    /// A slot owned by someone else looks the same as a missing one.
    pub fn delete_slot(&self, id: i64, user_id: i64) -> Result<Option<MealSlot>> {
        let Some(slot) = self.get_slot(id, user_id)? else {
            return Ok(None);
        };
        self.conn.execute(
            "DELETE FROM meal_slots WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(Some(slot))
    }

    // --- Pantry ---

    pub fn insert_pantry_item(&self, user_id: i64, item: &NewPantryItem) -> Result<PantryItem> {
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        let expiry = item.expiry_date.map(|d| d.format("%Y-%m-%d").to_string());
        self.conn.execute(
            "INSERT INTO pantry_items (uuid, user_id, name, quantity, unit, category,
                expiry_date, is_running_low, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                uuid,
                user_id,
                item.name,
                item.quantity,
                item.unit,
                item.category,
                expiry,
                item.is_running_low,
                now,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_pantry_item(id, user_id)?
            .context("Pantry item vanished")
    }

    pub fn get_pantry_item(&self, id: i64, user_id: i64) -> Result<Option<PantryItem>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, uuid, user_id, name, quantity, unit, category, expiry_date,
                        is_running_low, created_at, updated_at
                 FROM pantry_items WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                Self::pantry_from_row,
            )
            .optional()?)
    }

    pub fn list_pantry_items(&self, user_id: i64, filter: &PantryFilter) -> Result<Vec<PantryItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, user_id, name, quantity, unit, category, expiry_date,
                    is_running_low, created_at, updated_at
             FROM pantry_items
             WHERE user_id = ?1
               AND (?2 IS NULL OR category = ?2)
               AND (?3 IS NULL OR is_running_low = ?3)
             ORDER BY name ASC",
        )?;
        let items = stmt
            .query_map(
                params![user_id, filter.category, filter.is_running_low],
                Self::pantry_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn update_pantry_item(
        &self,
        id: i64,
        user_id: i64,
        update: &UpdatePantryItem,
    ) -> Result<Option<PantryItem>> {
        let Some(current) = self.get_pantry_item(id, user_id)? else {
            return Ok(None);
        };

        let name = update.name.clone().unwrap_or(current.name);
        let quantity = update.quantity.unwrap_or(current.quantity);
        let unit = update.unit.clone().unwrap_or(current.unit);
        let category = update.category.clone().unwrap_or(current.category);
        let expiry = match &update.expiry_date {
            Some(value) => value.map(|d| d.format("%Y-%m-%d").to_string()),
            None => current.expiry_date,
        };
        let is_running_low = update.is_running_low.unwrap_or(current.is_running_low);
        let now = Local::now().to_rfc3339();

        self.conn.execute(
            "UPDATE pantry_items SET name = ?1, quantity = ?2, unit = ?3, category = ?4,
                expiry_date = ?5, is_running_low = ?6, updated_at = ?7
             WHERE id = ?8 AND user_id = ?9",
            params![name, quantity, unit, category, expiry, is_running_low, now, id, user_id],
        )?;
        self.get_pantry_item(id, user_id)
    }

    pub fn delete_pantry_item(&self, id: i64, user_id: i64) -> Result<bool> {
        let n = self.conn.execute(
            "DELETE FROM pantry_items WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(n > 0)
    }

    pub fn expiring_soon(
        &self,
        user_id: i64,
        today: NaiveDate,
        days: i64,
    ) -> Result<Vec<PantryItem>> {
        let until = today + chrono::Duration::days(days);
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, user_id, name, quantity, unit, category, expiry_date,
                    is_running_low, created_at, updated_at
             FROM pantry_items
             WHERE user_id = ?1 AND expiry_date IS NOT NULL AND expiry_date BETWEEN ?2 AND ?3
             ORDER BY expiry_date ASC",
        )?;
        let items = stmt
            .query_map(
                params![
                    user_id,
                    today.format("%Y-%m-%d").to_string(),
                    until.format("%Y-%m-%d").to_string()
                ],
                Self::pantry_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Pantry stock as reconciliation sees it: name, quantity, unit rows in
    /// insertion order.
    fn pantry_stock(conn: &Connection, user_id: i64) -> Result<Vec<StockRow>> {
        let mut stmt = conn.prepare(
            "SELECT name, quantity, unit FROM pantry_items WHERE user_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(StockRow {
                    name: row.get(0)?,
                    quantity: row.get(1)?,
                    unit: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // --- Shopping list ---

    pub fn insert_shopping_item(
        &self,
        user_id: i64,
        item: &NewShoppingItem,
    ) -> Result<ShoppingItem> {
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        let category = item
            .category
            .clone()
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        self.conn.execute(
            "INSERT INTO shopping_list_items (uuid, user_id, ingredient_name, quantity, unit,
                category, is_checked, from_meal_plan, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, ?7, ?8)",
            params![uuid, user_id, item.ingredient_name, item.quantity, item.unit, category, now, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_shopping_item(id, user_id)?
            .context("Shopping item vanished")
    }

    pub fn get_shopping_item(&self, id: i64, user_id: i64) -> Result<Option<ShoppingItem>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, uuid, user_id, ingredient_name, quantity, unit, category,
                        is_checked, from_meal_plan, created_at, updated_at
                 FROM shopping_list_items WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                Self::shopping_from_row,
            )
            .optional()?)
    }

    pub fn list_shopping_items(&self, user_id: i64) -> Result<Vec<ShoppingItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, user_id, ingredient_name, quantity, unit, category,
                    is_checked, from_meal_plan, created_at, updated_at
             FROM shopping_list_items WHERE user_id = ?1
             ORDER BY COALESCE(category, 'Uncategorized') ASC, ingredient_name ASC",
        )?;
        let items = stmt
            .query_map(params![user_id], Self::shopping_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn update_shopping_item(
        &self,
        id: i64,
        user_id: i64,
        update: &UpdateShoppingItem,
    ) -> Result<Option<ShoppingItem>> {
        let Some(current) = self.get_shopping_item(id, user_id)? else {
            return Ok(None);
        };

        let ingredient_name = update
            .ingredient_name
            .clone()
            .unwrap_or(current.ingredient_name);
        let quantity = update.quantity.unwrap_or(current.quantity);
        let unit = update.unit.clone().unwrap_or(current.unit);
        let category = update.category.clone().or(current.category);
        let is_checked = update.is_checked.unwrap_or(current.is_checked);
        let now = Local::now().to_rfc3339();

        self.conn.execute(
            "UPDATE shopping_list_items SET ingredient_name = ?1, quantity = ?2, unit = ?3,
                category = ?4, is_checked = ?5, updated_at = ?6
             WHERE id = ?7 AND user_id = ?8",
            params![ingredient_name, quantity, unit, category, is_checked, now, id, user_id],
        )?;
        self.get_shopping_item(id, user_id)
    }

    /// Flip an item's checked state; `None` for missing or foreign items.
    pub fn toggle_checked(&self, id: i64, user_id: i64) -> Result<Option<ShoppingItem>> {
        let Some(current) = self.get_shopping_item(id, user_id)? else {
            return Ok(None);
        };
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "UPDATE shopping_list_items SET is_checked = ?1, updated_at = ?2 WHERE id = ?3",
            params![!current.is_checked, now, current.id],
        )?;
        self.get_shopping_item(id, user_id)
    }

    pub fn delete_shopping_item(&self, id: i64, user_id: i64) -> Result<Option<ShoppingItem>> {
        let Some(item) = self.get_shopping_item(id, user_id)? else {
            return Ok(None);
        };
        self.conn.execute(
            "DELETE FROM shopping_list_items WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(Some(item))
    }

    /// Delete all checked items, returning the removed rows.
    pub fn clear_checked(&self, user_id: i64) -> Result<Vec<ShoppingItem>> {
        let removed: Vec<ShoppingItem> = self
            .list_shopping_items(user_id)?
            .into_iter()
            .filter(|item| item.is_checked)
            .collect();
        self.conn.execute(
            "DELETE FROM shopping_list_items WHERE user_id = ?1 AND is_checked = 1",
            params![user_id],
        )?;
        Ok(removed)
    }

    /// Delete the user's entire shopping list, returning the removed rows.
    pub fn clear_all(&self, user_id: i64) -> Result<Vec<ShoppingItem>> {
        let removed = self.list_shopping_items(user_id)?;
        self.conn.execute(
            "DELETE FROM shopping_list_items WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(removed)
    }

    /// Shopping list partitioned by category: groups ordered by category name
    /// ascending, items name-sorted within each group. Rows without a
    /// category land in "Uncategorized".
    pub fn grouped_by_category(&self, user_id: i64) -> Result<Vec<CategoryGroup>> {
        let items = self.list_shopping_items(user_id)?;
        let mut groups: Vec<CategoryGroup> = Vec::new();
        for item in items {
            let category = item
                .category
                .clone()
                .unwrap_or_else(|| UNCATEGORIZED.to_string());
            match groups.last_mut() {
                Some(group) if group.category == category => group.items.push(item),
                _ => groups.push(CategoryGroup {
                    category,
                    items: vec![item],
                }),
            }
        }
        Ok(groups)
    }

    /// Move every checked item into the pantry, then remove it from the
    /// shopping list, atomically. Returns the pre-transfer snapshot.
    ///
    /// Always inserts a fresh pantry row per item, even when a row with the
    /// same name already exists; quantities are never merged.
    pub fn add_checked_to_pantry(&self, user_id: i64) -> Result<Vec<ShoppingItem>> {
        let tx = self.conn.unchecked_transaction()?;

        let checked: Vec<ShoppingItem> = {
            let mut stmt = tx.prepare(
                "SELECT id, uuid, user_id, ingredient_name, quantity, unit, category,
                        is_checked, from_meal_plan, created_at, updated_at
                 FROM shopping_list_items WHERE user_id = ?1 AND is_checked = 1
                 ORDER BY COALESCE(category, 'Uncategorized') ASC, ingredient_name ASC",
            )?;
            stmt.query_map(params![user_id], Self::shopping_from_row)?
                .collect::<Result<Vec<_>, _>>()?
        };

        let now = Local::now().to_rfc3339();
        for item in &checked {
            let uuid = Uuid::new_v4().to_string();
            let category = item
                .category
                .clone()
                .unwrap_or_else(|| UNCATEGORIZED.to_string());
            tx.execute(
                "INSERT INTO pantry_items (uuid, user_id, name, quantity, unit, category,
                    expiry_date, is_running_low, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, 0, ?7, ?8)",
                params![uuid, user_id, item.ingredient_name, item.quantity, item.unit, category, now, now],
            )?;
        }

        tx.execute(
            "DELETE FROM shopping_list_items WHERE user_id = ?1 AND is_checked = 1",
            params![user_id],
        )?;

        tx.commit()?;
        Ok(checked)
    }

    /// Regenerate the auto-generated part of the shopping list from the meal
    /// plan in `[start, end]`, atomically:
    ///
    /// 1. drop every `from_meal_plan` row for the user (full replace);
    /// 2. aggregate ingredient lines across planned recipes by
    ///    lowercased-name + unit;
    /// 3. subtract the current pantry snapshot;
    /// 4. insert one row per still-needed ingredient.
    ///
    /// Any failure rolls the whole sequence back, including the delete.
    /// Manually added rows are never touched. Re-running with unchanged
    /// inputs reproduces the same row content, so callers may retry freely.
    pub fn generate_from_meal_plan(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ShoppingItem>> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "DELETE FROM shopping_list_items WHERE user_id = ?1 AND from_meal_plan = 1",
            params![user_id],
        )?;

        // Ingredient lines of every recipe planned in range. Slot order fixes
        // the insertion (and thus display) order of the generated rows; a
        // recipe planned twice contributes its lines twice.
        let mut demand = AggregateMap::new();
        {
            let sql = format!(
                "SELECT ri.name, ri.quantity, ri.unit
                 FROM meal_slots ms
                 JOIN recipe_ingredients ri ON ri.recipe_id = ms.recipe_id
                 WHERE ms.user_id = ?1 AND ms.meal_date BETWEEN ?2 AND ?3
                 ORDER BY ms.meal_date ASC, {MEAL_TYPE_RANK} ASC, ri.id ASC"
            );
            let mut stmt = tx.prepare(&sql)?;
            let mut rows = stmt.query(params![
                user_id,
                start.format("%Y-%m-%d").to_string(),
                end.format("%Y-%m-%d").to_string()
            ])?;
            while let Some(row) = rows.next()? {
                let name: String = row.get(0)?;
                let quantity: f64 = row.get(1)?;
                let unit: String = row.get(2)?;
                demand.add(&name, quantity, &unit);
            }
        }

        let stock = Self::pantry_stock(&tx, user_id)?;
        let needed = reconcile(&demand, &stock);

        let now = Local::now().to_rfc3339();
        for item in &needed {
            let uuid = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO shopping_list_items (uuid, user_id, ingredient_name, quantity, unit,
                    category, is_checked, from_meal_plan, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 1, ?7, ?8)",
                params![uuid, user_id, item.name, item.quantity, item.unit, UNCATEGORIZED, now, now],
            )?;
        }

        tx.commit()?;
        self.list_shopping_items(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewIngredientLine, week_end};

    fn test_db() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user("alice").unwrap();
        (db, user.id)
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn recipe_with(name: &str, lines: &[(&str, f64, &str)]) -> NewRecipe {
        NewRecipe {
            name: name.to_string(),
            description: None,
            cuisine_type: None,
            difficulty: "easy".to_string(),
            prep_time: Some(10),
            cook_time: Some(20),
            servings: 2,
            image_url: None,
            source: "manual".to_string(),
            ingredients: lines
                .iter()
                .map(|(n, q, u)| NewIngredientLine {
                    name: (*n).to_string(),
                    quantity: *q,
                    unit: (*u).to_string(),
                })
                .collect(),
            instructions: vec!["Cook.".to_string()],
            dietary_tags: vec![],
            nutrition: None,
        }
    }

    fn plan(db: &Database, user: i64, day: &str, meal: &str, recipe_id: i64) -> MealSlot {
        db.upsert_slot(
            user,
            &NewMealSlot {
                recipe_id,
                meal_date: date(day),
                meal_type: meal.to_string(),
            },
        )
        .unwrap()
    }

    // --- Recipes ---

    #[test]
    fn test_insert_and_get_recipe_detail() {
        let (db, user) = test_db();
        let detail = db
            .insert_recipe(user, &recipe_with("Soup", &[("tomato", 2.0, "cup")]))
            .unwrap();
        assert_eq!(detail.recipe.name, "Soup");
        assert_eq!(detail.ingredients.len(), 1);
        assert_eq!(detail.instructions, vec!["Cook.".to_string()]);
        assert!(detail.nutrition.is_none());

        let again = db.get_recipe_detail(detail.recipe.id, user).unwrap();
        assert_eq!(again.ingredients[0].name, "tomato");
    }

    #[test]
    fn test_recipe_nutrition_round_trip() {
        let (db, user) = test_db();
        let mut recipe = recipe_with("Bowl", &[("rice", 1.0, "cup")]);
        recipe.nutrition = Some(RecipeNutrition {
            calories: 500.0,
            protein_g: Some(20.0),
            carbs_g: None,
            fat_g: Some(10.0),
        });
        let detail = db.insert_recipe(user, &recipe).unwrap();
        let n = detail.nutrition.unwrap();
        assert!((n.calories - 500.0).abs() < f64::EPSILON);
        assert!(n.carbs_g.is_none());
    }

    #[test]
    fn test_recipe_scoped_to_owner() {
        let (db, user) = test_db();
        let other = db.create_user("bob").unwrap();
        let detail = db.insert_recipe(user, &recipe_with("Pasta", &[])).unwrap();
        assert!(db.get_recipe(detail.recipe.id, other.id).unwrap().is_none());
        assert!(!db.delete_recipe(detail.recipe.id, other.id).unwrap());
        assert!(db.get_recipe(detail.recipe.id, user).unwrap().is_some());
    }

    #[test]
    fn test_delete_recipe_cascades_slots_and_lines() {
        let (db, user) = test_db();
        let detail = db
            .insert_recipe(user, &recipe_with("Stew", &[("beef", 500.0, "g")]))
            .unwrap();
        let slot = plan(&db, user, "2024-06-03", "dinner", detail.recipe.id);

        assert!(db.delete_recipe(detail.recipe.id, user).unwrap());
        assert!(db.get_slot(slot.id, user).unwrap().is_none());
        assert!(db.get_recipe_ingredients(detail.recipe.id).unwrap().is_empty());
    }

    #[test]
    fn test_delete_user_cascades_everything() {
        let (db, user) = test_db();
        let detail = db.insert_recipe(user, &recipe_with("X", &[])).unwrap();
        plan(&db, user, "2024-06-03", "lunch", detail.recipe.id);
        db.insert_shopping_item(
            user,
            &NewShoppingItem {
                ingredient_name: "milk".to_string(),
                quantity: 1.0,
                unit: "l".to_string(),
                category: None,
            },
        )
        .unwrap();

        assert!(db.delete_user(user).unwrap());
        assert!(db.list_recipes(user).unwrap().is_empty());
        assert!(db.list_shopping_items(user).unwrap().is_empty());
    }

    // --- Meal slots ---

    #[test]
    fn test_upsert_creates_then_overwrites_recipe() {
        let (db, user) = test_db();
        let a = db.insert_recipe(user, &recipe_with("A", &[])).unwrap();
        let b = db.insert_recipe(user, &recipe_with("B", &[])).unwrap();

        let first = plan(&db, user, "2024-06-03", "lunch", a.recipe.id);
        let second = plan(&db, user, "2024-06-03", "lunch", b.recipe.id);

        // Same slot, new recipe: id stable, recipe swapped
        assert_eq!(first.id, second.id);
        assert_eq!(second.recipe_id, b.recipe.id);

        let meals = db
            .slots_in_range(user, date("2024-06-03"), date("2024-06-03"))
            .unwrap();
        assert_eq!(meals.len(), 1);
        assert_eq!(meals[0].recipe_id, b.recipe.id);
    }

    #[test]
    fn test_upsert_same_recipe_is_noop() {
        let (db, user) = test_db();
        let a = db.insert_recipe(user, &recipe_with("A", &[])).unwrap();
        let first = plan(&db, user, "2024-06-03", "lunch", a.recipe.id);
        let second = plan(&db, user, "2024-06-03", "lunch", a.recipe.id);
        assert_eq!(first.id, second.id);
        assert_eq!(first.updated_at, second.updated_at);
    }

    #[test]
    fn test_slots_distinct_per_meal_type_and_date() {
        let (db, user) = test_db();
        let a = db.insert_recipe(user, &recipe_with("A", &[])).unwrap();
        plan(&db, user, "2024-06-03", "breakfast", a.recipe.id);
        plan(&db, user, "2024-06-03", "lunch", a.recipe.id);
        plan(&db, user, "2024-06-04", "lunch", a.recipe.id);

        let meals = db
            .slots_in_range(user, date("2024-06-03"), date("2024-06-04"))
            .unwrap();
        assert_eq!(meals.len(), 3);
    }

    #[test]
    fn test_range_ordering_breakfast_before_dinner() {
        let (db, user) = test_db();
        let a = db.insert_recipe(user, &recipe_with("A", &[])).unwrap();
        // Insert dinner first so insertion order cannot mask a sort bug
        plan(&db, user, "2024-06-03", "dinner", a.recipe.id);
        plan(&db, user, "2024-06-03", "breakfast", a.recipe.id);

        let meals = db
            .slots_in_range(user, date("2024-06-03"), date("2024-06-03"))
            .unwrap();
        assert_eq!(meals.len(), 2);
        assert_eq!(meals[0].meal_type, "breakfast");
        assert_eq!(meals[1].meal_type, "dinner");
    }

    #[test]
    fn test_range_ordering_date_then_meal() {
        let (db, user) = test_db();
        let a = db.insert_recipe(user, &recipe_with("A", &[])).unwrap();
        plan(&db, user, "2024-06-04", "breakfast", a.recipe.id);
        plan(&db, user, "2024-06-03", "dinner", a.recipe.id);
        plan(&db, user, "2024-06-03", "lunch", a.recipe.id);

        let meals = db
            .slots_in_range(user, date("2024-06-03"), date("2024-06-04"))
            .unwrap();
        let order: Vec<(String, String)> = meals
            .iter()
            .map(|m| (m.meal_date.clone(), m.meal_type.clone()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("2024-06-03".to_string(), "lunch".to_string()),
                ("2024-06-03".to_string(), "dinner".to_string()),
                ("2024-06-04".to_string(), "breakfast".to_string()),
            ]
        );
    }

    #[test]
    fn test_range_is_inclusive() {
        let (db, user) = test_db();
        let a = db.insert_recipe(user, &recipe_with("A", &[])).unwrap();
        plan(&db, user, "2024-06-03", "lunch", a.recipe.id);
        plan(&db, user, "2024-06-09", "lunch", a.recipe.id);
        plan(&db, user, "2024-06-10", "lunch", a.recipe.id);

        let meals = db
            .weekly_plan(user, date("2024-06-03"))
            .unwrap();
        assert_eq!(meals.len(), 2);
        assert_eq!(week_end(date("2024-06-03")), date("2024-06-09"));
    }

    #[test]
    fn test_planned_meal_carries_recipe_fields() {
        let (db, user) = test_db();
        let a = db.insert_recipe(user, &recipe_with("Omelette", &[])).unwrap();
        plan(&db, user, "2024-06-03", "breakfast", a.recipe.id);

        let meals = db
            .slots_in_range(user, date("2024-06-03"), date("2024-06-03"))
            .unwrap();
        assert_eq!(meals[0].recipe_name.as_deref(), Some("Omelette"));
        assert_eq!(meals[0].prep_time, Some(10));
        assert_eq!(meals[0].cook_time, Some(20));
    }

    #[test]
    fn test_delete_slot_returns_record_and_scopes_to_owner() {
        let (db, user) = test_db();
        let other = db.create_user("bob").unwrap();
        let a = db.insert_recipe(user, &recipe_with("A", &[])).unwrap();
        let slot = plan(&db, user, "2024-06-03", "lunch", a.recipe.id);

        // Foreign owner sees not-found, slot untouched
        assert!(db.delete_slot(slot.id, other.id).unwrap().is_none());
        assert!(db.get_slot(slot.id, user).unwrap().is_some());

        let deleted = db.delete_slot(slot.id, user).unwrap().unwrap();
        assert_eq!(deleted.id, slot.id);
        assert!(db.delete_slot(slot.id, user).unwrap().is_none());
    }

    #[test]
    fn test_upcoming_meals_limit() {
        let (db, user) = test_db();
        let a = db.insert_recipe(user, &recipe_with("A", &[])).unwrap();
        for day in ["2024-06-03", "2024-06-04", "2024-06-05"] {
            plan(&db, user, day, "lunch", a.recipe.id);
        }
        plan(&db, user, "2024-06-01", "lunch", a.recipe.id);

        let meals = db.upcoming_meals(user, date("2024-06-03"), 2).unwrap();
        assert_eq!(meals.len(), 2);
        assert_eq!(meals[0].meal_date, "2024-06-03");
    }

    #[test]
    fn test_meal_plan_stats() {
        let (db, user) = test_db();
        let a = db.insert_recipe(user, &recipe_with("A", &[])).unwrap();
        plan(&db, user, "2024-06-01", "lunch", a.recipe.id);
        plan(&db, user, "2024-06-03", "lunch", a.recipe.id);
        plan(&db, user, "2024-06-09", "lunch", a.recipe.id);
        plan(&db, user, "2024-06-10", "lunch", a.recipe.id);

        let stats = db.meal_plan_stats(user, date("2024-06-03")).unwrap();
        assert_eq!(stats.total_planned_meals, 4);
        // Week of 06-03 runs through 06-09 inclusive
        assert_eq!(stats.this_week_count, 2);
    }

    // --- Pantry ---

    #[test]
    fn test_pantry_crud() {
        let (db, user) = test_db();
        let item = db
            .insert_pantry_item(
                user,
                &NewPantryItem {
                    name: "flour".to_string(),
                    quantity: 2.0,
                    unit: "kg".to_string(),
                    category: "Baking".to_string(),
                    expiry_date: None,
                    is_running_low: false,
                },
            )
            .unwrap();

        let updated = db
            .update_pantry_item(
                item.id,
                user,
                &UpdatePantryItem {
                    quantity: Some(1.5),
                    is_running_low: Some(true),
                    ..UpdatePantryItem::default()
                },
            )
            .unwrap()
            .unwrap();
        assert!((updated.quantity - 1.5).abs() < f64::EPSILON);
        assert!(updated.is_running_low);
        assert_eq!(updated.name, "flour");

        assert!(db.delete_pantry_item(item.id, user).unwrap());
        assert!(db.get_pantry_item(item.id, user).unwrap().is_none());
    }

    #[test]
    fn test_pantry_update_can_clear_expiry() {
        let (db, user) = test_db();
        let item = db
            .insert_pantry_item(
                user,
                &NewPantryItem {
                    name: "milk".to_string(),
                    quantity: 1.0,
                    unit: "l".to_string(),
                    category: "Dairy".to_string(),
                    expiry_date: Some(date("2024-06-10")),
                    is_running_low: false,
                },
            )
            .unwrap();
        assert_eq!(item.expiry_date.as_deref(), Some("2024-06-10"));

        let cleared = db
            .update_pantry_item(
                item.id,
                user,
                &UpdatePantryItem {
                    expiry_date: Some(None),
                    ..UpdatePantryItem::default()
                },
            )
            .unwrap()
            .unwrap();
        assert!(cleared.expiry_date.is_none());
    }

    #[test]
    fn test_pantry_filters() {
        let (db, user) = test_db();
        for (name, category, low) in [
            ("flour", "Baking", false),
            ("sugar", "Baking", true),
            ("milk", "Dairy", true),
        ] {
            db.insert_pantry_item(
                user,
                &NewPantryItem {
                    name: name.to_string(),
                    quantity: 1.0,
                    unit: "kg".to_string(),
                    category: category.to_string(),
                    expiry_date: None,
                    is_running_low: low,
                },
            )
            .unwrap();
        }

        let baking = db
            .list_pantry_items(
                user,
                &PantryFilter {
                    category: Some("Baking".to_string()),
                    is_running_low: None,
                },
            )
            .unwrap();
        assert_eq!(baking.len(), 2);

        let low = db
            .list_pantry_items(
                user,
                &PantryFilter {
                    category: None,
                    is_running_low: Some(true),
                },
            )
            .unwrap();
        assert_eq!(low.len(), 2);

        let both = db
            .list_pantry_items(
                user,
                &PantryFilter {
                    category: Some("Baking".to_string()),
                    is_running_low: Some(true),
                },
            )
            .unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].name, "sugar");
    }

    #[test]
    fn test_expiring_soon() {
        let (db, user) = test_db();
        for (name, expiry) in [
            ("milk", Some("2024-06-05")),
            ("yogurt", Some("2024-06-20")),
            ("salt", None),
        ] {
            db.insert_pantry_item(
                user,
                &NewPantryItem {
                    name: name.to_string(),
                    quantity: 1.0,
                    unit: "piece".to_string(),
                    category: "Misc".to_string(),
                    expiry_date: expiry.map(date),
                    is_running_low: false,
                },
            )
            .unwrap();
        }

        let soon = db.expiring_soon(user, date("2024-06-03"), 7).unwrap();
        assert_eq!(soon.len(), 1);
        assert_eq!(soon[0].name, "milk");
    }

    // --- Shopping list ---

    #[test]
    fn test_manual_item_defaults() {
        let (db, user) = test_db();
        let item = db
            .insert_shopping_item(
                user,
                &NewShoppingItem {
                    ingredient_name: "coffee".to_string(),
                    quantity: 1.0,
                    unit: "bag".to_string(),
                    category: None,
                },
            )
            .unwrap();
        assert_eq!(item.category.as_deref(), Some(UNCATEGORIZED));
        assert!(!item.is_checked);
        assert!(!item.from_meal_plan);
    }

    #[test]
    fn test_toggle_checked() {
        let (db, user) = test_db();
        let other = db.create_user("bob").unwrap();
        let item = db
            .insert_shopping_item(
                user,
                &NewShoppingItem {
                    ingredient_name: "tea".to_string(),
                    quantity: 1.0,
                    unit: "box".to_string(),
                    category: None,
                },
            )
            .unwrap();

        let on = db.toggle_checked(item.id, user).unwrap().unwrap();
        assert!(on.is_checked);
        let off = db.toggle_checked(item.id, user).unwrap().unwrap();
        assert!(!off.is_checked);

        assert!(db.toggle_checked(item.id, other.id).unwrap().is_none());
        assert!(db.toggle_checked(9999, user).unwrap().is_none());
    }

    #[test]
    fn test_grouped_by_category() {
        let (db, user) = test_db();
        for (name, category) in [
            ("zucchini", Some("Produce")),
            ("apple", Some("Produce")),
            ("mystery", None),
            ("bread", Some("Bakery")),
        ] {
            db.insert_shopping_item(
                user,
                &NewShoppingItem {
                    ingredient_name: name.to_string(),
                    quantity: 1.0,
                    unit: "piece".to_string(),
                    category: category.map(String::from),
                },
            )
            .unwrap();
        }

        let groups = db.grouped_by_category(user).unwrap();
        let names: Vec<&str> = groups.iter().map(|g| g.category.as_str()).collect();
        assert_eq!(names, vec!["Bakery", "Produce", UNCATEGORIZED]);

        let produce: Vec<&str> = groups[1]
            .items
            .iter()
            .map(|i| i.ingredient_name.as_str())
            .collect();
        assert_eq!(produce, vec!["apple", "zucchini"]);
    }

    #[test]
    fn test_clear_checked_and_clear_all() {
        let (db, user) = test_db();
        let a = db
            .insert_shopping_item(
                user,
                &NewShoppingItem {
                    ingredient_name: "a".to_string(),
                    quantity: 1.0,
                    unit: "x".to_string(),
                    category: None,
                },
            )
            .unwrap();
        db.insert_shopping_item(
            user,
            &NewShoppingItem {
                ingredient_name: "b".to_string(),
                quantity: 1.0,
                unit: "x".to_string(),
                category: None,
            },
        )
        .unwrap();
        db.toggle_checked(a.id, user).unwrap();

        let cleared = db.clear_checked(user).unwrap();
        assert_eq!(cleared.len(), 1);
        assert_eq!(cleared[0].ingredient_name, "a");
        assert_eq!(db.list_shopping_items(user).unwrap().len(), 1);

        let rest = db.clear_all(user).unwrap();
        assert_eq!(rest.len(), 1);
        assert!(db.list_shopping_items(user).unwrap().is_empty());
    }

    #[test]
    fn test_transfer_checked_to_pantry_always_inserts_new_rows() {
        let (db, user) = test_db();
        // Pantry already holds flour; transfer still inserts a second row
        db.insert_pantry_item(
            user,
            &NewPantryItem {
                name: "flour".to_string(),
                quantity: 1.0,
                unit: "kg".to_string(),
                category: "Baking".to_string(),
                expiry_date: None,
                is_running_low: false,
            },
        )
        .unwrap();

        let item = db
            .insert_shopping_item(
                user,
                &NewShoppingItem {
                    ingredient_name: "flour".to_string(),
                    quantity: 2.0,
                    unit: "kg".to_string(),
                    category: None,
                },
            )
            .unwrap();
        db.toggle_checked(item.id, user).unwrap();

        let transferred = db.add_checked_to_pantry(user).unwrap();
        assert_eq!(transferred.len(), 1);
        assert_eq!(transferred[0].ingredient_name, "flour");

        // Shopping row gone, pantry now holds two flour rows
        assert!(db.list_shopping_items(user).unwrap().is_empty());
        let pantry = db.list_pantry_items(user, &PantryFilter::default()).unwrap();
        assert_eq!(pantry.len(), 2);
        let new_row = pantry
            .iter()
            .find(|p| (p.quantity - 2.0).abs() < f64::EPSILON)
            .unwrap();
        assert_eq!(new_row.category, UNCATEGORIZED);
    }

    #[test]
    fn test_transfer_with_nothing_checked() {
        let (db, user) = test_db();
        db.insert_shopping_item(
            user,
            &NewShoppingItem {
                ingredient_name: "tea".to_string(),
                quantity: 1.0,
                unit: "box".to_string(),
                category: None,
            },
        )
        .unwrap();
        let transferred = db.add_checked_to_pantry(user).unwrap();
        assert!(transferred.is_empty());
        assert_eq!(db.list_shopping_items(user).unwrap().len(), 1);
    }

    // --- Generation ---

    #[test]
    fn test_generate_aggregates_and_subtracts_pantry() {
        let (db, user) = test_db();
        // Recipe A needs 2 cup tomato, Recipe B needs 1 cup tomato
        let a = db
            .insert_recipe(user, &recipe_with("A", &[("tomato", 2.0, "cup")]))
            .unwrap();
        let b = db
            .insert_recipe(user, &recipe_with("B", &[("tomato", 1.0, "cup")]))
            .unwrap();
        plan(&db, user, "2024-06-03", "lunch", a.recipe.id);
        plan(&db, user, "2024-06-04", "dinner", b.recipe.id);

        // Pantry holds 1 cup tomato
        db.insert_pantry_item(
            user,
            &NewPantryItem {
                name: "tomato".to_string(),
                quantity: 1.0,
                unit: "cup".to_string(),
                category: "Produce".to_string(),
                expiry_date: None,
                is_running_low: false,
            },
        )
        .unwrap();

        let list = db
            .generate_from_meal_plan(user, date("2024-06-03"), date("2024-06-09"))
            .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].ingredient_name, "tomato");
        assert_eq!(list[0].unit, "cup");
        assert!((list[0].quantity - 2.0).abs() < f64::EPSILON);
        assert!(list[0].from_meal_plan);
        assert_eq!(list[0].category.as_deref(), Some(UNCATEGORIZED));
    }

    #[test]
    fn test_generate_drops_fully_covered_ingredients() {
        let (db, user) = test_db();
        let a = db
            .insert_recipe(user, &recipe_with("A", &[("tomato", 2.0, "cup")]))
            .unwrap();
        let b = db
            .insert_recipe(user, &recipe_with("B", &[("tomato", 1.0, "cup")]))
            .unwrap();
        plan(&db, user, "2024-06-03", "lunch", a.recipe.id);
        plan(&db, user, "2024-06-04", "dinner", b.recipe.id);

        db.insert_pantry_item(
            user,
            &NewPantryItem {
                name: "tomato".to_string(),
                quantity: 5.0,
                unit: "cup".to_string(),
                category: "Produce".to_string(),
                expiry_date: None,
                is_running_low: false,
            },
        )
        .unwrap();

        let list = db
            .generate_from_meal_plan(user, date("2024-06-03"), date("2024-06-09"))
            .unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_generate_is_idempotent_in_content() {
        let (db, user) = test_db();
        let a = db
            .insert_recipe(
                user,
                &recipe_with("A", &[("tomato", 2.0, "cup"), ("rice", 1.0, "cup")]),
            )
            .unwrap();
        plan(&db, user, "2024-06-03", "lunch", a.recipe.id);

        let first = db
            .generate_from_meal_plan(user, date("2024-06-03"), date("2024-06-09"))
            .unwrap();
        let second = db
            .generate_from_meal_plan(user, date("2024-06-03"), date("2024-06-09"))
            .unwrap();

        let content =
            |items: &[ShoppingItem]| -> Vec<(String, String, f64)> {
                items
                    .iter()
                    .filter(|i| i.from_meal_plan)
                    .map(|i| (i.ingredient_name.clone(), i.unit.clone(), i.quantity))
                    .collect()
            };
        assert_eq!(content(&first), content(&second));
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn test_generate_preserves_manual_items() {
        let (db, user) = test_db();
        let a = db
            .insert_recipe(user, &recipe_with("A", &[("tomato", 2.0, "cup")]))
            .unwrap();
        plan(&db, user, "2024-06-03", "lunch", a.recipe.id);

        let manual = db
            .insert_shopping_item(
                user,
                &NewShoppingItem {
                    ingredient_name: "batteries".to_string(),
                    quantity: 4.0,
                    unit: "piece".to_string(),
                    category: Some("Household".to_string()),
                },
            )
            .unwrap();

        let list = db
            .generate_from_meal_plan(user, date("2024-06-03"), date("2024-06-09"))
            .unwrap();
        let kept = list.iter().find(|i| i.id == manual.id).unwrap();
        assert_eq!(kept.ingredient_name, "batteries");
        assert!(!kept.from_meal_plan);
        assert!((kept.quantity - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_generate_replaces_stale_generated_rows() {
        let (db, user) = test_db();
        let a = db
            .insert_recipe(user, &recipe_with("A", &[("tomato", 2.0, "cup")]))
            .unwrap();
        let slot = plan(&db, user, "2024-06-03", "lunch", a.recipe.id);

        let first = db
            .generate_from_meal_plan(user, date("2024-06-03"), date("2024-06-09"))
            .unwrap();
        assert_eq!(first.len(), 1);

        // Unplan the meal; regeneration must remove the stale row
        db.delete_slot(slot.id, user).unwrap();
        let second = db
            .generate_from_meal_plan(user, date("2024-06-03"), date("2024-06-09"))
            .unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_generate_ignores_slots_outside_range() {
        let (db, user) = test_db();
        let a = db
            .insert_recipe(user, &recipe_with("A", &[("tomato", 2.0, "cup")]))
            .unwrap();
        plan(&db, user, "2024-06-10", "lunch", a.recipe.id);

        let list = db
            .generate_from_meal_plan(user, date("2024-06-03"), date("2024-06-09"))
            .unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_generate_with_empty_ingredient_list() {
        let (db, user) = test_db();
        let a = db.insert_recipe(user, &recipe_with("Water", &[])).unwrap();
        plan(&db, user, "2024-06-03", "lunch", a.recipe.id);

        let list = db
            .generate_from_meal_plan(user, date("2024-06-03"), date("2024-06-09"))
            .unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_generate_unit_mismatch_not_converted() {
        let (db, user) = test_db();
        let a = db
            .insert_recipe(user, &recipe_with("Cake", &[("sugar", 2.0, "cup")]))
            .unwrap();
        plan(&db, user, "2024-06-03", "lunch", a.recipe.id);

        db.insert_pantry_item(
            user,
            &NewPantryItem {
                name: "sugar".to_string(),
                quantity: 500.0,
                unit: "g".to_string(),
                category: "Baking".to_string(),
                expiry_date: None,
                is_running_low: false,
            },
        )
        .unwrap();

        let list = db
            .generate_from_meal_plan(user, date("2024-06-03"), date("2024-06-09"))
            .unwrap();
        assert_eq!(list.len(), 1);
        assert!((list[0].quantity - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_generate_scoped_per_user() {
        let (db, user) = test_db();
        let other = db.create_user("bob").unwrap();
        let a = db
            .insert_recipe(user, &recipe_with("A", &[("tomato", 2.0, "cup")]))
            .unwrap();
        plan(&db, user, "2024-06-03", "lunch", a.recipe.id);

        let theirs = db
            .generate_from_meal_plan(other.id, date("2024-06-03"), date("2024-06-09"))
            .unwrap();
        assert!(theirs.is_empty());

        let mine = db
            .generate_from_meal_plan(user, date("2024-06-03"), date("2024-06-09"))
            .unwrap();
        assert_eq!(mine.len(), 1);
    }

    #[test]
    fn test_generate_folds_name_case_across_recipes() {
        let (db, user) = test_db();
        let a = db
            .insert_recipe(user, &recipe_with("A", &[("Tomato", 2.0, "cup")]))
            .unwrap();
        let b = db
            .insert_recipe(user, &recipe_with("B", &[("tomato", 1.0, "cup")]))
            .unwrap();
        plan(&db, user, "2024-06-03", "lunch", a.recipe.id);
        plan(&db, user, "2024-06-03", "dinner", b.recipe.id);

        let list = db
            .generate_from_meal_plan(user, date("2024-06-03"), date("2024-06-03"))
            .unwrap();
        assert_eq!(list.len(), 1);
        // First-seen casing comes from the breakfast<lunch<dinner scan order
        assert_eq!(list[0].ingredient_name, "Tomato");
        assert!((list[0].quantity - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_generate_failure_rolls_back_delete() {
        let (db, user) = test_db();
        let a = db
            .insert_recipe(user, &recipe_with("A", &[("tomato", 2.0, "cup")]))
            .unwrap();
        plan(&db, user, "2024-06-03", "lunch", a.recipe.id);

        let first = db
            .generate_from_meal_plan(user, date("2024-06-03"), date("2024-06-09"))
            .unwrap();
        assert_eq!(first.len(), 1);

        // Make the insert step fail so the transaction has to unwind the
        // delete that already ran
        db.conn
            .execute_batch(
                "CREATE TRIGGER block_generated_rows
                 BEFORE INSERT ON shopping_list_items
                 WHEN NEW.from_meal_plan = 1
                 BEGIN SELECT RAISE(ABORT, 'generated rows blocked'); END",
            )
            .unwrap();

        let result = db.generate_from_meal_plan(user, date("2024-06-03"), date("2024-06-09"));
        assert!(result.is_err());

        // The previously generated row survives the failed regeneration
        let list = db.list_shopping_items(user).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].uuid, first[0].uuid);
        assert!(list[0].from_meal_plan);
    }

    #[test]
    fn test_transfer_failure_rolls_back_pantry_inserts() {
        let (db, user) = test_db();
        let item = db
            .insert_shopping_item(
                user,
                &NewShoppingItem {
                    ingredient_name: "flour".to_string(),
                    quantity: 2.0,
                    unit: "kg".to_string(),
                    category: None,
                },
            )
            .unwrap();
        db.toggle_checked(item.id, user).unwrap();

        // Pantry inserts run before the shopping delete; blocking the delete
        // forces the transaction to unwind them
        db.conn
            .execute_batch(
                "CREATE TRIGGER block_shopping_delete
                 BEFORE DELETE ON shopping_list_items
                 BEGIN SELECT RAISE(ABORT, 'delete blocked'); END",
            )
            .unwrap();

        let result = db.add_checked_to_pantry(user);
        assert!(result.is_err());

        // Nothing moved: the pantry is untouched and the item is still checked
        assert!(
            db.list_pantry_items(user, &PantryFilter::default())
                .unwrap()
                .is_empty()
        );
        let list = db.list_shopping_items(user).unwrap();
        assert_eq!(list.len(), 1);
        assert!(list[0].is_checked);
    }
}
