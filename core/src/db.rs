use std::path::Path;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::models::{FoodItem, FoodItemUpdate, NewFoodItem, NewRecipe, Recipe};

pub struct Database {
    conn: Connection,
}

// Fixed-width UTC timestamps so that text ordering matches time ordering.
fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
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
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS food_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    quantity INTEGER NOT NULL,
                    unit TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_recipes_created_at ON recipes(created_at);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn food_item_from_row(row: &rusqlite::Row) -> rusqlite::Result<FoodItem> {
        Ok(FoodItem {
            id: row.get(0)?,
            name: row.get(1)?,
            quantity: row.get(2)?,
            unit: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        Ok(Recipe {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    // --- Food items ---

    pub fn list_food_items(&self) -> Result<Vec<FoodItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, quantity, unit, created_at, updated_at FROM food_items ORDER BY id",
        )?;
        let items = stmt
            .query_map([], Self::food_item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn insert_food_item(&self, item: &NewFoodItem) -> Result<FoodItem> {
        let now = now();
        self.conn.execute(
            "INSERT INTO food_items (name, quantity, unit, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![item.name, item.quantity, item.unit, now, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_food_item(id)?
            .context("Food item vanished after insert")
    }

    pub fn get_food_item(&self, id: i64) -> Result<Option<FoodItem>> {
        self.conn
            .query_row(
                "SELECT id, name, quantity, unit, created_at, updated_at
                 FROM food_items WHERE id = ?1",
                params![id],
                Self::food_item_from_row,
            )
            .optional()
            .context("Failed to load food item")
    }

    /// Apply the provided fields; returns `None` when the item does not exist.
    pub fn update_food_item(&self, id: i64, update: &FoodItemUpdate) -> Result<Option<FoodItem>> {
        if update.is_empty() {
            return self.get_food_item(id);
        }

        let rows = self.conn.execute(
            "UPDATE food_items
             SET name = COALESCE(?1, name),
                 quantity = COALESCE(?2, quantity),
                 unit = COALESCE(?3, unit),
                 updated_at = ?4
             WHERE id = ?5",
            params![update.name, update.quantity, update.unit, now(), id],
        )?;
        if rows == 0 {
            return Ok(None);
        }
        self.get_food_item(id)
    }

    pub fn delete_food_item(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM food_items WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // --- Recipes ---

    pub fn insert_recipe(&self, recipe: &NewRecipe) -> Result<Recipe> {
        let now = now();
        self.conn.execute(
            "INSERT INTO recipes (title, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![recipe.title, recipe.content, now, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_recipe(id)?.context("Recipe vanished after insert")
    }

    pub fn get_recipe(&self, id: i64) -> Result<Option<Recipe>> {
        self.conn
            .query_row(
                "SELECT id, title, content, created_at, updated_at FROM recipes WHERE id = ?1",
                params![id],
                Self::recipe_from_row,
            )
            .optional()
            .context("Failed to load recipe")
    }

    /// Newest first. Rows created within the same clock tick keep insertion order.
    pub fn list_recipes(&self) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, content, created_at, updated_at
             FROM recipes ORDER BY created_at DESC, id DESC",
        )?;
        let recipes = stmt
            .query_map([], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    pub fn delete_recipe(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM recipes WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}
