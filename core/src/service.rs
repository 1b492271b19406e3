use std::path::Path;

use crate::db::Database;
use crate::error::{NO_INGREDIENTS_MESSAGE, PantryError, PantryResult};
use crate::generation::build_prompt;
use crate::models::{
    FoodItem, FoodItemFields, Recipe, RecipeFields, validate_food_item_update,
    validate_new_food_item, validate_new_recipe,
};

/// Validated CRUD over food items and saved recipes.
///
/// Every operation is a single-row read or write; there is no cross-request
/// state beyond the database itself.
pub struct PantryService {
    db: Database,
}

impl PantryService {
    pub fn new(db_path: &Path) -> PantryResult<Self> {
        let db = Database::open(db_path)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> PantryResult<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    // --- Food items ---

    pub fn list_food_items(&self) -> PantryResult<Vec<FoodItem>> {
        Ok(self.db.list_food_items()?)
    }

    pub fn create_food_item(&self, fields: &FoodItemFields) -> PantryResult<FoodItem> {
        let item = validate_new_food_item(fields)?;
        Ok(self.db.insert_food_item(&item)?)
    }

    pub fn get_food_item(&self, id: i64) -> PantryResult<FoodItem> {
        self.db
            .get_food_item(id)?
            .ok_or_else(|| PantryError::food_item_not_found(id))
    }

    pub fn update_food_item(&self, id: i64, fields: &FoodItemFields) -> PantryResult<FoodItem> {
        let update = validate_food_item_update(fields)?;
        self.db
            .update_food_item(id, &update)?
            .ok_or_else(|| PantryError::food_item_not_found(id))
    }

    pub fn delete_food_item(&self, id: i64) -> PantryResult<()> {
        if self.db.delete_food_item(id)? {
            Ok(())
        } else {
            Err(PantryError::food_item_not_found(id))
        }
    }

    // --- Recipe generation ---

    /// Prompt for the current pantry contents.
    ///
    /// Fails with [`PantryError::PreconditionFailed`] when the pantry is empty,
    /// before anything is sent upstream.
    pub fn generation_prompt(&self) -> PantryResult<String> {
        let items = self.db.list_food_items()?;
        if items.is_empty() {
            return Err(PantryError::PreconditionFailed(
                NO_INGREDIENTS_MESSAGE.to_string(),
            ));
        }
        Ok(build_prompt(&items))
    }

    // --- Saved recipes ---

    pub fn list_recipes(&self) -> PantryResult<Vec<Recipe>> {
        Ok(self.db.list_recipes()?)
    }

    pub fn create_recipe(&self, fields: &RecipeFields) -> PantryResult<Recipe> {
        let recipe = validate_new_recipe(fields)?;
        Ok(self.db.insert_recipe(&recipe)?)
    }

    pub fn get_recipe(&self, id: i64) -> PantryResult<Recipe> {
        self.db
            .get_recipe(id)?
            .ok_or_else(|| PantryError::recipe_not_found(id))
    }

    pub fn delete_recipe(&self, id: i64) -> PantryResult<()> {
        if self.db.delete_recipe(id)? {
            Ok(())
        } else {
            Err(PantryError::recipe_not_found(id))
        }
    }
}
