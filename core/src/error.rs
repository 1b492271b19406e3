use thiserror::Error;

use crate::models::ValidationErrors;

/// Message returned when a recipe is requested before any food item exists.
pub const NO_INGREDIENTS_MESSAGE: &str =
    "You need to register some ingredients before creating a recipe.";

#[derive(Debug, Error)]
pub enum PantryError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{0}")]
    PreconditionFailed(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PantryError {
    #[must_use]
    pub fn food_item_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "Food item",
            id,
        }
    }

    #[must_use]
    pub fn recipe_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "Recipe",
            id,
        }
    }
}

pub type PantryResult<T> = Result<T, PantryError>;
