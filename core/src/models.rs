use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Title stored when a recipe is saved without one.
pub const DEFAULT_RECIPE_TITLE: &str = "Generated Recipe";

/// Display title used when a recipe's markdown has no leading heading.
pub const UNTITLED_RECIPE: &str = "Untitled recipe";

/// Maximum length (in characters) of food item names and units.
pub const MAX_TEXT_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodItem {
    pub id: i64,
    pub name: String,
    pub quantity: i64,
    pub unit: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewFoodItem {
    pub name: String,
    pub quantity: i64,
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FoodItemUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl FoodItemUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.quantity.is_none() && self.unit.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Recipe {
    /// Human-visible title taken from the markdown heading, not the stored `title`.
    #[must_use]
    pub fn display_title(&self) -> String {
        display_title(&self.content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRecipe {
    pub title: String,
    pub content: String,
}

/// Extract the display title from the first line of a markdown document.
///
/// A first line starting with `#` yields its text with the leading hashes and
/// whitespace removed; anything else yields [`UNTITLED_RECIPE`].
#[must_use]
pub fn display_title(markdown: &str) -> String {
    let first_line = markdown.split('\n').next().unwrap_or_default();
    if first_line.starts_with('#') {
        first_line.trim_start_matches('#').trim().to_string()
    } else {
        UNTITLED_RECIPE.to_string()
    }
}

// --- Request validation ---

/// Field-level validation failures, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, Vec<String>> {
        &self.0
    }

    fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T, Self> {
        if self.is_empty() { Ok(value()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.0.values().flatten().map(String::as_str).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Raw food item payload. Every field is optional here so that missing and
/// mistyped fields can be reported together instead of failing on the first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FoodItemFields {
    #[serde(default, deserialize_with = "present")]
    pub name: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub quantity: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub unit: Option<Value>,
}

/// Raw recipe payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeFields {
    #[serde(default, deserialize_with = "present")]
    pub title: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub content: Option<Value>,
}

// Distinguishes an explicit `null` (Some(Value::Null)) from a missing key (None).
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

pub fn validate_new_food_item(fields: &FoodItemFields) -> Result<NewFoodItem, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let name = required(&mut errors, "name", fields.name.as_ref())
        .and_then(|v| text_field(&mut errors, "name", v));
    let quantity = required(&mut errors, "quantity", fields.quantity.as_ref())
        .and_then(|v| integer_field(&mut errors, "quantity", v));
    let unit = required(&mut errors, "unit", fields.unit.as_ref())
        .and_then(|v| text_field(&mut errors, "unit", v));

    match (name, quantity, unit) {
        (Some(name), Some(quantity), Some(unit)) => errors.into_result(|| NewFoodItem {
            name,
            quantity,
            unit,
        }),
        _ => Err(errors),
    }
}

pub fn validate_food_item_update(
    fields: &FoodItemFields,
) -> Result<FoodItemUpdate, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let name = fields
        .name
        .as_ref()
        .and_then(|v| text_field(&mut errors, "name", v));
    let quantity = fields
        .quantity
        .as_ref()
        .and_then(|v| integer_field(&mut errors, "quantity", v));
    let unit = fields
        .unit
        .as_ref()
        .and_then(|v| text_field(&mut errors, "unit", v));

    errors.into_result(|| FoodItemUpdate {
        name,
        quantity,
        unit,
    })
}

pub fn validate_new_recipe(fields: &RecipeFields) -> Result<NewRecipe, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let title = match &fields.title {
        None | Some(Value::Null) => DEFAULT_RECIPE_TITLE.to_string(),
        Some(Value::String(s)) if s.trim().is_empty() => DEFAULT_RECIPE_TITLE.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => {
            errors.add("title", "title must be a string");
            String::new()
        }
    };

    let content = match &fields.content {
        None | Some(Value::Null) => {
            errors.add("content", "content is required");
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            errors.add("content", "content must not be empty");
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            errors.add("content", "content must be a string");
            None
        }
    };

    match content {
        Some(content) => errors.into_result(|| NewRecipe { title, content }),
        None => Err(errors),
    }
}

fn required<'a>(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&'a Value>,
) -> Option<&'a Value> {
    match value {
        None | Some(Value::Null) => {
            errors.add(field, format!("{field} is required"));
            None
        }
        Some(v) => Some(v),
    }
}

fn text_field(errors: &mut ValidationErrors, field: &str, value: &Value) -> Option<String> {
    let Value::String(s) = value else {
        errors.add(field, format!("{field} must be a string"));
        return None;
    };
    let s = s.trim();
    if s.is_empty() {
        errors.add(field, format!("{field} must not be empty"));
        return None;
    }
    if s.chars().count() > MAX_TEXT_LEN {
        errors.add(
            field,
            format!("{field} must not be longer than {MAX_TEXT_LEN} characters"),
        );
        return None;
    }
    Some(s.to_string())
}

fn integer_field(errors: &mut ValidationErrors, field: &str, value: &Value) -> Option<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    if parsed.is_none() {
        errors.add(field, format!("{field} must be an integer"));
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> FoodItemFields {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_display_title_from_heading() {
        assert_eq!(
            display_title("# Bolo de Cenoura\n\n## Ingredientes\n- cenoura"),
            "Bolo de Cenoura"
        );
        assert_eq!(display_title("### Deep heading  \nbody"), "Deep heading");
        assert_eq!(display_title("#NoSpace"), "NoSpace");
    }

    #[test]
    fn test_display_title_fallback() {
        assert_eq!(display_title("Just some text\n# Later heading"), UNTITLED_RECIPE);
        assert_eq!(display_title(""), UNTITLED_RECIPE);
        assert_eq!(display_title("\n# Heading on second line"), UNTITLED_RECIPE);
    }

    #[test]
    fn test_recipe_display_title_ignores_stored_title() {
        let recipe = Recipe {
            id: 1,
            title: "Stored".to_string(),
            content: "# Shown\nbody".to_string(),
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert_eq!(recipe.display_title(), "Shown");
    }

    #[test]
    fn test_validate_new_food_item_ok() {
        let item = validate_new_food_item(&fields(json!({
            "name": "Arroz",
            "quantity": 2,
            "unit": "kg"
        })))
        .unwrap();
        assert_eq!(
            item,
            NewFoodItem {
                name: "Arroz".to_string(),
                quantity: 2,
                unit: "kg".to_string(),
            }
        );
    }

    #[test]
    fn test_validate_new_food_item_accepts_integer_string() {
        let item = validate_new_food_item(&fields(json!({
            "name": " Leite ",
            "quantity": "3",
            "unit": "L"
        })))
        .unwrap();
        assert_eq!(item.name, "Leite");
        assert_eq!(item.quantity, 3);
    }

    #[test]
    fn test_validate_new_food_item_each_missing_field() {
        let complete = json!({ "name": "Arroz", "quantity": 2, "unit": "kg" });
        for field in ["name", "quantity", "unit"] {
            let mut body = complete.clone();
            body.as_object_mut().unwrap().remove(field);
            let errors = validate_new_food_item(&fields(body)).unwrap_err();
            assert!(errors.contains(field), "expected error for missing {field}");
            assert_eq!(errors.fields().len(), 1);
        }
    }

    #[test]
    fn test_validate_new_food_item_null_is_missing() {
        let errors = validate_new_food_item(&fields(json!({
            "name": null,
            "quantity": 2,
            "unit": "kg"
        })))
        .unwrap_err();
        assert_eq!(errors.fields()["name"], vec!["name is required".to_string()]);
    }

    #[test]
    fn test_validate_new_food_item_non_integer_quantity() {
        for quantity in [json!(1.5), json!("two"), json!("1.5"), json!(true), json!([1])] {
            let errors = validate_new_food_item(&fields(json!({
                "name": "Arroz",
                "quantity": quantity,
                "unit": "kg"
            })))
            .unwrap_err();
            assert!(errors.contains("quantity"));
        }
    }

    #[test]
    fn test_validate_new_food_item_reports_all_fields() {
        let errors = validate_new_food_item(&fields(json!({ "name": 5, "unit": "" }))).unwrap_err();
        assert!(errors.contains("name"));
        assert!(errors.contains("quantity"));
        assert!(errors.contains("unit"));
    }

    #[test]
    fn test_validate_new_food_item_too_long() {
        let errors = validate_new_food_item(&fields(json!({
            "name": "a".repeat(MAX_TEXT_LEN + 1),
            "quantity": 1,
            "unit": "un"
        })))
        .unwrap_err();
        assert!(errors.contains("name"));
    }

    #[test]
    fn test_validate_food_item_update_partial() {
        let update = validate_food_item_update(&fields(json!({ "quantity": 5 }))).unwrap();
        assert_eq!(
            update,
            FoodItemUpdate {
                name: None,
                quantity: Some(5),
                unit: None,
            }
        );
        assert!(validate_food_item_update(&fields(json!({}))).unwrap().is_empty());
    }

    #[test]
    fn test_validate_food_item_update_rejects_bad_types() {
        let errors =
            validate_food_item_update(&fields(json!({ "quantity": "lots", "unit": null })))
                .unwrap_err();
        assert!(errors.contains("quantity"));
        assert!(errors.contains("unit"));
        assert!(!errors.contains("name"));
    }

    #[test]
    fn test_validate_new_recipe_default_title() {
        let recipe: RecipeFields =
            serde_json::from_value(json!({ "content": "# X\nbody" })).unwrap();
        let recipe = validate_new_recipe(&recipe).unwrap();
        assert_eq!(recipe.title, DEFAULT_RECIPE_TITLE);
        assert_eq!(recipe.content, "# X\nbody");

        let blank: RecipeFields =
            serde_json::from_value(json!({ "title": "  ", "content": "x" })).unwrap();
        assert_eq!(validate_new_recipe(&blank).unwrap().title, DEFAULT_RECIPE_TITLE);
    }

    #[test]
    fn test_validate_new_recipe_requires_content() {
        let missing: RecipeFields = serde_json::from_value(json!({ "title": "T" })).unwrap();
        assert!(validate_new_recipe(&missing).unwrap_err().contains("content"));

        let wrong: RecipeFields =
            serde_json::from_value(json!({ "title": 3, "content": 4 })).unwrap();
        let errors = validate_new_recipe(&wrong).unwrap_err();
        assert!(errors.contains("title"));
        assert!(errors.contains("content"));
    }

    #[test]
    fn test_validation_errors_display() {
        let mut errors = ValidationErrors::new();
        errors.add("name", "name is required");
        errors.add("unit", "unit is required");
        assert_eq!(errors.to_string(), "name is required; unit is required");
    }
}
