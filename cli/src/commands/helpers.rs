use anyhow::{Context, Result};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use pantry_core::models::{FoodItem, Recipe};

/// Ask a yes/no question on stderr and read the answer from `input`.
/// Anything other than `y`/`yes` is a no.
pub(crate) fn confirm(input: &mut impl BufRead, question: &str) -> Result<bool> {
    eprint!("{question} [y/N]: ");
    io::stderr().flush()?;
    let mut line = String::new();
    input.read_line(&mut line).context("Failed to read answer")?;
    Ok(matches!(
        line.trim().to_lowercase().as_str(),
        "y" | "yes"
    ))
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn print_food_items_table(items: &[FoodItem]) {
    #[derive(Tabled)]
    struct FoodItemRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Quantity")]
        quantity: i64,
        #[tabled(rename = "Unit")]
        unit: String,
        #[tabled(rename = "Updated")]
        updated: String,
    }

    if items.is_empty() {
        println!("No food items yet. Add one with: pantry food add <name> <quantity> <unit>");
        return;
    }

    let rows: Vec<FoodItemRow> = items
        .iter()
        .map(|item| FoodItemRow {
            id: item.id,
            name: truncate(&item.name, 35),
            quantity: item.quantity,
            unit: truncate(&item.unit, 12),
            updated: short_timestamp(&item.updated_at),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_recipes_table(recipes: &[Recipe]) {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Recipe")]
        recipe: String,
        #[tabled(rename = "Saved as")]
        title: String,
        #[tabled(rename = "Created")]
        created: String,
    }

    if recipes.is_empty() {
        println!("No saved recipes yet. Generate one with: pantry recipe generate");
        return;
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: r.id,
            recipe: truncate(&r.display_title(), 40),
            title: truncate(&r.title, 25),
            created: short_timestamp(&r.created_at),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

/// `2025-03-01T12:34:56.123456Z` -> `2025-03-01 12:34`.
pub(crate) fn short_timestamp(ts: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(ts).map_or_else(
        |_| ts.to_string(),
        |dt| dt.format("%Y-%m-%d %H:%M").to_string(),
    )
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
