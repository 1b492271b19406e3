use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use std::io::{BufRead, Read};
use std::path::Path;

use crate::client::{ClientError, PantryClient};
use crate::retry::{RetryError, RetryPolicy};
use pantry_core::models::{Recipe, display_title};

use super::helpers::{confirm, print_json, print_recipes_table};

/// What to do with a freshly generated recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SaveChoice {
    Ask,
    Save,
    Discard,
}

impl SaveChoice {
    pub(crate) fn from_flags(save: bool, discard: bool) -> Self {
        match (save, discard) {
            (true, _) => Self::Save,
            (false, true) => Self::Discard,
            (false, false) => Self::Ask,
        }
    }
}

#[derive(Serialize)]
struct GeneratedRecipe<'a> {
    display_title: String,
    content: &'a str,
    saved: Option<&'a Recipe>,
}

fn generation_failure(err: RetryError<ClientError>) -> anyhow::Error {
    match err {
        RetryError::Aborted(err) => anyhow!(err),
        RetryError::Exhausted { attempts, last } => {
            anyhow!(last).context(format!("Failed to generate a recipe after {attempts} attempts"))
        }
    }
}

async fn show_refreshed_list(client: &PantryClient) -> Result<()> {
    let recipes = client.list_recipes().await?;
    print_recipes_table(&recipes);
    Ok(())
}

pub(crate) async fn cmd_recipe_generate(
    client: &PantryClient,
    policy: &RetryPolicy,
    choice: SaveChoice,
    title: Option<&str>,
    json: bool,
    input: &mut impl BufRead,
) -> Result<()> {
    eprintln!("Generating a recipe from your pantry...");
    let markdown = client
        .generate_recipe_with_retry(policy, |attempt, err, delay| {
            eprintln!(
                "Attempt {attempt} failed: {err}. Retrying in {}s...",
                delay.as_secs()
            );
        })
        .await
        .map_err(generation_failure)?;

    if !json {
        println!("{markdown}");
        println!();
    }

    let save = match choice {
        SaveChoice::Save => true,
        SaveChoice::Discard => false,
        SaveChoice::Ask => confirm(input, "Save this recipe?")?,
    };

    let saved = if save {
        eprintln!("Saving recipe...");
        let recipe = client.save_recipe(title, &markdown).await?;
        eprintln!("Saved \"{}\" (id: {})", recipe.display_title(), recipe.id);
        Some(recipe)
    } else {
        eprintln!("Recipe discarded");
        None
    };

    if json {
        return print_json(&GeneratedRecipe {
            display_title: display_title(&markdown),
            content: &markdown,
            saved: saved.as_ref(),
        });
    }
    if saved.is_some() {
        show_refreshed_list(client).await?;
    }
    Ok(())
}

/// Read markdown from `source`, where `-` means stdin.
fn read_markdown(source: &Path) -> Result<String> {
    if source == Path::new("-") {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .context("Failed to read recipe from stdin")?;
        Ok(content)
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read {}", source.display()))
    }
}

pub(crate) async fn cmd_recipe_save(
    client: &PantryClient,
    source: &Path,
    title: Option<&str>,
    json: bool,
) -> Result<()> {
    let content = read_markdown(source)?;
    if content.trim().is_empty() {
        bail!("Recipe is empty");
    }

    eprintln!("Saving recipe...");
    let recipe = client.save_recipe(title, &content).await?;
    eprintln!("Saved \"{}\" (id: {})", recipe.display_title(), recipe.id);

    if json {
        print_json(&recipe)
    } else {
        show_refreshed_list(client).await
    }
}

pub(crate) async fn cmd_recipe_list(client: &PantryClient, json: bool) -> Result<()> {
    let recipes = client.list_recipes().await?;
    if json {
        print_json(&recipes)
    } else {
        print_recipes_table(&recipes);
        Ok(())
    }
}

pub(crate) async fn cmd_recipe_show(client: &PantryClient, id: i64, json: bool) -> Result<()> {
    let recipe = client.get_recipe(id).await?;
    if json {
        return print_json(&recipe);
    }

    eprintln!(
        "Recipe {} \"{}\" saved {}",
        recipe.id, recipe.title, recipe.created_at
    );
    println!("{}", recipe.content);
    Ok(())
}

pub(crate) async fn cmd_recipe_delete(
    client: &PantryClient,
    id: i64,
    yes: bool,
    json: bool,
    input: &mut impl BufRead,
) -> Result<()> {
    if !yes && !confirm(input, &format!("Delete recipe {id}?"))? {
        eprintln!("Cancelled");
        return Ok(());
    }

    eprintln!("Deleting recipe {id}...");
    client.delete_recipe(id).await?;
    eprintln!("Deleted recipe {id}");

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
        Ok(())
    } else {
        show_refreshed_list(client).await
    }
}
