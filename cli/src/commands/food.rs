use anyhow::{Result, bail};
use serde_json::Value;
use std::io::BufRead;

use crate::client::PantryClient;
use pantry_core::models::{
    FoodItem, FoodItemFields, FoodItemUpdate, NewFoodItem, ValidationErrors,
    validate_new_food_item,
};

use super::helpers::{confirm, print_food_items_table, print_json};

/// Editable food item fields as typed by the user, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FoodForm {
    pub name: String,
    pub quantity: String,
    pub unit: String,
}

impl FoodForm {
    fn from_item(item: &FoodItem) -> Self {
        Self {
            name: item.name.clone(),
            quantity: item.quantity.to_string(),
            unit: item.unit.clone(),
        }
    }

    fn merge(
        mut self,
        name: Option<String>,
        quantity: Option<String>,
        unit: Option<String>,
    ) -> Self {
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(quantity) = quantity {
            self.quantity = quantity;
        }
        if let Some(unit) = unit {
            self.unit = unit;
        }
        self
    }

    /// Same rules the server applies: every field present and non-empty, and
    /// quantity an integer.
    pub(crate) fn validate(&self) -> Result<NewFoodItem, ValidationErrors> {
        validate_new_food_item(&FoodItemFields {
            name: Some(Value::String(self.name.clone())),
            quantity: Some(Value::String(self.quantity.clone())),
            unit: Some(Value::String(self.unit.clone())),
        })
    }
}

/// Most recently touched first.
pub(crate) fn sort_newest_first(items: &mut [FoodItem]) {
    items.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

async fn show_refreshed_list(client: &PantryClient) -> Result<()> {
    let mut items = client.list_food_items().await?;
    sort_newest_first(&mut items);
    print_food_items_table(&items);
    Ok(())
}

fn checked(form: &FoodForm) -> Result<NewFoodItem> {
    match form.validate() {
        Ok(item) => Ok(item),
        Err(errors) => bail!("Invalid food item: {errors}"),
    }
}

pub(crate) async fn cmd_food_add(
    client: &PantryClient,
    form: FoodForm,
    json: bool,
) -> Result<()> {
    let item = checked(&form)?;

    eprintln!("Saving {}...", item.name);
    let created = client.create_food_item(&item).await?;
    eprintln!("Added {} (id: {})", created.name, created.id);

    if json {
        print_json(&created)
    } else {
        show_refreshed_list(client).await
    }
}

pub(crate) async fn cmd_food_edit(
    client: &PantryClient,
    id: i64,
    name: Option<String>,
    quantity: Option<String>,
    unit: Option<String>,
    json: bool,
) -> Result<()> {
    if name.is_none() && quantity.is_none() && unit.is_none() {
        bail!("Nothing to change. Pass --name, --quantity or --unit");
    }

    let current = client.get_food_item(id).await?;
    let form = FoodForm::from_item(&current).merge(name, quantity, unit);
    let item = checked(&form)?;

    eprintln!("Updating food item {id}...");
    let updated = client
        .update_food_item(
            id,
            &FoodItemUpdate {
                name: Some(item.name),
                quantity: Some(item.quantity),
                unit: Some(item.unit),
            },
        )
        .await?;
    eprintln!("Updated {} (id: {id})", updated.name);

    if json {
        print_json(&updated)
    } else {
        show_refreshed_list(client).await
    }
}

pub(crate) async fn cmd_food_list(client: &PantryClient, json: bool) -> Result<()> {
    let mut items = client.list_food_items().await?;
    sort_newest_first(&mut items);
    if json {
        print_json(&items)
    } else {
        print_food_items_table(&items);
        Ok(())
    }
}

pub(crate) async fn cmd_food_show(client: &PantryClient, id: i64, json: bool) -> Result<()> {
    let item = client.get_food_item(id).await?;
    if json {
        print_json(&item)
    } else {
        print_food_items_table(std::slice::from_ref(&item));
        Ok(())
    }
}

pub(crate) async fn cmd_food_delete(
    client: &PantryClient,
    id: i64,
    yes: bool,
    json: bool,
    input: &mut impl BufRead,
) -> Result<()> {
    if !yes && !confirm(input, &format!("Delete food item {id}?"))? {
        eprintln!("Cancelled");
        return Ok(());
    }

    eprintln!("Deleting food item {id}...");
    client.delete_food_item(id).await?;
    eprintln!("Deleted food item {id}");

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
        Ok(())
    } else {
        show_refreshed_list(client).await
    }
}
