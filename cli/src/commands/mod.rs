mod food;
mod helpers;
mod recipe;

pub(crate) use food::{
    FoodForm, cmd_food_add, cmd_food_delete, cmd_food_edit, cmd_food_list, cmd_food_show,
};
pub(crate) use helpers::json_error;
pub(crate) use recipe::{
    SaveChoice, cmd_recipe_delete, cmd_recipe_generate, cmd_recipe_list, cmd_recipe_save,
    cmd_recipe_show,
};
