mod helpers;
mod pantry;
mod plan;
mod recipe;
mod shop;

pub(crate) use pantry::{
    cmd_pantry_add, cmd_pantry_expiring, cmd_pantry_list, cmd_pantry_remove, cmd_pantry_update,
};
pub(crate) use plan::{
    cmd_plan_add, cmd_plan_remove, cmd_plan_stats, cmd_plan_upcoming, cmd_plan_week,
};
pub(crate) use recipe::{
    cmd_recipe_delete, cmd_recipe_generate, cmd_recipe_list, cmd_recipe_show, cmd_recipe_suggest,
};
pub(crate) use shop::{
    cmd_shop_add, cmd_shop_clear, cmd_shop_generate, cmd_shop_list, cmd_shop_remove,
    cmd_shop_to_pantry, cmd_shop_toggle,
};
