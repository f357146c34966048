use anyhow::Result;
use std::process;

use larder_core::models::{NewShoppingItem, week_end};
use larder_core::service::LarderService;

use super::helpers::{json_error, parse_date, print_shopping_table};

pub(crate) fn cmd_shop_generate(
    service: &LarderService,
    user_id: i64,
    start: Option<String>,
    end: Option<String>,
    json: bool,
) -> Result<()> {
    let start = parse_date(start)?;
    let end = match end {
        Some(e) => parse_date(Some(e))?,
        None => week_end(start),
    };

    let list = service.generate_shopping_list(
        user_id,
        &start.format("%Y-%m-%d").to_string(),
        &end.format("%Y-%m-%d").to_string(),
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
    } else {
        let count = list.iter().filter(|i| i.from_meal_plan).count();
        println!("Generated {count} items from the plan ({start} to {end})");
        if !list.is_empty() {
            print_shopping_table(&list);
        }
    }
    Ok(())
}

pub(crate) fn cmd_shop_list(
    service: &LarderService,
    user_id: i64,
    grouped: bool,
    json: bool,
) -> Result<()> {
    if grouped {
        let groups = service.shopping_list_by_category(user_id)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&groups)?);
        } else if groups.is_empty() {
            println!("Shopping list is empty");
        } else {
            for group in &groups {
                let category = &group.category;
                println!("{category}:");
                for item in &group.items {
                    let mark = if item.is_checked { "x" } else { " " };
                    let name = &item.ingredient_name;
                    let qty = item.quantity;
                    let unit = &item.unit;
                    println!("  [{mark}] {name} ({qty} {unit})");
                }
            }
        }
        return Ok(());
    }

    let items = service.shopping_list(user_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if items.is_empty() {
        println!("Shopping list is empty");
    } else {
        print_shopping_table(&items);
    }
    Ok(())
}

pub(crate) fn cmd_shop_add(
    service: &LarderService,
    user_id: i64,
    name: &str,
    quantity: f64,
    unit: &str,
    category: Option<String>,
    json: bool,
) -> Result<()> {
    let item = service.add_shopping_item(
        user_id,
        &NewShoppingItem {
            ingredient_name: name.to_string(),
            quantity,
            unit: unit.to_string(),
            category,
        },
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        let name = &item.ingredient_name;
        let id = item.id;
        println!("Added {name} to the shopping list (item {id})");
    }
    Ok(())
}

pub(crate) fn cmd_shop_toggle(
    service: &LarderService,
    user_id: i64,
    id: i64,
    json: bool,
) -> Result<()> {
    match service.toggle_shopping_item(id, user_id)? {
        Some(item) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&item)?);
            } else {
                let name = &item.ingredient_name;
                let state = if item.is_checked { "checked" } else { "unchecked" };
                println!("{name} is now {state}");
            }
            Ok(())
        }
        None => {
            if json {
                println!("{}", json_error(&format!("Shopping item {id} not found")));
            } else {
                eprintln!("Shopping item {id} not found");
            }
            process::exit(2);
        }
    }
}

pub(crate) fn cmd_shop_remove(
    service: &LarderService,
    user_id: i64,
    id: i64,
    json: bool,
) -> Result<()> {
    match service.remove_shopping_item(id, user_id)? {
        Some(item) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&item)?);
            } else {
                let name = &item.ingredient_name;
                println!("Removed {name} from the shopping list");
            }
            Ok(())
        }
        None => {
            if json {
                println!("{}", json_error(&format!("Shopping item {id} not found")));
            } else {
                eprintln!("Shopping item {id} not found");
            }
            process::exit(2);
        }
    }
}

pub(crate) fn cmd_shop_clear(
    service: &LarderService,
    user_id: i64,
    checked_only: bool,
    json: bool,
) -> Result<()> {
    let removed = if checked_only {
        service.clear_checked(user_id)?
    } else {
        service.clear_all(user_id)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&removed)?);
    } else {
        let count = removed.len();
        let what = if checked_only { "checked items" } else { "items" };
        println!("Removed {count} {what}");
    }
    Ok(())
}

pub(crate) fn cmd_shop_to_pantry(service: &LarderService, user_id: i64, json: bool) -> Result<()> {
    let moved = service.move_checked_to_pantry(user_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&moved)?);
    } else if moved.is_empty() {
        println!("No checked items to move");
    } else {
        let count = moved.len();
        println!("Moved {count} checked items to the pantry");
    }
    Ok(())
}
