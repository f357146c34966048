use anyhow::Result;
use std::process;

use larder_core::models::{NewPantryItem, PantryFilter, UpdatePantryItem};
use larder_core::service::LarderService;

use super::helpers::{json_error, parse_date, print_pantry_table};

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_pantry_add(
    service: &LarderService,
    user_id: i64,
    name: &str,
    quantity: f64,
    unit: &str,
    category: &str,
    expires: Option<String>,
    running_low: bool,
    json: bool,
) -> Result<()> {
    let expiry_date = expires.map(|d| parse_date(Some(d))).transpose()?;
    let item = service.add_pantry_item(
        user_id,
        &NewPantryItem {
            name: name.to_string(),
            quantity,
            unit: unit.to_string(),
            category: category.to_string(),
            expiry_date,
            is_running_low: running_low,
        },
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        let name = &item.name;
        let qty = item.quantity;
        let unit = &item.unit;
        println!("Added {name} ({qty} {unit}) to the pantry");
    }
    Ok(())
}

pub(crate) fn cmd_pantry_list(
    service: &LarderService,
    user_id: i64,
    category: Option<String>,
    running_low: bool,
    json: bool,
) -> Result<()> {
    let filter = PantryFilter {
        category,
        is_running_low: if running_low { Some(true) } else { None },
    };
    let items = service.list_pantry(user_id, &filter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if items.is_empty() {
        println!("Pantry is empty");
    } else {
        print_pantry_table(&items);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_pantry_update(
    service: &LarderService,
    user_id: i64,
    id: i64,
    name: Option<String>,
    quantity: Option<f64>,
    unit: Option<String>,
    category: Option<String>,
    expires: Option<String>,
    running_low: Option<bool>,
    json: bool,
) -> Result<()> {
    if name.is_none()
        && quantity.is_none()
        && unit.is_none()
        && category.is_none()
        && expires.is_none()
        && running_low.is_none()
    {
        anyhow::bail!("Nothing to update. Provide at least one field");
    }

    // "none" clears the expiry date
    let expiry_date = match expires {
        None => None,
        Some(value) if value == "none" => Some(None),
        Some(value) => Some(Some(parse_date(Some(value))?)),
    };

    let update = UpdatePantryItem {
        name,
        quantity,
        unit,
        category,
        expiry_date,
        is_running_low: running_low,
    };

    match service.update_pantry_item(id, user_id, &update)? {
        Some(item) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&item)?);
            } else {
                let name = &item.name;
                println!("Updated pantry item {id}: {name}");
            }
            Ok(())
        }
        None => {
            if json {
                println!("{}", json_error(&format!("Pantry item {id} not found")));
            } else {
                eprintln!("Pantry item {id} not found");
            }
            process::exit(2);
        }
    }
}

pub(crate) fn cmd_pantry_remove(
    service: &LarderService,
    user_id: i64,
    id: i64,
    json: bool,
) -> Result<()> {
    if service.remove_pantry_item(id, user_id)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": id }));
        } else {
            println!("Removed pantry item {id}");
        }
        Ok(())
    } else {
        if json {
            println!("{}", json_error(&format!("Pantry item {id} not found")));
        } else {
            eprintln!("Pantry item {id} not found");
        }
        process::exit(2);
    }
}

pub(crate) fn cmd_pantry_expiring(
    service: &LarderService,
    user_id: i64,
    days: i64,
    json: bool,
) -> Result<()> {
    let today = chrono::Local::now().date_naive();
    let items = service.expiring_soon(user_id, today, days)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if items.is_empty() {
        println!("Nothing expires in the next {days} days");
    } else {
        print_pantry_table(&items);
    }
    Ok(())
}
