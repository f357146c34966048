use anyhow::Result;
use std::process;

use larder_core::service::LarderService;

use super::helpers::{date_arg, json_error, print_meal_table};

pub(crate) fn cmd_plan_add(
    service: &LarderService,
    user_id: i64,
    recipe_id: i64,
    date: Option<String>,
    meal: &str,
    json: bool,
) -> Result<()> {
    let date = date_arg(date)?;
    let slot = service.plan_meal(user_id, &date, meal, recipe_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&slot)?);
    } else {
        let meal = &slot.meal_type;
        let when = &slot.meal_date;
        println!("Planned recipe {recipe_id} for {meal} on {when}");
    }
    Ok(())
}

pub(crate) fn cmd_plan_week(
    service: &LarderService,
    user_id: i64,
    start: Option<String>,
    json: bool,
) -> Result<()> {
    let start = date_arg(start)?;
    let meals = service.weekly_plan(user_id, &start)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meals)?);
    } else if meals.is_empty() {
        println!("Nothing planned for the week of {start}");
    } else {
        print_meal_table(&meals);
    }
    Ok(())
}

pub(crate) fn cmd_plan_upcoming(
    service: &LarderService,
    user_id: i64,
    limit: i64,
    json: bool,
) -> Result<()> {
    let today = chrono::Local::now().date_naive();
    let meals = service.upcoming_meals(user_id, today, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meals)?);
    } else if meals.is_empty() {
        println!("No upcoming meals planned");
    } else {
        print_meal_table(&meals);
    }
    Ok(())
}

pub(crate) fn cmd_plan_stats(service: &LarderService, user_id: i64, json: bool) -> Result<()> {
    let today = chrono::Local::now().date_naive();
    let stats = service.meal_plan_stats(user_id, today)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        let total = stats.total_planned_meals;
        let week = stats.this_week_count;
        println!("Planned meals: {total} total, {week} this week");
    }
    Ok(())
}

pub(crate) fn cmd_plan_remove(
    service: &LarderService,
    user_id: i64,
    id: i64,
    json: bool,
) -> Result<()> {
    match service.unplan_meal(id, user_id)? {
        Some(slot) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&slot)?);
            } else {
                let meal = &slot.meal_type;
                let when = &slot.meal_date;
                println!("Removed {meal} on {when} from the plan");
            }
            Ok(())
        }
        None => {
            if json {
                println!("{}", json_error(&format!("Meal slot {id} not found")));
            } else {
                eprintln!("Meal slot {id} not found");
            }
            process::exit(2);
        }
    }
}
