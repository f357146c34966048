use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use larder_core::models::{PantryItem, PlannedMeal, Recipe, ShoppingItem};

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

pub(crate) fn date_arg(date: Option<String>) -> Result<String> {
    Ok(parse_date(date)?.format("%Y-%m-%d").to_string())
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

pub(crate) fn format_quantity(q: f64) -> String {
    if (q.fract()).abs() < 1e-9 {
        format!("{q:.0}")
    } else {
        format!("{q:.2}")
    }
}

pub(crate) fn print_pantry_table(items: &[PantryItem]) {
    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Qty")]
        quantity: String,
        #[tabled(rename = "Unit")]
        unit: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Expires")]
        expires: String,
        #[tabled(rename = "Low")]
        low: String,
    }

    let rows: Vec<Row> = items
        .iter()
        .map(|i| Row {
            id: i.id,
            name: truncate(&i.name, 30),
            quantity: format_quantity(i.quantity),
            unit: i.unit.clone(),
            category: truncate(&i.category, 20),
            expires: i.expiry_date.clone().unwrap_or_else(|| "-".into()),
            low: if i.is_running_low { "yes".into() } else { "".into() },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_recipe_table(recipes: &[Recipe]) {
    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Cuisine")]
        cuisine: String,
        #[tabled(rename = "Difficulty")]
        difficulty: String,
        #[tabled(rename = "Prep")]
        prep: String,
        #[tabled(rename = "Cook")]
        cook: String,
        #[tabled(rename = "Servings")]
        servings: i64,
    }

    let rows: Vec<Row> = recipes
        .iter()
        .map(|r| Row {
            id: r.id,
            name: truncate(&r.name, 35),
            cuisine: r.cuisine_type.clone().unwrap_or_else(|| "-".into()),
            difficulty: r.difficulty.clone(),
            prep: r.prep_time.map_or("-".into(), |m| format!("{m} min")),
            cook: r.cook_time.map_or("-".into(), |m| format!("{m} min")),
            servings: r.servings,
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn print_meal_table(meals: &[PlannedMeal]) {
    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "Recipe")]
        recipe: String,
        #[tabled(rename = "Prep")]
        prep: String,
        #[tabled(rename = "Cook")]
        cook: String,
    }

    let rows: Vec<Row> = meals
        .iter()
        .map(|m| Row {
            id: m.id,
            date: m.meal_date.clone(),
            meal: m.meal_type.clone(),
            recipe: m
                .recipe_name
                .as_deref()
                .map(|n| truncate(n, 35))
                .unwrap_or_else(|| format!("recipe {}", m.recipe_id)),
            prep: m.prep_time.map_or("-".into(), |t| format!("{t} min")),
            cook: m.cook_time.map_or("-".into(), |t| format!("{t} min")),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn print_shopping_table(items: &[ShoppingItem]) {
    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = " ")]
        checked: String,
        #[tabled(rename = "Item")]
        name: String,
        #[tabled(rename = "Qty")]
        quantity: String,
        #[tabled(rename = "Unit")]
        unit: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Source")]
        source: String,
    }

    let rows: Vec<Row> = items
        .iter()
        .map(|i| Row {
            id: i.id,
            checked: if i.is_checked { "x".into() } else { " ".into() },
            name: truncate(&i.ingredient_name, 30),
            quantity: format_quantity(i.quantity),
            unit: i.unit.clone(),
            category: i
                .category
                .as_deref()
                .map(|c| truncate(c, 20))
                .unwrap_or_default(),
            source: if i.from_meal_plan { "plan".into() } else { "manual".into() },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_none_is_today() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(None).unwrap(), today);
    }

    #[test]
    fn test_parse_date_keywords() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(Some("today".to_string())).unwrap(), today);
        assert_eq!(
            parse_date(Some("yesterday".to_string())).unwrap(),
            today - chrono::Duration::days(1)
        );
        assert_eq!(
            parse_date(Some("tomorrow".to_string())).unwrap(),
            today + chrono::Duration::days(1)
        );
    }

    #[test]
    fn test_parse_date_iso() {
        let date = parse_date(Some("2024-06-03".to_string())).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date(Some("nope".to_string())).is_err());
        assert!(parse_date(Some("03/06/2024".to_string())).is_err());
    }

    #[test]
    fn test_date_arg_formats() {
        assert_eq!(date_arg(Some("2024-06-03".to_string())).unwrap(), "2024-06-03");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
    }

    #[test]
    fn test_truncate_utf8() {
        // Should not panic on multi-byte characters
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
        assert_eq!(truncate("Müsli", 10), "Müsli");
    }

    #[test]
    fn test_format_quantity() {
        assert_eq!(format_quantity(2.0), "2");
        assert_eq!(format_quantity(1.5), "1.50");
        assert_eq!(format_quantity(0.0), "0");
    }

    #[test]
    fn test_json_error_shape() {
        let s = json_error("boom");
        let v: serde_json::Value = serde_json::from_str(&s).unwrap();
        assert_eq!(v["error"], "boom");
    }
}
