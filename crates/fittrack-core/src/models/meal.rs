//! Logged meals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Meal {
    pub id: i64,
    #[serde(default)]
    pub user: Option<String>,
    pub name: String,
    pub calories: u32,
    pub timestamp: DateTime<Utc>,
}

/// Body of `POST /meals/`. The server stamps the current time when
/// `timestamp` is omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMeal {
    pub name: String,
    pub calories: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Body of `PATCH /meals/{id}/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MealPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Sum of calories for meals logged on the given UTC day.
pub fn calories_on(meals: &[Meal], day: chrono::NaiveDate) -> u32 {
    meals
        .iter()
        .filter(|m| m.timestamp.date_naive() == day)
        .map(|m| m.calories)
        .sum()
}
