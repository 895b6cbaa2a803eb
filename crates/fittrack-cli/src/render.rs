//! Plain-text rendering of profiles, dashboard data and saved records.

use chrono::Utc;

use fittrack_core::models::{calories_on, FitnessGoal, HealthMetric, Meal, UserProfile};
use fittrack_core::utils::{format_optional, format_timestamp, format_weight, truncate_string};
use fittrack_core::Dashboard;

const NAME_WIDTH: usize = 30;
const GOAL_WIDTH: usize = 60;

pub fn profile(user: &UserProfile) {
    println!("{} (#{})", user.display_name(), user.id);
    println!("  Username: {}", user.username);
    if !user.email.is_empty() {
        println!("  Email:    {}", user.email);
    }
}

pub fn dashboard(dashboard: &Dashboard) {
    println!("Health Metrics");
    println!("==============");
    if dashboard.metrics.is_empty() {
        println!("No health metrics recorded yet.");
    } else {
        for metric in &dashboard.metrics {
            metric_line(metric);
        }
        println!();
        println!("Trend");
        for point in dashboard.chart() {
            println!(
                "  {:<7} weight {:>7}  steps {:>6}  hr {:>4}",
                point.label,
                format_optional(point.weight.map(format_weight), "-"),
                format_optional(point.steps, "-"),
                format_optional(point.heart_rate, "-"),
            );
        }
    }

    println!();
    println!("Meals");
    println!("=====");
    if dashboard.meals.is_empty() {
        println!("No meals logged yet.");
    } else {
        for meal in &dashboard.meals {
            meal_line(meal);
        }
        let today = Utc::now().date_naive();
        println!("  Calories today: {}", calories_on(&dashboard.meals, today));
    }

    println!();
    println!("Fitness Goals");
    println!("=============");
    if dashboard.goals.is_empty() {
        println!("No goals set yet.");
    } else {
        for goal in &dashboard.goals {
            goal_line(goal);
        }
        println!(
            "  {} open, {} completed",
            dashboard.open_goals().count(),
            dashboard.goals.iter().filter(|g| g.completed).count()
        );
    }
}

pub fn metric_line(metric: &HealthMetric) {
    println!(
        "  #{:<5} {}  weight {:>7}  steps {:>6}  hr {:>4}",
        metric.id,
        format_timestamp(&metric.timestamp),
        format_optional(metric.weight.map(format_weight), "-"),
        format_optional(metric.steps, "-"),
        format_optional(metric.heart_rate, "-"),
    );
}

pub fn meal_line(meal: &Meal) {
    println!(
        "  #{:<5} {}  {:<width$} {:>5} kcal",
        meal.id,
        format_timestamp(&meal.timestamp),
        truncate_string(&meal.name, NAME_WIDTH),
        meal.calories,
        width = NAME_WIDTH,
    );
}

pub fn goal_line(goal: &FitnessGoal) {
    let mark = if goal.completed { "x" } else { " " };
    let done = goal
        .completed_at
        .map(|ts| format!("  (done {})", format_timestamp(&ts)))
        .unwrap_or_default();
    println!(
        "  #{:<5} [{}] {}{}",
        goal.id,
        mark,
        truncate_string(&goal.goal_text, GOAL_WIDTH),
        done
    );
}
