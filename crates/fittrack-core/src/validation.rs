//! Local form validation.
//!
//! Forms hold raw text exactly as typed. `validate()` either produces the
//! request body to send or a set of per-field messages; a form that fails
//! validation never reaches the network.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use validator::ValidateEmail;

use crate::models::{LoginRequest, NewGoal, NewMeal, NewMetric, RegisterRequest};

const MIN_USERNAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 8;
const MIN_GOAL_LEN: usize = 5;

/// Formats accepted for timestamps typed without an offset (local time).
const LOCAL_TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

/// Per-field validation messages, one per field.
#[derive(Error, Debug, Clone, Default, PartialEq, Eq)]
#[error("{}", self.summary())]
pub struct FormErrors {
    fields: BTreeMap<&'static str, String>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message; the first message for a field wins.
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.entry(field).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.fields.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// All messages as `field: message` pairs joined for display.
    pub fn summary(&self) -> String {
        self.fields
            .iter()
            .map(|(field, message)| format!("{}: {}", field, message))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T, FormErrors> {
        if self.is_empty() {
            Ok(value())
        } else {
            Err(self)
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Domain part of an address: dotted labels ending in an alphabetic label of
/// two or more letters.
static EMAIL_DOMAIN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@(?:[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?\.)+[A-Za-z]{2,}$")
        .expect("Invalid regex")
});

/// Address check matching the web client's form: a valid address by HTML
/// rules, with a dotted domain and no stray dots in the local part.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, _)) = email.rsplit_once('@') else {
        return false;
    };
    email.validate_email()
        && EMAIL_DOMAIN_REGEX.is_match(email)
        && !local.starts_with('.')
        && !local.ends_with('.')
        && !local.contains("..")
}

/// Parse an optional timestamp field.
///
/// Empty input means "not given". Input with an offset is taken as-is,
/// input without one is read as local time.
pub fn parse_timestamp(input: &str) -> Result<Option<DateTime<Utc>>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }

    for format in LOCAL_TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            if let Some(local) = Local.from_local_datetime(&naive).earliest() {
                return Ok(Some(local.with_timezone(&Utc)));
            }
        }
    }

    Err("Invalid date/time provided for timestamp.".to_string())
}

/// Parse an optional number. Blank means absent; anything unparseable is
/// "Must be a number".
fn parse_optional_number(input: &str) -> Result<Option<f64>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    match input.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(Some(n)),
        _ => Err("Must be a number".to_string()),
    }
}

fn whole_number(value: f64, whole_msg: &str) -> Result<u32, String> {
    if value.fract() != 0.0 {
        return Err(whole_msg.to_string());
    }
    if value > f64::from(u32::MAX) {
        return Err("Value is too large".to_string());
    }
    // Sign is checked by the caller before this cast.
    Ok(value.max(0.0) as u32)
}

// ============================================================================
// Login
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<LoginRequest, FormErrors> {
        let mut errors = FormErrors::new();
        if self.username.is_empty() {
            errors.add("username", "Username is required");
        }
        if self.password.is_empty() {
            errors.add("password", "Password is required");
        }
        errors.into_result(|| LoginRequest {
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Registration form. `password2` is the confirmation field; it is checked
/// here and dropped before anything is sent.
#[derive(Debug, Clone, Default)]
pub struct RegistrationForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password2: String,
    pub first_name: String,
    pub last_name: String,
}

impl RegistrationForm {
    pub fn validate(&self) -> Result<RegisterRequest, FormErrors> {
        let mut errors = FormErrors::new();
        if char_len(&self.username) < MIN_USERNAME_LEN {
            errors.add("username", "Username must be at least 3 characters");
        }
        if !is_valid_email(&self.email) {
            errors.add("email", "Invalid email address");
        }
        if char_len(&self.password) < MIN_PASSWORD_LEN {
            errors.add("password", "Password must be at least 8 characters");
        }
        // Only compared once every field rule passes.
        if errors.is_empty() && self.password != self.password2 {
            errors.add("password2", "Passwords don't match");
        }
        errors.into_result(|| RegisterRequest::from(self.clone()))
    }
}

impl From<RegistrationForm> for RegisterRequest {
    fn from(form: RegistrationForm) -> Self {
        RegisterRequest {
            username: form.username,
            email: non_empty(&form.email),
            password: form.password,
            first_name: non_empty(&form.first_name),
            last_name: non_empty(&form.last_name),
        }
    }
}

// ============================================================================
// Health metric
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MetricForm {
    pub weight: String,
    pub steps: String,
    pub heart_rate: String,
    pub timestamp: String,
}

impl MetricForm {
    pub fn validate(&self) -> Result<NewMetric, FormErrors> {
        let mut errors = FormErrors::new();

        let weight = match parse_optional_number(&self.weight) {
            Ok(Some(w)) if w <= 0.0 => {
                errors.add("weight", "Weight must be positive");
                None
            }
            Ok(w) => w,
            Err(msg) => {
                errors.add("weight", msg);
                None
            }
        };

        let steps = match parse_optional_number(&self.steps) {
            Ok(Some(s)) => match whole_number(s, "Steps must be a whole number") {
                Ok(_) if s < 0.0 => {
                    errors.add("steps", "Steps cannot be negative");
                    None
                }
                Ok(s) => Some(s),
                Err(msg) => {
                    errors.add("steps", msg);
                    None
                }
            },
            Ok(None) => None,
            Err(msg) => {
                errors.add("steps", msg);
                None
            }
        };

        let heart_rate = match parse_optional_number(&self.heart_rate) {
            Ok(Some(h)) => match whole_number(h, "Heart rate must be a whole number") {
                Ok(_) if h <= 0.0 => {
                    errors.add("heart_rate", "Heart rate must be positive");
                    None
                }
                Ok(h) => Some(h),
                Err(msg) => {
                    errors.add("heart_rate", msg);
                    None
                }
            },
            Ok(None) => None,
            Err(msg) => {
                errors.add("heart_rate", msg);
                None
            }
        };

        let timestamp = parse_timestamp(&self.timestamp).unwrap_or_else(|msg| {
            errors.add("timestamp", msg);
            None
        });

        if errors.is_empty() && weight.is_none() && steps.is_none() && heart_rate.is_none() {
            errors.add(
                "weight",
                "At least one metric (Weight, Steps, or Heart Rate) must be provided.",
            );
        }

        errors.into_result(|| NewMetric {
            weight,
            steps,
            heart_rate,
            timestamp,
        })
    }
}

// ============================================================================
// Meal
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MealForm {
    pub name: String,
    pub calories: String,
    pub timestamp: String,
}

impl MealForm {
    pub fn validate(&self) -> Result<NewMeal, FormErrors> {
        let mut errors = FormErrors::new();
        if self.name.is_empty() {
            errors.add("name", "Meal name is required");
        }

        // A blank calories field counts as zero, which then fails the
        // positivity check.
        let calories_input = self.calories.trim();
        let calories = if calories_input.is_empty() {
            Ok(0.0)
        } else {
            calories_input
                .parse::<f64>()
                .ok()
                .filter(|c| c.is_finite())
                .ok_or_else(|| "Calories must be a number".to_string())
        };
        let calories = match calories {
            Ok(c) => match whole_number(c, "Calories must be a whole number") {
                Ok(_) if c <= 0.0 => {
                    errors.add("calories", "Calories must be positive");
                    0
                }
                Ok(c) => c,
                Err(msg) => {
                    errors.add("calories", msg);
                    0
                }
            },
            Err(msg) => {
                errors.add("calories", msg);
                0
            }
        };

        let timestamp = parse_timestamp(&self.timestamp).unwrap_or_else(|msg| {
            errors.add("timestamp", msg);
            None
        });

        errors.into_result(|| NewMeal {
            name: self.name.clone(),
            calories,
            timestamp,
        })
    }
}

// ============================================================================
// Goal
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct GoalForm {
    pub goal_text: String,
}

impl GoalForm {
    pub fn validate(&self) -> Result<NewGoal, FormErrors> {
        let mut errors = FormErrors::new();
        if char_len(&self.goal_text) < MIN_GOAL_LEN {
            errors.add(
                "goal_text",
                "Goal description must be at least 5 characters",
            );
        }
        errors.into_result(|| NewGoal {
            goal_text: self.goal_text.clone(),
        })
    }
}
