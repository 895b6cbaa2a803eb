//! Data models for fittrack entities.
//!
//! This module contains the structures exchanged with the fittrack API:
//!
//! - `UserProfile` and the login/registration wire types
//! - `HealthMetric`: weight, steps and heart rate readings
//! - `Meal`: logged meals with calories
//! - `FitnessGoal`: free-text goals with completion tracking

pub mod goal;
pub mod meal;
pub mod metric;
pub mod user;

pub use goal::{FitnessGoal, GoalPatch, NewGoal};
pub use meal::{calories_on, Meal, MealPatch, NewMeal};
pub use metric::{HealthMetric, MetricPatch, NewMetric};
pub use user::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, UserProfile};
