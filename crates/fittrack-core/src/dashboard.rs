//! Dashboard data and the authenticated data operations behind it.
//!
//! `Tracker` runs metric, meal and goal calls on behalf of the signed-in
//! user. When one of them comes back 401 it asks the session to expire,
//! passing the session generation captured before the call, so a stale
//! rejection can't end a newer session.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError, ApiResult};
use crate::auth::SessionManager;
use crate::models::{
    FitnessGoal, HealthMetric, Meal, MealPatch, MetricPatch, NewGoal, NewMeal, NewMetric,
};

const AUTH_ERROR_MESSAGE: &str = "Authentication error. Please log in again.";
const LOAD_ERROR_MESSAGE: &str = "Failed to load dashboard data. Please try again later.";

/// Everything the dashboard shows, newest first as the server orders it.
#[derive(Debug, Clone, Default)]
pub struct Dashboard {
    pub metrics: Vec<HealthMetric>,
    pub meals: Vec<Meal>,
    pub goals: Vec<FitnessGoal>,
}

impl Dashboard {
    pub fn chart(&self) -> Vec<ChartPoint> {
        chart_series(&self.metrics)
    }

    pub fn open_goals(&self) -> impl Iterator<Item = &FitnessGoal> {
        self.goals.iter().filter(|g| !g.completed)
    }
}

/// One point on the metrics line chart. Missing readings stay missing so
/// the chart skips them instead of plotting zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub timestamp: DateTime<Utc>,
    /// Short axis label, e.g. "Mar 4".
    pub label: String,
    pub weight: Option<f64>,
    pub steps: Option<u32>,
    pub heart_rate: Option<u32>,
}

/// Chart series for a set of readings, oldest first.
pub fn chart_series(metrics: &[HealthMetric]) -> Vec<ChartPoint> {
    let mut sorted: Vec<&HealthMetric> = metrics.iter().collect();
    sorted.sort_by_key(|m| m.timestamp);
    sorted
        .into_iter()
        .map(|m| ChartPoint {
            timestamp: m.timestamp,
            label: m.timestamp.format("%b %-d").to_string(),
            weight: m.weight,
            steps: m.steps,
            heart_rate: m.heart_rate,
        })
        .collect()
}

/// Message to show when a data call fails.
pub fn user_message(err: &ApiError) -> String {
    match err {
        ApiError::Unauthorized => AUTH_ERROR_MESSAGE.to_string(),
        ApiError::Rejected(errors) => errors.to_string(),
        _ => LOAD_ERROR_MESSAGE.to_string(),
    }
}

pub struct Tracker {
    session: Arc<SessionManager>,
}

impl Tracker {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    fn api(&self) -> &ApiClient {
        self.session.api()
    }

    /// Run a data call and end the session if the server rejects the token.
    async fn authorized<T, F>(&self, call: F) -> ApiResult<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        let epoch = self.session.epoch();
        let result = call.await;
        if let Err(ApiError::Unauthorized) = &result {
            if !self.session.expire(epoch) {
                debug!("401 from an older session, ignoring");
            }
        }
        result
    }

    /// Fetch metrics, meals and goals concurrently.
    pub async fn load_dashboard(&self) -> ApiResult<Dashboard> {
        let api = self.api();
        let result = self
            .authorized(async {
                futures::try_join!(api.list_metrics(), api.list_meals(), api.list_goals())
            })
            .await;

        match result {
            Ok((metrics, meals, goals)) => {
                debug!(
                    metrics = metrics.len(),
                    meals = meals.len(),
                    goals = goals.len(),
                    "Dashboard loaded"
                );
                Ok(Dashboard {
                    metrics,
                    meals,
                    goals,
                })
            }
            Err(e) => {
                warn!(error = %e, "Error fetching dashboard data");
                Err(e)
            }
        }
    }

    pub async fn add_metric(&self, metric: &NewMetric) -> ApiResult<HealthMetric> {
        self.authorized(self.api().create_metric(metric)).await
    }

    pub async fn update_metric(&self, id: i64, patch: &MetricPatch) -> ApiResult<HealthMetric> {
        self.authorized(self.api().update_metric(id, patch)).await
    }

    pub async fn delete_metric(&self, id: i64) -> ApiResult<()> {
        self.authorized(self.api().delete_metric(id)).await
    }

    pub async fn add_meal(&self, meal: &NewMeal) -> ApiResult<Meal> {
        self.authorized(self.api().create_meal(meal)).await
    }

    pub async fn update_meal(&self, id: i64, patch: &MealPatch) -> ApiResult<Meal> {
        self.authorized(self.api().update_meal(id, patch)).await
    }

    pub async fn delete_meal(&self, id: i64) -> ApiResult<()> {
        self.authorized(self.api().delete_meal(id)).await
    }

    pub async fn add_goal(&self, goal: &NewGoal) -> ApiResult<FitnessGoal> {
        self.authorized(self.api().create_goal(goal)).await
    }

    pub async fn get_goal(&self, id: i64) -> ApiResult<FitnessGoal> {
        self.authorized(self.api().get_goal(id)).await
    }

    /// Flip a goal between open and completed.
    pub async fn toggle_goal(&self, goal: &FitnessGoal) -> ApiResult<FitnessGoal> {
        self.authorized(self.api().update_goal(goal.id, &goal.toggle_patch()))
            .await
    }

    pub async fn delete_goal(&self, id: i64) -> ApiResult<()> {
        self.authorized(self.api().delete_goal(id)).await
    }
}
