//! CLI command implementations.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tracing::{info, warn};

use fittrack_core::dashboard::user_message;
use fittrack_core::models::UserProfile;
use fittrack_core::validation::{
    FormErrors, GoalForm, LoginForm, MealForm, MetricForm, RegistrationForm,
};
use fittrack_core::{guard, ApiError, AuthError, Config, RouteDecision, SessionManager, Tracker};

use crate::render;
use crate::{Commands, GoalCommands, MealCommands, MetricCommands};

const USERNAME_ENV: &str = "FITTRACK_USERNAME";
const PASSWORD_ENV: &str = "FITTRACK_PASSWORD";

pub async fn run(command: Commands, config: &mut Config, session: Arc<SessionManager>) -> Result<()> {
    match command {
        Commands::Login { username } => login(config, &session, username).await,
        Commands::Register {
            username,
            email,
            first_name,
            last_name,
        } => {
            let form = RegistrationForm {
                username,
                email,
                password: String::new(),
                password2: String::new(),
                first_name: first_name.unwrap_or_default(),
                last_name: last_name.unwrap_or_default(),
            };
            register(config, &session, form).await
        }
        Commands::Logout => {
            logout(&session);
            Ok(())
        }
        Commands::Whoami => {
            let user = require_user(&session)?;
            render::profile(&user);
            Ok(())
        }
        Commands::Dashboard => {
            require_user(&session)?;
            let tracker = Tracker::new(session);
            let dashboard = tracker.load_dashboard().await.map_err(data_error)?;
            render::dashboard(&dashboard);
            Ok(())
        }
        Commands::Metric { command } => {
            require_user(&session)?;
            metric(&Tracker::new(session), command).await
        }
        Commands::Meal { command } => {
            require_user(&session)?;
            meal(&Tracker::new(session), command).await
        }
        Commands::Goal { command } => {
            require_user(&session)?;
            goal(&Tracker::new(session), command).await
        }
    }
}

/// The signed-in user, or an error telling the caller to log in first.
fn require_user(session: &SessionManager) -> Result<UserProfile> {
    let snapshot = session.current();
    match guard(&snapshot) {
        RouteDecision::Allow => snapshot
            .user
            .ok_or_else(|| anyhow!("Not logged in. Run `fittrack login` first.")),
        RouteDecision::RedirectToLogin => bail!("Not logged in. Run `fittrack login` first."),
        RouteDecision::Wait => bail!("Session is still loading, try again."),
    }
}

// ==================== Session Commands ====================

async fn login(config: &mut Config, session: &SessionManager, username: Option<String>) -> Result<()> {
    let username = match username.or_else(|| env_value(USERNAME_ENV)) {
        Some(username) => username,
        None => prompt_username(config.last_username.as_deref())?,
    };
    let password = match env_value(PASSWORD_ENV) {
        Some(password) => password,
        None => rpassword::prompt_password("Password: ")?,
    };

    let credentials = LoginForm { username, password }
        .validate()
        .map_err(form_error)?;

    eprintln!("Authenticating...");
    let user = session.login(&credentials).await.map_err(auth_error)?;
    remember_username(config, &user.username);

    println!("Logged in as {}", user.display_name());
    Ok(())
}

async fn register(config: &mut Config, session: &SessionManager, mut form: RegistrationForm) -> Result<()> {
    match env_value(PASSWORD_ENV) {
        Some(password) => {
            form.password2 = password.clone();
            form.password = password;
        }
        None => {
            form.password = rpassword::prompt_password("Password: ")?;
            form.password2 = rpassword::prompt_password("Confirm password: ")?;
        }
    }

    let payload = form.validate().map_err(form_error)?;

    let user = session.register(&payload).await.map_err(auth_error)?;
    remember_username(config, &user.username);

    println!("Account created. Logged in as {}", user.display_name());
    Ok(())
}

fn logout(session: &SessionManager) {
    let was_signed_in = session.current().is_authenticated();
    session.logout();
    if was_signed_in {
        println!("Logged out");
    } else {
        println!("Not logged in");
    }
}

fn remember_username(config: &mut Config, username: &str) {
    config.last_username = Some(username.to_string());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn prompt_username(last: Option<&str>) -> Result<String> {
    match last {
        Some(last) => print!("Username [{}]: ", last),
        None => print!("Username: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    Ok(match (input.is_empty(), last) {
        (true, Some(last)) => last.to_string(),
        _ => input.to_string(),
    })
}

// ==================== Data Commands ====================

async fn metric(tracker: &Tracker, command: MetricCommands) -> Result<()> {
    match command {
        MetricCommands::Add {
            weight,
            steps,
            heart_rate,
            at,
        } => {
            let form = MetricForm {
                weight: weight.unwrap_or_default(),
                steps: steps.unwrap_or_default(),
                heart_rate: heart_rate.unwrap_or_default(),
                timestamp: at.unwrap_or_default(),
            };
            let new_metric = form.validate().map_err(form_error)?;
            let saved = tracker.add_metric(&new_metric).await.map_err(data_error)?;
            info!(id = saved.id, "Metric recorded");
            println!("Recorded metric #{}", saved.id);
            render::metric_line(&saved);
        }
        MetricCommands::Delete { id } => {
            tracker.delete_metric(id).await.map_err(data_error)?;
            println!("Deleted metric #{}", id);
        }
    }
    Ok(())
}

async fn meal(tracker: &Tracker, command: MealCommands) -> Result<()> {
    match command {
        MealCommands::Add { name, calories, at } => {
            let form = MealForm {
                name,
                calories,
                timestamp: at.unwrap_or_default(),
            };
            let new_meal = form.validate().map_err(form_error)?;
            let saved = tracker.add_meal(&new_meal).await.map_err(data_error)?;
            info!(id = saved.id, "Meal logged");
            println!("Logged meal #{}", saved.id);
            render::meal_line(&saved);
        }
        MealCommands::Delete { id } => {
            tracker.delete_meal(id).await.map_err(data_error)?;
            println!("Deleted meal #{}", id);
        }
    }
    Ok(())
}

async fn goal(tracker: &Tracker, command: GoalCommands) -> Result<()> {
    match command {
        GoalCommands::Add { text } => {
            let new_goal = GoalForm { goal_text: text }.validate().map_err(form_error)?;
            let saved = tracker.add_goal(&new_goal).await.map_err(data_error)?;
            println!("Added goal #{}", saved.id);
            render::goal_line(&saved);
        }
        GoalCommands::Toggle { id } => {
            let current = tracker.get_goal(id).await.map_err(data_error)?;
            let updated = tracker.toggle_goal(&current).await.map_err(data_error)?;
            if updated.completed {
                println!("Goal #{} completed", id);
            } else {
                println!("Goal #{} reopened", id);
            }
            render::goal_line(&updated);
        }
        GoalCommands::Delete { id } => {
            tracker.delete_goal(id).await.map_err(data_error)?;
            println!("Deleted goal #{}", id);
        }
    }
    Ok(())
}

// ==================== Error Reporting ====================

fn form_error(errors: FormErrors) -> anyhow::Error {
    for (field, message) in errors.iter() {
        eprintln!("  {}: {}", field, message);
    }
    anyhow!("Please fix the errors above")
}

fn auth_error(err: AuthError) -> anyhow::Error {
    match err {
        AuthError::Rejected(errors) => {
            for message in errors.form_messages() {
                eprintln!("  {}", message);
            }
            for (field, message) in errors.field_messages() {
                eprintln!("  {}: {}", field, message);
            }
            anyhow!("The server rejected the request")
        }
        other => anyhow!(other),
    }
}

fn data_error(err: ApiError) -> anyhow::Error {
    warn!(error = %err, kind = err.kind().as_str(), "Request failed");
    anyhow!(user_message(&err))
}
