//! Rollcall tracks weekday-group attendance with audit trails and reminders.

#[forbid(unsafe_code)]
#[deny(missing_docs, unused_mut)]
mod crypto;
mod attendance;
mod database;
pub mod error;
mod notify;
mod router;
pub mod scheduler;
mod token;
mod user;

pub mod config;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::Router;
use error::ServerError;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    token: Option<&str>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    dbg!(&token, &method, path, &body);

    app.oneshot(
        Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, token.unwrap_or_default())
            .body(axum::body::Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub users: Arc<dyn user::UserStore>,
    pub attendance: Arc<dyn attendance::AttendanceStore>,
    pub crypto: Arc<crypto::PasswordManager>,
    pub token: token::TokenManager,
    pub notify: notify::Notifier,
}

impl AppState {
    /// User manager over the configured store.
    pub fn user_service(&self) -> user::UserService {
        user::UserService::new(
            Arc::clone(&self.users),
            Arc::clone(&self.crypto),
        )
    }

    /// Attendance writer over the configured stores.
    pub fn marking(&self) -> attendance::MarkingEngine {
        attendance::MarkingEngine::new(
            Arc::clone(&self.users),
            Arc::clone(&self.attendance),
            self.notify.clone(),
        )
    }

    /// Attendance aggregates over the configured stores.
    pub fn analytics(&self) -> attendance::Analytics {
        attendance::Analytics::new(
            Arc::clone(&self.users),
            Arc::clone(&self.attendance),
        )
    }

    /// Midnight closer for the previous group day.
    pub fn absence_sweep(&self) -> attendance::AbsenceSweep {
        attendance::AbsenceSweep::new(
            Arc::clone(&self.users),
            Arc::clone(&self.attendance),
            self.notify.clone(),
        )
    }

    /// Hourly reminder dispatcher.
    pub fn reminder_sweep(&self) -> attendance::ReminderSweep {
        attendance::ReminderSweep::new(
            Arc::clone(&self.users),
            self.notify.clone(),
        )
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true). level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new(). include_headers(true). latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `GET /status. json` goes to `status`.
        .route("/status.json", get(router::status::status))
        // `POST /register` goes to `register`.
        .route("/register", post(router::register::handler))
        // `POST /login` goes to `login`.
        .route("/login", post(router::login::handler))
        .nest("/users", router::users::router(state.clone()))
        .nest("/attendance", router::attendance::router(state.clone()))
        .with_state(state)
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>>
{
    // read configuration file.  let it in memory.
    let config = config::Configuration::default().read();

    let db = match config.postgres {
        Some(ref config) => {
            database::Database::new(
                &config.address,
                &config
                    .username
                    .clone()
                    .unwrap_or(database::DEFAULT_CREDENTIALS.into()),
                &config
                    .password
                    .clone()
                    .unwrap_or(database::DEFAULT_CREDENTIALS.into()),
                &config
                    .database
                    .clone()
                    .unwrap_or(database::DEFAULT_DATABASE_NAME.into()),
                config.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
            )
            .await?
        },
        None => {
            tracing::error!("missing `postgres` entry on `config. yaml` file");
            std::process::exit(0);
        },
    };

    // execute migrations scripts on start.
    sqlx::migrate!().run(&db.postgres).await?;

    let users: Arc<dyn user::UserStore> =
        Arc::new(user::PgUserStore::new(db.postgres.clone()));
    let attendance: Arc<dyn attendance::AttendanceStore> =
        Arc::new(attendance::PgAttendanceStore::new(db.postgres.clone()));

    let crypto = Arc::new(crypto::PasswordManager::new(config.argon2.clone())?);

    // handle jwt.
    let Some(token_config) = &config.token else {
        tracing::warn!("missing `token` entry on `config.yaml` file");
        std::process::exit(0);
    };
    let secret = match &token_config.secret {
        Some(secret) => secret.clone(),
        None => std::env::var("TOKEN_SECRET")
            .expect("missing `TOKEN_SECRET` environnement variable"),
    };
    let name = if config.name.is_empty() {
        env!("CARGO_CRATE_NAME")
    } else {
        config.name.as_str()
    };
    let mut token = token::TokenManager::new(name, &secret);

    if let Some(audience) = &token_config.audience {
        token.audience(audience);
    }

    // handle notification events.
    let notify = if let Some(cfg) = &config.amqp {
        notify::Notifier::new(cfg).await?
    } else {
        notify::Notifier::default()
    };

    Ok(AppState {
        config: Arc::clone(&config),
        users,
        attendance,
        crypto,
        token,
        notify,
    })
}
