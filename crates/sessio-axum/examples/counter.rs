//! Visit counter with login and logout
//!
//! ```sh
//! RUST_LOG=sessio=debug cargo run -p sessio-axum --example counter
//! curl -c jar -b jar localhost:3000/
//! curl -c jar -b jar localhost:3000/login/ada
//! curl -c jar -b jar localhost:3000/logout
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use sessio::config::SessionConfig;
use sessio::web::store::MemoryStore;
use sessio_axum::{Auth, Authenticator, CurrentSession, SessionLayer};
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct Users;

impl Authenticator for Users {
    type User = String;
    type Error = (StatusCode, &'static str);

    async fn authenticate(&self, user_id: &str) -> Result<String, Self::Error> {
        Ok(user_id.to_uppercase())
    }

    fn unauthenticated() -> Self::Error {
        (StatusCode::UNAUTHORIZED, "log in first")
    }
}

async fn count(session: CurrentSession) -> String {
    let visits = session.get_as::<u64>("visits").ok().flatten().unwrap_or(0) + 1;
    session.set("visits", visits);
    format!("visit #{visits}")
}

async fn login(session: CurrentSession, Path(user): Path<String>) -> Result<String, StatusCode> {
    session
        .regenerate()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    session.authenticate(user.clone());
    Ok(format!("logged in as {user}"))
}

async fn logout(session: Option<CurrentSession>) -> &'static str {
    if let Some(session) = session {
        session.destroy();
    }
    "bye"
}

async fn me(user: Auth<Users>) -> String {
    format!("you are {}", *user)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let store = Arc::new(MemoryStore::new());
    let config = SessionConfig::new("change-me-in-production")
        .with_ttl(Duration::from_secs(15 * 60))
        .with_auto_renew(true);
    let layer = SessionLayer::with_shared_store(Arc::clone(&store), config)?;

    let sweeper = Arc::clone(&store);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let evicted = sweeper.cleanup_expired();
            if evicted > 0 {
                tracing::info!(evicted, "expired sessions removed");
            }
        }
    });

    let app = Router::new()
        .route("/", get(count))
        .route("/login/{user}", get(login))
        .route("/logout", get(logout))
        .route("/me", get(me))
        .layer(layer)
        .with_state(Users);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
