//! survey-gate - NPS survey distribution and response gateway

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use survey_gate::{
    auth::{hash_password, Role},
    config::Args,
    db::{schemas::UserDoc, MemoryStore, MongoClient, MongoStore, SurveyStore, UserStore},
    logging::{AuditLogger, JsonlAuditSink},
    server, AppState,
};

const DEV_ADMIN_IDENTIFIER: &str = "admin@localhost";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("survey_gate={},info", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.json_logs() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  survey-gate {}", env!("CARGO_PKG_VERSION"));
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Public base URL: {}", args.public_base_url);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {}", args.redacted_mongodb_uri());
    info!(
        "Login limit: {} attempts / {}s, lock {}s",
        args.login_max_attempts, args.login_window_secs, args.login_lock_secs
    );
    info!(
        "Route limit: {} requests / {}s",
        args.route_max_requests, args.route_window_secs
    );
    info!("======================================");

    // MongoDB is optional in dev mode
    let (store, users, backend): (Arc<dyn SurveyStore>, Arc<dyn UserStore>, &'static str) =
        match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(client) => {
                let mongo = Arc::new(MongoStore::new(&client).await?);
                let store: Arc<dyn SurveyStore> = mongo.clone();
                let users: Arc<dyn UserStore> = mongo;
                (store, users, "mongodb")
            }
            Err(e) if args.dev_mode => {
                warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
                let memory = Arc::new(MemoryStore::new());
                let store: Arc<dyn SurveyStore> = memory.clone();
                let users: Arc<dyn UserStore> = memory;
                (store, users, "memory")
            }
            Err(e) => {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        };

    if args.dev_mode {
        if let Some(ref password) = args.dev_admin_password {
            seed_dev_admin(users.as_ref(), password).await;
        }
    }

    let audit = match args.audit_log_path {
        Some(ref path) => AuditLogger::new(Arc::new(JsonlAuditSink::open(path)?)),
        None => AuditLogger::default(),
    };

    let state = Arc::new(AppState::new(args, store, users, backend, audit)?);
    server::run(state).await?;

    Ok(())
}

/// Create the dev admin unless it already exists
async fn seed_dev_admin(users: &dyn UserStore, password: &str) {
    match users.find_user_by_identifier(DEV_ADMIN_IDENTIFIER).await {
        Ok(Some(_)) => return,
        Ok(None) => {}
        Err(e) => {
            warn!("Could not check for dev admin: {}", e);
            return;
        }
    }

    let hash = match hash_password(password) {
        Ok(hash) => hash,
        Err(e) => {
            warn!("Could not hash dev admin password: {}", e);
            return;
        }
    };
    match users
        .create_user(UserDoc::new(DEV_ADMIN_IDENTIFIER.to_string(), hash, Role::Admin))
        .await
    {
        Ok(user) => info!("Seeded dev admin {} ({})", DEV_ADMIN_IDENTIFIER, user.id),
        Err(e) => warn!("Could not seed dev admin: {}", e),
    }
}
