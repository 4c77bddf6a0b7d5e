// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use mocktest::bank::JsonDirBank;
use mocktest::cache::{FileCache, LocalCache, MemoryCache};
use mocktest::config::Config;
use mocktest::routes;
use mocktest::state::AppState;
use mocktest::store::{Filter, PgStore, RemoteStore, Table, encode};
use mocktest::utils::password::hash_password;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load configuration from environment (.env included)
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Initialize Database Pool with Retry
    let mut retry_count = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to connect to database after 5 retries: {}", e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    // Run Migrations Automatically
    tracing::info!("Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations applied successfully.");

    let store: Arc<dyn RemoteStore> = Arc::new(PgStore::new(pool));

    // Seed Admin User
    if let Err(e) = seed_admin_user(store.as_ref(), &config).await {
        tracing::error!("Failed to seed admin user: {:?}", e);
    }

    let file_cache = config.local_cache_path.as_ref().map(|path| {
        tracing::info!("Local session cache at {:?}", path);
        Arc::new(FileCache::open(path))
    });
    let flusher = file_cache.as_ref().map(|cache| {
        cache.spawn_flusher(Duration::from_millis(config.local_cache_flush_ms.max(10)))
    });
    let cache: Arc<dyn LocalCache> = match &file_cache {
        Some(cache) => cache.clone(),
        None => Arc::new(MemoryCache::new()),
    };
    let bank = Arc::new(JsonDirBank::new(config.question_bank_dir.clone()));

    let state = AppState::new(store, cache, bank, config.clone());
    let hub = state.hub.clone();

    // Create the Axum application router
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind listening address");
    tracing::info!("Listening on {}", config.bind_addr);

    // Start the server
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down...");
        })
        .await
        .expect("Server error");

    hub.shutdown();
    if let Some(flusher) = flusher {
        flusher.abort();
    }
    if let Some(cache) = file_cache {
        match cache.flush() {
            Ok(()) => tracing::info!("Local session cache flushed."),
            Err(e) => tracing::error!("Failed to flush local session cache: {}", e),
        }
    }
}

async fn seed_admin_user(
    store: &dyn RemoteStore,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    if let (Some(register_no), Some(password)) = (&config.admin_register_no, &config.admin_password)
    {
        let user_exists = store
            .select_one(Table::Users, &Filter::new().eq("register_no", register_no.as_str()))
            .await?;

        if user_exists.is_none() {
            tracing::info!("Seeding admin user: {}", register_no);
            let hashed_password = hash_password(password)?;

            let row = encode(
                Table::Users,
                &json!({
                    "register_no": register_no,
                    "password": hashed_password,
                    "student_name": "Administrator",
                    "is_admin": true,
                }),
            )?;
            store.insert(Table::Users, row).await?;
            tracing::info!("Admin user created successfully.");
        }
    }
    Ok(())
}
