use std::sync::Arc;

use chrono::Utc;

use studytrail_engine::config::Config;
use studytrail_engine::store::{PgStore, Store};
use studytrail_engine::{db, seed, Engine};

const USAGE: &str = "Usage: studytrail-jobs <seed | assign-missions [YYYY-MM-DD] | check-streaks>";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studytrail_engine=debug".into()),
        )
        .json()
        .init();

    let mut args = std::env::args().skip(1);
    let Some(command) = args.next() else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let config = Config::from_env();
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations applied");

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    let engine = Engine::new(store.clone());

    match command.as_str() {
        "seed" => {
            seed::run(store.as_ref()).await.expect("Seed failed");
        }
        "assign-missions" => {
            let date = match args.next() {
                Some(raw) => raw.parse().expect("date must be YYYY-MM-DD"),
                None => Utc::now().date_naive(),
            };
            engine
                .missions
                .assign_missions_to_all_users(date)
                .await
                .expect("Mission assignment failed");
        }
        "check-streaks" => {
            engine
                .streaks
                .check_and_break_streaks()
                .await
                .expect("Streak check failed");
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
}
