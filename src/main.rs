use identity_shared::config::{environment::Config, init_db};
use identity_shared::modules::auth::crud::mysql_repositories;
use identity_shared::modules::auth::AuthService;
use identity_shared::services::jwt::JwtService;
use identity_shared::services::sweeper::RetentionSweeper;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "identity_shared=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Failed to load environment configuration");

    let db = init_db(&config.database_url)
        .await
        .expect("Failed to connect to MySQL");
    tracing::info!("Connected to MySQL");

    let repos = mysql_repositories(db);
    let jwt = JwtService::new(&config.jwt_secret);

    let sweeper = RetentionSweeper::new(
        repos.tokens.clone(),
        repos.events.clone(),
        config.policy.event_retention,
    );
    tokio::spawn(sweeper.run());

    let auth = AuthService::new(repos, config.policy.clone(), jwt);
    let app = identity_shared::create_app(auth).await;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind listener");
    tracing::info!("Server running on http://{}", config.bind_addr);
    axum::serve(listener, app).await.unwrap();
}
