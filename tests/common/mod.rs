// tests/common/mod.rs

use std::sync::Arc;
use std::time::Duration;

use examprep::{
    config::{AttemptPolicy, Config},
    fixtures::{DemoCatalog, demo_catalog},
    routes,
    services::scoring::MarkingScheme,
    state::AppState,
    store::MemoryStore,
    utils::jwt::sign_jwt,
};

pub const JWT_SECRET: &str = "test_secret_for_integration_tests";

pub struct TestApp {
    pub address: String,
    pub demo: DemoCatalog,
    pub client: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub fn token(&self, user_id: i64) -> String {
        sign_jwt(user_id, JWT_SECRET, 600).unwrap()
    }
}

/// Spawns the app on a random port over an in-memory store seeded with the demo catalog.
pub async fn spawn_app() -> TestApp {
    let store = MemoryStore::new();
    let demo = demo_catalog(&store).expect("Failed to seed demo catalog");

    let config = Config {
        database_url: None,
        jwt_secret: JWT_SECRET.to_string(),
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        marking: MarkingScheme::default(),
        attempt_policy: AttemptPolicy::Resume,
        autosave_interval: Duration::from_secs(30),
        seed_demo_data: false,
    };

    let app = routes::create_router(AppState::new(Arc::new(store), config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        demo,
        client: reqwest::Client::new(),
    }
}
