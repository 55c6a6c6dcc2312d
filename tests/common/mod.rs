
use axum_test::TestServer;
use std::sync::Arc;

use identity_shared::config::SecurityPolicy;
use identity_shared::modules::auth::AuthService;
use identity_shared::services::jwt::JwtService;

use memory::MemoryRepository;

// Allow dead_code for utilities used by other test files
#[allow(dead_code)]
pub struct TestContext {
    pub server: TestServer,
    pub repo: Arc<MemoryRepository>,
    pub auth: AuthService,
}

#[allow(dead_code)]
impl TestContext {
    pub async fn new() -> Self {
        Self::with_policy(SecurityPolicy::default()).await
    }

    pub async fn with_policy(policy: SecurityPolicy) -> Self {
        let repo = Arc::new(MemoryRepository::default());
        let jwt = JwtService::new("test-secret-key-for-testing-only");
        let auth = AuthService::new(repo.clone().into_repositories(), policy, jwt);

        let app = identity_shared::create_app(auth.clone()).await;
        let server = TestServer::new(app).expect("Failed to create test server");

        Self { server, repo, auth }
    }
}

// Helper to generate unique test email
#[allow(dead_code)]
pub fn test_email() -> String {
    format!("test_{}@example.com", uuid::Uuid::new_v4())
}

// Helper to generate test password
#[allow(dead_code)]
pub fn test_password() -> &'static str {
    "TestPassword123!"
}
