#![allow(dead_code)]

use std::sync::Arc;

use parley_auth::{Authenticator, Identity};
use parley_chats::ChatRoom;
use parley_config::{AuthConfig, DatabaseConfig, RealtimeConfig};
use parley_gateway::GatewayState;
use tempfile::TempDir;

pub const TEST_SECRET: &str = "gateway_test_secret_long_enough_for_hs256";

pub struct TestContext {
    pub state: GatewayState,
    pub authenticator: Authenticator,
    _temp_dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_realtime(RealtimeConfig::default()).await
    }

    pub async fn with_realtime(realtime: RealtimeConfig) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let database = DatabaseConfig {
            url: format!("sqlite://{}", temp_dir.path().join("gateway.db").display()),
            max_connections: 4,
        };
        let pool = parley_database::initialize_database(&database).await.unwrap();

        let auth = AuthConfig {
            jwt_secret: TEST_SECRET.into(),
            ..AuthConfig::default()
        };
        let authenticator = Authenticator::new(&auth);
        let state = GatewayState::new(pool, Arc::new(authenticator.clone()), &auth, &realtime);

        Self {
            state,
            authenticator,
            _temp_dir: temp_dir,
        }
    }

    pub fn token(&self, identity: &str) -> String {
        self.authenticator
            .issue_token(&Identity::from(identity))
            .unwrap()
    }

    pub fn token_with_ttl(&self, identity: &str, ttl: chrono::Duration) -> String {
        self.authenticator
            .issue_token_with_ttl(&Identity::from(identity), ttl)
            .unwrap()
    }

    /// Submit and accept a request between `sender` and `receiver`.
    pub async fn open_room(&self, sender: &str, receiver: &str) -> ChatRoom {
        let request = self
            .state
            .requests
            .submit(&Identity::from(sender), &Identity::from(receiver))
            .await
            .unwrap();
        let resolution = self
            .state
            .requests
            .resolve(
                &request.public_id,
                &Identity::from(receiver),
                parley_chats::Decision::Accept,
            )
            .await
            .unwrap();
        resolution.room.unwrap()
    }
}
