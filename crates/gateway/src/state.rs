//! Shared application state for the gateway

use std::sync::Arc;
use std::time::Duration;

use parley_auth::SessionVerifier;
use parley_chats::{MessageStore, RequestLedger, RoomDirectory, StoreLimits};
use parley_config::{AuthConfig, RealtimeConfig, MAX_IDLE_TIMEOUT_SECONDS};
use sqlx::SqlitePool;

use crate::websocket::ConnectionHub;

/// Tuning for live connections, resolved from configuration.
#[derive(Debug, Clone, Copy)]
pub struct LiveSettings {
    pub outbound_buffer: usize,
    pub idle_timeout: Duration,
    /// How often the writer pings the client. Kept well under the idle
    /// timeout so a listening client's pongs hold the connection open.
    pub ping_interval: Duration,
}

impl From<&RealtimeConfig> for LiveSettings {
    fn from(config: &RealtimeConfig) -> Self {
        let idle_timeout = Duration::from_secs(
            config
                .idle_timeout_seconds
                .clamp(1, MAX_IDLE_TIMEOUT_SECONDS),
        );

        Self {
            outbound_buffer: config.outbound_buffer.max(1),
            idle_timeout,
            ping_interval: idle_timeout / 3,
        }
    }
}

/// Services and live state shared by every handler.
#[derive(Clone)]
pub struct GatewayState {
    pub verifier: Arc<dyn SessionVerifier>,
    /// Cookie checked first when extracting a credential.
    pub cookie_name: String,
    pub requests: RequestLedger,
    pub rooms: RoomDirectory,
    pub messages: MessageStore,
    pub hub: ConnectionHub,
    pub live: LiveSettings,
}

impl GatewayState {
    pub fn new(
        pool: SqlitePool,
        verifier: Arc<dyn SessionVerifier>,
        auth: &AuthConfig,
        realtime: &RealtimeConfig,
    ) -> Self {
        Self {
            verifier,
            cookie_name: auth.cookie_name.clone(),
            requests: RequestLedger::new(pool.clone()),
            rooms: RoomDirectory::new(pool.clone()),
            messages: MessageStore::new(pool, StoreLimits::from(realtime)),
            hub: ConnectionHub::new(),
            live: LiveSettings::from(realtime),
        }
    }
}
