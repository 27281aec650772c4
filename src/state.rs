mod request_id;

use crate::auth::KeyRotator;
use crate::config::AppConfig;
use crate::error::RelayError;
use crate::transport::HttpTransport;

use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub key_rotator: KeyRotator,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport) -> Self {
        Self {
            config,
            transport,
            key_rotator: KeyRotator::new(),
            request_ids: RequestIdGenerator::new(),
        }
    }

    /// Build the transport from `config` and wrap both.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the upstream client cannot be built.
    pub fn from_config(config: AppConfig) -> Result<Self, RelayError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::new(config, transport))
    }

    #[must_use]
    pub fn next_request_id(&self) -> uuid::Uuid {
        self.request_ids.next_id()
    }
}
