//! Periodic polling of a Pi-hole's statistics

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use ha_config_entries::SetupFailure;

use crate::api::{DataResponse, HoleError, PiHoleApi, Summary};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpdateError {
    #[error("Failed to communicate with API: {0}")]
    Failed(#[from] HoleError),

    #[error("API data is not a record")]
    AuthFailed,
}

impl From<UpdateError> for SetupFailure {
    fn from(err: UpdateError) -> Self {
        match err {
            UpdateError::AuthFailed => SetupFailure::AuthFailed(err.to_string()),
            UpdateError::Failed(_) => SetupFailure::NotReady(err.to_string()),
        }
    }
}

/// Caches the latest summary of one Pi-hole
pub struct Coordinator {
    name: String,
    api: Arc<dyn PiHoleApi>,
    update_interval: Duration,
    data: RwLock<Option<Summary>>,
}

impl Coordinator {
    pub fn new(name: impl Into<String>, api: Arc<dyn PiHoleApi>, update_interval: Duration) -> Self {
        Self {
            name: name.into(),
            api,
            update_interval,
            data: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latest successfully fetched summary
    pub async fn data(&self) -> Option<Summary> {
        self.data.read().await.clone()
    }

    /// Fetch data from API endpoint
    pub async fn refresh(&self) -> Result<Summary, UpdateError> {
        debug!(name = %self.name, "Updating data from Pi-hole API");
        match self.api.get_data().await {
            Ok(DataResponse::Record(summary)) => {
                *self.data.write().await = Some(summary.clone());
                Ok(summary)
            }
            Ok(DataResponse::AuthRequired) => {
                debug!("API data is not a record");
                Err(UpdateError::AuthFailed)
            }
            Err(err) => {
                error!("Failed to communicate with API: {}", err);
                Err(err.into())
            }
        }
    }

    /// First refresh during entry setup
    pub async fn first_refresh(&self) -> Result<(), SetupFailure> {
        self.refresh().await.map(|_| ()).map_err(SetupFailure::from)
    }

    /// Refresh every `update_interval` until credentials are rejected
    /// or the handle is aborted
    ///
    /// `on_auth_failed` runs once after the Pi-hole rejected the credentials.
    pub fn spawn_polling<F>(self: &Arc<Self>, on_auth_failed: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(coordinator.update_interval);
            // The first tick completes immediately; setup already refreshed
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(UpdateError::AuthFailed) = coordinator.refresh().await {
                    warn!(
                        name = %coordinator.name,
                        "Pi-hole rejected the credentials, stopping updates until reauthenticated"
                    );
                    break;
                }
            }
            on_auth_failed.await;
        })
    }
}
