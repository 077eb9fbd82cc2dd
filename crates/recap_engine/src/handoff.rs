use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_debug, engine_info};
use serde_json::Value;

use crate::persist::{PersistError, ResultStore};
use crate::EngineSettings;

/// Moves the user to another screen once results are ready.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Navigator that only records the request in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, route: &str) {
        engine_info!("Results ready at {}", route);
    }
}

/// Persists the final payload, then navigates once after a short delay.
#[derive(Clone)]
pub struct ResultHandoff {
    store: ResultStore,
    navigator: Arc<dyn Navigator>,
    delay: Duration,
    route: String,
}

impl ResultHandoff {
    pub fn new(settings: &EngineSettings, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            store: ResultStore::new(settings.storage_dir.clone(), settings.result_key.clone()),
            navigator,
            delay: settings.navigation_delay,
            route: settings.results_route.clone(),
        }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// Stores `result` when there is one and navigates. Nothing is navigated
    /// to if storing fails.
    pub async fn execute(&self, result: Option<&Value>) -> Result<Option<PathBuf>, PersistError> {
        let stored = match result {
            Some(result) => {
                let path = self.store.save(result)?;
                engine_debug!("Stored result at {}", path.display());
                Some(path)
            }
            None => None,
        };
        tokio::time::sleep(self.delay).await;
        self.navigator.navigate(&self.route);
        Ok(stored)
    }
}
