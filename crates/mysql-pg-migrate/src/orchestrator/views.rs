//! Temporary source views.

use tracing::{debug, info, warn};

use crate::config::Verbosity;
use crate::core::SourceReader;

/// Views created on the source for the duration of one run.
///
/// Only views that were actually created are dropped again.
#[derive(Debug)]
pub struct TempViews {
    created: Vec<String>,
    verbosity: Verbosity,
}

impl TempViews {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            created: Vec::new(),
            verbosity,
        }
    }

    /// Create `name` from `body`. Failures are logged and reported as `false`.
    pub async fn create(&mut self, reader: &dyn SourceReader, name: &str, body: &str) -> bool {
        if self.verbosity.progress() {
            info!("Creating view {}", name);
        }
        debug!("view {} body:\n{}", name, body);

        match reader.create_view(name, body).await {
            Ok(()) => {
                self.created.push(name.to_string());
                true
            }
            Err(e) => {
                warn!("Could not create view {}: {}", name, e);
                false
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.created.iter().any(|v| v == name)
    }

    pub fn len(&self) -> usize {
        self.created.len()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }

    /// Drop every created view, newest first. Failures are logged.
    pub async fn erase(&mut self, reader: &dyn SourceReader) {
        while let Some(name) = self.created.pop() {
            if self.verbosity.progress() {
                info!("Dropping view {}", name);
            }
            if let Err(e) = reader.drop_view(&name).await {
                warn!("Could not drop view {}: {}", name, e);
            }
        }
    }
}
