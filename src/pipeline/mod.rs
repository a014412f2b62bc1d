pub mod flat;
pub mod tree;

use crate::config::{Config, FailurePolicy};
use crate::error::Result;
use crate::rate_limiter::RateLimiter;
use crate::report::LoadReport;
use crate::store::{DocPath, DocumentStore, Fields};
use std::sync::Arc;
use tracing::{error, warn};

pub use flat::run_flat;
pub use tree::run_tree;

/// What both pipelines share: where documents go, how fast, and what a failure means.
#[derive(Clone)]
pub struct Loader {
    pub store: Arc<dyn DocumentStore>,
    pub limiter: RateLimiter,
    pub policy: FailurePolicy,
    pub collection: String,
}

impl Loader {
    pub fn new(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        Self {
            store,
            limiter: RateLimiter::from_config(&config.limits),
            policy: config.policy.on_error,
            collection: config.firestore.collection.clone(),
        }
    }

    pub fn root(&self) -> DocPath {
        DocPath::collection(&self.collection)
    }

    pub async fn create(&self, collection: &DocPath, fields: &Fields) -> Result<DocPath> {
        let _permit = self.limiter.acquire().await;
        self.store.create(collection, fields).await
    }

    pub async fn set(&self, document: &DocPath, fields: &Fields) -> Result<()> {
        let _permit = self.limiter.acquire().await;
        self.store.set(document, fields).await
    }

    /// Records a file- or row-level failure. Returns false when the run must stop.
    pub fn keep_going(&self, report: &mut LoadReport, message: String) -> bool {
        report.record_error(message.clone());
        match self.policy {
            FailurePolicy::BestEffort => {
                warn!("{}", message);
                true
            }
            FailurePolicy::FailFast => {
                error!("{} (aborting, policy fail_fast)", message);
                report.aborted = true;
                false
            }
        }
    }
}
