pub mod http;
pub mod params;
pub mod plan;
pub mod reconcile;
pub mod report;
pub mod retry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use types::{Instance, InstanceInfo};

pub use params::{ReconcileRequest, VmParams};
pub use plan::{Plan, resolve};
pub use reconcile::{Failure, Outcome, Reconciler};
pub use retry::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("qcontroller api error: {0}")]
    Api(#[from] qcontroller_api::Error),

    #[error("timed out waiting for {waiting_for} after {attempts} attempts: {last}")]
    ConvergenceTimeout {
        waiting_for: &'static str,
        attempts: u32,
        #[source]
        last: Box<Error>,
    },

    #[error("{0}")]
    NotReady(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of looking an instance up by id.
///
/// `Missing` covers both "no record" and the 5xx the controller answers with
/// for unknown names; callers never have to match on transport errors.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Vec<InstanceInfo>),
    Missing,
}

impl Lookup {
    /// The authoritative record for `id`. When the controller returns several,
    /// the first one wins.
    pub fn into_first(self, id: &str) -> Option<InstanceInfo> {
        match self {
            Self::Missing => None,
            Self::Found(infos) => {
                if infos.len() > 1 {
                    tracing::warn!(
                        instance = id,
                        records = infos.len(),
                        "controller returned multiple records, using the first"
                    );
                }
                infos.into_iter().next()
            }
        }
    }
}

/// VM lifecycle operations exposed by the controller service.
#[async_trait]
pub trait Controller: Send + Sync + 'static {
    /// Look an instance up by id.
    async fn get(&self, id: &str) -> Result<Lookup>;

    /// Create (but do not start) an instance from `image`.
    async fn create(&self, image: &str, instance: &Instance) -> Result<()>;

    async fn start(&self, id: &str) -> Result<()>;

    async fn stop(&self, id: &str, force: bool) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;
}

/// Image registry operations.
#[async_trait]
pub trait ImageService: Send + Sync + 'static {
    /// Ids of every registered image.
    async fn list_images(&self) -> Result<Vec<String>>;

    /// Upload the file at `path` under `id`.
    async fn put_image(&self, id: &str, path: &Path) -> Result<()>;

    /// Make sure an image `id` exists, uploading `path` when it does not or
    /// when `overwrite` is set. Returns the id to create instances from.
    async fn upload_image(&self, id: &str, path: &Path, overwrite: bool) -> Result<String> {
        if !overwrite && self.list_images().await?.iter().any(|existing| existing == id) {
            tracing::info!(image = id, "image already registered, skipping upload");
            return Ok(id.to_string());
        }

        self.put_image(id, path).await?;
        tracing::info!(image = id, path = %path.display(), "image uploaded");
        Ok(id.to_string())
    }
}

/// Source of the delay between polling attempts.
#[async_trait]
pub trait Sleeper: Send + Sync + 'static {
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock sleeper backed by `tokio::time::sleep`.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Build a reconciler talking to the qcontroller gateway at `host:port`.
///
/// The controller and the image registry are served from the same address.
pub fn connect(host: &str, port: u16) -> Reconciler {
    tracing::debug!(host, port, "connecting to qcontroller");

    Reconciler::new(
        Arc::new(http::HttpController::new(host, port)),
        Arc::new(http::HttpImageService::new(host, port)),
        Arc::new(TokioSleeper),
    )
}
