//! Host collaborator interfaces.
//!
//! The engine never touches a page directly. The host supplies these
//! surfaces; production hosts wrap a browser page, tests and the simulator
//! use [`crate::sim::SimulatedQuiz`].

use crate::error::{FaceMatchError, Result};
use crate::types::{Candidate, Name};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Where the current image comes from
#[async_trait]
pub trait PresentationSource: Send + Sync {
    /// Locator of the image on display, if any
    async fn current_image_source(&self) -> Option<String>;

    /// Push notifications of locator changes, when the host supports them.
    ///
    /// Hosts returning `None` are polled instead.
    fn subscribe(&self) -> Option<watch::Receiver<Option<String>>> {
        None
    }
}

/// The answer buttons
#[async_trait]
pub trait CandidateSurface: Send + Sync {
    /// Every visible option in display order, answered ones included
    async fn current_candidates(&self) -> Vec<Candidate>;

    async fn submit(&self, candidate: &Candidate) -> Result<()>;
}

/// Where the correct answer is revealed after a submission
#[async_trait]
pub trait OutcomeSurface: Send + Sync {
    /// `Some` once the correct answer is visible
    async fn confirmed_name(&self) -> Option<Name>;
}

/// Fetches raw image bytes for content hashing
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, locator: &str) -> Result<Vec<u8>>;
}

/// The three page surfaces a session drives
#[derive(Clone)]
pub struct Host {
    pub presentation: Arc<dyn PresentationSource>,
    pub candidates: Arc<dyn CandidateSurface>,
    pub outcome: Arc<dyn OutcomeSurface>,
}

impl Host {
    pub fn new(
        presentation: Arc<dyn PresentationSource>,
        candidates: Arc<dyn CandidateSurface>,
        outcome: Arc<dyn OutcomeSurface>,
    ) -> Self {
        Self {
            presentation,
            candidates,
            outcome,
        }
    }

    /// One object implementing every surface
    pub fn from_single<T>(surface: Arc<T>) -> Self
    where
        T: PresentationSource + CandidateSurface + OutcomeSurface + 'static,
    {
        Self {
            presentation: surface.clone(),
            candidates: surface.clone(),
            outcome: surface,
        }
    }

    /// Open options only
    pub async fn open_candidates(&self) -> Vec<Candidate> {
        self.candidates
            .current_candidates()
            .await
            .into_iter()
            .filter(|c| !c.already_answered)
            .collect()
    }
}

/// Loads images over HTTP(S), or from disk for `file://` and bare paths
pub struct HttpImageLoader {
    client: reqwest::Client,
}

impl HttpImageLoader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, locator: &str) -> Result<Vec<u8>> {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            let response = self.client.get(locator).send().await?.error_for_status()?;
            let bytes = response.bytes().await?;
            return Ok(bytes.to_vec());
        }

        if locator.starts_with("data:") {
            return Err(FaceMatchError::ImageLoad(
                "inline data locators are not fetched".to_string(),
            ));
        }

        let path = locator.strip_prefix("file://").unwrap_or(locator);
        Ok(tokio::fs::read(path).await?)
    }
}
