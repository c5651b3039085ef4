//! Background metadata fetcher that answers the session's resolve requests.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metadata::MetadataStore;
use crate::session::{ResolveRequest, ResolvedMetadata};

const LOG_TARGET: &str = "cadenza::fetcher";

/// Metadata fetcher that resolves each request on its own task
pub struct MetadataFetcher {
    store: Arc<MetadataStore>,
    cancel_token: CancellationToken,
}

impl MetadataFetcher {
    /// Create a new metadata fetcher
    ///
    /// # Arguments
    /// * `store` - Metadata store doing the actual resolution
    /// * `cancel_token` - Optional external cancellation token for graceful shutdown
    #[must_use]
    pub fn new(store: Arc<MetadataStore>, cancel_token: Option<CancellationToken>) -> Self {
        Self {
            store,
            cancel_token: cancel_token.unwrap_or_default(),
        }
    }

    /// Get a clone of the cancellation token
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Start the fetcher in a background task
    #[must_use]
    pub fn start(
        self,
        requests: mpsc::UnboundedReceiver<ResolveRequest>,
        results: mpsc::UnboundedSender<ResolvedMetadata>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(requests, results).await;
        })
    }

    /// Run the request loop until cancelled or the session goes away
    async fn run(
        &self,
        mut requests: mpsc::UnboundedReceiver<ResolveRequest>,
        results: mpsc::UnboundedSender<ResolvedMetadata>,
    ) {
        info!(target: LOG_TARGET, "Initializing metadata fetching handler");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: LOG_TARGET, "Metadata fetcher shutting down");
                    break;
                }
                request = requests.recv() => {
                    let Some(request) = request else {
                        break;
                    };
                    self.spawn_resolution(request, results.clone());
                }
            }
        }
    }

    /// Resolve one request on a detached task; the session drops stale answers.
    fn spawn_resolution(
        &self,
        request: ResolveRequest,
        results: mpsc::UnboundedSender<ResolvedMetadata>,
    ) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            debug!(
                target: LOG_TARGET,
                "Resolving {:?} (generation {}, next candidate: {})",
                request.song.path,
                request.generation,
                request.force_next_candidate
            );
            let resolution = store
                .resolve(&request.song, request.force_next_candidate)
                .await;

            let resolved = ResolvedMetadata {
                generation: request.generation,
                path: request.song.path,
                resolution,
            };
            if results.send(resolved).is_err() {
                debug!(target: LOG_TARGET, "Session is gone, dropping resolved metadata");
            }
        });
    }
}
