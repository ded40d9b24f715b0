//! Segment publish collaborator.
//!
//! After each flush the sink emits a [`SegmentReady`] event; the publish
//! loop picks these up on a channel and hands the segment bytes to a
//! [`SegmentPublisher`] implementation. The loop runs on its own task and
//! failures are logged and counted, never propagated back into ingestion.

use crate::writer::SegmentReady;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to read segment file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Upload failed: {0}")]
    Upload(String),
}

/// Destination for completed segments.
///
/// Implementations own transport, credentials and retries. The pipeline
/// only guarantees that `publish` is called at least once per flushed
/// segment, in flush order per kind.
#[async_trait]
pub trait SegmentPublisher: Send + Sync {
    async fn publish(
        &self,
        segment: &SegmentReady,
        content: &[u8],
    ) -> Result<(), PublishError>;
}

/// Publisher that discards segments. Default when no remote destination
/// is configured.
pub struct NullPublisher;

#[async_trait]
impl SegmentPublisher for NullPublisher {
    async fn publish(
        &self,
        segment: &SegmentReady,
        _content: &[u8],
    ) -> Result<(), PublishError> {
        debug!(segment = %segment.segment_id, "Discarding segment (no publisher configured)");
        Ok(())
    }
}

/// Drain segment-ready events and publish each one.
///
/// Returns the number of failed publishes. Runs until the channel closes
/// or the token is cancelled; on cancellation the already-queued events
/// are still drained so a final flush at shutdown is not lost.
pub async fn run_publish_loop<P: SegmentPublisher>(
    mut rx: mpsc::Receiver<SegmentReady>,
    publisher: P,
    shutdown: CancellationToken,
) -> u64 {
    let mut failures: u64 = 0;

    loop {
        let segment = tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(segment) => segment,
                None => break,
            },
            _ = shutdown.cancelled() => {
                // Drain whatever is already queued, then stop
                rx.close();
                match rx.recv().await {
                    Some(segment) => segment,
                    None => break,
                }
            }
        };

        if let Err(e) = publish_one(&publisher, &segment).await {
            failures += 1;
            error!(segment = %segment.segment_id, error = %e, "Segment publish failed");
        }
    }

    info!(failures, "Publish loop stopped");
    failures
}

async fn publish_one<P: SegmentPublisher>(
    publisher: &P,
    segment: &SegmentReady,
) -> Result<(), PublishError> {
    let content = tokio::fs::read(&segment.path).await?;
    publisher.publish(segment, &content).await?;
    debug!(segment = %segment.segment_id, bytes = content.len(), "Segment published");
    Ok(())
}
