//! Durable CSV record sink for the Hyperliquid data collector.
//!
//! Appends typed records to one fixed-schema CSV file per record kind,
//! flushing on a buffer-size threshold or an external time trigger.
//! Completed flushes surface as segment-ready events for the publish
//! collaborator, which runs independently and never blocks ingestion.

pub mod error;
pub mod publish;
pub mod writer;

pub use error::{SinkError, SinkResult};
pub use publish::{run_publish_loop, NullPublisher, PublishError, SegmentPublisher};
pub use writer::{CsvSink, SegmentReady, SinkConfig};
