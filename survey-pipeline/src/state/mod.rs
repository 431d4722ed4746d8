//! Pipeline state: the in-memory store, previews and durable snapshots.

pub mod preview;
pub mod snapshot;
pub mod store;

pub use preview::{PreviewRegistry, StepPreview, TablePreview};
pub use snapshot::{SnapshotExporter, SnapshotManifest};
pub use store::{Bucket, PipelineStore, SharedStore, SourceTables, TableRef, shared_store};
