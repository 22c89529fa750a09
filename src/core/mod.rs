pub mod comparator;
pub mod engine;
pub mod lister;
pub mod sanitize;
pub mod scheduler;
pub mod sidecar;
pub mod staleness;
pub mod transfer;

pub use comparator::{FileComparator, LocalFileState, SyncDecision};
pub use engine::{SyncEngine, SyncReport};
pub use lister::BucketLister;
pub use sanitize::{relative_path, sanitize_key};
pub use scheduler::{ScheduleConfig, Scheduler, SchedulerExit};
pub use sidecar::{decode_header, SidecarWriter, SIDECAR_NAME};
pub use staleness::StalenessFilter;
pub use transfer::{Downloader, PartialFile, SequentialSink};
