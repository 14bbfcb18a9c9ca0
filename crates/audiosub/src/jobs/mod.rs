pub mod events;
pub mod job;
pub mod store;
pub mod sweeper;

pub use events::{JobEvent, JobEventBroadcaster};
pub use job::{
    FailureKind, Job, JobFailure, JobStatus, JobView, ParseStatusError, TranscriptSummary,
    TransitionError,
};
pub use store::{JobCounts, JobStore};
pub use sweeper::SweepScheduler;
