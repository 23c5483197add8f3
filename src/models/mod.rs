// Domain models

mod job;
mod results;
mod stats;

pub use job::{
    Direction, Job, JobSnapshot, JobSpec, JobState, ResultDetail, SpanMethod, StartAccepted,
    StopAck,
};
pub use results::{ExportInfo, Histogram, JobResults, TopFlow};
pub use stats::{CATEGORY_COUNT, Category, IfProtoKey, ProtoStats, counter_delta};
