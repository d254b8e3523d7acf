pub mod attempt;

pub use attempt::{
    Attempt, AttemptStatus, CloseAttemptRequest, RecordViolationRequest, RecordViolationResponse,
    SaveProgressRequest, SaveProgressResponse, StartAttemptRequest, Violation, ViolationKind,
};
