//! Round-based TA allocation: the allocate / deallocate / freeze transitions, the round
//! tracker, and the audit trail written alongside every transition.

pub mod capacity;
pub mod domain;
pub mod notify;
pub mod rounds;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use capacity::{CapacityRule, LARGE_COURSE_THRESHOLD};
pub use domain::{
    Actor, ActorRole, AllocationRow, Coordinator, CoordinatorId, Course, CourseId, CourseSnapshot,
    LogAction, LogEntry, LogId, NewLogEntry, Placement, Professor, ProfessorId, Round, RoundId,
    Student, StudentId,
};
pub use notify::{
    AllocationNotice, Broadcaster, DisabledNotifier, LiveEvent, LiveUpdates, Notifier,
    NotifyError,
};
pub use rounds::RoundTracker;
pub use router::{allocation_router, round_router, TransitionPayload};
pub use service::{
    AllocationEngine, AllocationError, AllocationRequest, DeallocationRequest, EngineSettings,
    TransitionOutcome, DEFAULT_COMMIT_ATTEMPTS,
};
