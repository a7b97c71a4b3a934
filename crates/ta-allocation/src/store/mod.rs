//! Entity store contract shared by the allocation, feedback and course workflows.
//!
//! Reads hand back versioned copies of the mutable documents (students, courses, rounds).
//! Writes are gathered into a [`ChangeSet`] and applied by [`EntityStore::commit`] as one
//! all-or-nothing unit; a stale expected version rejects the whole set with
//! [`StoreError::Conflict`] so callers can re-read and try again.

mod memory;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::{MemoryStore, Seed};

use serde::{Deserialize, Serialize};

use crate::workflows::allocation::{
    Coordinator, CoordinatorId, Course, CourseId, LogEntry, NewLogEntry, Professor, ProfessorId,
    Round, RoundId, Student, StudentId,
};
use crate::workflows::feedback::{Feedback, FeedbackId, NewFeedback};

/// A stored document together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub record: T,
}

impl<T> Versioned<T> {
    pub fn into_record(self) -> T {
        self.record
    }
}

/// Expected state of a document at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// The document must not exist yet.
    Absent,
    /// The document must still be at this version.
    Version(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    PutStudent { expect: Expect, record: Student },
    PutCourse { expect: Expect, record: Course },
    RemoveCourse { expect: Expect, id: CourseId },
    PutRound { expect: Expect, record: Round },
    /// Writes nothing; rejects the set unless the round is still at `expect`.
    ExpectRound { expect: Expect, id: RoundId },
    /// Writes nothing; rejects the set unless the course is still at `expect`.
    ExpectCourse { expect: Expect, id: CourseId },
    AppendLog(NewLogEntry),
    CreateFeedback(NewFeedback),
    ReplaceFeedback(Feedback),
    /// Deletes every feedback record for the (student, course) pair.
    RemoveFeedbackFor { student: StudentId, course: CourseId },
    RemoveCourseFeedback(CourseId),
    /// Deletes the feedback a professor holds for every TA of the course.
    RemoveProfessorFeedback { course: CourseId, professor: ProfessorId },
    SetFeedbackWindow { open: bool },
}

/// Ordered list of writes committed atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    writes: Vec<Write>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: Write) -> &mut Self {
        self.writes.push(write);
        self
    }

    pub fn with(mut self, write: Write) -> Self {
        self.writes.push(write);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

/// Records created by a commit, in the order their writes appeared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReceipt {
    pub logs: Vec<LogEntry>,
    pub feedback: Vec<FeedbackId>,
}

/// Storage abstraction so the workflows can be exercised in isolation.
pub trait EntityStore: Send + Sync {
    fn current_round(&self) -> Result<Option<Versioned<Round>>, StoreError>;
    fn rounds(&self) -> Result<Vec<Versioned<Round>>, StoreError>;

    fn student(&self, id: &StudentId) -> Result<Option<Versioned<Student>>, StoreError>;
    fn students(&self) -> Result<Vec<Student>, StoreError>;

    fn course(&self, id: &CourseId) -> Result<Option<Versioned<Course>>, StoreError>;
    fn courses(&self) -> Result<Vec<Versioned<Course>>, StoreError>;
    fn next_course_id(&self) -> Result<CourseId, StoreError>;

    fn professor(&self, id: &ProfessorId) -> Result<Option<Professor>, StoreError>;
    fn professors(&self) -> Result<Vec<Professor>, StoreError>;

    fn coordinator(&self, id: &CoordinatorId) -> Result<Option<Coordinator>, StoreError>;
    fn coordinators(&self) -> Result<Vec<Coordinator>, StoreError>;

    fn logs(&self) -> Result<Vec<LogEntry>, StoreError>;

    fn feedback(&self, id: &FeedbackId) -> Result<Option<Feedback>, StoreError>;
    fn feedbacks(&self) -> Result<Vec<Feedback>, StoreError>;
    fn feedback_window_open(&self) -> Result<bool, StoreError>;

    /// Applies every write or none of them.
    fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt, StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("write conflict on {entity} {id}")]
    Conflict { entity: &'static str, id: String },
    #[error("{entity} {id} not found")]
    Missing { entity: &'static str, id: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Identifier of the round with this ordinal.
pub fn round_id(number: u32) -> RoundId {
    RoundId::new(format!("round-{number:03}"))
}
