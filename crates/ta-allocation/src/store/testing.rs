use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use super::{ChangeSet, CommitReceipt, EntityStore, MemoryStore, StoreError, Versioned};
use crate::workflows::allocation::{
    Coordinator, CoordinatorId, Course, CourseId, LogEntry, Professor, ProfessorId, Round,
    Student, StudentId,
};
use crate::workflows::feedback::{Feedback, FeedbackId};

type CommitHook = Box<dyn FnOnce(&Arc<MemoryStore>) + Send>;

/// Shares a [`MemoryStore`] and runs a one-shot hook right before the first commit lands,
/// standing in for a request that wins the race between a plan and its commit.
pub(crate) struct InterleavingStore {
    inner: Arc<MemoryStore>,
    before_commit: Mutex<Option<CommitHook>>,
    commits: AtomicU32,
}

impl InterleavingStore {
    pub(crate) fn new(
        inner: Arc<MemoryStore>,
        hook: impl FnOnce(&Arc<MemoryStore>) + Send + 'static,
    ) -> Self {
        Self {
            inner,
            before_commit: Mutex::new(Some(Box::new(hook))),
            commits: AtomicU32::new(0),
        }
    }

    pub(crate) fn commits(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }
}

impl EntityStore for InterleavingStore {
    fn current_round(&self) -> Result<Option<Versioned<Round>>, StoreError> {
        self.inner.current_round()
    }

    fn rounds(&self) -> Result<Vec<Versioned<Round>>, StoreError> {
        self.inner.rounds()
    }

    fn student(&self, id: &StudentId) -> Result<Option<Versioned<Student>>, StoreError> {
        self.inner.student(id)
    }

    fn students(&self) -> Result<Vec<Student>, StoreError> {
        self.inner.students()
    }

    fn course(&self, id: &CourseId) -> Result<Option<Versioned<Course>>, StoreError> {
        self.inner.course(id)
    }

    fn courses(&self) -> Result<Vec<Versioned<Course>>, StoreError> {
        self.inner.courses()
    }

    fn next_course_id(&self) -> Result<CourseId, StoreError> {
        self.inner.next_course_id()
    }

    fn professor(&self, id: &ProfessorId) -> Result<Option<Professor>, StoreError> {
        self.inner.professor(id)
    }

    fn professors(&self) -> Result<Vec<Professor>, StoreError> {
        self.inner.professors()
    }

    fn coordinator(&self, id: &CoordinatorId) -> Result<Option<Coordinator>, StoreError> {
        self.inner.coordinator(id)
    }

    fn coordinators(&self) -> Result<Vec<Coordinator>, StoreError> {
        self.inner.coordinators()
    }

    fn logs(&self) -> Result<Vec<LogEntry>, StoreError> {
        self.inner.logs()
    }

    fn feedback(&self, id: &FeedbackId) -> Result<Option<Feedback>, StoreError> {
        self.inner.feedback(id)
    }

    fn feedbacks(&self) -> Result<Vec<Feedback>, StoreError> {
        self.inner.feedbacks()
    }

    fn feedback_window_open(&self) -> Result<bool, StoreError> {
        self.inner.feedback_window_open()
    }

    fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt, StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        let hook = self
            .before_commit
            .lock()
            .expect("hook mutex poisoned")
            .take();
        if let Some(hook) = hook {
            hook(&self.inner);
        }
        self.inner.commit(changes)
    }
}
