use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::capacity::CapacityRule;
use super::domain::{
    Actor, AllocationRow, Course, CourseId, LogAction, LogEntry, NewLogEntry, Placement, Student,
    StudentId,
};
use super::notify::{AllocationNotice, Broadcaster, LiveEvent, Notifier};
use crate::store::{
    ChangeSet, CommitReceipt, EntityStore, Expect, StoreError, Versioned, Write,
};
use crate::workflows::feedback::{FeedbackId, NewFeedback};

pub const DEFAULT_COMMIT_ATTEMPTS: u32 = 5;

/// Knobs for the allocation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Copied on every allocation notice.
    pub admin_email: String,
    /// Precondition-check-and-commit passes before a conflict is reported.
    pub max_attempts: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            admin_email: "admin@localhost".to_string(),
            max_attempts: DEFAULT_COMMIT_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRequest {
    pub student: StudentId,
    pub course: CourseId,
    pub actor: Actor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeallocationRequest {
    pub student: StudentId,
    /// Course the caller believes the student holds; the stored allocation wins.
    pub course: Option<CourseId>,
    pub actor: Actor,
}

/// Records written by a successful allocate or deallocate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub student: Student,
    pub course: Option<Course>,
    pub log: LogEntry,
    pub feedback: Vec<FeedbackId>,
}

/// Validates and executes allocate / deallocate / freeze against the entity store.
///
/// Every transition is planned from a fresh read and committed as a single change set.
/// When the store reports a conflicting concurrent write the whole plan is rebuilt, so
/// capacity and availability checks always run against the state that gets committed.
pub struct AllocationEngine<S, N, B> {
    store: Arc<S>,
    notifier: Arc<N>,
    broadcaster: Arc<B>,
    settings: EngineSettings,
}

impl<S, N, B> AllocationEngine<S, N, B>
where
    S: EntityStore + 'static,
    N: Notifier + 'static,
    B: Broadcaster + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, broadcaster: Arc<B>, settings: EngineSettings) -> Self {
        Self {
            store,
            notifier,
            broadcaster,
            settings: EngineSettings {
                max_attempts: settings.max_attempts.max(1),
                ..settings
            },
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn allocate(
        &self,
        request: &AllocationRequest,
    ) -> Result<TransitionOutcome, AllocationError> {
        let outcome = self.with_retries("allocate", || self.try_allocate(request))?;
        info!(
            student = %outcome.student.id,
            course = %request.course,
            actor = outcome.log.actor_role.label(),
            "student allocated"
        );
        self.publish(&outcome, LogAction::Allocated);
        Ok(outcome)
    }

    pub fn deallocate(
        &self,
        request: &DeallocationRequest,
    ) -> Result<TransitionOutcome, AllocationError> {
        let outcome = self.with_retries("deallocate", || self.try_deallocate(request))?;
        info!(
            student = %outcome.student.id,
            actor = outcome.log.actor_role.label(),
            "student deallocated"
        );
        self.publish(&outcome, LogAction::Deallocated);
        Ok(outcome)
    }

    /// Locks an allocated student onto their course; frozen is terminal here.
    pub fn freeze(&self, student: &StudentId) -> Result<Student, AllocationError> {
        let frozen = self.with_retries("freeze", || self.try_freeze(student))?;
        info!(student = %frozen.id, "allocation frozen");
        if let Err(err) = self
            .broadcaster
            .emit(LiveEvent::StudentUpdated(frozen.clone()))
        {
            warn!(error = %err, "failed to broadcast frozen student");
        }
        Ok(frozen)
    }

    /// Email recorded against a transition; `None` when the acting record is gone.
    pub fn resolve_actor_email(&self, actor: &Actor) -> Result<Option<String>, StoreError> {
        match actor {
            Actor::Admin => Ok(Some("admin".to_string())),
            Actor::Coordinator(id) => Ok(self.store.coordinator(id)?.map(|jm| jm.email)),
            Actor::Professor(id) => Ok(self.store.professor(id)?.map(|prof| prof.email)),
        }
    }

    pub fn logs(&self) -> Result<Vec<LogEntry>, AllocationError> {
        Ok(self.store.logs()?)
    }

    /// One row per allocated TA, grouped by course.
    pub fn allocations(&self) -> Result<Vec<AllocationRow>, AllocationError> {
        let students: HashMap<_, _> = self
            .store
            .students()?
            .into_iter()
            .map(|student| (student.id.clone(), student))
            .collect();

        let mut rows = Vec::new();
        for course in self.store.courses()? {
            let course = course.record;
            for ta in &course.ta_allocated {
                let Some(student) = students.get(ta) else {
                    warn!(student = %ta, course = %course.id, "allocated student missing from store");
                    continue;
                };
                rows.push(AllocationRow {
                    roll_no: student.roll_no.clone(),
                    name: student.name.clone(),
                    program: student.program.clone(),
                    department: student.department.clone(),
                    ta_type: student.ta_type.clone(),
                    course: course.name.clone(),
                    course_code: course.code.clone(),
                });
            }
        }
        Ok(rows)
    }

    fn with_retries<T>(
        &self,
        operation: &'static str,
        mut attempt: impl FnMut() -> Result<T, AllocationError>,
    ) -> Result<T, AllocationError> {
        for pass in 1..=self.settings.max_attempts {
            match attempt() {
                Err(AllocationError::Internal(err)) if err.is_conflict() => {
                    debug!(operation, pass, error = %err, "write conflict, replanning");
                }
                result => return result,
            }
        }
        warn!(operation, attempts = self.settings.max_attempts, "giving up after repeated write conflicts");
        Err(AllocationError::TransactionConflict {
            attempts: self.settings.max_attempts,
        })
    }

    fn try_allocate(&self, request: &AllocationRequest) -> Result<TransitionOutcome, AllocationError> {
        let Versioned {
            version: round_version,
            record: round,
        } = self
            .store
            .current_round()?
            .ok_or(AllocationError::NoActiveRound)?;

        if matches!(request.actor, Actor::Professor(_)) && round.number != 1 {
            return Err(AllocationError::RoundRestricted {
                round: round.number,
            });
        }

        let student = self
            .store
            .student(&request.student)?
            .ok_or_else(|| AllocationError::not_found("student", &request.student))?;
        let course = self
            .store
            .course(&request.course)?
            .ok_or_else(|| AllocationError::not_found("course", &request.course))?;

        let rule = CapacityRule::for_round(round.number, &course.record);
        if !rule.admits(&course.record) {
            return Err(AllocationError::CapacityExceeded {
                limit: rule.limit(),
            });
        }

        if !student.record.is_unallocated() {
            return Err(AllocationError::AlreadyAllocated(student.record.id));
        }

        let actor_email = self.resolve_actor_email(&request.actor)?;

        let mut allocated = student.record;
        allocated.placement = Placement::Allocated(course.record.id.clone());

        let mut updated_course = course.record;
        updated_course.add_ta(allocated.id.clone());

        let mut changes = ChangeSet::new()
            .with(Write::ExpectRound {
                expect: Expect::Version(round_version),
                id: round.id.clone(),
            })
            .with(Write::PutStudent {
                expect: Expect::Version(student.version),
                record: allocated.clone(),
            })
            .with(Write::PutCourse {
                expect: Expect::Version(course.version),
                record: updated_course.clone(),
            })
            .with(Write::AppendLog(NewLogEntry {
                student: allocated.id.clone(),
                actor_email,
                actor_role: request.actor.role(),
                action: LogAction::Allocated,
                course: Some(updated_course.snapshot()),
                recorded_at: Utc::now(),
            }));
        for professor in &updated_course.professors {
            changes.push(Write::CreateFeedback(NewFeedback::placeholder(
                allocated.id.clone(),
                updated_course.id.clone(),
                professor.clone(),
            )));
        }

        let receipt = self.store.commit(changes)?;
        transition_outcome(allocated, Some(updated_course), receipt)
    }

    fn try_deallocate(
        &self,
        request: &DeallocationRequest,
    ) -> Result<TransitionOutcome, AllocationError> {
        let student = self
            .store
            .student(&request.student)?
            .ok_or_else(|| AllocationError::not_found("student", &request.student))?;

        let course_id = match &student.record.placement {
            Placement::Unallocated => {
                return Err(AllocationError::NotAllocated(student.record.id));
            }
            Placement::Frozen(_) => return Err(AllocationError::Frozen(student.record.id)),
            Placement::Allocated(course) => course.clone(),
        };

        if let Some(requested) = request.course.as_ref().filter(|id| **id != course_id) {
            warn!(
                student = %student.record.id,
                requested = %requested,
                allocated = %course_id,
                "deallocation names a different course than the stored allocation"
            );
        }

        let actor_email = self.resolve_actor_email(&request.actor)?;

        let mut released = student.record;
        released.placement = Placement::Unallocated;

        let mut changes = ChangeSet::new().with(Write::PutStudent {
            expect: Expect::Version(student.version),
            record: released.clone(),
        });

        let updated_course = match self.store.course(&course_id)? {
            Some(doc) => {
                let mut course = doc.record;
                course.remove_ta(&released.id);
                changes.push(Write::PutCourse {
                    expect: Expect::Version(doc.version),
                    record: course.clone(),
                });
                Some(course)
            }
            None => {
                warn!(course = %course_id, "allocated course no longer exists");
                None
            }
        };

        changes
            .push(Write::AppendLog(NewLogEntry {
                student: released.id.clone(),
                actor_email,
                actor_role: request.actor.role(),
                action: LogAction::Deallocated,
                course: updated_course.as_ref().map(Course::snapshot),
                recorded_at: Utc::now(),
            }))
            .push(Write::RemoveFeedbackFor {
                student: released.id.clone(),
                course: course_id,
            });

        let receipt = self.store.commit(changes)?;
        transition_outcome(released, updated_course, receipt)
    }

    fn try_freeze(&self, id: &StudentId) -> Result<Student, AllocationError> {
        let student = self
            .store
            .student(id)?
            .ok_or_else(|| AllocationError::not_found("student", id))?;

        let Placement::Allocated(course) = &student.record.placement else {
            return Err(AllocationError::NotAllocatable(student.record.id));
        };

        let mut frozen = student.record.clone();
        frozen.placement = Placement::Frozen(course.clone());

        self.store.commit(ChangeSet::new().with(Write::PutStudent {
            expect: Expect::Version(student.version),
            record: frozen.clone(),
        }))?;
        Ok(frozen)
    }

    /// Email and live-update side effects. Failures are logged and never surface.
    fn publish(&self, outcome: &TransitionOutcome, action: LogAction) {
        let notice = self.notice_for(outcome, action);
        if let Err(err) = self.notifier.send(notice) {
            warn!(error = %err, student = %outcome.student.id, "failed to queue allocation notice");
        }

        let events = [
            LiveEvent::LogCreated {
                entry: outcome.log.clone(),
                student: outcome.student.clone(),
            },
            LiveEvent::StudentUpdated(outcome.student.clone()),
        ];
        for event in events {
            let name = event.name();
            if let Err(err) = self.broadcaster.emit(event) {
                warn!(error = %err, event = name, "failed to broadcast live update");
            }
        }
    }

    fn notice_for(&self, outcome: &TransitionOutcome, action: LogAction) -> AllocationNotice {
        let course = outcome.course.as_ref();

        let coordinator_email = course.and_then(|course| {
            match self.store.coordinator(&course.department) {
                Ok(found) => found.map(|jm| jm.email),
                Err(err) => {
                    warn!(error = %err, "coordinator lookup failed for notice");
                    None
                }
            }
        });

        let professor_emails = course
            .map(|course| {
                course
                    .professors
                    .iter()
                    .filter_map(|id| match self.store.professor(id) {
                        Ok(found) => found.map(|prof| prof.email),
                        Err(err) => {
                            warn!(error = %err, professor = %id, "professor lookup failed for notice");
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        AllocationNotice {
            action,
            student_email: outcome.student.email.clone(),
            admin_email: self.settings.admin_email.clone(),
            coordinator_email,
            professor_emails,
            actor_role: outcome.log.actor_role,
            course_name: course.map(|course| course.name.clone()),
        }
    }
}

fn transition_outcome(
    student: Student,
    course: Option<Course>,
    receipt: CommitReceipt,
) -> Result<TransitionOutcome, AllocationError> {
    let CommitReceipt { logs, feedback } = receipt;
    let log = logs.into_iter().next().ok_or_else(|| {
        AllocationError::Internal(StoreError::Unavailable(
            "commit did not return the appended log entry".to_string(),
        ))
    })?;
    Ok(TransitionOutcome {
        student,
        course,
        log,
        feedback,
    })
}

/// Typed failures of the allocation workflow.
#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("No ongoing round for allocation.")]
    NoActiveRound,
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("Maximum allocation limit reached ({limit} students).")]
    CapacityExceeded { limit: usize },
    #[error("Student {0} is not available for allocation")]
    AlreadyAllocated(StudentId),
    #[error("Faculty can only allocate in Round 1 (current round is {round})")]
    RoundRestricted { round: u32 },
    #[error("Student {0} is not allocated")]
    NotAllocated(StudentId),
    #[error("Cannot freeze allocation of student {0}")]
    NotAllocatable(StudentId),
    #[error("Allocation of student {0} is frozen")]
    Frozen(StudentId),
    #[error("allocation abandoned after {attempts} conflicting attempts")]
    TransactionConflict { attempts: u32 },
    #[error("internal store error: {0}")]
    Internal(#[from] StoreError),
}

impl AllocationError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        AllocationError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Precondition failures are detected before anything is written.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            AllocationError::TransactionConflict { .. } | AllocationError::Internal(_)
        )
    }
}
