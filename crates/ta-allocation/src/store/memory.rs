use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::Deserialize;

use super::{ChangeSet, CommitReceipt, EntityStore, Expect, StoreError, Versioned, Write};
use crate::workflows::allocation::{
    Coordinator, CoordinatorId, Course, CourseId, LogEntry, LogId, Professor, ProfessorId, Round,
    RoundId, Student, StudentId,
};
use crate::workflows::feedback::{Feedback, FeedbackId};

/// Records used to populate a fresh store, typically read from a JSON fixture.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Seed {
    pub coordinators: Vec<Coordinator>,
    pub professors: Vec<Professor>,
    pub students: Vec<Student>,
    pub courses: Vec<Course>,
    pub rounds: Vec<Round>,
}

#[derive(Debug, Default)]
struct Tables {
    students: BTreeMap<StudentId, Versioned<Student>>,
    courses: BTreeMap<CourseId, Versioned<Course>>,
    rounds: BTreeMap<RoundId, Versioned<Round>>,
    professors: BTreeMap<ProfessorId, Professor>,
    coordinators: BTreeMap<CoordinatorId, Coordinator>,
    logs: Vec<LogEntry>,
    feedback: BTreeMap<FeedbackId, Feedback>,
    feedback_open: bool,
    log_sequence: u64,
    feedback_sequence: u64,
}

/// Process-local store. Every commit applies its writes in place under a single lock,
/// recording the prior value of each touched key, and rolls them back on the first
/// rejected write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    course_sequence: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: Seed) -> Self {
        let store = Self::new();
        for coordinator in seed.coordinators {
            store.insert_coordinator(coordinator);
        }
        for professor in seed.professors {
            store.insert_professor(professor);
        }
        for student in seed.students {
            store.insert_student(student);
        }
        for course in seed.courses {
            store.insert_course(course);
        }
        for round in seed.rounds {
            store.insert_round(round);
        }
        store
    }

    pub fn insert_coordinator(&self, coordinator: Coordinator) {
        self.lock()
            .coordinators
            .insert(coordinator.id.clone(), coordinator);
    }

    pub fn insert_professor(&self, professor: Professor) {
        self.lock().professors.insert(professor.id.clone(), professor);
    }

    pub fn insert_student(&self, student: Student) {
        put_versioned(&mut self.lock().students, student.id.clone(), student);
    }

    pub fn insert_course(&self, mut course: Course) {
        course.refresh_ta_required();
        put_versioned(&mut self.lock().courses, course.id.clone(), course);
    }

    pub fn insert_round(&self, round: Round) {
        put_versioned(&mut self.lock().rounds, round.id.clone(), round);
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // Writes are applied and rolled back under this guard without panicking in between.
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn put_versioned<K: Ord, T>(
    table: &mut BTreeMap<K, Versioned<T>>,
    key: K,
    record: T,
) -> Option<Versioned<T>> {
    let version = table.get(&key).map_or(1, |existing| existing.version + 1);
    table.insert(key, Versioned { version, record })
}

fn check<K: Ord, T>(
    table: &BTreeMap<K, Versioned<T>>,
    key: &K,
    expect: Expect,
    entity: &'static str,
    id: impl FnOnce() -> String,
) -> Result<(), StoreError> {
    let current = table.get(key).map(|doc| doc.version);
    match (expect, current) {
        (Expect::Absent, None) => Ok(()),
        (Expect::Version(expected), Some(actual)) if expected == actual => Ok(()),
        _ => Err(StoreError::Conflict { entity, id: id() }),
    }
}

/// Prior value of one key touched by an in-flight commit.
enum Undo {
    Student(StudentId, Option<Versioned<Student>>),
    Course(CourseId, Option<Versioned<Course>>),
    Round(RoundId, Option<Versioned<Round>>),
    Feedback(FeedbackId, Option<Feedback>),
    Window(bool),
}

/// Append-only positions captured before a commit starts.
#[derive(Clone, Copy)]
struct Mark {
    logs: usize,
    log_sequence: u64,
    feedback_sequence: u64,
}

fn restore<K: Ord, V>(table: &mut BTreeMap<K, V>, key: K, prior: Option<V>) {
    match prior {
        Some(value) => {
            table.insert(key, value);
        }
        None => {
            table.remove(&key);
        }
    }
}

impl Tables {
    fn mark(&self) -> Mark {
        Mark {
            logs: self.logs.len(),
            log_sequence: self.log_sequence,
            feedback_sequence: self.feedback_sequence,
        }
    }

    fn rollback(&mut self, mark: Mark, undo: Vec<Undo>) {
        for entry in undo.into_iter().rev() {
            match entry {
                Undo::Student(id, prior) => restore(&mut self.students, id, prior),
                Undo::Course(id, prior) => restore(&mut self.courses, id, prior),
                Undo::Round(id, prior) => restore(&mut self.rounds, id, prior),
                Undo::Feedback(id, prior) => restore(&mut self.feedback, id, prior),
                Undo::Window(open) => self.feedback_open = open,
            }
        }
        self.logs.truncate(mark.logs);
        self.log_sequence = mark.log_sequence;
        self.feedback_sequence = mark.feedback_sequence;
    }

    fn remove_feedback_where(&mut self, undo: &mut Vec<Undo>, doomed: impl Fn(&Feedback) -> bool) {
        let ids: Vec<FeedbackId> = self
            .feedback
            .values()
            .filter(|feedback| doomed(feedback))
            .map(|feedback| feedback.id.clone())
            .collect();
        for id in ids {
            let prior = self.feedback.remove(&id);
            undo.push(Undo::Feedback(id, prior));
        }
    }

    fn apply(
        &mut self,
        write: Write,
        receipt: &mut CommitReceipt,
        undo: &mut Vec<Undo>,
    ) -> Result<(), StoreError> {
        match write {
            Write::PutStudent { expect, record } => {
                check(&self.students, &record.id, expect, "student", || {
                    record.id.to_string()
                })?;
                let id = record.id.clone();
                let prior = put_versioned(&mut self.students, id.clone(), record);
                undo.push(Undo::Student(id, prior));
            }
            Write::PutCourse { expect, record } => {
                check(&self.courses, &record.id, expect, "course", || {
                    record.id.to_string()
                })?;
                let id = record.id.clone();
                let prior = put_versioned(&mut self.courses, id.clone(), record);
                undo.push(Undo::Course(id, prior));
            }
            Write::RemoveCourse { expect, id } => {
                check(&self.courses, &id, expect, "course", || id.to_string())?;
                let prior = self.courses.remove(&id);
                undo.push(Undo::Course(id, prior));
            }
            Write::PutRound { expect, record } => {
                check(&self.rounds, &record.id, expect, "round", || {
                    record.id.to_string()
                })?;
                let id = record.id.clone();
                let prior = put_versioned(&mut self.rounds, id.clone(), record);
                undo.push(Undo::Round(id, prior));
            }
            Write::ExpectRound { expect, id } => {
                check(&self.rounds, &id, expect, "round", || id.to_string())?;
            }
            Write::ExpectCourse { expect, id } => {
                check(&self.courses, &id, expect, "course", || id.to_string())?;
            }
            Write::AppendLog(entry) => {
                self.log_sequence += 1;
                let entry = entry.into_entry(LogId::new(format!("log-{:06}", self.log_sequence)));
                receipt.logs.push(entry.clone());
                self.logs.push(entry);
            }
            Write::CreateFeedback(draft) => {
                self.feedback_sequence += 1;
                let id = FeedbackId::new(format!("fb-{:06}", self.feedback_sequence));
                receipt.feedback.push(id.clone());
                let prior = self
                    .feedback
                    .insert(id.clone(), draft.into_feedback(id.clone()));
                undo.push(Undo::Feedback(id, prior));
            }
            Write::ReplaceFeedback(feedback) => {
                if !self.feedback.contains_key(&feedback.id) {
                    return Err(StoreError::Missing {
                        entity: "feedback",
                        id: feedback.id.to_string(),
                    });
                }
                let id = feedback.id.clone();
                let prior = self.feedback.insert(id.clone(), feedback);
                undo.push(Undo::Feedback(id, prior));
            }
            Write::RemoveFeedbackFor { student, course } => {
                self.remove_feedback_where(undo, |feedback| {
                    feedback.student == student && feedback.course == course
                });
            }
            Write::RemoveCourseFeedback(course) => {
                self.remove_feedback_where(undo, |feedback| feedback.course == course);
            }
            Write::RemoveProfessorFeedback { course, professor } => {
                self.remove_feedback_where(undo, |feedback| {
                    feedback.course == course && feedback.professor == professor
                });
            }
            Write::SetFeedbackWindow { open } => {
                undo.push(Undo::Window(self.feedback_open));
                self.feedback_open = open;
            }
        }
        Ok(())
    }
}

impl EntityStore for MemoryStore {
    fn current_round(&self) -> Result<Option<Versioned<Round>>, StoreError> {
        let guard = self.lock();
        Ok(guard
            .rounds
            .values()
            .filter(|round| round.record.is_current())
            .max_by_key(|round| round.record.number)
            .cloned())
    }

    fn rounds(&self) -> Result<Vec<Versioned<Round>>, StoreError> {
        let mut rounds: Vec<_> = self.lock().rounds.values().cloned().collect();
        rounds.sort_by_key(|round| round.record.number);
        Ok(rounds)
    }

    fn student(&self, id: &StudentId) -> Result<Option<Versioned<Student>>, StoreError> {
        Ok(self.lock().students.get(id).cloned())
    }

    fn students(&self) -> Result<Vec<Student>, StoreError> {
        Ok(self
            .lock()
            .students
            .values()
            .map(|doc| doc.record.clone())
            .collect())
    }

    fn course(&self, id: &CourseId) -> Result<Option<Versioned<Course>>, StoreError> {
        Ok(self.lock().courses.get(id).cloned())
    }

    fn courses(&self) -> Result<Vec<Versioned<Course>>, StoreError> {
        Ok(self.lock().courses.values().cloned().collect())
    }

    fn next_course_id(&self) -> Result<CourseId, StoreError> {
        let guard = self.lock();
        loop {
            let next = self.course_sequence.fetch_add(1, Ordering::Relaxed) + 1;
            let id = CourseId::new(format!("course-{next:06}"));
            if !guard.courses.contains_key(&id) {
                return Ok(id);
            }
        }
    }

    fn professor(&self, id: &ProfessorId) -> Result<Option<Professor>, StoreError> {
        Ok(self.lock().professors.get(id).cloned())
    }

    fn professors(&self) -> Result<Vec<Professor>, StoreError> {
        Ok(self.lock().professors.values().cloned().collect())
    }

    fn coordinator(&self, id: &CoordinatorId) -> Result<Option<Coordinator>, StoreError> {
        Ok(self.lock().coordinators.get(id).cloned())
    }

    fn coordinators(&self) -> Result<Vec<Coordinator>, StoreError> {
        Ok(self.lock().coordinators.values().cloned().collect())
    }

    fn logs(&self) -> Result<Vec<LogEntry>, StoreError> {
        Ok(self.lock().logs.clone())
    }

    fn feedback(&self, id: &FeedbackId) -> Result<Option<Feedback>, StoreError> {
        Ok(self.lock().feedback.get(id).cloned())
    }

    fn feedbacks(&self) -> Result<Vec<Feedback>, StoreError> {
        Ok(self.lock().feedback.values().cloned().collect())
    }

    fn feedback_window_open(&self) -> Result<bool, StoreError> {
        Ok(self.lock().feedback_open)
    }

    fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt, StoreError> {
        let mut guard = self.lock();
        let mark = guard.mark();
        let mut undo = Vec::new();
        let mut receipt = CommitReceipt::default();

        for write in changes.into_writes() {
            if let Err(err) = guard.apply(write, &mut receipt, &mut undo) {
                guard.rollback(mark, undo);
                return Err(err);
            }
        }
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::round_id;
    use crate::workflows::allocation::{ActorRole, LogAction, NewLogEntry, Placement};
    use crate::workflows::feedback::NewFeedback;
    use chrono::Utc;

    fn student(id: &str) -> Student {
        Student {
            id: StudentId::new(id),
            name: format!("Student {id}"),
            roll_no: id.to_uppercase(),
            email: format!("{id}@example.edu"),
            program: "B.Tech".to_string(),
            department: "CSE".to_string(),
            ta_type: "UG".to_string(),
            placement: Placement::Unallocated,
        }
    }

    fn log(student: &str) -> Write {
        Write::AppendLog(NewLogEntry {
            student: StudentId::new(student),
            actor_email: Some("admin".to_string()),
            actor_role: ActorRole::Admin,
            action: LogAction::Allocated,
            course: None,
            recorded_at: Utc::now(),
        })
    }

    #[test]
    fn stale_version_rejects_entire_change_set() {
        let store = MemoryStore::new();
        store.insert_student(student("s-1"));
        let read = store
            .student(&StudentId::new("s-1"))
            .expect("read")
            .expect("present");

        let mut first = read.record.clone();
        first.name = "First".to_string();
        store
            .commit(ChangeSet::new().with(Write::PutStudent {
                expect: Expect::Version(read.version),
                record: first,
            }))
            .expect("first commit applies");

        let mut second = read.record.clone();
        second.name = "Second".to_string();
        let err = store
            .commit(
                ChangeSet::new()
                    .with(log("s-1"))
                    .with(Write::PutStudent {
                        expect: Expect::Version(read.version),
                        record: second,
                    }),
            )
            .expect_err("stale write rejected");

        assert!(err.is_conflict());
        assert!(store.logs().expect("logs").is_empty(), "log must roll back");
        let stored = store
            .student(&StudentId::new("s-1"))
            .expect("read")
            .expect("present");
        assert_eq!(stored.record.name, "First");
        assert_eq!(stored.version, read.version + 1);
    }

    #[test]
    fn insert_expecting_absent_conflicts_with_existing_record() {
        let store = MemoryStore::new();
        store.insert_student(student("s-1"));

        let err = store
            .commit(ChangeSet::new().with(Write::PutStudent {
                expect: Expect::Absent,
                record: student("s-1"),
            }))
            .expect_err("duplicate rejected");
        assert!(err.is_conflict());
    }

    #[test]
    fn stale_guard_rolls_back_feedback_and_window_changes() {
        let store = MemoryStore::new();
        store.insert_round(Round {
            id: round_id(1),
            number: 1,
            ongoing: true,
            started_at: Utc::now(),
            ended_at: None,
        });
        let seeded = store
            .commit(ChangeSet::new().with(Write::CreateFeedback(NewFeedback::placeholder(
                StudentId::new("s-1"),
                CourseId::new("course-os"),
                ProfessorId::new("prof-1"),
            ))))
            .expect("seed feedback");

        let err = store
            .commit(
                ChangeSet::new()
                    .with(Write::SetFeedbackWindow { open: true })
                    .with(Write::RemoveCourseFeedback(CourseId::new("course-os")))
                    .with(Write::CreateFeedback(NewFeedback::placeholder(
                        StudentId::new("s-2"),
                        CourseId::new("course-os"),
                        ProfessorId::new("prof-1"),
                    )))
                    .with(Write::ExpectRound {
                        expect: Expect::Version(7),
                        id: round_id(1),
                    }),
            )
            .expect_err("stale round rejected");

        assert!(err.is_conflict());
        assert!(!store.feedback_window_open().expect("window"));
        let ids: Vec<_> = store
            .feedbacks()
            .expect("feedback")
            .into_iter()
            .map(|feedback| feedback.id)
            .collect();
        assert_eq!(ids, seeded.feedback);

        let next = store
            .commit(ChangeSet::new().with(Write::CreateFeedback(NewFeedback::placeholder(
                StudentId::new("s-3"),
                CourseId::new("course-os"),
                ProfessorId::new("prof-1"),
            ))))
            .expect("sequence restored");
        assert_eq!(next.feedback[0].0.as_str(), "fb-000002");
    }

    #[test]
    fn current_guard_lets_the_change_set_through() {
        let store = MemoryStore::new();
        store.insert_student(student("s-1"));
        let round = Round {
            id: round_id(1),
            number: 1,
            ongoing: true,
            started_at: Utc::now(),
            ended_at: None,
        };
        store.insert_round(round);

        store
            .commit(
                ChangeSet::new()
                    .with(Write::ExpectRound {
                        expect: Expect::Version(1),
                        id: round_id(1),
                    })
                    .with(log("s-1")),
            )
            .expect("guard matches");
        assert_eq!(store.logs().expect("logs").len(), 1);
        assert_eq!(
            store.current_round().expect("round").expect("open").version,
            1,
            "guards never bump versions"
        );
    }

    #[test]
    fn receipt_lists_created_records_in_order() {
        let store = MemoryStore::new();
        let receipt = store
            .commit(ChangeSet::new().with(log("s-1")).with(log("s-2")))
            .expect("commit");

        let ids: Vec<_> = receipt.logs.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(ids, ["log-000001", "log-000002"]);
    }
}
