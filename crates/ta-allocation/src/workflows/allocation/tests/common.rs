use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{Duration, Utc};
use serde_json::Value;

use crate::store::{
    round_id, ChangeSet, CommitReceipt, EntityStore, MemoryStore, Seed, StoreError, Versioned,
};
use crate::workflows::allocation::{
    Actor, AllocationEngine, AllocationNotice, AllocationRequest, Broadcaster, Coordinator,
    CoordinatorId, Course, CourseId, DeallocationRequest, EngineSettings, LiveEvent, LogEntry,
    Notifier, NotifyError, Placement, Professor, ProfessorId, Round, Student, StudentId,
};
use crate::workflows::feedback::{Feedback, FeedbackId};

pub(super) const SMALL: &str = "course-small";
pub(super) const LARGE: &str = "course-large";

pub(super) fn student(id: &str) -> Student {
    Student {
        id: StudentId::new(id),
        name: format!("Student {id}"),
        roll_no: format!("2021{}", id.trim_start_matches("s-")),
        email: format!("{id}@students.example.edu"),
        program: "M.Tech".to_string(),
        department: "CSE".to_string(),
        ta_type: "PG".to_string(),
        placement: Placement::Unallocated,
    }
}

pub(super) fn course(id: &str, total_students: u32, ratio: u32, professors: &[&str]) -> Course {
    Course {
        id: CourseId::new(id),
        name: format!("Course {id}"),
        code: id.to_uppercase(),
        acronym: id.trim_start_matches("course-").to_uppercase(),
        credits: 4,
        department: CoordinatorId::new("jm-cse"),
        professors: professors.iter().map(|id| ProfessorId::new(*id)).collect(),
        total_students,
        ta_student_ratio: ratio,
        ta_required: 0,
        ta_allocated: Vec::new(),
    }
}

/// Rounds 1..=current, with every round before `current` already closed.
pub(super) fn rounds_up_to(current: u32) -> Vec<Round> {
    let opened = Utc::now() - Duration::days(i64::from(current));
    (1..=current)
        .map(|number| Round {
            id: round_id(number),
            number,
            ongoing: number == current,
            started_at: opened + Duration::days(i64::from(number)),
            ended_at: (number != current).then(|| opened + Duration::days(i64::from(number) + 1)),
        })
        .collect()
}

pub(super) fn seed(round: Option<u32>) -> Seed {
    Seed {
        coordinators: vec![Coordinator {
            id: CoordinatorId::new("jm-cse"),
            department: "CSE".to_string(),
            email: "jm.cse@example.edu".to_string(),
        }],
        professors: vec![
            Professor {
                id: ProfessorId::new("prof-1"),
                name: "Dr. Meera Iyer".to_string(),
                email: "meera@example.edu".to_string(),
            },
            Professor {
                id: ProfessorId::new("prof-2"),
                name: "Dr. Karan Shah".to_string(),
                email: "karan@example.edu".to_string(),
            },
        ],
        students: ["s-1", "s-2", "s-3", "s-4"].into_iter().map(student).collect(),
        courses: vec![
            course(SMALL, 50, 25, &["prof-1"]),
            course(LARGE, 120, 40, &["prof-1", "prof-2"]),
        ],
        rounds: round.map(rounds_up_to).unwrap_or_default(),
    }
}

pub(super) fn store_in_round(round: u32) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::from_seed(seed(Some(round))))
}

pub(super) type TestEngine = AllocationEngine<MemoryStore, RecordingNotifier, RecordingBroadcaster>;

pub(super) fn build_engine(
    store: Arc<MemoryStore>,
) -> (TestEngine, Arc<RecordingNotifier>, Arc<RecordingBroadcaster>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let engine = AllocationEngine::new(
        store,
        notifier.clone(),
        broadcaster.clone(),
        EngineSettings {
            admin_email: "admin@example.edu".to_string(),
            ..EngineSettings::default()
        },
    );
    (engine, notifier, broadcaster)
}

pub(super) fn allocation(student: &str, course: &str, actor: Actor) -> AllocationRequest {
    AllocationRequest {
        student: StudentId::new(student),
        course: CourseId::new(course),
        actor,
    }
}

pub(super) fn deallocation(student: &str, actor: Actor) -> DeallocationRequest {
    DeallocationRequest {
        student: StudentId::new(student),
        course: None,
        actor,
    }
}

pub(super) fn coordinator() -> Actor {
    Actor::Coordinator(CoordinatorId::new("jm-cse"))
}

pub(super) fn stored_student(store: &MemoryStore, id: &str) -> Student {
    store
        .student(&StudentId::new(id))
        .expect("store readable")
        .expect("student present")
        .record
}

pub(super) fn stored_course(store: &MemoryStore, id: &str) -> Course {
    store
        .course(&CourseId::new(id))
        .expect("store readable")
        .expect("course present")
        .record
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    notices: Mutex<Vec<AllocationNotice>>,
}

impl RecordingNotifier {
    pub(super) fn notices(&self) -> Vec<AllocationNotice> {
        self.notices.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, notice: AllocationNotice) -> Result<(), NotifyError> {
        self.notices
            .lock()
            .expect("notifier mutex poisoned")
            .push(notice);
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn send(&self, _notice: AllocationNotice) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp relay refused connection".to_string()))
    }
}

#[derive(Default)]
pub(super) struct RecordingBroadcaster {
    events: Mutex<Vec<LiveEvent>>,
}

impl RecordingBroadcaster {
    pub(super) fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .expect("broadcast mutex poisoned")
            .iter()
            .map(LiveEvent::name)
            .collect()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn emit(&self, event: LiveEvent) -> Result<(), NotifyError> {
        self.events
            .lock()
            .expect("broadcast mutex poisoned")
            .push(event);
        Ok(())
    }
}

/// Store whose reads succeed but whose every commit loses a race.
pub(super) struct ConflictingStore {
    inner: MemoryStore,
    commits: AtomicU32,
}

impl ConflictingStore {
    pub(super) fn new(round: u32) -> Self {
        Self {
            inner: MemoryStore::from_seed(seed(Some(round))),
            commits: AtomicU32::new(0),
        }
    }

    pub(super) fn commits(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }
}

impl EntityStore for ConflictingStore {
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

    fn commit(&self, _changes: ChangeSet) -> Result<CommitReceipt, StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Conflict {
            entity: "course",
            id: LARGE.to_string(),
        })
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
