use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

record_id!(
    /// Identifier wrapper for student records.
    StudentId
);
record_id!(
    /// Identifier wrapper for course records.
    CourseId
);
record_id!(RoundId);
record_id!(ProfessorId);
record_id!(
    /// Identifier of a department coordinator (JM).
    CoordinatorId
);
record_id!(LogId);

/// Where a student currently sits in the allocation lifecycle.
///
/// Carrying the course inside the variant keeps "has a course" and "is allocated" from
/// ever drifting apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", content = "course", rename_all = "snake_case")]
pub enum Placement {
    #[default]
    Unallocated,
    Allocated(CourseId),
    Frozen(CourseId),
}

impl Placement {
    /// Numeric status used by the allocation screens: 0, 1 or 2.
    pub fn code(&self) -> u8 {
        match self {
            Placement::Unallocated => 0,
            Placement::Allocated(_) => 1,
            Placement::Frozen(_) => 2,
        }
    }

    pub fn course(&self) -> Option<&CourseId> {
        match self {
            Placement::Unallocated => None,
            Placement::Allocated(course) | Placement::Frozen(course) => Some(course),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub roll_no: String,
    pub email: String,
    #[serde(default)]
    pub program: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub ta_type: String,
    #[serde(default)]
    pub placement: Placement,
}

impl Student {
    pub fn allocation_status(&self) -> u8 {
        self.placement.code()
    }

    pub fn allocated_ta(&self) -> Option<&CourseId> {
        self.placement.course()
    }

    pub fn is_unallocated(&self) -> bool {
        matches!(self.placement, Placement::Unallocated)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
    pub code: String,
    pub acronym: String,
    #[serde(default)]
    pub credits: u8,
    pub department: CoordinatorId,
    #[serde(default)]
    pub professors: Vec<ProfessorId>,
    pub total_students: u32,
    pub ta_student_ratio: u32,
    pub ta_required: u32,
    #[serde(default)]
    pub ta_allocated: Vec<StudentId>,
}

impl Course {
    /// `ceil(total_students / ta_student_ratio)`; a zero ratio requires no TAs.
    pub fn required_tas(total_students: u32, ta_student_ratio: u32) -> u32 {
        if ta_student_ratio == 0 {
            return 0;
        }
        total_students.div_ceil(ta_student_ratio)
    }

    pub fn refresh_ta_required(&mut self) {
        self.ta_required = Self::required_tas(self.total_students, self.ta_student_ratio);
    }

    pub fn has_ta(&self, student: &StudentId) -> bool {
        self.ta_allocated.contains(student)
    }

    /// Appends the student unless already present. Returns whether the set changed.
    pub fn add_ta(&mut self, student: StudentId) -> bool {
        if self.has_ta(&student) {
            return false;
        }
        self.ta_allocated.push(student);
        true
    }

    pub fn remove_ta(&mut self, student: &StudentId) -> bool {
        let before = self.ta_allocated.len();
        self.ta_allocated.retain(|ta| ta != student);
        before != self.ta_allocated.len()
    }

    pub fn snapshot(&self) -> CourseSnapshot {
        CourseSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            code: self.code.clone(),
            acronym: self.acronym.clone(),
            ta_required: self.ta_required,
            ta_allocated: self.ta_allocated.len(),
        }
    }
}

/// Copy of the course as it looked when a log entry was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSnapshot {
    pub id: CourseId,
    pub name: String,
    pub code: String,
    pub acronym: String,
    pub ta_required: u32,
    pub ta_allocated: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub number: u32,
    pub ongoing: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Round {
    pub fn is_current(&self) -> bool {
        self.ongoing && self.ended_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Professor {
    pub id: ProfessorId,
    pub name: String,
    pub email: String,
}

/// Department coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinator {
    pub id: CoordinatorId,
    pub department: String,
    pub email: String,
}

/// Who asked for a transition. Parsed once from the request's role tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Actor {
    Coordinator(CoordinatorId),
    Professor(ProfessorId),
    Admin,
}

impl Actor {
    /// `"jm"` and `"professor"` carry the acting record's id; any other role is the administrator.
    pub fn from_role(role: &str, id: &str) -> Self {
        match role.trim().to_ascii_lowercase().as_str() {
            "jm" => Actor::Coordinator(CoordinatorId::new(id.trim())),
            "professor" => Actor::Professor(ProfessorId::new(id.trim())),
            _ => Actor::Admin,
        }
    }

    pub fn role(&self) -> ActorRole {
        match self {
            Actor::Coordinator(_) => ActorRole::Jm,
            Actor::Professor(_) => ActorRole::Professor,
            Actor::Admin => ActorRole::Admin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Jm,
    Professor,
    Admin,
}

impl ActorRole {
    pub fn label(self) -> &'static str {
        match self {
            ActorRole::Jm => "jm",
            ActorRole::Professor => "professor",
            ActorRole::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogAction {
    Allocated,
    Deallocated,
}

/// Audit record written alongside every allocation transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: LogId,
    pub student: StudentId,
    pub actor_email: Option<String>,
    pub actor_role: ActorRole,
    pub action: LogAction,
    pub course: Option<CourseSnapshot>,
    pub recorded_at: DateTime<Utc>,
}

/// Log entry before the store has assigned it an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogEntry {
    pub student: StudentId,
    pub actor_email: Option<String>,
    pub actor_role: ActorRole,
    pub action: LogAction,
    pub course: Option<CourseSnapshot>,
    pub recorded_at: DateTime<Utc>,
}

impl NewLogEntry {
    pub fn into_entry(self, id: LogId) -> LogEntry {
        LogEntry {
            id,
            student: self.student,
            actor_email: self.actor_email,
            actor_role: self.actor_role,
            action: self.action,
            course: self.course,
            recorded_at: self.recorded_at,
        }
    }
}

/// Flattened row describing one TA assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationRow {
    pub roll_no: String,
    pub name: String,
    pub program: String,
    pub department: String,
    pub ta_type: String,
    pub course: String,
    pub course_code: String,
}
