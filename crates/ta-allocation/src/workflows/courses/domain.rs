use serde::{Deserialize, Serialize};

use crate::workflows::allocation::{Course, CourseId, StudentId};

/// Course row as submitted by an administrator, usually one line of a bulk upload.
///
/// Every field is optional on the wire so incomplete rows can be reported back instead of
/// failing the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseDraft {
    pub name: String,
    pub code: String,
    pub acronym: String,
    pub credits: u8,
    /// Department name as recorded on the coordinator.
    pub department: String,
    /// Comma-separated professor names.
    pub professor: Option<String>,
    pub total_students: u32,
    pub ta_student_ratio: u32,
}

impl CourseDraft {
    pub(crate) fn missing_required(&self) -> bool {
        [&self.name, &self.code, &self.acronym, &self.department]
            .iter()
            .any(|value| value.trim().is_empty())
            || self.total_students == 0
            || self.ta_student_ratio == 0
    }

    pub(crate) fn upsert_key(&self) -> (String, String) {
        (self.acronym.trim().to_string(), self.name.trim().to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseChanges {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub acronym: Option<String>,
    #[serde(default)]
    pub credits: Option<u8>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub professor: Option<String>,
    #[serde(default)]
    pub total_students: Option<u32>,
    #[serde(default)]
    pub ta_student_ratio: Option<u32>,
}

/// Listing filter; text fields match case-insensitively, `professor` as a substring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CourseFilter {
    pub name: Option<String>,
    pub code: Option<String>,
    pub acronym: Option<String>,
    pub credits: Option<u8>,
    pub department: Option<String>,
    pub professor: Option<String>,
}

/// Course flattened for display: department and professor names instead of ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseView {
    pub id: CourseId,
    pub name: String,
    pub code: String,
    pub acronym: String,
    pub department: Option<String>,
    pub credits: u8,
    pub professor: String,
    pub total_students: u32,
    pub ta_student_ratio: u32,
    pub ta_required: u32,
    pub ta_allocated: Vec<StudentId>,
}

impl CourseView {
    pub(crate) fn new(course: Course, department: Option<String>, professors: &[String]) -> Self {
        let professor = if professors.is_empty() {
            "N/A".to_string()
        } else {
            professors.join(", ")
        };
        Self {
            id: course.id,
            name: course.name,
            code: course.code,
            acronym: course.acronym,
            department,
            credits: course.credits,
            professor,
            total_students: course.total_students,
            ta_student_ratio: course.ta_student_ratio,
            ta_required: course.ta_required,
            ta_allocated: course.ta_allocated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedDraft {
    pub course: CourseDraft,
    pub message: String,
}

/// Outcome of a bulk upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub stored: Vec<CourseId>,
    pub invalid_courses: Vec<RejectedDraft>,
}
