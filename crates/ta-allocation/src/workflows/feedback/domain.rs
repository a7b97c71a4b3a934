use std::fmt;

use serde::{Deserialize, Serialize};

use crate::workflows::allocation::{CourseId, ProfessorId, StudentId};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedbackId(pub String);

impl FeedbackId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for FeedbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Satisfactory / unsatisfactory verdict on a TA's term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OverallGrade {
    #[default]
    S,
    X,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Rating {
    Excellent,
    #[serde(rename = "Very Good")]
    VeryGood,
    Good,
    #[default]
    Average,
    #[serde(rename = "Below Average")]
    BelowAverage,
    #[serde(rename = "NA")]
    NotApplicable,
}

impl Rating {
    pub fn label(self) -> &'static str {
        match self {
            Rating::Excellent => "Excellent",
            Rating::VeryGood => "Very Good",
            Rating::Good => "Good",
            Rating::Average => "Average",
            Rating::BelowAverage => "Below Average",
            Rating::NotApplicable => "NA",
        }
    }
}

/// The six rubric lines a professor fills in for each TA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RatingSheet {
    pub regularity_in_meeting: Rating,
    pub attendance_in_lectures: Rating,
    pub preparedness_for_tutorials: Rating,
    pub timeliness_of_tasks: Rating,
    pub quality_of_work: Rating,
    pub attitude_commitment: Rating,
}

impl RatingSheet {
    pub fn entries(&self) -> [(&'static str, Rating); 6] {
        [
            ("Regularity in Meeting", self.regularity_in_meeting),
            ("Attendance in Lectures", self.attendance_in_lectures),
            ("Preparedness for Tutorials", self.preparedness_for_tutorials),
            ("Timeliness of Tasks", self.timeliness_of_tasks),
            ("Quality of Work", self.quality_of_work),
            ("Attitude and Commitment", self.attitude_commitment),
        ]
    }
}

/// Body of a feedback record; shared by stored records and unsaved placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub overall_grade: OverallGrade,
    #[serde(flatten)]
    pub ratings: RatingSheet,
    pub nominated_for_best_ta: bool,
    pub comments: String,
}

impl Assessment {
    /// Anything a professor changed away from the placeholder defaults.
    pub fn is_submitted(&self) -> bool {
        !self.is_placeholder()
    }

    fn is_placeholder(&self) -> bool {
        let Assessment {
            overall_grade,
            ratings,
            nominated_for_best_ta,
            comments,
        } = self;
        *overall_grade == OverallGrade::S
            && *ratings == RatingSheet::default()
            && !nominated_for_best_ta
            && comments.trim().is_empty()
    }

    pub fn apply(&mut self, edit: FeedbackEdit) {
        let FeedbackEdit {
            overall_grade,
            regularity_in_meeting,
            attendance_in_lectures,
            preparedness_for_tutorials,
            timeliness_of_tasks,
            quality_of_work,
            attitude_commitment,
            nominated_for_best_ta,
            comments,
        } = edit;

        let ratings = &mut self.ratings;
        if let Some(grade) = overall_grade {
            self.overall_grade = grade;
        }
        if let Some(value) = regularity_in_meeting {
            ratings.regularity_in_meeting = value;
        }
        if let Some(value) = attendance_in_lectures {
            ratings.attendance_in_lectures = value;
        }
        if let Some(value) = preparedness_for_tutorials {
            ratings.preparedness_for_tutorials = value;
        }
        if let Some(value) = timeliness_of_tasks {
            ratings.timeliness_of_tasks = value;
        }
        if let Some(value) = quality_of_work {
            ratings.quality_of_work = value;
        }
        if let Some(value) = attitude_commitment {
            ratings.attitude_commitment = value;
        }
        if let Some(value) = nominated_for_best_ta {
            self.nominated_for_best_ta = value;
        }
        if let Some(text) = comments.filter(|text| !text.is_empty()) {
            self.comments = text;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: FeedbackId,
    pub student: StudentId,
    pub course: CourseId,
    pub professor: ProfessorId,
    #[serde(flatten)]
    pub assessment: Assessment,
}

/// Feedback awaiting an identifier from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFeedback {
    pub student: StudentId,
    pub course: CourseId,
    pub professor: ProfessorId,
    pub assessment: Assessment,
}

impl NewFeedback {
    pub fn placeholder(student: StudentId, course: CourseId, professor: ProfessorId) -> Self {
        Self {
            student,
            course,
            professor,
            assessment: Assessment::default(),
        }
    }

    pub fn into_feedback(self, id: FeedbackId) -> Feedback {
        Feedback {
            id,
            student: self.student,
            course: self.course,
            professor: self.professor,
            assessment: self.assessment,
        }
    }
}

/// Partial update submitted by a professor; absent fields keep their stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEdit {
    #[serde(default)]
    pub overall_grade: Option<OverallGrade>,
    #[serde(default)]
    pub regularity_in_meeting: Option<Rating>,
    #[serde(default)]
    pub attendance_in_lectures: Option<Rating>,
    #[serde(default)]
    pub preparedness_for_tutorials: Option<Rating>,
    #[serde(default)]
    pub timeliness_of_tasks: Option<Rating>,
    #[serde(default)]
    pub quality_of_work: Option<Rating>,
    #[serde(default)]
    pub attitude_commitment: Option<Rating>,
    #[serde(default)]
    pub nominated_for_best_ta: Option<bool>,
    #[serde(default)]
    pub comments: Option<String>,
}

/// Feedback joined with the display fields of its course, student and professor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackView {
    pub id: Option<FeedbackId>,
    pub course_name: String,
    pub course_code: String,
    pub student_name: String,
    pub student_roll_no: String,
    pub professor_name: String,
    pub professor_email: String,
    #[serde(flatten)]
    pub assessment: Assessment,
}
