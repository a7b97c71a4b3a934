use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::domain::{Assessment, Feedback, FeedbackEdit, FeedbackId, FeedbackView, NewFeedback};
use super::export;
use crate::store::{ChangeSet, EntityStore, Expect, StoreError, Write};
use crate::workflows::allocation::{
    Course, CourseId, Professor, ProfessorId, Student, StudentId, DEFAULT_COMMIT_ATTEMPTS,
};

/// Feedback window management and professor-facing feedback editing.
pub struct FeedbackService<S> {
    store: Arc<S>,
    max_attempts: u32,
}

/// Display lookups resolved once per request.
struct Directory {
    courses: HashMap<CourseId, Course>,
    students: HashMap<StudentId, Student>,
    professors: HashMap<ProfessorId, Professor>,
}

impl Directory {
    fn view(
        &self,
        id: Option<FeedbackId>,
        student: &StudentId,
        course: &CourseId,
        professor: &ProfessorId,
        assessment: Assessment,
    ) -> FeedbackView {
        let course = self.courses.get(course);
        let student = self.students.get(student);
        let professor = self.professors.get(professor);
        FeedbackView {
            id,
            course_name: course.map(|c| c.name.clone()).unwrap_or_default(),
            course_code: course.map(|c| c.code.clone()).unwrap_or_default(),
            student_name: student.map(|s| s.name.clone()).unwrap_or_default(),
            student_roll_no: student.map(|s| s.roll_no.clone()).unwrap_or_default(),
            professor_name: professor.map(|p| p.name.clone()).unwrap_or_default(),
            professor_email: professor.map(|p| p.email.clone()).unwrap_or_default(),
            assessment,
        }
    }

    fn view_of(&self, feedback: Feedback) -> FeedbackView {
        self.view(
            Some(feedback.id),
            &feedback.student,
            &feedback.course,
            &feedback.professor,
            feedback.assessment,
        )
    }
}

impl<S> FeedbackService<S>
where
    S: EntityStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self::with_attempts(store, DEFAULT_COMMIT_ATTEMPTS)
    }

    pub fn with_attempts(store: Arc<S>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Opens the window and resets every course's feedback to one placeholder per
    /// allocated TA and course professor. Returns the number of placeholders created.
    ///
    /// Every course read is pinned at its version; a course write landing in between
    /// forces a fresh plan. Courses created after the read keep their feedback.
    pub fn start(&self) -> Result<usize, FeedbackError> {
        let created = self.with_retries(|| {
            let mut changes = ChangeSet::new().with(Write::SetFeedbackWindow { open: true });

            let mut created = 0;
            for doc in self.store.courses()? {
                changes
                    .push(Write::ExpectCourse {
                        expect: Expect::Version(doc.version),
                        id: doc.record.id.clone(),
                    })
                    .push(Write::RemoveCourseFeedback(doc.record.id.clone()));
                let course = doc.record;
                for professor in &course.professors {
                    for ta in &course.ta_allocated {
                        changes.push(Write::CreateFeedback(NewFeedback::placeholder(
                            ta.clone(),
                            course.id.clone(),
                            professor.clone(),
                        )));
                        created += 1;
                    }
                }
            }

            self.store.commit(changes)?;
            Ok(created)
        })?;
        info!(placeholders = created, "feedback window opened");
        Ok(created)
    }

    pub fn close(&self) -> Result<(), FeedbackError> {
        self.store
            .commit(ChangeSet::new().with(Write::SetFeedbackWindow { open: false }))?;
        info!("feedback window closed");
        Ok(())
    }

    pub fn is_open(&self) -> Result<bool, FeedbackError> {
        Ok(self.store.feedback_window_open()?)
    }

    pub fn edit(&self, id: &FeedbackId, edit: FeedbackEdit) -> Result<Feedback, FeedbackError> {
        if !self.store.feedback_window_open()? {
            return Err(FeedbackError::Closed);
        }

        let mut feedback = self
            .store
            .feedback(id)?
            .ok_or_else(|| FeedbackError::NotFound(id.clone()))?;
        feedback.assessment.apply(edit);

        match self
            .store
            .commit(ChangeSet::new().with(Write::ReplaceFeedback(feedback.clone())))
        {
            Ok(_) => Ok(feedback),
            Err(StoreError::Missing { .. }) => Err(FeedbackError::NotFound(id.clone())),
            Err(err) => Err(err.into()),
        }
    }

    /// Feedback for each TA on the professor's courses; unsaved pairs come back as
    /// placeholders without an id.
    pub fn for_professor(
        &self,
        professor: &ProfessorId,
    ) -> Result<Vec<FeedbackView>, FeedbackError> {
        let directory = self.directory()?;
        let stored = self.store.feedbacks()?;

        let mut courses: Vec<&Course> = directory
            .courses
            .values()
            .filter(|course| course.professors.contains(professor))
            .collect();
        courses.sort_by(|a, b| a.id.cmp(&b.id));

        let mut views = Vec::new();
        for course in courses {
            for ta in &course.ta_allocated {
                let existing = stored.iter().find(|feedback| {
                    feedback.professor == *professor
                        && feedback.course == course.id
                        && feedback.student == *ta
                });
                let view = match existing {
                    Some(feedback) => directory.view_of(feedback.clone()),
                    None => directory.view(None, ta, &course.id, professor, Assessment::default()),
                };
                views.push(view);
            }
        }
        Ok(views)
    }

    pub fn all(&self) -> Result<Vec<FeedbackView>, FeedbackError> {
        let directory = self.directory()?;
        Ok(self
            .store
            .feedbacks()?
            .into_iter()
            .map(|feedback| directory.view_of(feedback))
            .collect())
    }

    /// CSV of every feedback a professor actually filled in.
    pub fn export_csv(&self) -> Result<Vec<u8>, FeedbackError> {
        let submitted: Vec<FeedbackView> = self
            .all()?
            .into_iter()
            .filter(|view| view.assessment.is_submitted())
            .collect();

        if submitted.is_empty() {
            return Err(FeedbackError::NoSubmissions);
        }

        export::to_csv(&submitted)
    }

    fn with_retries<T>(
        &self,
        mut attempt: impl FnMut() -> Result<T, FeedbackError>,
    ) -> Result<T, FeedbackError> {
        for pass in 1..=self.max_attempts {
            match attempt() {
                Err(FeedbackError::Store(err)) if err.is_conflict() => {
                    debug!(pass, error = %err, "feedback reset raced a course write, replanning");
                }
                result => return result,
            }
        }
        Err(FeedbackError::TransactionConflict {
            attempts: self.max_attempts,
        })
    }

    fn directory(&self) -> Result<Directory, FeedbackError> {
        Ok(Directory {
            courses: self
                .store
                .courses()?
                .into_iter()
                .map(|doc| (doc.record.id.clone(), doc.record))
                .collect(),
            students: self
                .store
                .students()?
                .into_iter()
                .map(|student| (student.id.clone(), student))
                .collect(),
            professors: self
                .store
                .professors()?
                .into_iter()
                .map(|professor| (professor.id.clone(), professor))
                .collect(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("Feedback form is closed. Cannot edit feedback.")]
    Closed,
    #[error("feedback {0} not found")]
    NotFound(FeedbackId),
    #[error("No submitted feedbacks available for download.")]
    NoSubmissions,
    #[error("feedback reset abandoned after {attempts} conflicting attempts")]
    TransactionConflict { attempts: u32 },
    #[error("failed to build feedback export: {0}")]
    Export(#[from] csv::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}
