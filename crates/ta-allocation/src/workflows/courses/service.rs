use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::domain::{
    CourseChanges, CourseDraft, CourseFilter, CourseView, ImportReport, RejectedDraft,
};
use crate::store::{ChangeSet, EntityStore, Expect, StoreError, Versioned, Write};
use crate::workflows::allocation::{
    Coordinator, CoordinatorId, Course, CourseId, Placement, Professor, ProfessorId,
    DEFAULT_COMMIT_ATTEMPTS,
};
use crate::workflows::feedback::NewFeedback;

/// Course administration: bulk upserts, edits, removal and the flattened listings.
pub struct CourseCatalog<S> {
    store: Arc<S>,
    max_attempts: u32,
}

/// Coordinator and professor lookups by display name.
struct Names {
    coordinators: Vec<Coordinator>,
    professors: Vec<Professor>,
}

impl Names {
    fn department_id(&self, department: &str) -> Option<CoordinatorId> {
        let department = department.trim();
        self.coordinators
            .iter()
            .find(|jm| jm.department == department)
            .map(|jm| jm.id.clone())
    }

    fn department_name(&self, id: &CoordinatorId) -> Option<String> {
        self.coordinators
            .iter()
            .find(|jm| jm.id == *id)
            .map(|jm| jm.department.clone())
    }

    /// Resolves a comma-separated list of names; the first unknown name is the error.
    fn professor_ids(&self, names: &str) -> Result<Vec<ProfessorId>, String> {
        names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| {
                self.professors
                    .iter()
                    .find(|prof| prof.name == name)
                    .map(|prof| prof.id.clone())
                    .ok_or_else(|| name.to_string())
            })
            .collect()
    }

    fn professor_names(&self, ids: &[ProfessorId]) -> Vec<String> {
        let by_id: HashMap<&ProfessorId, &str> = self
            .professors
            .iter()
            .map(|prof| (&prof.id, prof.name.as_str()))
            .collect();
        ids.iter()
            .filter_map(|id| by_id.get(id).map(|name| name.to_string()))
            .collect()
    }

    fn view(&self, course: Course) -> CourseView {
        let department = self.department_name(&course.department);
        let professors = self.professor_names(&course.professors);
        CourseView::new(course, department, &professors)
    }
}

impl<S> CourseCatalog<S>
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

    /// Upserts every valid draft keyed by (acronym, name). Rejected drafts come back with
    /// the reason; the valid ones are committed together.
    pub fn add(&self, drafts: Vec<CourseDraft>) -> Result<ImportReport, CatalogError> {
        let names = self.names()?;
        let mut invalid_courses = Vec::new();
        let mut accepted: BTreeMap<(String, String), (CourseDraft, CoordinatorId, Vec<ProfessorId>)> =
            BTreeMap::new();

        for draft in drafts {
            match validate(&names, &draft) {
                Ok((department, professors)) => {
                    accepted.insert(draft.upsert_key(), (draft, department, professors));
                }
                Err(message) => {
                    debug!(course = %draft.name, reason = %message, "rejected course draft");
                    invalid_courses.push(RejectedDraft {
                        course: draft,
                        message,
                    });
                }
            }
        }

        if accepted.is_empty() {
            return Ok(ImportReport {
                stored: Vec::new(),
                invalid_courses,
            });
        }

        let stored = self.with_retries("add courses", || {
            let existing: HashMap<(String, String), Versioned<Course>> = self
                .store
                .courses()?
                .into_iter()
                .map(|doc| {
                    let key = (doc.record.acronym.clone(), doc.record.name.clone());
                    (key, doc)
                })
                .collect();

            let mut changes = ChangeSet::new();
            let mut ids = Vec::with_capacity(accepted.len());
            for (key, (draft, department, professors)) in &accepted {
                let (expect, id, ta_allocated) = match existing.get(key) {
                    Some(doc) => (
                        Expect::Version(doc.version),
                        doc.record.id.clone(),
                        doc.record.ta_allocated.clone(),
                    ),
                    None => (Expect::Absent, self.store.next_course_id()?, Vec::new()),
                };

                let mut record = Course {
                    id: id.clone(),
                    name: draft.name.trim().to_string(),
                    code: draft.code.trim().to_string(),
                    acronym: draft.acronym.trim().to_string(),
                    credits: draft.credits,
                    department: department.clone(),
                    professors: professors.clone(),
                    total_students: draft.total_students,
                    ta_student_ratio: draft.ta_student_ratio,
                    ta_required: 0,
                    ta_allocated,
                };
                record.refresh_ta_required();
                changes.push(Write::PutCourse { expect, record });
                ids.push(id);
            }

            self.store.commit(changes)?;
            Ok(ids)
        })?;

        info!(
            stored = stored.len(),
            rejected = invalid_courses.len(),
            "course upload processed"
        );
        Ok(ImportReport {
            stored,
            invalid_courses,
        })
    }

    /// Partial edit. A changed professor list gains placeholders for joining professors
    /// and drops the feedback of departing ones for every current TA.
    pub fn update(&self, id: &CourseId, changes: CourseChanges) -> Result<CourseView, CatalogError> {
        let names = self.names()?;

        let department = match changes.department.as_deref() {
            Some(name) => Some(
                names
                    .department_id(name)
                    .ok_or_else(|| CatalogError::InvalidDepartment(name.to_string()))?,
            ),
            None => None,
        };
        let professors = match changes.professor.as_deref() {
            Some(list) => Some(
                names
                    .professor_ids(list)
                    .map_err(CatalogError::UnknownProfessor)?,
            ),
            None => None,
        };
        if changes.total_students == Some(0) || changes.ta_student_ratio == Some(0) {
            return Err(CatalogError::Invalid(
                "totalStudents and taStudentRatio must be positive".to_string(),
            ));
        }

        let updated = self.with_retries("update course", || {
            let doc = self
                .store
                .course(id)?
                .ok_or_else(|| CatalogError::NotFound(id.clone()))?;

            let mut course = doc.record;
            let previous_professors = course.professors.clone();
            if let Some(name) = &changes.name {
                course.name = name.trim().to_string();
            }
            if let Some(code) = &changes.code {
                course.code = code.trim().to_string();
            }
            if let Some(acronym) = &changes.acronym {
                course.acronym = acronym.trim().to_string();
            }
            if let Some(credits) = changes.credits {
                course.credits = credits;
            }
            if let Some(department) = &department {
                course.department = department.clone();
            }
            if let Some(professors) = &professors {
                course.professors = professors.clone();
            }
            if let Some(total) = changes.total_students {
                course.total_students = total;
            }
            if let Some(ratio) = changes.ta_student_ratio {
                course.ta_student_ratio = ratio;
            }
            if changes.total_students.is_some() || changes.ta_student_ratio.is_some() {
                course.refresh_ta_required();
            }

            let mut writes = ChangeSet::new().with(Write::PutCourse {
                expect: Expect::Version(doc.version),
                record: course.clone(),
            });
            for departed in previous_professors
                .iter()
                .filter(|id| !course.professors.contains(id))
            {
                writes.push(Write::RemoveProfessorFeedback {
                    course: course.id.clone(),
                    professor: departed.clone(),
                });
            }
            for joined in course
                .professors
                .iter()
                .filter(|id| !previous_professors.contains(id))
            {
                for ta in &course.ta_allocated {
                    writes.push(Write::CreateFeedback(NewFeedback::placeholder(
                        ta.clone(),
                        course.id.clone(),
                        joined.clone(),
                    )));
                }
            }

            self.store.commit(writes)?;
            Ok(course)
        })?;

        info!(course = %updated.id, "course updated");
        Ok(names.view(updated))
    }

    /// Removes the course and its feedback and returns its TAs to the unallocated pool.
    pub fn delete(&self, id: &CourseId) -> Result<CourseView, CatalogError> {
        let removed = self.with_retries("delete course", || {
            let doc = self
                .store
                .course(id)?
                .ok_or_else(|| CatalogError::NotFound(id.clone()))?;

            let mut changes = ChangeSet::new();
            for ta in &doc.record.ta_allocated {
                let Some(student) = self.store.student(ta)? else {
                    warn!(student = %ta, course = %id, "allocated student missing from store");
                    continue;
                };
                if student.record.placement.course() != Some(id) {
                    continue;
                }
                let mut released = student.record;
                released.placement = Placement::Unallocated;
                changes.push(Write::PutStudent {
                    expect: Expect::Version(student.version),
                    record: released,
                });
            }
            changes
                .push(Write::RemoveCourseFeedback(id.clone()))
                .push(Write::RemoveCourse {
                    expect: Expect::Version(doc.version),
                    id: id.clone(),
                });

            self.store.commit(changes)?;
            Ok(doc.record)
        })?;

        info!(
            course = %removed.id,
            released = removed.ta_allocated.len(),
            "course deleted"
        );
        Ok(self.names()?.view(removed))
    }

    pub fn get(&self, id: &CourseId) -> Result<CourseView, CatalogError> {
        let course = self
            .store
            .course(id)?
            .ok_or_else(|| CatalogError::NotFound(id.clone()))?;
        Ok(self.names()?.view(course.record))
    }

    pub fn list(&self, filter: &CourseFilter) -> Result<Vec<CourseView>, CatalogError> {
        let names = self.names()?;
        Ok(self
            .store
            .courses()?
            .into_iter()
            .filter_map(|doc| {
                let professors = names.professor_names(&doc.record.professors);
                let view = names.view(doc.record);
                matches_filter(&view, &professors, filter).then_some(view)
            })
            .collect())
    }

    pub fn for_professor(&self, professor: &ProfessorId) -> Result<Vec<CourseView>, CatalogError> {
        let names = self.names()?;
        Ok(self
            .store
            .courses()?
            .into_iter()
            .filter(|doc| doc.record.professors.contains(professor))
            .map(|doc| names.view(doc.record))
            .collect())
    }

    fn names(&self) -> Result<Names, CatalogError> {
        Ok(Names {
            coordinators: self.store.coordinators()?,
            professors: self.store.professors()?,
        })
    }

    fn with_retries<T>(
        &self,
        operation: &'static str,
        mut attempt: impl FnMut() -> Result<T, CatalogError>,
    ) -> Result<T, CatalogError> {
        for pass in 1..=self.max_attempts {
            match attempt() {
                Err(CatalogError::Store(err)) if err.is_conflict() => {
                    debug!(operation, pass, error = %err, "write conflict, replanning");
                }
                result => return result,
            }
        }
        Err(CatalogError::TransactionConflict {
            attempts: self.max_attempts,
        })
    }
}

fn validate(names: &Names, draft: &CourseDraft) -> Result<(CoordinatorId, Vec<ProfessorId>), String> {
    if draft.missing_required() {
        return Err("All required fields must be provided".to_string());
    }
    let professors = match draft.professor.as_deref() {
        Some(list) => names
            .professor_ids(list)
            .map_err(|name| format!("Professor {name} not found"))?,
        None => Vec::new(),
    };
    let department = names
        .department_id(&draft.department)
        .ok_or_else(|| format!("Invalid department: {}", draft.department))?;
    Ok((department, professors))
}

fn same_text(candidate: &str, wanted: &Option<String>) -> bool {
    wanted
        .as_deref()
        .map(str::trim)
        .filter(|wanted| !wanted.is_empty())
        .map_or(true, |wanted| candidate.eq_ignore_ascii_case(wanted))
}

fn matches_filter(view: &CourseView, professors: &[String], filter: &CourseFilter) -> bool {
    let professor_matches = match filter.professor.as_deref().map(str::trim) {
        Some(needle) if !needle.is_empty() => {
            let needle = needle.to_lowercase();
            professors
                .iter()
                .any(|name| name.to_lowercase().contains(&needle))
        }
        _ => true,
    };

    professor_matches
        && same_text(&view.name, &filter.name)
        && same_text(&view.code, &filter.code)
        && same_text(&view.acronym, &filter.acronym)
        && same_text(view.department.as_deref().unwrap_or_default(), &filter.department)
        && filter.credits.map_or(true, |credits| view.credits == credits)
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("course {0} not found")]
    NotFound(CourseId),
    #[error("Invalid Department value: {0}")]
    InvalidDepartment(String),
    #[error("Invalid Professor value: {0}")]
    UnknownProfessor(String),
    #[error("{0}")]
    Invalid(String),
    #[error("course update abandoned after {attempts} conflicting attempts")]
    TransactionConflict { attempts: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}
