//! Course catalog administration and the flattened course listings.

pub mod domain;
pub mod router;
pub mod service;


pub use domain::{CourseChanges, CourseDraft, CourseFilter, CourseView, ImportReport, RejectedDraft};
pub use router::{course_router, DraftBatch};
pub use service::{CatalogError, CourseCatalog};
