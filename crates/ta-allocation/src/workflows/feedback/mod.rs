//! Professor feedback on allocated TAs: the feedback window, placeholder records created
//! on allocation, partial edits and the CSV export of submitted forms.

pub mod domain;
mod export;
pub mod router;
pub mod service;


pub use domain::{
    Assessment, Feedback, FeedbackEdit, FeedbackId, FeedbackView, NewFeedback, OverallGrade,
    Rating, RatingSheet,
};
pub use router::feedback_router;
pub use service::{FeedbackError, FeedbackService};
