pub mod allocation;
pub mod courses;
pub mod feedback;
