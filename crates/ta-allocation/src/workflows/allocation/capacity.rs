use super::domain::Course;

/// Enrolment at which a first-round course may take a second TA.
pub const LARGE_COURSE_THRESHOLD: u32 = 100;

/// Per-round ceiling on a course's allocated TAs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityRule {
    /// Round 1: one TA, or two for courses at or above [`LARGE_COURSE_THRESHOLD`].
    FirstRound { limit: usize },
    /// Later rounds fill up to the course's computed requirement.
    Requirement { limit: usize },
}

impl CapacityRule {
    pub fn for_round(round: u32, course: &Course) -> Self {
        if round <= 1 {
            let limit = if course.total_students >= LARGE_COURSE_THRESHOLD {
                2
            } else {
                1
            };
            CapacityRule::FirstRound { limit }
        } else {
            CapacityRule::Requirement {
                limit: course.ta_required as usize,
            }
        }
    }

    pub fn limit(self) -> usize {
        match self {
            CapacityRule::FirstRound { limit } | CapacityRule::Requirement { limit } => limit,
        }
    }

    pub fn admits(self, course: &Course) -> bool {
        course.ta_allocated.len() < self.limit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::allocation::domain::{CoordinatorId, CourseId, StudentId};

    fn course(total_students: u32, ratio: u32, allocated: usize) -> Course {
        let mut course = Course {
            id: CourseId::new("c-1"),
            name: "Data Structures".to_string(),
            code: "CSE102".to_string(),
            acronym: "DSA".to_string(),
            credits: 4,
            department: CoordinatorId::new("jm-cse"),
            professors: Vec::new(),
            total_students,
            ta_student_ratio: ratio,
            ta_required: 0,
            ta_allocated: (0..allocated)
                .map(|n| StudentId::new(format!("s-{n}")))
                .collect(),
        };
        course.refresh_ta_required();
        course
    }

    #[test]
    fn first_round_caps_small_courses_at_one() {
        let rule = CapacityRule::for_round(1, &course(99, 10, 0));
        assert_eq!(rule, CapacityRule::FirstRound { limit: 1 });
        assert!(rule.admits(&course(99, 10, 0)));
        assert!(!rule.admits(&course(99, 10, 1)));
    }

    #[test]
    fn first_round_caps_large_courses_at_two() {
        let rule = CapacityRule::for_round(1, &course(100, 10, 0));
        assert_eq!(rule.limit(), 2);
        assert!(rule.admits(&course(100, 10, 1)));
        assert!(!rule.admits(&course(100, 10, 2)));
    }

    #[test]
    fn later_rounds_use_computed_requirement() {
        let large = course(250, 40, 0);
        let rule = CapacityRule::for_round(2, &large);
        assert_eq!(rule, CapacityRule::Requirement { limit: 7 });
        assert!(rule.admits(&course(250, 40, 6)));
        assert!(!rule.admits(&course(250, 40, 7)));
        assert_eq!(CapacityRule::for_round(3, &course(10, 40, 0)).limit(), 1);
    }
}
