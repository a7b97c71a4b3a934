use super::domain::{FeedbackView, OverallGrade};
use super::service::FeedbackError;

const HEADERS: [&str; 14] = [
    "Professor Name",
    "Professor Email",
    "Student Roll No.",
    "Student Name",
    "Course Name",
    "Overall Grade",
    "Regularity in Meeting",
    "Attendance in Lectures",
    "Preparedness for Tutorials",
    "Timeliness of Tasks",
    "Quality of Work",
    "Attitude and Commitment",
    "Nominated for Best TA",
    "Comments",
];

fn or_na(value: &str) -> &str {
    if value.trim().is_empty() {
        "N/A"
    } else {
        value
    }
}

pub(crate) fn to_csv(views: &[FeedbackView]) -> Result<Vec<u8>, FeedbackError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADERS)?;

    for view in views {
        let assessment = &view.assessment;
        let grade = match assessment.overall_grade {
            OverallGrade::S => "S",
            OverallGrade::X => "X",
        };

        let mut record: Vec<&str> = vec![
            or_na(&view.professor_name),
            or_na(&view.professor_email),
            or_na(&view.student_roll_no),
            or_na(&view.student_name),
            or_na(&view.course_name),
            grade,
        ];
        record.extend(
            assessment
                .ratings
                .entries()
                .iter()
                .map(|(_, rating)| rating.label()),
        );
        record.push(if assessment.nominated_for_best_ta {
            "Yes"
        } else {
            "No"
        });
        record.push(or_na(&assessment.comments));

        writer.write_record(&record)?;
    }

    writer
        .into_inner()
        .map_err(|err| FeedbackError::Export(csv::Error::from(err.into_error())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::feedback::domain::{Assessment, FeedbackId, Rating};

    #[test]
    fn export_writes_header_and_fallbacks() {
        let view = FeedbackView {
            id: Some(FeedbackId::new("fb-000001")),
            course_name: "Compilers".to_string(),
            course_code: "CSE511".to_string(),
            student_name: "Asha Rao".to_string(),
            student_roll_no: "2021001".to_string(),
            professor_name: "Dr. Sen".to_string(),
            professor_email: String::new(),
            assessment: Assessment {
                nominated_for_best_ta: true,
                ..Assessment::default()
            },
        };
        let mut excellent = view.clone();
        excellent.assessment.ratings.quality_of_work = Rating::Excellent;
        excellent.assessment.comments = "Ran every lab, thanks".to_string();

        let bytes = to_csv(&[view, excellent]).expect("csv builds");
        let text = String::from_utf8(bytes).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Professor Name,Professor Email,Student Roll No."));
        assert!(lines[1].contains("Dr. Sen,N/A,2021001"));
        assert!(lines[1].ends_with("Yes,N/A"));
        assert!(lines[2].contains("Excellent"));
        assert!(lines[2].ends_with("\"Ran every lab, thanks\""));
    }
}
