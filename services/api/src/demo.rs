use std::sync::Arc;

use clap::Args;
use ta_allocation::config::AllocationConfig;
use ta_allocation::error::AppError;
use ta_allocation::store::{MemoryStore, Seed};
use ta_allocation::workflows::allocation::{
    Actor, AllocationError, AllocationRequest, Coordinator, CoordinatorId, CourseId,
    DeallocationRequest, Placement, Professor, ProfessorId, Student, StudentId,
    TransitionOutcome,
};
use ta_allocation::workflows::courses::{CourseDraft, CourseFilter};
use ta_allocation::workflows::feedback::{FeedbackEdit, Rating};

use crate::infra::{MailQueue, Services};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Skip the feedback window portion of the demo.
    #[arg(long)]
    pub(crate) skip_feedback: bool,
    /// Print every audit log entry as JSON at the end.
    #[arg(long)]
    pub(crate) show_logs: bool,
}

fn sample_seed() -> Seed {
    let student = |id: &str, name: &str, roll_no: &str| Student {
        id: StudentId::new(id),
        name: name.to_string(),
        roll_no: roll_no.to_string(),
        email: format!("{id}@students.example.edu"),
        program: "M.Tech".to_string(),
        department: "CSE".to_string(),
        ta_type: "PG".to_string(),
        placement: Placement::Unallocated,
    };

    Seed {
        coordinators: vec![Coordinator {
            id: CoordinatorId::new("jm-cse"),
            department: "CSE".to_string(),
            email: "jm.cse@example.edu".to_string(),
        }],
        professors: vec![
            Professor {
                id: ProfessorId::new("prof-iyer"),
                name: "Meera Iyer".to_string(),
                email: "meera.iyer@example.edu".to_string(),
            },
            Professor {
                id: ProfessorId::new("prof-shah"),
                name: "Karan Shah".to_string(),
                email: "karan.shah@example.edu".to_string(),
            },
        ],
        students: vec![
            student("s-101", "Asha Rao", "2023101"),
            student("s-102", "Ravi Kumar", "2023102"),
            student("s-103", "Nisha Menon", "2023103"),
            student("s-104", "Arjun Das", "2023104"),
        ],
        ..Seed::default()
    }
}

fn draft(
    name: &str,
    code: &str,
    acronym: &str,
    professor: &str,
    total: u32,
    ratio: u32,
) -> CourseDraft {
    CourseDraft {
        name: name.to_string(),
        code: code.to_string(),
        acronym: acronym.to_string(),
        credits: 4,
        department: "CSE".to_string(),
        professor: Some(professor.to_string()),
        total_students: total,
        ta_student_ratio: ratio,
    }
}

fn report(label: &str, result: Result<TransitionOutcome, AllocationError>) {
    match result {
        Ok(outcome) => {
            let course = outcome
                .course
                .as_ref()
                .map(|course| {
                    format!(
                        "{} ({}/{})",
                        course.acronym,
                        course.ta_allocated.len(),
                        course.ta_required
                    )
                })
                .unwrap_or_else(|| "no course".to_string());
            println!("  {label}: ok -> {course}, log {}", outcome.log.id);
        }
        Err(err) => println!("  {label}: rejected ({err})"),
    }
}

fn allocate(
    services: &Services,
    student: &str,
    course: &CourseId,
    actor: Actor,
) -> Result<TransitionOutcome, AllocationError> {
    services.engine.allocate(&AllocationRequest {
        student: StudentId::new(student),
        course: course.clone(),
        actor,
    })
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AllocationConfig::default();
    let store = Arc::new(MemoryStore::from_seed(sample_seed()));
    let (mail, mut outbox) = MailQueue::new(config.mail_sender.clone());
    let services = Services::build(store, mail, &config);

    println!("TA allocation demo");

    let upload = services.courses.add(vec![
        draft("Operating Systems", "CSE231", "OS", "Meera Iyer", 60, 30),
        draft("Machine Learning", "CSE343", "ML", "Meera Iyer, Karan Shah", 140, 40),
        draft("Quantum Computing", "CSE600", "QC", "Unknown Person", 30, 30),
    ])?;
    println!(
        "\nCourse upload: {} stored, {} rejected",
        upload.stored.len(),
        upload.invalid_courses.len()
    );
    for rejected in &upload.invalid_courses {
        println!("  {}: {}", rejected.course.name, rejected.message);
    }

    let courses = services.courses.list(&CourseFilter::default())?;
    let course_id = |acronym: &str| {
        courses
            .iter()
            .find(|course| course.acronym == acronym)
            .map(|course| course.id.clone())
            .ok_or_else(|| AllocationError::NotFound {
                entity: "course",
                id: acronym.to_string(),
            })
    };
    let os = course_id("OS")?;
    let ml = course_id("ML")?;

    let professor = Actor::Professor(ProfessorId::new("prof-iyer"));
    let coordinator = Actor::Coordinator(CoordinatorId::new("jm-cse"));

    let round = services.rounds.start_next()?;
    println!("\nRound {} (professors and coordinators)", round.number);
    report("prof-iyer allocates s-101 to OS", allocate(&services, "s-101", &os, professor.clone()));
    report("jm-cse allocates s-102 to OS", allocate(&services, "s-102", &os, coordinator.clone()));
    report("jm-cse allocates s-102 to ML", allocate(&services, "s-102", &ml, coordinator.clone()));
    report("jm-cse allocates s-103 to ML", allocate(&services, "s-103", &ml, coordinator.clone()));
    report("jm-cse allocates s-104 to ML", allocate(&services, "s-104", &ml, coordinator.clone()));
    match services.engine.freeze(&StudentId::new("s-101")) {
        Ok(student) => println!("  freeze s-101: status {}", student.allocation_status()),
        Err(err) => println!("  freeze s-101: rejected ({err})"),
    }

    let round = services.rounds.start_next()?;
    println!("\nRound {} (coordinators fill to requirement)", round.number);
    report("prof-iyer allocates s-104 to OS", allocate(&services, "s-104", &os, professor));
    report("jm-cse allocates s-104 to OS", allocate(&services, "s-104", &os, coordinator.clone()));
    report(
        "jm-cse deallocates s-103",
        services.engine.deallocate(&DeallocationRequest {
            student: StudentId::new("s-103"),
            course: Some(ml.clone()),
            actor: coordinator.clone(),
        }),
    );
    report(
        "jm-cse deallocates frozen s-101",
        services.engine.deallocate(&DeallocationRequest {
            student: StudentId::new("s-101"),
            course: None,
            actor: coordinator,
        }),
    );

    println!("\nAllocations");
    for row in services.engine.allocations()? {
        println!("  {} {:<12} {} ({})", row.roll_no, row.name, row.course, row.course_code);
    }

    if !args.skip_feedback {
        let created = services.feedback.start()?;
        println!("\nFeedback window opened with {created} placeholders");
        let forms = services
            .feedback
            .for_professor(&ProfessorId::new("prof-iyer"))?;
        if let Some(id) = forms.iter().find_map(|form| form.id.clone()) {
            services.feedback.edit(
                &id,
                FeedbackEdit {
                    quality_of_work: Some(Rating::Excellent),
                    nominated_for_best_ta: Some(true),
                    comments: Some("Ran every tutorial on time".to_string()),
                    ..FeedbackEdit::default()
                },
            )?;
        }
        services.feedback.close()?;
        let csv = services.feedback.export_csv()?;
        println!("Feedback export:\n{}", String::from_utf8_lossy(&csv));
    }

    let logs = services.engine.logs()?;
    println!("\nAudit log: {} entries", logs.len());
    if args.show_logs {
        println!("{}", serde_json::to_string_pretty(&logs)?);
    }

    let mut queued = 0;
    while let Ok(mail) = outbox.try_recv() {
        queued += 1;
        println!("  mail: {} -> {}", mail.subject, mail.to.join(", "));
    }
    println!("Queued emails: {queued}");
    Ok(())
}
