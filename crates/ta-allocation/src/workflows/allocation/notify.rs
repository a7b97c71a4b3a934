use std::collections::HashSet;

use serde::Serialize;

use super::domain::{ActorRole, LogAction, LogEntry, Student};

/// Recipients and context of an allocation or deallocation email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationNotice {
    pub action: LogAction,
    pub student_email: String,
    pub admin_email: String,
    pub coordinator_email: Option<String>,
    pub professor_emails: Vec<String>,
    pub actor_role: ActorRole,
    pub course_name: Option<String>,
}

impl AllocationNotice {
    pub fn subject(&self) -> &'static str {
        match self.action {
            LogAction::Allocated => "Student Allocation Data",
            LogAction::Deallocated => "Student Deallocation Data",
        }
    }

    /// Every address the notice goes to, without duplicates.
    pub fn recipients(&self) -> Vec<String> {
        let mut recipients = vec![self.student_email.clone(), self.admin_email.clone()];
        recipients.extend(self.coordinator_email.iter().cloned());
        recipients.extend(self.professor_emails.iter().cloned());
        recipients.retain(|address| !address.trim().is_empty());
        let mut seen = HashSet::new();
        recipients.retain(|address| seen.insert(address.clone()));
        recipients
    }
}

/// Outbound email hook. Implementations must hand the notice off without blocking.
pub trait Notifier: Send + Sync {
    fn send(&self, notice: AllocationNotice) -> Result<(), NotifyError>;
}

/// Event pushed to live allocation dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum LiveEvent {
    #[serde(rename = "liveLogs")]
    LogCreated { entry: LogEntry, student: Student },
    #[serde(rename = "studentUpdated")]
    StudentUpdated(Student),
}

impl LiveEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LiveEvent::LogCreated { .. } => "liveLogs",
            LiveEvent::StudentUpdated(_) => "studentUpdated",
        }
    }
}

/// Publish hook for connected live-update subscribers.
pub trait Broadcaster: Send + Sync {
    fn emit(&self, event: LiveEvent) -> Result<(), NotifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Broadcast hub backed by a `tokio::sync::broadcast` channel.
#[derive(Debug, Clone)]
pub struct LiveUpdates {
    sender: tokio::sync::broadcast::Sender<LiveEvent>,
}

impl LiveUpdates {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<LiveEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Broadcaster for LiveUpdates {
    fn emit(&self, event: LiveEvent) -> Result<(), NotifyError> {
        // No subscribers is not a failure; the event simply has nobody to reach.
        if let Err(err) = self.sender.send(event) {
            tracing::debug!(event = err.0.name(), "no live subscribers connected");
        }
        Ok(())
    }
}

/// Notifier that drops every notice; handy where email is switched off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledNotifier;

impl Notifier for DisabledNotifier {
    fn send(&self, notice: AllocationNotice) -> Result<(), NotifyError> {
        tracing::debug!(subject = notice.subject(), "email notifications disabled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::allocation::domain::{Placement, StudentId};

    fn notice() -> AllocationNotice {
        AllocationNotice {
            action: LogAction::Allocated,
            student_email: "s1@example.edu".to_string(),
            admin_email: "admin@example.edu".to_string(),
            coordinator_email: Some("jm@example.edu".to_string()),
            professor_emails: vec![
                "prof@example.edu".to_string(),
                "admin@example.edu".to_string(),
            ],
            actor_role: ActorRole::Jm,
            course_name: Some("Compilers".to_string()),
        }
    }

    #[test]
    fn recipients_are_deduplicated_in_order() {
        assert_eq!(
            notice().recipients(),
            [
                "s1@example.edu",
                "admin@example.edu",
                "jm@example.edu",
                "prof@example.edu"
            ]
        );
    }

    #[tokio::test]
    async fn live_updates_fan_out_to_subscribers() {
        let hub = LiveUpdates::new(8);
        let mut receiver = hub.subscribe();
        let student = Student {
            id: StudentId::new("s-1"),
            name: "Asha".to_string(),
            roll_no: "2021001".to_string(),
            email: "asha@example.edu".to_string(),
            program: String::new(),
            department: String::new(),
            ta_type: String::new(),
            placement: Placement::Unallocated,
        };

        hub.emit(LiveEvent::StudentUpdated(student.clone()))
            .expect("emit succeeds");

        let received = receiver.recv().await.expect("event delivered");
        assert_eq!(received, LiveEvent::StudentUpdated(student));
        assert_eq!(received.name(), "studentUpdated");
    }

    #[test]
    fn emitting_without_subscribers_is_not_an_error() {
        let hub = LiveUpdates::new(1);
        let student = Student {
            id: StudentId::new("s-2"),
            name: "Ravi".to_string(),
            roll_no: "2021002".to_string(),
            email: "ravi@example.edu".to_string(),
            program: String::new(),
            department: String::new(),
            ta_type: String::new(),
            placement: Placement::Unallocated,
        };
        assert!(hub.emit(LiveEvent::StudentUpdated(student)).is_ok());
        assert_eq!(hub.subscriber_count(), 0);
    }
}
