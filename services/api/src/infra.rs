use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use ta_allocation::config::AllocationConfig;
use ta_allocation::error::AppError;
use ta_allocation::store::{MemoryStore, Seed};
use ta_allocation::workflows::allocation::{
    AllocationEngine, AllocationNotice, LiveUpdates, LogAction, Notifier, NotifyError,
    RoundTracker,
};
use ta_allocation::workflows::courses::CourseCatalog;
use ta_allocation::workflows::feedback::FeedbackService;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) live: LiveUpdates,
}

/// Rendered email handed to the delivery task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OutgoingMail {
    pub(crate) from: String,
    pub(crate) to: Vec<String>,
    pub(crate) subject: String,
    pub(crate) body: String,
}

impl OutgoingMail {
    fn render(from: &str, notice: &AllocationNotice) -> Self {
        let course = notice.course_name.as_deref().unwrap_or("an unlisted course");
        let verb = match notice.action {
            LogAction::Allocated => "allocated to",
            LogAction::Deallocated => "deallocated from",
        };
        let body = format!(
            "Student {} has been {verb} {course} by {}.",
            notice.student_email,
            notice.actor_role.label()
        );
        Self {
            from: from.to_string(),
            to: notice.recipients(),
            subject: notice.subject().to_string(),
            body,
        }
    }
}

/// Notifier that queues mail on an unbounded channel drained by a background task, so
/// allocation requests never wait on delivery.
#[derive(Clone)]
pub(crate) struct MailQueue {
    sender: String,
    queue: mpsc::UnboundedSender<OutgoingMail>,
}

impl MailQueue {
    pub(crate) fn new(sender: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<OutgoingMail>) {
        let (queue, outbox) = mpsc::unbounded_channel();
        (
            Self {
                sender: sender.into(),
                queue,
            },
            outbox,
        )
    }

    /// Starts the delivery task on the current runtime.
    pub(crate) fn spawn(sender: impl Into<String>) -> Self {
        let (queue, mut outbox) = Self::new(sender);
        tokio::spawn(async move {
            while let Some(mail) = outbox.recv().await {
                info!(
                    from = %mail.from,
                    to = ?mail.to,
                    subject = %mail.subject,
                    "allocation email dispatched"
                );
                debug!(body = %mail.body, "allocation email body");
            }
        });
        queue
    }
}

impl Notifier for MailQueue {
    fn send(&self, notice: AllocationNotice) -> Result<(), NotifyError> {
        self.queue
            .send(OutgoingMail::render(&self.sender, &notice))
            .map_err(|_| NotifyError::Transport("mail delivery task stopped".to_string()))
    }
}

pub(crate) type Engine = AllocationEngine<MemoryStore, MailQueue, LiveUpdates>;

/// Every workflow service wired to one shared store.
pub(crate) struct Services {
    pub(crate) engine: Arc<Engine>,
    pub(crate) rounds: Arc<RoundTracker<MemoryStore>>,
    pub(crate) feedback: Arc<FeedbackService<MemoryStore>>,
    pub(crate) courses: Arc<CourseCatalog<MemoryStore>>,
    pub(crate) live: LiveUpdates,
}

impl Services {
    pub(crate) fn build(store: Arc<MemoryStore>, mail: MailQueue, config: &AllocationConfig) -> Self {
        let live = LiveUpdates::new(config.broadcast_capacity);
        let engine = AllocationEngine::new(
            store.clone(),
            Arc::new(mail),
            Arc::new(live.clone()),
            config.engine_settings(),
        );
        Self {
            engine: Arc::new(engine),
            rounds: Arc::new(RoundTracker::new(store.clone())),
            feedback: Arc::new(FeedbackService::with_attempts(
                store.clone(),
                config.commit_attempts,
            )),
            courses: Arc::new(CourseCatalog::with_attempts(store, config.commit_attempts)),
            live,
        }
    }
}

/// Reads a JSON seed file; no path means an empty store.
pub(crate) fn load_seed(path: Option<&Path>) -> Result<Seed, AppError> {
    let Some(path) = path else {
        return Ok(Seed::default());
    };
    let raw = std::fs::read_to_string(path)?;
    let seed: Seed = serde_json::from_str(&raw)?;
    info!(
        path = %path.display(),
        students = seed.students.len(),
        courses = seed.courses.len(),
        "loaded seed data"
    );
    Ok(seed)
}
