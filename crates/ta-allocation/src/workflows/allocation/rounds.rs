use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::domain::Round;
use super::service::AllocationError;
use crate::store::{round_id, ChangeSet, EntityStore, Expect, Write};

/// Opens and closes numbered allocation rounds.
pub struct RoundTracker<S> {
    store: Arc<S>,
}

impl<S> RoundTracker<S>
where
    S: EntityStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn current(&self) -> Result<Option<Round>, AllocationError> {
        Ok(self.store.current_round()?.map(|round| round.into_record()))
    }

    pub fn history(&self) -> Result<Vec<Round>, AllocationError> {
        Ok(self
            .store
            .rounds()?
            .into_iter()
            .map(|round| round.into_record())
            .collect())
    }

    /// Closes the current round (if any) and opens the next ordinal.
    pub fn start_next(&self) -> Result<Round, AllocationError> {
        let rounds = self.store.rounds()?;
        let now = Utc::now();
        let number = rounds
            .iter()
            .map(|round| round.record.number)
            .max()
            .map_or(1, |highest| highest + 1);

        let mut changes = ChangeSet::new();
        for open in rounds.iter().filter(|round| round.record.is_current()) {
            let mut closed = open.record.clone();
            closed.ongoing = false;
            closed.ended_at = Some(now);
            changes.push(Write::PutRound {
                expect: Expect::Version(open.version),
                record: closed,
            });
        }

        let round = Round {
            id: round_id(number),
            number,
            ongoing: true,
            started_at: now,
            ended_at: None,
        };
        changes.push(Write::PutRound {
            expect: Expect::Absent,
            record: round.clone(),
        });

        self.store.commit(changes)?;
        info!(round = number, "allocation round started");
        Ok(round)
    }

    pub fn end_current(&self) -> Result<Round, AllocationError> {
        let current = self
            .store
            .current_round()?
            .ok_or(AllocationError::NoActiveRound)?;

        let mut closed = current.record;
        closed.ongoing = false;
        closed.ended_at = Some(Utc::now());

        self.store.commit(ChangeSet::new().with(Write::PutRound {
            expect: Expect::Version(current.version),
            record: closed.clone(),
        }))?;
        info!(round = closed.number, "allocation round ended");
        Ok(closed)
    }
}
