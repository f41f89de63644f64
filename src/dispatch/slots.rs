//! Job slots: at most one in-flight target request per job.
//!
//! # Design Decisions
//! - Starting a job aborts the request already running in its slot
//! - A finished request is dropped if its own abort signal fired or its
//!   generation is no longer current, so stale results never land

use std::time::{Duration, Instant, SystemTime};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::dispatch::abort::{abort_pair, AbortHandle, AbortSignal};
use crate::relay::Outcome;

/// What a slot currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running {
        started: Instant,
    },
    Finished {
        outcome: Outcome,
        duration: Duration,
        finished_at: SystemTime,
    },
}

/// A completed, non-superseded run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRun {
    pub job_id: String,
    pub outcome: Outcome,
    pub duration: Duration,
    pub finished_at: SystemTime,
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    abort: AbortHandle,
    state: JobState,
}

/// Proof of a started request. Hand it back to [`JobSlots::finish`].
#[derive(Debug)]
pub struct Ticket {
    job_id: String,
    generation: u64,
    signal: AbortSignal,
    started: Instant,
}

impl Ticket {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    pub fn started(&self) -> Instant {
        self.started
    }
}

#[derive(Debug, Default)]
pub struct JobSlots {
    slots: DashMap<String, Slot>,
}

impl JobSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request in `job_id`'s slot, aborting any prior one.
    pub fn begin(&self, job_id: &str) -> Ticket {
        let (handle, signal) = abort_pair();
        let started = Instant::now();

        let generation = match self.slots.entry(job_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let slot = entry.get_mut();
                if matches!(slot.state, JobState::Running { .. }) {
                    tracing::debug!(job_id, "Superseding in-flight request");
                }
                slot.abort.abort();
                slot.generation += 1;
                slot.abort = handle;
                slot.state = JobState::Running { started };
                slot.generation
            }
            Entry::Vacant(entry) => {
                entry.insert(Slot {
                    generation: 1,
                    abort: handle,
                    state: JobState::Running { started },
                });
                1
            }
        };

        Ticket {
            job_id: job_id.to_string(),
            generation,
            signal,
            started,
        }
    }

    /// Record the outcome for `ticket`. Returns `None` when the request was
    /// aborted or superseded; slot state is left untouched in that case.
    pub fn finish(&self, ticket: &Ticket, outcome: Outcome) -> Option<JobRun> {
        if ticket.signal.is_aborted() {
            return None;
        }

        let mut slot = self.slots.get_mut(&ticket.job_id)?;
        if slot.generation != ticket.generation {
            return None;
        }

        let duration = ticket.started.elapsed();
        let finished_at = SystemTime::now();
        slot.state = JobState::Finished {
            outcome: outcome.clone(),
            duration,
            finished_at,
        };

        Some(JobRun {
            job_id: ticket.job_id.clone(),
            outcome,
            duration,
            finished_at,
        })
    }

    pub fn state(&self, job_id: &str) -> JobState {
        self.slots
            .get(job_id)
            .map(|slot| slot.state.clone())
            .unwrap_or(JobState::Idle)
    }

    /// Abort the running request in `job_id`'s slot, if any.
    pub fn abort(&self, job_id: &str) -> bool {
        match self.slots.get_mut(job_id) {
            Some(mut slot) => Self::abort_slot(&mut slot),
            None => false,
        }
    }

    /// Abort every running request. Used on teardown.
    pub fn abort_all(&self) -> usize {
        self.slots
            .iter_mut()
            .filter_map(|mut slot| Self::abort_slot(slot.value_mut()).then_some(()))
            .count()
    }

    fn abort_slot(slot: &mut Slot) -> bool {
        if !matches!(slot.state, JobState::Running { .. }) {
            return false;
        }
        slot.abort.abort();
        slot.state = JobState::Idle;
        true
    }
}
