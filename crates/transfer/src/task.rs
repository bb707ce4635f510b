//! Upload tasks and the shared acknowledgement ledger.

use std::{collections::BTreeMap, ops::Range};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{error::NodeError, node::NodeAddress, retry::Exhausted, selector::Selection};

/// State of an upload task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Not started.
    Pending,
    /// Pushes to its targets are running.
    InFlight,
    /// Every segment reached enough targets.
    Succeeded,
    /// Some segment fell short.
    Failed {
        /// First segment that fell short.
        segment: u64,
    },
}

impl TaskStatus {
    /// Whether `next` may follow `self`.
    pub const fn can_become(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InFlight)
                | (Self::InFlight, Self::Succeeded)
                | (Self::InFlight, Self::Failed { .. })
        )
    }

    /// Whether the task has finished.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. })
    }
}

/// A contiguous run of segments and where they go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    /// Task number.
    pub id: usize,
    /// File-relative segment indices.
    pub segments: Range<u64>,
    /// Segment indices per target node.
    pub assignments: BTreeMap<NodeAddress, Vec<u64>>,
    /// Requests made, retries included.
    pub attempts: u32,
    /// Current state.
    pub status: TaskStatus,
}

impl UploadTask {
    /// Cuts `count` segments into tasks of at most `task_size` segments.
    pub fn partition(selection: &Selection, count: u64, task_size: usize) -> Vec<Self> {
        let task_size = task_size.max(1) as u64;
        (0..count.div_ceil(task_size))
            .map(|id| {
                let segments = id * task_size..((id + 1) * task_size).min(count);
                let mut assignments: BTreeMap<NodeAddress, Vec<u64>> = BTreeMap::new();
                for index in segments.clone() {
                    for node in selection.targets(index) {
                        assignments.entry(node.clone()).or_default().push(index);
                    }
                }
                Self {
                    id: id as usize,
                    segments,
                    assignments,
                    attempts: 0,
                    status: TaskStatus::Pending,
                }
            })
            .collect()
    }
}

/// A push that did not land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushFailure {
    /// Target node.
    pub node: NodeAddress,
    /// Attempts made.
    pub attempts: u32,
    /// Last error.
    pub error: NodeError,
}

/// Per segment outcome of a finished upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SegmentTally {
    pub(crate) targets: usize,
    pub(crate) acks: Vec<NodeAddress>,
    pub(crate) failures: Vec<PushFailure>,
}

#[derive(Debug)]
struct LedgerState {
    closed: bool,
    tasks: Vec<UploadTask>,
    tallies: Vec<SegmentTally>,
}

/// Task states and acknowledgements shared by concurrent pushes.
///
/// Once closed the ledger ignores every further report.
#[derive(Debug)]
pub(crate) struct Ledger {
    required: usize,
    state: Mutex<LedgerState>,
}

impl Ledger {
    /// A ledger where each segment needs `required` acknowledgements.
    pub(crate) fn new(
        tasks: Vec<UploadTask>,
        selection: &Selection,
        count: u64,
        required: usize,
    ) -> Self {
        let tallies = (0..count)
            .map(|i| SegmentTally {
                targets: selection.targets(i).len(),
                acks: Vec::new(),
                failures: Vec::new(),
            })
            .collect();
        let state = LedgerState {
            closed: false,
            tasks,
            tallies,
        };
        Self {
            required,
            state: Mutex::new(state),
        }
    }

    /// Snapshot of a task.
    #[cfg(test)]
    pub(crate) fn task(&self, id: usize) -> Option<UploadTask> {
        self.state.lock().tasks.get(id).cloned()
    }

    fn transition(task: &mut UploadTask, next: TaskStatus) {
        if task.status.can_become(&next) {
            task.status = next;
        } else {
            warn!(
                task = task.id,
                from = ?task.status,
                to = ?next,
                "Ignoring invalid task transition"
            );
        }
    }

    /// Marks a task in flight and returns its assignments.
    pub(crate) fn start(&self, id: usize) -> Option<BTreeMap<NodeAddress, Vec<u64>>> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        let task = state.tasks.get_mut(id)?;
        Self::transition(task, TaskStatus::InFlight);
        Some(task.assignments.clone())
    }

    /// Records the outcome of pushing `segments` to `node`.
    ///
    /// Returns false when the ledger is already closed.
    pub(crate) fn record(
        &self,
        id: usize,
        node: &NodeAddress,
        segments: &[u64],
        outcome: Result<u32, Exhausted>,
    ) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        let attempts = match &outcome {
            Ok(attempts) => *attempts,
            Err(exhausted) => exhausted.attempts,
        };
        if let Some(task) = state.tasks.get_mut(id) {
            task.attempts += attempts;
        }
        for &index in segments {
            let Some(tally) = state.tallies.get_mut(index as usize) else {
                continue;
            };
            match &outcome {
                Ok(_) => tally.acks.push(node.clone()),
                Err(exhausted) => tally.failures.push(PushFailure {
                    node: node.clone(),
                    attempts: exhausted.attempts,
                    error: exhausted.error.clone(),
                }),
            }
        }
        true
    }

    /// Settles a task once all its pushes reported.
    pub(crate) fn finish(&self, id: usize) -> Option<TaskStatus> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        let LedgerState { tasks, tallies, .. } = &mut *state;
        let task = tasks.get_mut(id)?;
        // one acknowledgement is enough to go on; the shortfall is reported separately
        let short = task
            .segments
            .clone()
            .find(|&i| tallies[i as usize].acks.is_empty());
        let next = match short {
            Some(segment) => TaskStatus::Failed { segment },
            None => TaskStatus::Succeeded,
        };
        Self::transition(task, next);
        debug!(task = id, status = ?task.status, attempts = task.attempts, "Upload task settled");
        Some(task.status.clone())
    }

    /// Stops accepting reports and returns the per segment tallies.
    pub(crate) fn close(&self) -> Vec<SegmentTally> {
        let mut state = self.state.lock();
        state.closed = true;
        state.tallies.clone()
    }

    /// Required acknowledgements per segment.
    pub(crate) const fn required(&self) -> usize {
        self.required
    }

    /// Whether every task reached a terminal state.
    pub(crate) fn is_settled(&self) -> bool {
        self.state
            .lock()
            .tasks
            .iter()
            .all(|task| task.status.is_terminal())
    }
}
