use std::sync::Arc;

use parking_lot::Mutex;

use crate::graphics::types::QueueType;

use super::{
    command_list::{AllocatorState, Command, HeadlessCommandList},
    fence::HeadlessFence,
    HeadlessError,
};

/// Snapshot of one closed command list as the queue received it.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedList {
    pub list: u64,
    pub allocator: u64,
    pub pipeline: Option<u64>,
    pub commands: Vec<Command>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Submission {
    pub lists: Vec<RecordedList>,
}

impl Submission {
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.lists.iter().flat_map(|list| list.commands.iter())
    }

    /// Labels of every marker command, in submission order.
    pub fn markers(&self) -> Vec<String> {
        self.commands()
            .filter_map(|command| match command {
                Command::Marker(label) => Some(label.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Software queue. Work retires as soon as it is signaled unless the queue is
/// stalled, in which case signals stay pending until `resume`/`retire_next`.
#[derive(Debug)]
pub struct HeadlessQueue {
    ty: QueueType,
    state: Mutex<QueueState>,
}

#[derive(Debug, Default)]
struct QueueState {
    stalled: bool,
    pending: Vec<(HeadlessFence, u64)>,
    unsignaled: Vec<Arc<AllocatorState>>,
    submissions: Vec<Submission>,
}

impl HeadlessQueue {
    pub(super) fn inner_new(ty: QueueType) -> Self {
        Self {
            ty,
            state: Default::default(),
        }
    }

    pub fn queue_type(&self) -> QueueType {
        self.ty
    }

    pub fn stall(&self) {
        self.state.lock().stalled = true;
    }

    /// Retires every pending signal and stops stalling.
    pub fn resume(&self) {
        let pending = {
            let mut state = self.state.lock();
            state.stalled = false;
            std::mem::take(&mut state.pending)
        };

        for (fence, value) in pending {
            fence.complete(value);
        }
    }

    /// Retires the oldest pending signal. The queue stays stalled.
    pub fn retire_next(&self) -> Option<u64> {
        let next = {
            let mut state = self.state.lock();
            if state.pending.is_empty() {
                None
            } else {
                Some(state.pending.remove(0))
            }
        };

        next.map(|(fence, value)| {
            fence.complete(value);
            value
        })
    }

    pub fn pending_signals(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().submissions.clone()
    }

    pub fn take_submissions(&self) -> Vec<Submission> {
        std::mem::take(&mut self.state.lock().submissions)
    }

    pub(super) fn execute(&self, lists: &[&HeadlessCommandList]) -> Result<(), HeadlessError> {
        let mut submission = Submission::default();
        let mut allocators = Vec::with_capacity(lists.len());

        for list in lists {
            if list.open {
                return Err(HeadlessError::ListNotClosed(list.id));
            }
            if list.ty != self.ty {
                return Err(HeadlessError::QueueMismatch {
                    expected: self.ty,
                    found: list.ty,
                });
            }

            submission.lists.push(RecordedList {
                list: list.id,
                allocator: list.allocator.id,
                pipeline: list.pipeline,
                commands: list.commands.clone(),
            });
            allocators.push(Arc::clone(&list.allocator));
        }

        let mut state = self.state.lock();
        state.unsignaled.extend(allocators);
        state.submissions.push(submission);

        Ok(())
    }

    pub(super) fn signal(&self, fence: &HeadlessFence, value: u64) {
        let mut state = self.state.lock();

        for allocator in state.unsignaled.drain(..) {
            *allocator.retire.lock() = Some((fence.clone(), value));
        }

        if state.stalled {
            state.pending.push((fence.clone(), value));
        } else {
            drop(state);
            fence.complete(value);
        }
    }
}
