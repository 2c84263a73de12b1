use std::sync::atomic::{AtomicU64, Ordering};

/// Number of live copies kept for frame-pipelined state.
pub const RESOURCE_BUFFER_COUNT: usize = 3;

/// Read-only view of the frame counter taken at a point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameContext {
    frame: u64,
}

impl FrameContext {
    pub fn new(frame: u64) -> Self {
        Self { frame }
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Slot of every buffered resource owned by this frame.
    pub fn index(&self) -> usize {
        (self.frame % RESOURCE_BUFFER_COUNT as u64) as usize
    }

    pub fn next(&self) -> Self {
        Self::new(self.frame + 1)
    }
}

/// Single-writer frame counter. Only the presenting thread advances it.
#[derive(Debug, Default)]
pub(crate) struct FrameCounter(AtomicU64);

impl FrameCounter {
    pub(crate) fn current(&self) -> FrameContext {
        FrameContext::new(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn advance(&self) -> FrameContext {
        FrameContext::new(self.0.fetch_add(1, Ordering::AcqRel) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameContext, FrameCounter};

    #[test]
    fn index_wraps_every_three_frames() {
        let indices = (0..7)
            .map(|i| FrameContext::new(i).index())
            .collect::<Vec<_>>();

        assert_eq!(indices, [0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn counter_advances_monotonically() {
        let counter = FrameCounter::default();
        assert_eq!(counter.current(), FrameContext::new(0));

        let next = counter.advance();
        assert_eq!(next, FrameContext::new(1));
        assert_eq!(counter.current(), next);
        assert_eq!(next.next().frame(), 2);
    }
}
