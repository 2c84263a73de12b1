use super::frame::{FrameContext, RESOURCE_BUFFER_COUNT};

/// One copy of `T` per in-flight frame.
///
/// Nothing here synchronizes access. The device only hands out a frame context
/// for a slot once the GPU work recorded against that slot three frames ago has
/// retired, and producers for the current slot finish before the counter moves.
#[derive(Clone, Debug)]
pub struct BufferedResource<T> {
    slots: [T; RESOURCE_BUFFER_COUNT],
}

impl<T> BufferedResource<T> {
    pub fn new(f: impl FnMut(usize) -> T) -> Self {
        Self {
            slots: std::array::from_fn(f),
        }
    }

    pub fn try_new<E>(mut f: impl FnMut(usize) -> Result<T, E>) -> Result<Self, E> {
        let first = f(0)?;
        let second = f(1)?;
        let third = f(2)?;

        Ok(Self {
            slots: [first, second, third],
        })
    }

    pub fn get(&self, frame: FrameContext) -> &T {
        &self.slots[frame.index()]
    }

    pub fn get_mut(&mut self, frame: FrameContext) -> &mut T {
        &mut self.slots[frame.index()]
    }

    pub fn slots(&self) -> &[T; RESOURCE_BUFFER_COUNT] {
        &self.slots
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::BufferedResource;
    use crate::graphics::frame::{FrameContext, FrameCounter};

    #[test]
    fn selects_slot_by_frame_counter() {
        let resource = BufferedResource::new(|i| i);
        let counter = FrameCounter::default();

        for n in 1..=10u64 {
            let frame = counter.advance();
            assert_eq!(*resource.get(frame), (n % 3) as usize);
        }
    }

    #[test]
    fn factory_runs_once_per_slot() {
        let mut calls = vec![];
        let resource = BufferedResource::new(|i| {
            calls.push(i);
            format!("allocator-{i}")
        });

        assert_eq!(calls, [0, 1, 2]);
        assert_eq!(resource.get(FrameContext::new(4)), "allocator-1");
    }

    #[test]
    fn try_new_stops_on_first_error() {
        let mut calls = 0;
        let result: Result<BufferedResource<u32>, &str> = BufferedResource::try_new(|i| {
            calls += 1;
            if i == 1 {
                Err("out of memory")
            } else {
                Ok(i as u32)
            }
        });

        assert_eq!(result.unwrap_err(), "out of memory");
        assert_eq!(calls, 2);
    }

    #[test]
    fn get_mut_touches_only_current_slot() {
        let mut resource = BufferedResource::new(|_| 0u32);
        *resource.get_mut(FrameContext::new(5)) += 7;

        assert_eq!(resource.slots(), &[0, 0, 7]);
        assert_eq!(resource.iter().sum::<u32>(), 7);
    }
}
