use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use crate::graphics::{backend::Backend, error::DeviceError};

use super::GraphicsPipelineDesc;

type Slot<P> = Arc<Mutex<Option<P>>>;

/// Pipeline states keyed by canonical description. Entries live as long as the
/// pool.
///
/// Each description owns a slot that is locked while its pipeline compiles, so
/// identical requests compile once and unrelated ones compile in parallel.
#[derive(Debug)]
pub struct PsoPool<B: Backend> {
    cache: Mutex<HashMap<GraphicsPipelineDesc<B>, Slot<B::PipelineState>>>,
}

impl<B: Backend> PsoPool<B> {
    pub(crate) fn inner_new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: GraphicsPipelineDesc<B>) -> Slot<B::PipelineState> {
        self.cache.lock().entry(key).or_default().clone()
    }

    pub fn get(
        &self,
        device: &B,
        desc: &GraphicsPipelineDesc<B>,
    ) -> Result<B::PipelineState, DeviceError> {
        let key = desc.canonical();
        let slot = self.slot(key.clone());

        let mut entry = slot.lock();
        if let Some(pso) = entry.as_ref() {
            return Ok(pso.clone());
        }

        let pso = device
            .create_pipeline_state(&key)
            .map_err(DeviceError::backend)?;
        tracing::debug!(
            render_targets = key.render_target_formats().len(),
            samples = key.sample_count(),
            "created pipeline state"
        );
        *entry = Some(pso.clone());

        Ok(pso)
    }

    /// Number of pipeline states created so far. Blocks on compilations in
    /// progress.
    pub fn len(&self) -> usize {
        self.cache
            .lock()
            .values()
            .filter(|slot| slot.lock().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
