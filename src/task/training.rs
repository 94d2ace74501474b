//! Training mode switch.

use std::collections::BTreeMap;

use tracing::info;

use super::Task;
use crate::error::{SdkResult, TransportError};

impl Task {
    /// Current training flag of every agent.
    pub fn training_modes(&mut self) -> SdkResult<BTreeMap<String, bool>> {
        let ids = self.agent_ids();
        let plane = self.plane()?;
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        plane.get_agent_mode(&ids)
    }

    /// Flips the training flag of every agent configured with `training = true`.
    ///
    /// Flags are read for all agents but only trainable agents are written;
    /// the others are left untouched. Returns the logical AND of the newly
    /// written flags, so `true` means every trainable agent is now training.
    /// With no trainable agent nothing is written and the result is `true`.
    pub fn switch_training(&mut self) -> SdkResult<bool> {
        let ids = self.agent_ids();
        let trainable: Vec<String> = self
            .agents
            .iter()
            .filter(|(_, config)| config.training)
            .map(|(id, _)| id.clone())
            .collect();
        let plane = self.plane()?;
        if ids.is_empty() {
            return Ok(true);
        }

        let current = plane.get_agent_mode(&ids)?;
        let mut next = BTreeMap::new();
        for id in trainable {
            let mode = current.get(&id).copied().ok_or_else(|| TransportError::MissingId {
                method: "GetAgentMode",
                id: id.clone(),
            })?;
            next.insert(id, !mode);
        }
        if !next.is_empty() {
            plane.set_agent_mode(&next)?;
        }

        let training = next.values().all(|mode| *mode);
        info!(switched = next.len(), training, "training mode switched");
        Ok(training)
    }
}
