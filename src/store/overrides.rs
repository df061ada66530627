//! Administrative crash point override store.
//!
//! At most one override is active. Setting a new one replaces the old.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::game::state::PlayerId;
use crate::store::StoreError;

/// Storage for the next round's forced crash point.
pub trait OverrideStore: Send {
    /// Active override, if any.
    fn get_active_override(&self) -> Result<Option<f64>, StoreError>;

    /// Replace the active override. `set_by` is the administrator, if known.
    fn set_active_override(
        &mut self,
        crash_point: f64,
        set_by: Option<PlayerId>,
    ) -> Result<(), StoreError>;

    /// Deactivate the active override.
    fn clear_active_override(&mut self) -> Result<(), StoreError>;
}

/// An override row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverrideSetting {
    /// Forced crash point
    pub crash_point: f64,
    /// Administrator who set it
    pub set_by: Option<PlayerId>,
    /// When it was set
    pub created_at: DateTime<Utc>,
}

/// In-memory override slot that keeps deactivated settings for audit.
#[derive(Clone, Debug, Default)]
pub struct InMemoryOverrideStore {
    active: Option<OverrideSetting>,
    deactivated: Vec<OverrideSetting>,
}

impl InMemoryOverrideStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Active setting with its timestamp.
    pub fn active_setting(&self) -> Option<&OverrideSetting> {
        self.active.as_ref()
    }

    /// Previously active settings, oldest first.
    pub fn deactivated(&self) -> &[OverrideSetting] {
        &self.deactivated
    }

    fn deactivate(&mut self) {
        if let Some(previous) = self.active.take() {
            self.deactivated.push(previous);
        }
    }
}

impl OverrideStore for InMemoryOverrideStore {
    fn get_active_override(&self) -> Result<Option<f64>, StoreError> {
        Ok(self.active.as_ref().map(|s| s.crash_point))
    }

    fn set_active_override(
        &mut self,
        crash_point: f64,
        set_by: Option<PlayerId>,
    ) -> Result<(), StoreError> {
        self.deactivate();
        self.active = Some(OverrideSetting {
            crash_point,
            set_by,
            created_at: Utc::now(),
        });
        Ok(())
    }

    fn clear_active_override(&mut self) -> Result<(), StoreError> {
        self.deactivate();
        Ok(())
    }
}
