//! Renderer Settings
//!
//! [`RendererSettings`] holds the renderer-wide defaults a pass falls back to
//! when it does not override them, plus a few scheduling knobs.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use strata::renderer::{Renderer, RendererSettings};
//! use strata::renderer::sorting::SortingPolicy;
//!
//! let settings = RendererSettings {
//!     default_transparent_policy: SortingPolicy::BoundingSphereAndEyeRayIntersection,
//!     layered_mode: true,
//!     ..Default::default()
//! };
//!
//! let renderer = Renderer::new(services, settings);
//! ```
//!
//! Settings are plain serde data and can be loaded from any format the
//! application already uses.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{RenderError, Result};
use crate::renderer::sorting::SortingPolicy;

/// Global renderer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    // === Sorting Defaults ===
    /// Policy for opaque bins of passes without an override.
    pub default_opaque_policy: SortingPolicy,

    /// Policy for transparent bins of passes without an override.
    pub default_transparent_policy: SortingPolicy,

    // === Frame Dispatch ===
    /// Clear depth between passes so each one composites over the previous.
    pub layered_mode: bool,

    /// Sleep between polls while a surface is still drawing its previous
    /// frame.
    pub busy_wait_poll_ms: u64,

    // === Allocation ===
    /// Initial capacity of a freshly created opaque bin.
    pub opaque_bin_capacity: usize,

    /// Initial capacity of a freshly created transparent bin.
    pub transparent_bin_capacity: usize,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            default_opaque_policy: SortingPolicy::ByStates,
            default_transparent_policy: SortingPolicy::FrontToBack,
            layered_mode: false,
            busy_wait_poll_ms: 1,
            opaque_bin_capacity: 256,
            transparent_bin_capacity: 64,
        }
    }
}

impl RendererSettings {
    /// Checks that both default policies have a canonical sorter.
    pub fn validate(&self) -> Result<()> {
        for policy in [self.default_opaque_policy, self.default_transparent_policy] {
            if policy == SortingPolicy::Custom {
                return Err(RenderError::CustomPolicyWithoutSorter);
            }
        }
        Ok(())
    }

    #[inline]
    pub fn busy_wait_poll(&self) -> Duration {
        Duration::from_millis(self.busy_wait_poll_ms)
    }
}
