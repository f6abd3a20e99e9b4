//! Render bin sorting policies
//!
//! A [`RenderBinSorter`] reorders one bin in place for a given eye. Every
//! named policy maps to a canonical sorter through
//! [`SortingPolicy::canonical_sorter`]; `Custom` stands for an injected one.
//!
//! All sorters use stable sorts, so atoms with equal keys keep the order the
//! culler produced them in and repeated sorts of an unchanged bin are no-ops.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{RenderError, Result};
use crate::math::Ray;
use crate::renderer::bin::{RenderAtom, ViewInfo};

/// Orders the atoms of one render bin.
pub trait RenderBinSorter: Send + Sync + fmt::Debug {
    fn sort(&self, atoms: &mut [RenderAtom], view: &ViewInfo);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortingPolicy {
    None,
    ByStates,
    ByStatesOrdered,
    FrontToBack,
    ByZValue,
    BoundingSphereAndEyeRayIntersection,
    Custom,
}

impl SortingPolicy {
    pub const ALL: [SortingPolicy; 7] = [
        SortingPolicy::None,
        SortingPolicy::ByStates,
        SortingPolicy::ByStatesOrdered,
        SortingPolicy::FrontToBack,
        SortingPolicy::ByZValue,
        SortingPolicy::BoundingSphereAndEyeRayIntersection,
        SortingPolicy::Custom,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SortingPolicy::None => "SORT_NONE",
            SortingPolicy::ByStates => "SORT_BY_STATES",
            SortingPolicy::ByStatesOrdered => "SORT_BY_STATES_ORDERED",
            SortingPolicy::FrontToBack => "SORT_FRONT_TO_BACK",
            SortingPolicy::ByZValue => "SORT_BY_Z_VALUE",
            SortingPolicy::BoundingSphereAndEyeRayIntersection => {
                "SORT_BOUNDING_SPHERE_AND_EYE_RAY_INTERSECTION"
            }
            SortingPolicy::Custom => "CUSTOM",
        }
    }

    /// The sorter a named policy stands for. `Custom` has none.
    pub fn canonical_sorter(self) -> Option<Arc<dyn RenderBinSorter>> {
        let sorter: Arc<dyn RenderBinSorter> = match self {
            SortingPolicy::None => Arc::new(NoSorter),
            SortingPolicy::ByStates => Arc::new(StateSorter),
            SortingPolicy::ByStatesOrdered => Arc::new(OrderedStateSorter),
            SortingPolicy::FrontToBack => Arc::new(FrontToBackSorter),
            SortingPolicy::ByZValue => Arc::new(ZValueSorter::default()),
            SortingPolicy::BoundingSphereAndEyeRayIntersection => Arc::new(EyeRaySphereSorter),
            SortingPolicy::Custom => return None,
        };
        Some(sorter)
    }
}

impl fmt::Display for SortingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SortingPolicy {
    type Err = RenderError;

    /// Accepts the canonical names case-insensitively, with or without the
    /// `SORT_` prefix.
    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase().replace('-', "_");
        let bare = upper.strip_prefix("SORT_").unwrap_or(upper.as_str());
        Self::ALL
            .into_iter()
            .find(|p| {
                let name = p.name();
                name == upper || name.strip_prefix("SORT_").unwrap_or(name) == bare
            })
            .ok_or_else(|| RenderError::UnknownSortPolicy(s.to_string()))
    }
}

/// Leaves the bin in collection order.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSorter;

impl RenderBinSorter for NoSorter {
    fn sort(&self, _atoms: &mut [RenderAtom], _view: &ViewInfo) {}
}

/// Groups atoms with equal draw state to minimize state changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateSorter;

impl RenderBinSorter for StateSorter {
    fn sort(&self, atoms: &mut [RenderAtom], _view: &ViewInfo) {
        atoms.sort_by(|a, b| a.state.cmp_state(&b.state));
    }
}

/// State grouping under an explicit ordering hint.
///
/// Hinted atoms come first, ascending by hint; unhinted atoms follow. Within
/// one hint value atoms are grouped by state, and equal states keep their
/// collection order.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderedStateSorter;

fn hint_order(a: Option<i32>, b: Option<i32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl RenderBinSorter for OrderedStateSorter {
    fn sort(&self, atoms: &mut [RenderAtom], _view: &ViewInfo) {
        atoms.sort_by(|a, b| {
            hint_order(a.order_hint, b.order_hint).then_with(|| a.state.cmp_state(&b.state))
        });
    }
}

/// Ascending distance along the view direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrontToBackSorter;

impl RenderBinSorter for FrontToBackSorter {
    fn sort(&self, atoms: &mut [RenderAtom], _view: &ViewInfo) {
        atoms.sort_by(|a, b| a.eye_distance.total_cmp(&b.eye_distance));
    }
}

/// Raw view-space Z, for 2D and overlay layers.
#[derive(Debug, Clone, Copy)]
pub struct ZValueSorter {
    pub ascending: bool,
}

impl Default for ZValueSorter {
    fn default() -> Self {
        Self { ascending: true }
    }
}

impl RenderBinSorter for ZValueSorter {
    fn sort(&self, atoms: &mut [RenderAtom], _view: &ViewInfo) {
        if self.ascending {
            atoms.sort_by(|a, b| a.view_z.total_cmp(&b.view_z));
        } else {
            atoms.sort_by(|a, b| b.view_z.total_cmp(&a.view_z));
        }
    }
}

/// Back-to-front order for blended geometry.
///
/// The key is where the eye ray enters an atom's bounding sphere when the
/// ray hits it, otherwise the sphere's nearest point along the view
/// direction. Large objects pop less than with plain center distances.
#[derive(Debug, Clone, Copy, Default)]
pub struct EyeRaySphereSorter;

impl EyeRaySphereSorter {
    fn key(ray: &Ray, atom: &RenderAtom) -> f32 {
        ray.intersect_sphere(&atom.sphere)
            .unwrap_or(atom.eye_distance - atom.sphere.radius)
    }
}

impl RenderBinSorter for EyeRaySphereSorter {
    fn sort(&self, atoms: &mut [RenderAtom], view: &ViewInfo) {
        let ray = Ray::new(view.position, view.forward);
        atoms.sort_by(|a, b| Self::key(&ray, b).total_cmp(&Self::key(&ray, a)));
    }
}
