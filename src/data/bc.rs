//! Exterior halo policies for non-periodic boundaries.
//!
//! Halo cells past a non-periodic domain edge have no owner, so exchange
//! never fills them. A field owner picks one of these policies and applies it
//! with [`FieldStore::set_exterior_halo`](crate::data::field::FieldStore::set_exterior_halo).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::grid_error::GridError;

/// Value source for exterior halo cells.
#[derive(Clone)]
pub enum ExteriorHalo {
    /// Every exterior cell holds the same value.
    Constant(f64),
    /// Copy the nearest in-domain value (flat extrapolation).
    ZeroGradient,
    /// Evaluate `f(x, y, z)` at the ghost cell's mirrored coordinates.
    Function(Arc<dyn Fn(f64, f64, f64) -> f64 + Send + Sync>),
}

impl ExteriorHalo {
    pub fn function(f: impl Fn(f64, f64, f64) -> f64 + Send + Sync + 'static) -> Self {
        ExteriorHalo::Function(Arc::new(f))
    }
}

impl fmt::Debug for ExteriorHalo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExteriorHalo::Constant(v) => f.debug_tuple("Constant").field(v).finish(),
            ExteriorHalo::ZeroGradient => f.write_str("ZeroGradient"),
            ExteriorHalo::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Serializable choice of exterior halo policy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ExteriorHaloOptions {
    Constant { value: f64 },
    ZeroGradient,
}

impl Default for ExteriorHaloOptions {
    fn default() -> Self {
        ExteriorHaloOptions::Constant { value: 0.0 }
    }
}

impl ExteriorHaloOptions {
    pub fn validate(&self) -> Result<(), GridError> {
        match self {
            ExteriorHaloOptions::Constant { value } if !value.is_finite() => Err(
                GridError::Config(format!("exterior halo value {value} is not finite")),
            ),
            _ => Ok(()),
        }
    }
}

impl From<ExteriorHaloOptions> for ExteriorHalo {
    fn from(opts: ExteriorHaloOptions) -> Self {
        match opts {
            ExteriorHaloOptions::Constant { value } => ExteriorHalo::Constant(value),
            ExteriorHaloOptions::ZeroGradient => ExteriorHalo::ZeroGradient,
        }
    }
}
