//! # Unit Normalization
//!
//! The simulation works in its native system (MeV, mm, ns). The persisted
//! schema stores energies and momenta in GeV, lengths in mm and times in ns.
//! Every function here is total over finite input and has no state.

use crate::{Vector3d, Vector3f};

// =============================================================================
// NATIVE UNIT SYSTEM
// =============================================================================

pub const MILLIMETER: f64 = 1.0;
pub const CENTIMETER: f64 = 10.0 * MILLIMETER;
pub const METER: f64 = 1000.0 * MILLIMETER;

pub const NANOSECOND: f64 = 1.0;
pub const SECOND: f64 = 1.0e9 * NANOSECOND;

pub const MEV: f64 = 1.0;
pub const KEV: f64 = 1.0e-3 * MEV;
pub const GEV: f64 = 1.0e3 * MEV;

// =============================================================================
// SCALAR CONVERSIONS
// =============================================================================

/// Native energy (or momentum) to GeV.
#[inline]
#[must_use]
pub fn to_energy(x: f64) -> f64 {
    x / GEV
}

/// Native length to mm.
#[inline]
#[must_use]
pub fn to_length(x: f64) -> f64 {
    x / MILLIMETER
}

/// Native time to ns.
#[inline]
#[must_use]
pub fn to_time(x: f64) -> f64 {
    x / NANOSECOND
}

// =============================================================================
// VECTOR CONVERSIONS
// =============================================================================

/// Component-wise [`to_energy`], narrowed to single precision.
#[must_use]
pub fn energy_vector(v: Vector3d) -> Vector3f {
    v.map(to_energy).to_f32()
}

/// Component-wise [`to_length`].
#[must_use]
pub fn length_vector(v: Vector3d) -> Vector3d {
    v.map(to_length)
}

/// Component-wise [`to_length`], narrowed to single precision.
#[must_use]
pub fn length_vector_f32(v: Vector3d) -> Vector3f {
    length_vector(v).to_f32()
}
