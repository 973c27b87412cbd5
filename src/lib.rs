/*
    KFParticle-rs, Kalman filter particle reconstruction
    Copyright (C) 2018-onwards Christopher Rabotin <christopher.rabotin@gmail.com>

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

//! Kalman filter reconstruction of decayed particles.
//!
//! A particle is an 8 component state `{x, y, z, px, py, pz, E, S}` with its symmetric covariance.
//! Particles are transported along their trajectory in a magnetic field, combined from their
//! daughters with a Kalman filter, constrained to a mass or a production vertex, and queried for
//! derived kinematics.
//!
//! Every algorithm is generic over a [`lanes::Lane`]: `f32` for one particle at a time, or
//! [`lanes::WideF32x4`] for four independent particles processed together.

#[macro_use]
extern crate log;

/// Lane arithmetic, masks and batch packing helpers.
pub mod lanes;

/// Packed symmetric matrices and the small kernels built on them.
pub mod linalg;

/// Magnetic field lookup.
pub mod field;

/// Transport of particles along straight lines and in magnetic fields.
pub mod transport;

/// The particle state, its construction and its derived quantities.
pub mod particle;

/// Kalman filter updates of a mother from its daughters, and vertex constraints.
pub mod kalman;

/// Nonlinear and linearised mass constraints.
pub mod mass;

/// Engine configuration, loaded from YAML.
pub mod io;

mod errors;
/// The numeric kernels never fail: errors are only raised when building inputs and configuration.
pub use self::errors::{ConfigError, ParticleError};

/// Re-export of the most used types
pub mod prelude {
    pub use crate::field::{FieldProvider, GradientField, UniformField, K_CLIGHT};
    pub use crate::io::{ConfigRepr, EngineConfig, FieldConfig};
    pub use crate::kalman::ConstructMethod;
    pub use crate::lanes::{Lane, Mask, WideF32x4};
    pub use crate::linalg::{Covariance, Sym3, SymMatrix};
    pub use crate::particle::{Measured, Particle, TrackCovariance, TrackEnergyCovariance};
    pub use crate::transport::{
        AnyPropagator, HomogeneousField, Propagator, StraightLine, VaryingField,
    };
    pub use crate::{ConfigError, ParticleError};
}
