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

use crate::lanes::{splat, Lane};
use nalgebra::Vector3;
use serde_derive::{Deserialize, Serialize};

/// Speed of light in the units of the engine: a charge of 1 in a field of 1 kG bends a track of
/// 1 GeV/c with a curvature of `K_CLIGHT` per cm.
pub const K_CLIGHT: f32 = 0.000_299_792_458;

/// Magnetic field lookup, in kG, at a position in cm.
///
/// Implementors are shared read-only between threads and must be pure functions of the position.
pub trait FieldProvider: Send + Sync {
    fn field_at<T: Lane>(&self, position: &Vector3<T>) -> Vector3<T>;
}

/// The same field vector everywhere.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UniformField {
    /// Field components in kG
    pub b: [f32; 3],
}

impl UniformField {
    pub fn new(bx: f32, by: f32, bz: f32) -> Self {
        Self { b: [bx, by, bz] }
    }
}

impl FieldProvider for UniformField {
    fn field_at<T: Lane>(&self, _position: &Vector3<T>) -> Vector3<T> {
        Vector3::new(splat(self.b[0]), splat(self.b[1]), splat(self.b[2]))
    }
}

/// A field varying linearly in space, `B(r) = b0 + G * r`.
///
/// This is the first order expansion of a smooth field map around the origin, enough to exercise
/// the slowly varying field transport.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GradientField {
    /// Field at the origin, in kG
    pub b0: [f32; 3],
    /// `gradient[i][j] = dB_i / dx_j`, in kG/cm
    pub gradient: [[f32; 3]; 3],
}

impl FieldProvider for GradientField {
    fn field_at<T: Lane>(&self, position: &Vector3<T>) -> Vector3<T> {
        Vector3::from_fn(|i, _| {
            let mut b = splat::<T>(self.b0[i]);
            for j in 0..3 {
                b += splat::<T>(self.gradient[i][j]) * position[j];
            }
            b
        })
    }
}

impl<F: FieldProvider> FieldProvider for &F {
    fn field_at<T: Lane>(&self, position: &Vector3<T>) -> Vector3<T> {
        (*self).field_at(position)
    }
}
