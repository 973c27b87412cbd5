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

use super::{clamp_path, Propagator};
use crate::field::FieldProvider;
use crate::lanes::{abs, select, splat, Lane};
use crate::linalg::Covariance;
use crate::particle::Particle;
use nalgebra::{SMatrix, SVector, Vector3};

/// Propagation without magnetic field.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct StraightLine;

impl FieldProvider for StraightLine {
    fn field_at<T: Lane>(&self, _position: &Vector3<T>) -> Vector3<T> {
        Vector3::zeros()
    }
}

impl Propagator for StraightLine {
    fn transport<T: Lane>(&self, particle: &Particle<T>, ds: T) -> (SVector<T, 8>, Covariance<T>) {
        transport_line(&particle.params, &particle.covar, ds)
    }

    fn ds_to_point<T: Lane>(&self, particle: &Particle<T>, xyz: &Vector3<T>) -> T {
        clamp_path(ds_to_point_line(&particle.params, xyz))
    }

    fn ds_to_particle<T: Lane>(&self, first: &Particle<T>, second: &Particle<T>) -> (T, T) {
        let (ds1, ds2) = ds_to_particle_line(&first.params, &second.params);
        (clamp_path(ds1), clamp_path(ds2))
    }
}

/// Moves the state by `ds` along the momentum direction: `r += ds * p`.
pub fn transport_line<T: Lane>(
    params: &SVector<T, 8>,
    covar: &Covariance<T>,
    ds: T,
) -> (SVector<T, 8>, Covariance<T>) {
    let mut jac = SMatrix::<T, 8, 8>::identity();
    for i in 0..3 {
        jac[(i, i + 3)] = ds;
    }
    let mut out = *params;
    for i in 0..3 {
        out[i] += ds * params[i + 3];
    }
    (out, covar.congruence(&jac))
}

/// Path length parameter to the point of the line closest to `xyz`, zero for a vanishing momentum.
pub fn ds_to_point_line<T: Lane>(params: &SVector<T, 8>, xyz: &Vector3<T>) -> T {
    let p2 = params[3] * params[3] + params[4] * params[4] + params[5] * params[5];
    let dr_p = (xyz[0] - params[0]) * params[3]
        + (xyz[1] - params[1]) * params[4]
        + (xyz[2] - params[2]) * params[5];
    let ok = p2.simd_gt(splat(1e-4));
    select(ok, dr_p / select(ok, p2, T::one()), T::zero())
}

/// Path length parameters of two lines to their points of closest approach.
///
/// Parallel lines (vanishing determinant) give a negligible step instead of a division by zero.
pub fn ds_to_particle_line<T: Lane>(first: &SVector<T, 8>, second: &SVector<T, 8>) -> (T, T) {
    let p12 = first[3] * first[3] + first[4] * first[4] + first[5] * first[5];
    let p22 = second[3] * second[3] + second[4] * second[4] + second[5] * second[5];
    let p1p2 = first[3] * second[3] + first[4] * second[4] + first[5] * second[5];

    let dpx = second[0] - first[0];
    let dpy = second[1] - first[1];
    let dpz = second[2] - first[2];

    let drp1 = first[3] * dpx + first[4] * dpy + first[5] * dpz;
    let drp2 = second[3] * dpx + second[4] * dpy + second[5] * dpz;

    let detp = p1p2 * p1p2 - p12 * p22;
    let detp = select(abs(detp).simd_lt(splat(1e-8)), splat(1e8), detp);

    let ds1 = (drp2 * p1p2 - drp1 * p22) / detp;
    let ds2 = (drp2 * p12 - drp1 * p1p2) / detp;
    (ds1, ds2)
}
