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

use super::homogeneous::{ds_to_particle_by, ds_to_point_by};
use super::{clamp_path, Propagator};
use crate::field::{FieldProvider, K_CLIGHT};
use crate::lanes::{abs, select, splat, Lane};
use crate::linalg::{Covariance, FieldJacobian};
use crate::particle::Particle;
use nalgebra::{SVector, Vector3};

/// Field values above this magnitude (kG) are treated as lookup failures and ignored.
const MAX_FIELD: f32 = 100.0;

/// Propagation in a slowly varying field, dominated by its y component.
///
/// The trajectory is integrated with the field sampled at the start, middle and end of the step.
/// Closest approach solvers use the local y component of the field as if it were homogeneous.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VaryingField<F: FieldProvider> {
    pub field: F,
}

impl<F: FieldProvider> VaryingField<F> {
    pub fn new(field: F) -> Self {
        Self { field }
    }
}

impl<F: FieldProvider> FieldProvider for VaryingField<F> {
    fn field_at<T: Lane>(&self, position: &Vector3<T>) -> Vector3<T> {
        self.field.field_at(position)
    }
}

impl<F: FieldProvider> Propagator for VaryingField<F> {
    fn transport<T: Lane>(&self, particle: &Particle<T>, ds: T) -> (SVector<T, 8>, Covariance<T>) {
        transport_varying(
            &self.field,
            particle.charge,
            &particle.params,
            &particle.covar,
            ds,
        )
    }

    fn ds_to_point<T: Lane>(&self, particle: &Particle<T>, xyz: &Vector3<T>) -> T {
        let b = self.field.field_at(&particle.position());
        clamp_path(ds_to_point_by(b[1], particle.charge, &particle.params, xyz))
    }

    fn ds_to_particle<T: Lane>(&self, first: &Particle<T>, second: &Particle<T>) -> (T, T) {
        let b = self.field.field_at(&first.position());
        let (ds1, ds2) = ds_to_particle_by(
            b[1],
            first.charge,
            &first.params,
            second.charge,
            &second.params,
        );
        (clamp_path(ds1), clamp_path(ds2))
    }
}

fn sample<T: Lane, F: FieldProvider>(field: &F, point: &Vector3<T>) -> Vector3<T> {
    field
        .field_at(point)
        .map(|b| select(abs(b).simd_gt(splat(MAX_FIELD)), T::zero(), b))
}

/// Transports the state by `ds` through `field`.
///
/// Neutral lanes see no bending terms and move along a straight line.
pub fn transport_varying<T: Lane, F: FieldProvider>(
    field: &F,
    charge: T,
    params: &SVector<T, 8>,
    covar: &Covariance<T>,
    ds: T,
) -> (SVector<T, 8>, Covariance<T>) {
    let c = charge * splat(K_CLIGHT);
    let (px, py, pz) = (params[3], params[4], params[5]);
    let ds2 = ds * ds;

    // line approximation, then bent by the first order deflection along y
    let p0 = Vector3::new(params[0], params[1], params[2]);
    let mut p2 = Vector3::new(p0[0] + px * ds, p0[1] + py * ds, p0[2] + pz * ds);
    let mut p1 = (p0 + p2) * splat::<T>(0.5);
    {
        let f0 = field.field_at(&p0);
        let f1 = field.field_at(&p1);
        let f2 = field.field_at(&p2);
        let ssy1 = (splat::<T>(7.0) * f0[1] + splat::<T>(6.0) * f1[1] - f2[1]) * c * ds2
            / splat(96.0);
        let ssy2 = (f0[1] + splat::<T>(2.0) * f1[1]) * c * ds2 / splat(6.0);
        p1[0] -= ssy1 * pz;
        p1[2] += ssy1 * px;
        p2[0] -= ssy2 * pz;
        p2[2] += ssy2 * px;
    }
    let fld = [sample(field, &p0), sample(field, &p1), sample(field, &p2)];

    let simpson = |k: usize| fld[0][k] + splat::<T>(4.0) * fld[1][k] + fld[2][k];
    let trapezoid = |k: usize| fld[0][k] + splat::<T>(2.0) * fld[1][k];
    let sixth = splat::<T>(1.0 / 6.0);

    let sx = c * simpson(0) * ds * sixth;
    let sy = c * simpson(1) * ds * sixth;
    let sz = c * simpson(2) * ds * sixth;
    let ssx = c * trapezoid(0) * ds2 * sixth;
    let ssy = c * trapezoid(1) * ds2 * sixth;
    let ssz = c * trapezoid(2) * ds2 * sixth;

    const C2: [[f32; 3]; 3] = [[5.0, -4.0, -1.0], [44.0, 80.0, -4.0], [11.0, 44.0, 5.0]];
    const CC2: [[f32; 3]; 3] = [[38.0, 8.0, -4.0], [148.0, 208.0, -20.0], [3.0, 36.0, 3.0]];
    let mut syz = T::zero();
    let mut ssyz = T::zero();
    for n in 0..3 {
        for m in 0..3 {
            let yz = fld[n][1] * fld[m][2];
            syz += splat::<T>(C2[n][m]) * yz;
            ssyz += splat::<T>(CC2[n][m]) * yz;
        }
    }
    let cc = c * c;
    syz *= cc * ds2 / splat(360.0);
    ssyz *= cc * ds2 * ds / splat(2520.0);

    let syy_lin = c * simpson(1) * ds;
    let syyy = syy_lin * syy_lin * syy_lin / splat(1296.0);
    let syy = syy_lin * syy_lin / splat(72.0);

    let (f0, f1, f2) = (fld[0][1], fld[1][1], fld[2][1]);
    let k = |v: f32| splat::<T>(v);
    let ssyy = (f0 * (k(38.0) * f0 + k(156.0) * f1 - f2) + f1 * (k(208.0) * f1 + k(16.0) * f2)
        + f2 * (k(3.0) * f2))
        * ds2
        * ds
        * cc
        / k(2520.0);
    let ssyyy = (f0
        * (f0 * (k(85.0) * f0 + k(526.0) * f1 - k(7.0) * f2)
            + f1 * (k(1376.0) * f1 + k(84.0) * f2)
            + f2 * (k(19.0) * f2))
        + f1 * (f1 * (k(1376.0) * f1 + k(256.0) * f2) + f2 * (k(62.0) * f2))
        + f2 * f2 * (k(3.0) * f2))
        * ds2
        * ds2
        * cc
        * c
        / k(90720.0);

    let jac = FieldJacobian([
        ds - ssyy,
        ssx,
        ssyyy - ssy,
        -ssz,
        ds,
        ssx + ssyz,
        T::one() - syy,
        sx,
        syyy - sy,
        -sz,
        sx + syz,
    ]);

    (jac.apply(params), jac.congruence(covar))
}
