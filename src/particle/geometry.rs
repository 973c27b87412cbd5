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

//! Distances, deviations and angles between particles and vertices.

use super::{Measured, Particle};
use crate::kalman::position_of;
use crate::lanes::{abs, max, min, select, splat, sqrt, Lane, Mask};
use crate::linalg::{invert_sym3, Covariance, Sym3};
use crate::transport::Propagator;
use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

/// `acos` of a cosine that may leave `[-1, 1]` by rounding.
fn clamped_acos<T: Lane>(cos: T) -> T {
    min(max(cos, -T::one()), T::one()).simd_acos()
}

impl<T: Lane> Particle<T> {
    fn transported_to_particle<P: Propagator>(
        &self,
        prop: &P,
        other: &Particle<T>,
    ) -> ((SVector<T, 8>, Covariance<T>), (SVector<T, 8>, Covariance<T>)) {
        let (ds, ds1) = prop.ds_to_particle(self, other);
        (prop.transport(self, ds), prop.transport(other, ds1))
    }

    /// Distance of closest approach to the point `vtx`, in cm.
    pub fn distance_from_vertex<P: Propagator>(&self, prop: &P, vtx: &Vector3<T>) -> T {
        let (p, _) = prop.transport(self, prop.ds_to_point(self, vtx));
        (vtx - position_of(&p)).norm()
    }

    /// Distance of closest approach between both trajectories, in cm.
    pub fn distance_from_particle<P: Propagator>(&self, prop: &P, other: &Particle<T>) -> T {
        let ((p1, _), (p2, _)) = self.transported_to_particle(prop, other);
        (position_of(&p1) - position_of(&p2)).norm()
    }

    /// Chi of the point of closest approach to `vtx`, with the vertex covariance when given.
    pub fn deviation_from_vertex<P: Propagator>(
        &self,
        prop: &P,
        vtx: &Vector3<T>,
        vtx_covar: Option<&Sym3<T>>,
    ) -> T {
        let (p, c) = prop.transport(self, prop.ds_to_point(self, vtx));
        let d = vtx - position_of(&p);
        let mut s = c.block::<3, 6>(0);
        if let Some(cv) = vtx_covar {
            s = s + *cv;
        }
        sqrt(invert_sym3(&s).quadratic_form(&d))
    }

    /// Distance of closest approach to another particle divided by its error.
    pub fn deviation_from_particle<P: Propagator>(&self, prop: &P, other: &Particle<T>) -> T {
        let ((p1, c1), (p2, c2)) = self.transported_to_particle(prop, other);
        let c = c1.block::<3, 6>(0) + c2.block::<3, 6>(0);
        let d = position_of(&p1) - position_of(&p2);
        let l = d.norm();
        let l = select(abs(l).simd_lt(splat(1e-8)), splat(1e-8), l);
        let dl = c.quadratic_form(&d);
        let dl = select(dl.simd_lt(T::zero()), T::zero(), dl);
        sqrt(dl) / l
    }

    /// Straight distance to a vertex `l`, its error `dl` and whether the particle is compatible with
    /// coming from the vertex.
    ///
    /// A particle comes from the vertex when the distance is within three errors, or when it moves
    /// toward the vertex.
    pub fn distance_to_vertex_line(&self, vtx: &Particle<T>) -> (T, T, Mask<T>) {
        let c = vtx.position_covar() + self.position_covar();
        let d = vtx.position() - self.position();
        let l = d.norm();
        let dl = c.quadratic_form(&d);
        let l = select(abs(l).simd_lt(splat(1e-8)), splat(1e-8), l);
        let ok = dl.simd_ge(T::zero());
        let dl = select(ok, sqrt(select(ok, dl, T::zero())) / l, splat(1e8));

        let close = ok & l.simd_lt(splat::<T>(3.0) * dl);
        let incoming = d.dot(&self.momentum()).simd_lt(T::zero());
        (l, dl, close | incoming)
    }

    /// Signed transverse impact parameter to `vtx`, with the vertex covariance when given.
    ///
    /// The problem flag is raised for a vanishing transverse momentum, in which case the value is
    /// a 1e4 cm sentinel.
    pub fn distance_from_vertex_xy<P: Propagator>(
        &self,
        prop: &P,
        vtx: &Vector3<T>,
        vtx_covar: Option<&Sym3<T>>,
    ) -> Measured<T> {
        let (p, c) = prop.transport(self, prop.ds_to_point(self, vtx));
        let dx = p[0] - vtx[0];
        let dy = p[1] - vtx[1];
        let pt = sqrt(p[3] * p[3] + p[4] * p[4]);
        let ok = pt.simd_ge(splat(1e-4));
        let pt = select(ok, pt, T::one());
        let ex = select(ok, p[3] / pt, T::zero());
        let ey = select(ok, p[4] / pt, T::zero());
        let value = select(ok, dy * ex - dx * ey, splat(1e4));

        let along = dy * ey + dx * ex;
        let h = [(0, -ey), (1, ex), (3, along * ey / pt), (4, -along * ex / pt)];
        let mut err2 = T::zero();
        for (i, hi) in h {
            for (j, hj) in h {
                err2 += hi * hj * c[(i, j)];
            }
        }
        if let Some(cv) = vtx_covar {
            err2 += ey * ey * cv[(0, 0)] - splat::<T>(2.0) * ex * ey * cv[(1, 0)] + ex * ex * cv[(1, 1)];
        }

        Measured {
            value,
            error: sqrt(abs(err2)),
            problem: !ok,
        }
    }

    /// Transverse impact parameter divided by its error, 1e4 when undefined.
    pub fn deviation_from_vertex_xy<P: Propagator>(
        &self,
        prop: &P,
        vtx: &Vector3<T>,
        vtx_covar: Option<&Sym3<T>>,
    ) -> T {
        let d = self.distance_from_vertex_xy(prop, vtx, vtx_covar);
        let ok = !d.problem & d.error.simd_ge(splat(1e-20));
        select(ok, d.value / select(ok, d.error, T::one()), splat(1e4))
    }

    /// Opening angle with another particle at their point of closest approach, in rad.
    pub fn angle<P: Propagator>(&self, prop: &P, other: &Particle<T>) -> T {
        let ((p1, _), (p2, _)) = self.transported_to_particle(prop, other);
        let a = Vector3::new(p1[3], p1[4], p1[5]);
        let b = Vector3::new(p2[3], p2[4], p2[5]);
        opening_angle(a.dot(&b), a.norm() * b.norm())
    }

    /// Opening angle in the transverse plane, in rad.
    pub fn angle_xy<P: Propagator>(&self, prop: &P, other: &Particle<T>) -> T {
        let ((p1, _), (p2, _)) = self.transported_to_particle(prop, other);
        let n = sqrt(p1[3] * p1[3] + p1[4] * p1[4]) * sqrt(p2[3] * p2[3] + p2[4] * p2[4]);
        opening_angle(p1[3] * p2[3] + p1[4] * p2[4], n)
    }

    /// Opening angle in the (r, z) plane, in rad.
    pub fn angle_rz<P: Propagator>(&self, prop: &P, other: &Particle<T>) -> T {
        let ((p1, _), (p2, _)) = self.transported_to_particle(prop, other);
        let r1 = sqrt(p1[3] * p1[3] + p1[4] * p1[4]);
        let r2 = sqrt(p2[3] * p2[3] + p2[4] * p2[4]);
        let n = sqrt(r1 * r1 + p1[5] * p1[5]) * sqrt(r2 * r2 + p2[5] * p2[5]);
        opening_angle(r1 * r2 + p1[5] * p2[5], n)
    }

    /// Armenteros-Podolanski variables `(qt, alpha)` of a two body decay.
    ///
    /// Both daughters are expected at the decay point. Degenerate lanes (vanishing total or
    /// negative daughter momentum) give zeros.
    pub fn armenteros_podolanski(positive: &Particle<T>, negative: &Particle<T>) -> (T, T) {
        let pos = positive.momentum();
        let neg = negative.momentum();
        let sum = pos + neg;
        let sp = sum.norm();
        let pn = neg.norm();
        let ok = abs(sp).simd_ge(splat(1e-10)) & abs(pn).simd_ge(splat(1e-10));
        let sp = select(ok, sp, T::one());
        let pn_safe = select(ok, pn, T::one());

        let pln = neg.dot(&sum) / sp;
        let plp = pos.dot(&sum) / sp;
        let ptm = T::one() - (pln / pn_safe) * (pln / pn_safe);
        let has_qt = ok & ptm.simd_ge(T::zero());
        let qt = select(has_qt, pn * sqrt(select(has_qt, ptm, T::zero())), T::zero());

        let total = plp + pln;
        let ok = ok & abs(total).simd_gt(T::zero());
        let alpha = select(ok, (plp - pln) / select(ok, total, T::one()), T::zero());
        (qt, alpha)
    }

    /// Rotates the particle by `angle` around the z axis going through `vtx`.
    pub fn rotate_xy(&mut self, angle: T, vtx: &Vector3<T>) {
        for i in 0..3 {
            self.params[i] -= vtx[i];
        }
        let (s, c) = (angle.simd_sin(), angle.simd_cos());
        let rot = Matrix3::new(c, s, T::zero(), -s, c, T::zero(), T::zero(), T::zero(), T::one());
        let mut jac = SMatrix::<T, 8, 8>::identity();
        jac.fixed_view_mut::<3, 3>(0, 0).copy_from(&rot);
        jac.fixed_view_mut::<3, 3>(3, 3).copy_from(&rot);

        self.params = jac * self.params;
        self.covar = self.covar.congruence(&jac);
        for i in 0..3 {
            self.params[i] += vtx[i];
        }
    }
}

fn opening_angle<T: Lane>(dot: T, norms: T) -> T {
    let ok = norms.simd_gt(splat(1e-8));
    clamped_acos(select(ok, dot / select(ok, norms, T::one()), T::zero()))
}
