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

use super::position_of;
use crate::lanes::{abs, select, splat, Lane};
use crate::linalg::invert_sym3;
use crate::particle::Particle;
use crate::transport::Propagator;
use nalgebra::SMatrix;

impl<T: Lane> Particle<T> {
    /// Constrains the particle to originate from `vtx`, a vertex it was not fitted into.
    ///
    /// On lanes with a free decay length (`C[7][7] > 0`) the decay length parameter is fitted
    /// together with the position, and the state ends up at its decay point with the decay length
    /// in `P[7]`. Lanes without a decay length are simply moved to the vertex.
    pub fn set_production_vertex<P: Propagator>(&mut self, prop: &P, vtx: &Particle<T>) {
        let m = position_of(&vtx.params);
        let v = vtx.position_covar();

        let no_s = self.covar[(7, 7)].simd_le(T::zero());
        let ds = select(no_s, -self.s_from_decay, prop.ds_to_point(self, &m));
        let was_at_production = self.at_production_vertex;
        self.transport_to_ds(prop, ds);
        if was_at_production {
            self.convert(prop, false, no_s);
        }
        self.at_production_vertex = false;

        self.params[7] = select(no_s, T::zero(), -self.s_from_decay);
        for j in 0..7 {
            self.covar[(7, j)] = T::zero();
        }
        self.covar[(7, 7)] = select(no_s, T::zero(), splat(0.1));
        self.convert(prop, true, !no_s);

        let ai = invert_sym3(&self.position_covar()).to_dense();
        let b: SMatrix<T, 5, 3> = SMatrix::<T, 5, 3>::from_fn(|i, j| self.covar[(i + 3, j)]) * ai;
        let z = m - self.position();

        let dchi2 = invert_sym3(&(self.position_covar() - v)).quadratic_form(&z);
        self.chi2 += abs(dchi2);
        self.ndf += splat::<T>(2.0);

        for i in 0..3 {
            self.params[i] = m[i];
        }
        let shift = b * z;
        for i in 0..5 {
            self.params[i + 3] += shift[i];
        }

        self.covar.set_block(0, &v);
        let bv = b * v.to_dense();
        for r in 0..5 {
            let d = [
                bv[(r, 0)] - self.covar[(r + 3, 0)],
                bv[(r, 1)] - self.covar[(r + 3, 1)],
                bv[(r, 2)] - self.covar[(r + 3, 2)],
            ];
            for (j, dj) in d.iter().enumerate() {
                self.covar[(r + 3, j)] += *dj;
            }
            for k in 0..=r {
                self.covar[(r + 3, k + 3)] += d[0] * b[(k, 0)] + d[1] * b[(k, 1)] + d[2] * b[(k, 2)];
            }
        }

        let back = select(no_s, T::zero(), self.params[7]);
        self.transport_to_ds(prop, back);
        self.convert(prop, false, !no_s);
        self.params[7] = select(no_s, T::zero(), self.params[7]);
        for j in 0..8 {
            self.covar[(7, j)] = select(no_s, T::zero(), self.covar[(7, j)]);
        }
        self.s_from_decay = T::zero();
    }

    /// Forces a vanishing decay length, for resonances decaying at their production point.
    ///
    /// Lanes without any decay length error are only moved to their decay point.
    pub fn set_no_decay_length<P: Propagator>(&mut self, prop: &P) {
        self.transport_to_decay_vertex(prop);

        let zeta = -self.params[7];
        let c77 = self.covar[(7, 7)];
        let active = c77.simd_gt(splat(1e-20));
        let s = select(active, T::one() / select(active, c77, T::one()), T::zero());
        self.chi2 += zeta * zeta * s;
        self.ndf += select(active, T::one(), T::zero());

        for i in 0..7 {
            let ki = self.covar[(7, i)] * s;
            self.params[i] += ki * zeta;
            for j in 0..=i {
                let c7j = self.covar[(7, j)];
                self.covar[(i, j)] -= ki * c7j;
            }
        }
        self.params[7] = T::zero();
        for j in 0..8 {
            self.covar[(7, j)] = T::zero();
        }
    }
}
