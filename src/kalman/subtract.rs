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

use super::{position_columns, Residual};
use crate::lanes::{splat, Lane};
use crate::linalg::Covariance;
use crate::particle::Particle;
use crate::transport::Propagator;
use nalgebra::SVector;

impl<T: Lane> Particle<T> {
    /// Measurement of this particle at the linearisation point of `target`, or at its position.
    fn measurement_against<P: Propagator>(
        &self,
        prop: &P,
        target: &Particle<T>,
    ) -> (SVector<T, 8>, Covariance<T>) {
        let xyz = if target.is_linearized {
            target.vtx_guess
        } else {
            target.position()
        };
        self.get_measurement(prop, &xyz, false)
    }

    /// Removes this particle from a vertex it was previously fitted into.
    ///
    /// Only the vertex position and its covariance are updated.
    pub fn subtract_from_vertex<P: Propagator>(&self, prop: &P, vtx: &mut Particle<T>) {
        let (m, v) = self.measurement_against(prop, vtx);
        let residual = Residual::removing(&vtx.params, &vtx.covar, &m, &v);

        let cht = position_columns::<T, 3>(&vtx.covar);
        let gain = residual.gain(&cht);
        let correction = residual.correction(&gain);
        let growth = gain * cht.transpose();
        for i in 0..3 {
            vtx.params[i] -= correction[i];
            for j in 0..=i {
                vtx.covar[(i, j)] += growth[(i, j)];
            }
        }

        vtx.ndf -= splat::<T>(2.0);
        vtx.chi2 -= residual.chi2();
    }

    /// Removes this daughter from a mother built with it, reversing [`Particle::add_daughter`].
    pub fn subtract_from_particle<P: Propagator>(&self, prop: &P, mother: &mut Particle<T>) {
        let (m, v) = self.measurement_against(prop, mother);
        let residual = Residual::removing(&mother.params, &mother.covar, &m, &v);

        let mut cht = position_columns::<T, 7>(&v);
        for i in 3..7 {
            for j in 0..3 {
                cht[(i, j)] = mother.covar[(i, j)] - v[(i, j)];
            }
        }
        let gain = residual.gain(&cht);
        let correction = residual.correction(&gain);

        for i in 3..7 {
            mother.params[i] -= m[i];
            for j in 3..=i {
                mother.covar[(i, j)] -= v[(i, j)];
            }
        }
        for i in 0..3 {
            mother.params[i] = m[i] - correction[i];
        }
        for i in 3..7 {
            mother.params[i] -= correction[i];
        }

        let mut reduced = mother.covar;
        for i in 0..7 {
            for j in 0..3.min(i + 1) {
                reduced[(i, j)] = if i < 3 { -v[(i, j)] } else { v[(i, j)] };
            }
        }
        let growth = gain * cht.transpose();
        for i in 0..7 {
            for j in 0..=i {
                mother.covar[(i, j)] = reduced[(i, j)] + growth[(i, j)];
            }
        }

        mother.ndf -= splat::<T>(2.0);
        mother.charge -= self.charge;
        mother.s_from_decay = T::zero();
        mother.chi2 -= residual.chi2();
    }
}
