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
use nalgebra::SVector;

impl<T: Lane> Particle<T> {
    /// Kalman update with the energy filtered as an independent coordinate.
    pub(crate) fn update_energy_fit(
        &mut self,
        daughter: &Particle<T>,
        m: &SVector<T, 8>,
        v: &Covariance<T>,
    ) {
        let residual = Residual::adding(&self.params, &self.covar, m, v);

        // C H^T - D^T
        let mut cht = position_columns::<T, 7>(&self.covar);
        for i in 3..7 {
            for j in 0..3 {
                cht[(i, j)] -= v[(i, j)];
            }
        }
        let gain = residual.gain(&cht);
        let correction = residual.correction(&gain);

        for i in 3..7 {
            self.params[i] += m[i];
            for j in 3..=i {
                self.covar[(i, j)] += v[(i, j)];
            }
        }

        let reduction = gain * cht.transpose();
        for i in 0..7 {
            self.params[i] += correction[i];
            for j in 0..=i {
                self.covar[(i, j)] -= reduction[(i, j)];
            }
        }

        self.ndf += splat::<T>(2.0);
        self.charge += daughter.charge;
        self.s_from_decay = T::zero();
        self.chi2 += residual.chi2();
    }
}
