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
use crate::lanes::{select, splat, sqrt, Lane, Mask};
use crate::linalg::Covariance;
use crate::mass::project_on_mass_shell;
use crate::particle::Particle;
use nalgebra::{SMatrix, SVector};

/// Mass of a state, zero when unphysical.
fn clamped_mass<T: Lane>(state: &SVector<T, 8>) -> T {
    let m2 = state[6] * state[6] - (state[3] * state[3] + state[4] * state[4] + state[5] * state[5]);
    let ok = m2.simd_gt(T::zero());
    select(ok, sqrt(select(ok, m2, T::zero())), T::zero())
}

/// Target mass and lanes to project: the mass hypothesis when set, otherwise the sum of the
/// daughter masses when the state is below it or has a negative energy.
fn shell_target<T: Lane>(state: &SVector<T, 8>, hypothesis: T, sum_daughter_mass: T) -> (T, Mask<T>) {
    let has_hypothesis = hypothesis.simd_gt(splat(-0.5));
    let unphysical = clamped_mass(state).simd_lt(sum_daughter_mass) | state[6].simd_lt(T::zero());
    (
        select(has_hypothesis, hypothesis, sum_daughter_mass),
        has_hypothesis | (!has_hypothesis & unphysical),
    )
}

impl<T: Lane> Particle<T> {
    /// Kalman update with the energy filtered, both sides being projected on their mass shell
    /// before they are combined.
    pub(crate) fn update_mass_constrained(
        &mut self,
        daughter: &Particle<T>,
        m: &SVector<T, 8>,
        v: &Covariance<T>,
    ) {
        let mut m = *m;
        let mut v = *v;
        let residual = Residual::adding(&self.params, &self.covar, &m, &v);

        let cht = position_columns::<T, 7>(&self.covar);
        let vht = position_columns::<T, 7>(&v);
        let gain = residual.gain(&cht);
        let km = residual.gain(&vht);

        let correction = residual.correction(&gain);
        let m_correction = residual.correction(&km);
        let reduction = gain * cht.transpose();
        let m_reduction = km * vht.transpose();
        for i in 0..7 {
            self.params[i] += correction[i];
            m[i] -= m_correction[i];
            for j in 0..=i {
                self.covar[(i, j)] -= reduction[(i, j)];
                v[(i, j)] -= m_reduction[(i, j)];
            }
        }
        let df: SMatrix<T, 7, 7> = km * cht.transpose();

        let (target, mask) = shell_target(&self.params, self.mass_hypothesis, self.sum_daughter_mass);
        let j1 = project_on_mass_shell(&mut self.params, &mut self.covar, target, mask);
        let (target, mask) =
            shell_target(&m, daughter.mass_hypothesis, daughter.sum_daughter_mass);
        let j2 = project_on_mass_shell(&mut m, &mut v, target, mask);
        let df = j2 * df * j1.transpose();

        for i in 3..7 {
            self.params[i] += m[i];
            for j in 0..3 {
                self.covar[(i, j)] += df[(i, j)];
            }
            for j in 3..=i {
                self.covar[(i, j)] += v[(i, j)] + df[(i, j)] + df[(j, i)];
            }
        }

        self.ndf += splat::<T>(2.0);
        self.charge += daughter.charge;
        self.s_from_decay = T::zero();
        self.chi2 += residual.chi2();
    }
}
