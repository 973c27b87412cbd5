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

//! Update rule where the energy of each side is recomputed from its filtered momentum and its mass.
//!
//! The position and momentum block is filtered as usual. The mother energy is then the sum of the
//! energies of the filtered mother (`rf`) and of the filtered daughter (`mf`), each evaluated on the
//! mass it had before the update, and the energy row of the covariance is rebuilt from the
//! derivatives `dE/dp = p / E` of both sides with their cross terms.

use super::{position_columns, Residual};
use crate::lanes::{abs, select, splat, sqrt, Lane};
use crate::linalg::{Covariance, Sym7};
use crate::particle::Particle;
use nalgebra::{SMatrix, SVector, Vector3};

const SMALL: f32 = 1e-20;

/// Invariant mass squared of a state, `E^2 - p^2`.
fn mass2<T: Lane>(state: &SVector<T, 8>) -> T {
    state[6] * state[6] - (state[3] * state[3] + state[4] * state[4] + state[5] * state[5])
}

/// Energy of the momentum `p[3..6]` on the mass shell `mass2`, and its derivative `p / E`.
fn energy_on_shell<T: Lane>(p: &SVector<T, 6>, mass2: T) -> (T, Vector3<T>) {
    let energy = sqrt(mass2 + p[3] * p[3] + p[4] * p[4] + p[5] * p[5]);
    let ok = abs(energy).simd_ge(splat(SMALL));
    let safe = select(ok, energy, T::one());
    let h = Vector3::new(p[3], p[4], p[5]).map(|pi| select(ok, pi / safe, T::zero()));
    (energy, h)
}

/// Covariance of `(x, y, z, px, py, pz)` reduced by `gain * rows^T`, with the energy row rebuilt
/// from the momentum derivative `h`.
fn filtered_covariance<T: Lane>(
    source: &Covariance<T>,
    gain: &SMatrix<T, 6, 3>,
    rows: &SMatrix<T, 6, 3>,
    h: &Vector3<T>,
) -> Sym7<T> {
    let mut out: Sym7<T> = source.block::<7, 28>(0);
    let reduction = gain * rows.transpose();
    for i in 0..6 {
        for j in 0..=i {
            out[(i, j)] -= reduction[(i, j)];
        }
    }
    for j in 0..6 {
        out[(6, j)] = h[0] * out[(3, j)] + h[1] * out[(4, j)] + h[2] * out[(5, j)];
    }
    out[(6, 6)] = h[0] * out[(6, 3)] + h[1] * out[(6, 4)] + h[2] * out[(6, 5)];
    out
}

impl<T: Lane> Particle<T> {
    /// Kalman update with the energy recomputed from the momenta and masses.
    pub(crate) fn update_energy_calculated(
        &mut self,
        daughter: &Particle<T>,
        m: &SVector<T, 8>,
        v: &Covariance<T>,
    ) {
        let mass_m2 = mass2(m);
        let mass_r2 = mass2(&self.params);

        let residual = Residual::adding(&self.params, &self.covar, m, v);

        let ccht = position_columns::<T, 6>(&self.covar);
        let vht = position_columns::<T, 6>(v);
        let cht = ccht - SMatrix::<T, 6, 3>::from_fn(|i, j| if i < 3 { T::zero() } else { v[(i, j)] });
        let gain = residual.gain(&cht);

        // filtered daughter
        let km = residual.gain(&vht);
        let mf = SVector::<T, 6>::from_fn(|i, _| m[i]) - residual.correction(&km);
        let (energy_mf, hmf) = energy_on_shell(&mf, mass_m2);
        let vf = filtered_covariance(v, &km, &vht, &hmf);

        // filtered mother
        let krf = residual.gain(&ccht);
        let rf = SVector::<T, 6>::from_fn(|i, _| self.params[i]) + residual.correction(&krf);
        let (energy_rf, hrf) = energy_on_shell(&rf, mass_r2);
        let cf = filtered_covariance(&self.covar, &krf, &ccht, &hrf);

        // cross terms between the filtered daughter and mother
        let d = SMatrix::<T, 3, 6>::from_fn(|i, j| {
            km[(i + 3, 0)] * ccht[(j, 0)] + km[(i + 3, 1)] * ccht[(j, 1)] + km[(i + 3, 2)] * ccht[(j, 2)]
        });
        let mut de = [T::zero(); 7];
        for (j, de_j) in de.iter_mut().enumerate().take(6) {
            *de_j = hmf[0] * d[(0, j)] + hmf[1] * d[(1, j)] + hmf[2] * d[(2, j)];
        }
        de[6] = splat::<T>(2.0) * (de[3] * hrf[0] + de[4] * hrf[1] + de[5] * hrf[2]);

        let correction = residual.correction(&gain);
        let reduction = gain * cht.transpose();
        for i in 3..6 {
            self.params[i] += m[i];
            for j in 3..=i {
                self.covar[(i, j)] += v[(i, j)];
            }
        }
        for i in 0..6 {
            self.params[i] += correction[i];
            for j in 0..=i {
                self.covar[(i, j)] -= reduction[(i, j)];
            }
        }
        for j in 0..7 {
            let mut c6j = cf[(6, j)] + de[j];
            if j >= 3 {
                c6j += vf[(6, j)];
            }
            self.covar[(6, j)] = c6j;
        }
        self.params[6] = energy_rf + energy_mf;

        self.ndf += splat::<T>(2.0);
        self.charge += daughter.charge;
        self.s_from_decay = T::zero();
        self.chi2 += residual.chi2();
    }
}
