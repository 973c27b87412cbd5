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

//! Kalman filter updates of a mother particle.
//!
//! A daughter is treated as a measurement of the mother decay point: the daughter is transported to
//! the current vertex guess, its position error is inflated along its momentum to account for the
//! unknown path length, and the position residual drives a gain applied to the whole state. The
//! daughter momentum and energy are then added to the mother.

use crate::errors::{NoDaughtersSnafu, ParticleError};
use crate::field::K_CLIGHT;
use crate::lanes::{all, any, select, select_vector, splat, sqrt, Lane};
use crate::linalg::{invert_sym3, Covariance, Sym3};
use crate::particle::Particle;
use crate::transport::Propagator;
use nalgebra::{SMatrix, SVector, Vector3};
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;

mod energy_calc;
mod energy_fit;
mod mass_constrained;
mod subtract;
mod vertex;

/// Number of passes used to settle the linearisation point when none was provided.
pub const LINEARIZATION_ITERATIONS: usize = 3;

/// Rule used to combine a daughter with its mother.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructMethod {
    /// Energy is filtered as an independent coordinate.
    #[default]
    EnergyFit,
    /// Energy is recomputed from the filtered momenta and the mass of each side.
    EnergyCalculated,
    /// As `EnergyFit`, with both sides projected on their mass shell before being combined.
    EnergyFitWithMassConstraint,
}

/// Position residual of a measurement against the current estimate, and its weight
/// `(C_pos + V_pos)^-1`.
pub(crate) struct Residual<T: Lane> {
    pub zeta: Vector3<T>,
    pub weight: Sym3<T>,
}

impl<T: Lane> Residual<T> {
    /// Residual of a measurement `(m, v)` added to the estimate `(p, c)`.
    pub fn adding(p: &SVector<T, 8>, c: &Covariance<T>, m: &SVector<T, 8>, v: &Covariance<T>) -> Self {
        Self {
            zeta: position_of(m) - position_of(p),
            weight: invert_sym3(&(c.block::<3, 6>(0) + v.block::<3, 6>(0))),
        }
    }

    /// Residual of a measurement `(m, v)` removed from the estimate `(p, c)`.
    pub fn removing(p: &SVector<T, 8>, c: &Covariance<T>, m: &SVector<T, 8>, v: &Covariance<T>) -> Self {
        Self {
            zeta: position_of(m) - position_of(p),
            weight: invert_sym3(&(v.block::<3, 6>(0) - c.block::<3, 6>(0))),
        }
    }

    /// Gain `K = C H^T S` for the given `C H^T` rows.
    pub fn gain<const R: usize>(&self, cht: &SMatrix<T, R, 3>) -> SMatrix<T, R, 3> {
        cht * self.weight.to_dense()
    }

    /// `K * zeta` for every row of the gain.
    pub fn correction<const R: usize>(&self, gain: &SMatrix<T, R, 3>) -> SVector<T, R> {
        gain * self.zeta
    }

    /// Chi2 contribution `zeta^T S zeta`.
    pub fn chi2(&self) -> T {
        self.weight.quadratic_form(&self.zeta)
    }
}

pub(crate) fn position_of<T: Lane>(params: &SVector<T, 8>) -> Vector3<T> {
    Vector3::new(params[0], params[1], params[2])
}

/// `C H^T` rows of a covariance: the columns of the position block, for the first `R` rows.
pub(crate) fn position_columns<T: Lane, const R: usize>(c: &Covariance<T>) -> SMatrix<T, R, 3> {
    SMatrix::<T, R, 3>::from_fn(|i, j| c[(i, j)])
}

/// Path length uncertainty used to let a daughter reach the point `xyz`.
pub(crate) fn s_correction<T: Lane>(params: &SVector<T, 8>, xyz: &Vector3<T>) -> T {
    let d = xyz - position_of(params);
    let p2 = params[3] * params[3] + params[4] * params[4] + params[5] * params[5];
    let ok = p2.simd_gt(splat(1e-4));
    let safe_p2 = select(ok, p2, splat(1e-4));
    select(
        ok,
        splat::<T>(0.1) + splat::<T>(10.0) * sqrt(d.norm_squared() / safe_p2),
        T::one(),
    )
}

impl<T: Lane> Particle<T> {
    /// Expresses this particle as a measurement of the point `xyz`.
    ///
    /// The state is transported to its closest approach to `xyz` (or taken as is when it is
    /// already there) and its position and momentum errors are inflated by the uncertainty of
    /// the path length along the trajectory.
    pub fn get_measurement<P: Propagator>(
        &self,
        prop: &P,
        xyz: &Vector3<T>,
        at_vtx_guess: bool,
    ) -> (SVector<T, 8>, Covariance<T>) {
        let b = prop.field_at(xyz) * (self.charge * splat(K_CLIGHT));
        let (m, mut v) = if at_vtx_guess {
            (self.params, self.covar)
        } else {
            prop.transport(self, prop.ds_to_point(self, xyz))
        };

        let sigma_s = s_correction(&m, xyz);
        let hp = Vector3::new(m[3], m[4], m[5]) * sigma_s;
        let hb = hp.cross(&b);
        let h = [hp[0], hp[1], hp[2], hb[0], hb[1], hb[2]];
        for i in 0..6 {
            for j in 0..=i {
                v[(i, j)] += h[i] * h[j];
            }
        }
        (m, v)
    }

    /// The measurement of `xyz` on lanes whose path length is free, the raw state elsewhere.
    pub(crate) fn measurement_or_state<P: Propagator>(
        &self,
        prop: &P,
        xyz: &Vector3<T>,
        at_vtx_guess: bool,
    ) -> (SVector<T, 8>, Covariance<T>) {
        let measured = self.covar[(7, 7)].simd_gt(T::zero());
        if !any(measured) {
            return (self.params, self.covar);
        }
        let (m, v) = self.get_measurement(prop, xyz, at_vtx_guess);
        (
            select_vector(measured, &m, &self.params),
            Covariance::select(measured, &v, &self.covar),
        )
    }

    /// Adds a daughter to this particle with the configured [`ConstructMethod`].
    ///
    /// Lanes without any daughter yet (`NDF < -1`) take the daughter state as their own. The
    /// others are updated with the Kalman rule.
    pub fn add_daughter<P: Propagator>(&mut self, prop: &P, daughter: &Particle<T>, at_vtx_guess: bool) {
        self.daughter_ids.push(daughter.id);

        let first = self.ndf.simd_lt(splat(-1.0));
        let mut seeded = self.clone();
        if any(first) {
            let (m, v) = daughter.measurement_or_state(prop, &self.vtx_guess, at_vtx_guess);
            seeded.ndf = splat(-1.0);
            seeded.charge = daughter.charge;
            seeded.params = m;
            seeded.covar = v;
            seeded.s_from_decay = T::zero();
            seeded.mass_hypothesis = daughter.mass_hypothesis;
            seeded.sum_daughter_mass = daughter.sum_daughter_mass;
            if all(first) {
                *self = seeded;
                return;
            }
        }

        let iterations = self.linearize(prop, daughter, at_vtx_guess);
        for _ in 1..iterations {
            let (m, v) = daughter.measurement_or_state(prop, &self.vtx_guess, at_vtx_guess);
            let residual = Residual::adding(&self.params, &self.covar, &m, &v);
            self.vtx_guess = self.refined_guess(&residual);
        }
        let (m, v) = daughter.measurement_or_state(prop, &self.vtx_guess, at_vtx_guess);
        match self.method {
            ConstructMethod::EnergyFit => self.update_energy_fit(daughter, &m, &v),
            ConstructMethod::EnergyCalculated => self.update_energy_calculated(daughter, &m, &v),
            ConstructMethod::EnergyFitWithMassConstraint => {
                self.update_mass_constrained(daughter, &m, &v)
            }
        }
        self.sum_daughter_mass += daughter.sum_daughter_mass;
        self.mass_hypothesis = splat(-1.0);

        if any(first) {
            *self = Particle::select_state(first, &seeded, self);
        }
    }

    /// Picks the linearisation point for the next update and returns the number of passes.
    ///
    /// Lanes holding a single daughter move to the point of closest approach with the new one
    /// and start from the middle of both. Other lanes start from their current position.
    fn linearize<P: Propagator>(&mut self, prop: &P, daughter: &Particle<T>, at_vtx_guess: bool) -> usize {
        if self.is_linearized || at_vtx_guess {
            return 1;
        }
        let single = self.ndf.simd_eq(splat(-1.0));
        if any(single) {
            let (ds, ds1) = prop.ds_to_particle(self, daughter);
            let ds = select(single, ds, T::zero());
            let ds1 = select(single, ds1, T::zero());
            self.transport_to_ds(prop, ds);
            let (m, _) = prop.transport(daughter, ds1);
            let middle = (position_of(&self.params) + position_of(&m)) * splat::<T>(0.5);
            self.vtx_guess = select_vector(single, &middle, &self.position());
        } else {
            self.vtx_guess = self.position();
        }
        LINEARIZATION_ITERATIONS
    }

    /// Position after the update by `residual`, used as the next linearisation point.
    fn refined_guess(&self, residual: &Residual<T>) -> Vector3<T> {
        let gain = residual.gain(&position_columns::<T, 3>(&self.covar));
        self.position() + residual.correction(&gain)
    }

    /// Full reconstruction of a particle from its daughters.
    ///
    /// Without a trusted linearisation point, the vertex guess starts at the closest approach of
    /// the first two daughters and the whole set is refitted three times. With `constrained`, the
    /// current position and its covariance act as a vertex constraint (`NDF` starts at 0).
    /// An optional mass constraint and production vertex are applied at the end.
    pub fn construct<P: Propagator>(
        &mut self,
        prop: &P,
        daughters: &[&Particle<T>],
        parent: Option<&Particle<T>>,
        mass: Option<T>,
        constrained: bool,
        at_vtx_guess: bool,
    ) -> Result<(), ParticleError> {
        ensure!(!daughters.is_empty(), NoDaughtersSnafu);

        let was_linearized = self.is_linearized;
        let mut iterations = 1;
        if (!self.is_linearized || constrained) && !at_vtx_guess {
            let first = daughters[0];
            let (params, covar) = match daughters.get(1) {
                Some(second) => {
                    let (ds, _) = prop.ds_to_particle(first, second);
                    prop.transport(first, ds)
                }
                None => (first.params, first.covar),
            };
            self.vtx_guess = position_of(&params);
            if !self.has_vtx_err_guess {
                for i in 0..3 {
                    let c = covar[(i, i)];
                    let ok = c.simd_gt(T::zero());
                    self.vtx_err_guess[i] = select(ok, splat::<T>(10.0) * sqrt(c), T::one());
                }
            }
            self.is_linearized = true;
            iterations = LINEARIZATION_ITERATIONS;
        } else if !self.has_vtx_err_guess {
            self.vtx_err_guess = Vector3::repeat(T::one());
        }

        let constraint = if constrained {
            self.position_covar()
        } else {
            Sym3::from_diagonal(&self.vtx_err_guess.component_mul(&self.vtx_err_guess))
        };

        trace!(
            "constructing from {} daughters in {iterations} pass(es), method {:?}",
            daughters.len(),
            self.method
        );
        for iter in 0..iterations {
            self.daughter_ids.clear();
            self.at_production_vertex = false;
            self.s_from_decay = T::zero();
            self.params = SVector::zeros();
            for i in 0..3 {
                self.params[i] = self.vtx_guess[i];
            }
            self.sum_daughter_mass = T::zero();
            self.covar = Covariance::zeros();
            self.covar.set_block(0, &constraint);
            self.covar[(7, 7)] = T::one();
            self.ndf = if constrained { T::zero() } else { splat(-3.0) };
            self.chi2 = T::zero();
            self.charge = T::zero();

            for daughter in daughters {
                self.add_daughter(prop, daughter, at_vtx_guess);
            }
            if iter + 1 < iterations {
                self.vtx_guess = self.position();
            }
        }
        self.is_linearized = was_linearized;

        if let Some(mass) = mass {
            self.set_mass_constraint(mass, T::zero());
        }
        if let Some(parent) = parent {
            self.set_production_vertex(prop, parent);
        }
        Ok(())
    }
}

#[cfg(test)]
mod ut_kalman {
    use super::*;
    use crate::transport::StraightLine;

    fn track(px: f32, py: f32, pz: f32, charge: f32) -> Particle<f32> {
        let mut cov = crate::particle::TrackCovariance::<f32>::zeros();
        for i in 0..3 {
            cov[(i, i)] = 1e-4;
            cov[(i + 3, i + 3)] = 1e-6;
        }
        Particle::from_track(
            &SVector::<f32, 6>::new(0.0, 0.0, 0.0, px, py, pz),
            &cov,
            charge,
            0.13957,
        )
    }

    #[test]
    fn first_daughter_is_copied() {
        let d = track(0.3, 0.0, 0.1, 1.0);
        let mut mother = Particle::<f32>::new();
        mother.add_daughter(&StraightLine, &d, false);
        assert_eq!(mother.ndf, -1.0);
        assert_eq!(mother.charge, 1.0);
        assert_eq!(mother.px(), 0.3);
        assert_eq!(mother.daughter_ids.len(), 1);
        // the path length error inflates the position block
        assert!(mother.covar[(0, 0)] > d.covar[(0, 0)]);
    }

    #[test]
    fn s_correction_floor() {
        let still = SVector::<f32, 8>::zeros();
        assert_eq!(s_correction(&still, &Vector3::new(1.0, 0.0, 0.0)), 1.0);
        let moving = SVector::<f32, 8>::from_column_slice(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0]);
        let s = s_correction(&moving, &Vector3::new(2.0, 0.0, 0.0));
        assert!((s - 20.1).abs() < 1e-5);
    }

    #[test]
    fn empty_daughter_list() {
        let mut mother = Particle::<f32>::new();
        assert_eq!(
            mother.construct(&StraightLine, &[], None, None, false, false),
            Err(ParticleError::NoDaughters)
        );
    }
}
