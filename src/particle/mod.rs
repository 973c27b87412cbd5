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

use crate::errors::{InvalidInputSnafu, ParticleError};
use crate::kalman::ConstructMethod;
use crate::lanes::{gather, select, select_vector, splat, sqrt, Lane, Mask, WideF32x4};
use crate::linalg::{Covariance, Sym3, SymMatrix};
use nalgebra::{SVector, Vector3};
use snafu::ensure;

mod derived;
mod geometry;

pub use derived::Measured;

/// Symmetric 6x6 covariance of a track (position and momentum), 21 packed terms.
pub type TrackCovariance<T> = SymMatrix<T, 6, 21>;
/// Symmetric 7x7 covariance of a track with its energy, 28 packed terms.
pub type TrackEnergyCovariance<T> = SymMatrix<T, 7, 28>;

/// Kinematic state of a particle candidate, or of a batch of independent candidates when `T` is a
/// SIMD lane type.
///
/// The state vector is `{x, y, z, px, py, pz, E, S}` in cm, GeV/c, GeV and cm/(GeV/c): `S` is the
/// signed path length parameter from the decay point (decay length divided by momentum).
#[derive(Clone, Debug)]
pub struct Particle<T: Lane> {
    /// State vector `{x, y, z, px, py, pz, E, S}`
    pub params: SVector<T, 8>,
    /// Covariance of the state vector
    pub covar: Covariance<T>,
    /// Electric charge in units of e
    pub charge: T,
    pub ndf: T,
    pub chi2: T,
    /// Path length parameter travelled since the particle was at its decay point
    pub s_from_decay: T,
    /// Sum of the rest masses of all daughters, a lower bound on the particle mass
    pub sum_daughter_mass: T,
    /// Mass enforced by the combined update, or any value below -0.5 when unset
    pub mass_hypothesis: T,
    pub id: T::Id,
    pub daughter_ids: Vec<T::Id>,
    /// Whether the state is expressed at the production point rather than at the decay point
    pub at_production_vertex: bool,
    /// Whether `vtx_guess` is trusted as the linearisation point of daughter measurements
    pub is_linearized: bool,
    pub vtx_guess: Vector3<T>,
    pub vtx_err_guess: Vector3<T>,
    /// Whether `vtx_err_guess` was set by the caller
    pub has_vtx_err_guess: bool,
    /// Rule used to add daughters
    pub method: ConstructMethod,
}

impl<T: Lane> Default for Particle<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Lane> Particle<T> {
    /// An empty particle, ready to receive daughters.
    ///
    /// The position is unconstrained (variance of 100 cm^2 per axis, `NDF = -3`).
    pub fn new() -> Self {
        let mut covar = Covariance::zeros();
        for i in 0..3 {
            covar[(i, i)] = splat(100.0);
        }
        covar[(7, 7)] = T::one();
        Self {
            params: SVector::zeros(),
            covar,
            charge: T::zero(),
            ndf: splat(-3.0),
            chi2: T::zero(),
            s_from_decay: T::zero(),
            sum_daughter_mass: T::zero(),
            mass_hypothesis: splat(-1.0),
            id: T::Id::default(),
            daughter_ids: Vec::new(),
            at_production_vertex: false,
            is_linearized: false,
            vtx_guess: Vector3::zeros(),
            vtx_err_guess: Vector3::zeros(),
            has_vtx_err_guess: false,
            method: ConstructMethod::default(),
        }
    }

    /// Initializes a particle from a cartesian track: position, momentum and their covariance.
    ///
    /// The energy is computed from the mass hypothesis, and its covariance terms are propagated
    /// from the momentum block. The path length parameter is exactly known (zero).
    pub fn from_track(
        params: &SVector<T, 6>,
        cov: &TrackCovariance<T>,
        charge: T,
        mass: T,
    ) -> Self {
        let mut me = Self::new();
        for i in 0..6 {
            me.params[i] = params[i];
        }
        me.covar = Covariance::zeros();
        for i in 0..6 {
            for j in 0..=i {
                me.covar[(i, j)] = cov[(i, j)];
            }
        }

        let p2 = params[3] * params[3] + params[4] * params[4] + params[5] * params[5];
        let energy = sqrt(mass * mass + p2);
        me.params[6] = energy;
        me.params[7] = T::zero();

        // dE/dp = p / E
        let h = [params[3] / energy, params[4] / energy, params[5] / energy];
        for j in 0..6 {
            me.covar[(6, j)] = h[0] * cov[(3, j)] + h[1] * cov[(4, j)] + h[2] * cov[(5, j)];
        }
        me.covar[(6, 6)] = h[0] * h[0] * cov[(3, 3)]
            + h[1] * h[1] * cov[(4, 4)]
            + h[2] * h[2] * cov[(5, 5)]
            + splat::<T>(2.0)
                * (h[0] * h[1] * cov[(4, 3)] + h[0] * h[2] * cov[(5, 3)] + h[1] * h[2] * cov[(5, 4)]);
        me.covar[(7, 7)] = T::one();

        me.charge = charge;
        me.ndf = T::zero();
        me.sum_daughter_mass = mass;
        me.mass_hypothesis = mass;
        me
    }

    /// Initializes a particle from a track whose energy is already part of the state.
    pub fn from_track_with_energy(
        params: &SVector<T, 7>,
        cov: &TrackEnergyCovariance<T>,
        charge: T,
        mass: T,
    ) -> Self {
        let mut me = Self::new();
        for i in 0..7 {
            me.params[i] = params[i];
        }
        me.covar = Covariance::zeros();
        for i in 0..7 {
            for j in 0..=i {
                me.covar[(i, j)] = cov[(i, j)];
            }
        }
        me.covar[(7, 7)] = T::one();
        me.charge = charge;
        me.ndf = T::zero();
        me.sum_daughter_mass = mass;
        me.mass_hypothesis = mass;
        me
    }

    /// Initializes a particle from flat upstream arrays.
    ///
    /// Accepts either 6 parameters with 21 covariance terms (the energy follows from `mass`) or
    /// 7 parameters with 28 covariance terms (the energy is given).
    pub fn from_slices(params: &[T], cov: &[T], charge: T, mass: T) -> Result<Self, ParticleError> {
        ensure!(
            (params.len() == 6 && cov.len() == 21) || (params.len() == 7 && cov.len() == 28),
            InvalidInputSnafu {
                params: params.len(),
                covariance: cov.len()
            }
        );
        if params.len() == 6 {
            let mut packed = [T::zero(); 21];
            packed.copy_from_slice(cov);
            Ok(Self::from_track(
                &SVector::<T, 6>::from_column_slice(params),
                &TrackCovariance::from_packed(packed),
                charge,
                mass,
            ))
        } else {
            let mut packed = [T::zero(); 28];
            packed.copy_from_slice(cov);
            Ok(Self::from_track_with_energy(
                &SVector::<T, 7>::from_column_slice(params),
                &TrackEnergyCovariance::from_packed(packed),
                charge,
                mass,
            ))
        }
    }

    /// Initializes a neutral, momentum-less particle from a fitted vertex.
    ///
    /// A vertex fitted from `n_contributors` tracks has `2 n - 3` degrees of freedom.
    pub fn from_vertex(position: &Vector3<T>, cov: &Sym3<T>, chi2: T, n_contributors: T) -> Self {
        let mut me = Self::new();
        for i in 0..3 {
            me.params[i] = position[i];
            for j in 0..=i {
                me.covar[(i, j)] = cov[(i, j)];
            }
        }
        me.chi2 = chi2;
        me.ndf = splat::<T>(2.0) * n_contributors - splat(3.0);
        me
    }

    /// Sets the linearisation point used when adding daughters and marks the particle linearized.
    pub fn set_vtx_guess(&mut self, guess: Vector3<T>) {
        self.vtx_guess = guess;
        self.is_linearized = true;
    }

    /// Sets the expected errors of the linearisation point, used by [`Particle::construct`].
    pub fn set_vtx_err_guess(&mut self, errors: Vector3<T>) {
        self.vtx_err_guess = errors;
        self.has_vtx_err_guess = true;
    }

    pub fn with_id(mut self, id: T::Id) -> Self {
        self.id = id;
        self
    }

    pub fn with_method(mut self, method: ConstructMethod) -> Self {
        self.method = method;
        self
    }

    pub fn x(&self) -> T {
        self.params[0]
    }

    pub fn y(&self) -> T {
        self.params[1]
    }

    pub fn z(&self) -> T {
        self.params[2]
    }

    pub fn px(&self) -> T {
        self.params[3]
    }

    pub fn py(&self) -> T {
        self.params[4]
    }

    pub fn pz(&self) -> T {
        self.params[5]
    }

    pub fn energy(&self) -> T {
        self.params[6]
    }

    /// Path length parameter from the decay point
    pub fn s(&self) -> T {
        self.params[7]
    }

    pub fn position(&self) -> Vector3<T> {
        Vector3::new(self.params[0], self.params[1], self.params[2])
    }

    pub fn momentum(&self) -> Vector3<T> {
        Vector3::new(self.params[3], self.params[4], self.params[5])
    }

    /// Covariance of the position, the upper left 3x3 block.
    pub fn position_covar(&self) -> Sym3<T> {
        self.covar.block::<3, 6>(0)
    }

    /// Lane-wise merge of the numeric state of two particles. Identifiers and flags are taken from
    /// `if_false`.
    pub(crate) fn select_state(mask: Mask<T>, if_true: &Self, if_false: &Self) -> Self {
        let mut out = if_false.clone();
        out.params = select_vector(mask, &if_true.params, &if_false.params);
        out.covar = Covariance::select(mask, &if_true.covar, &if_false.covar);
        out.charge = select(mask, if_true.charge, if_false.charge);
        out.ndf = select(mask, if_true.ndf, if_false.ndf);
        out.chi2 = select(mask, if_true.chi2, if_false.chi2);
        out.s_from_decay = select(mask, if_true.s_from_decay, if_false.s_from_decay);
        out.sum_daughter_mass = select(mask, if_true.sum_daughter_mass, if_false.sum_daughter_mass);
        out.mass_hypothesis = select(mask, if_true.mass_hypothesis, if_false.mass_hypothesis);
        out.vtx_guess = select_vector(mask, &if_true.vtx_guess, &if_false.vtx_guess);
        out
    }
}

impl Particle<WideF32x4> {
    /// Packs up to four scalar particles into one batch.
    ///
    /// Unused lanes repeat the first particle so that every lane carries a valid state. Flags and
    /// the construction method are taken from the first particle.
    pub fn pack(particles: &[Particle<f32>]) -> Result<Self, ParticleError> {
        ensure!(
            !particles.is_empty() && particles.len() <= WideF32x4::WIDTH,
            crate::errors::BatchSizeSnafu {
                len: particles.len(),
                width: WideF32x4::WIDTH
            }
        );
        let lanes = |f: &dyn Fn(&Particle<f32>) -> f32| -> WideF32x4 {
            gather(&particles.iter().map(f).collect::<Vec<f32>>())
        };
        let first = &particles[0];
        let mut me = Self::new();
        for i in 0..8 {
            me.params[i] = lanes(&|p| p.params[i]);
        }
        for k in 0..36 {
            me.covar.packed_mut()[k] = lanes(&|p| p.covar.packed()[k]);
        }
        me.charge = lanes(&|p| p.charge);
        me.ndf = lanes(&|p| p.ndf);
        me.chi2 = lanes(&|p| p.chi2);
        me.s_from_decay = lanes(&|p| p.s_from_decay);
        me.sum_daughter_mass = lanes(&|p| p.sum_daughter_mass);
        me.mass_hypothesis = lanes(&|p| p.mass_hypothesis);
        for i in 0..3 {
            me.vtx_guess[i] = lanes(&|p| p.vtx_guess[i]);
            me.vtx_err_guess[i] = lanes(&|p| p.vtx_err_guess[i]);
        }

        let lane_of = |lane: usize| particles.get(lane).unwrap_or(first);
        for lane in 0..WideF32x4::WIDTH {
            me.id[lane] = lane_of(lane).id;
        }
        let n_daughters = particles.iter().map(|p| p.daughter_ids.len()).max().unwrap_or(0);
        me.daughter_ids = (0..n_daughters)
            .map(|k| {
                let mut ids = [-1; 4];
                for (lane, id) in ids.iter_mut().enumerate() {
                    if let Some(d) = lane_of(lane).daughter_ids.get(k) {
                        *id = *d;
                    }
                }
                ids
            })
            .collect();

        me.at_production_vertex = first.at_production_vertex;
        me.is_linearized = first.is_linearized;
        me.has_vtx_err_guess = first.has_vtx_err_guess;
        me.method = first.method;
        Ok(me)
    }

    /// Splits a batch into its four scalar particles.
    pub fn unpack(&self) -> Vec<Particle<f32>> {
        use simba::simd::SimdValue;
        (0..WideF32x4::WIDTH)
            .map(|lane| {
                let mut p = Particle::<f32>::new();
                for i in 0..8 {
                    p.params[i] = self.params[i].extract(lane);
                }
                for k in 0..36 {
                    p.covar.packed_mut()[k] = self.covar.packed()[k].extract(lane);
                }
                p.charge = self.charge.extract(lane);
                p.ndf = self.ndf.extract(lane);
                p.chi2 = self.chi2.extract(lane);
                p.s_from_decay = self.s_from_decay.extract(lane);
                p.sum_daughter_mass = self.sum_daughter_mass.extract(lane);
                p.mass_hypothesis = self.mass_hypothesis.extract(lane);
                for i in 0..3 {
                    p.vtx_guess[i] = self.vtx_guess[i].extract(lane);
                    p.vtx_err_guess[i] = self.vtx_err_guess[i].extract(lane);
                }
                p.id = self.id[lane];
                p.daughter_ids = self.daughter_ids.iter().map(|ids| ids[lane]).collect();
                p.at_production_vertex = self.at_production_vertex;
                p.is_linearized = self.is_linearized;
                p.has_vtx_err_guess = self.has_vtx_err_guess;
                p.method = self.method;
                p
            })
            .collect()
    }
}
