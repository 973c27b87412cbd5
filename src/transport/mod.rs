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

//! Analytic propagation of a particle state along its trajectory.
//!
//! The path is parameterised by `dS`, the signed path length divided by the momentum. Three field
//! models are provided: [`StraightLine`] (no field), [`HomogeneousField`] (uniform field along z)
//! and [`VaryingField`] (any smooth field, integrated along the trajectory).

use crate::field::{FieldProvider, GradientField, UniformField, K_CLIGHT};
use crate::lanes::{abs, select, splat, Lane, Mask};
use crate::linalg::Covariance;
use crate::particle::Particle;
use nalgebra::{SMatrix, SVector, Vector3};

mod homogeneous;
mod line;
mod varying;

pub use homogeneous::{
    ds_to_particle_by, ds_to_particle_bz, ds_to_point_by, ds_to_point_bz, transport_bz,
    HomogeneousField,
};
pub use line::{ds_to_particle_line, ds_to_point_line, transport_line, StraightLine};
pub use varying::{transport_varying, VaryingField};

/// Path length solutions beyond this magnitude are discarded (set to zero).
pub const MAX_PATH: f32 = 1e3;

/// A field model able to move a particle along its trajectory.
///
/// All methods are pure: they read the current state of the particles and return new values.
pub trait Propagator: FieldProvider {
    /// Returns the state vector and covariance transported by `ds`.
    fn transport<T: Lane>(&self, particle: &Particle<T>, ds: T) -> (SVector<T, 8>, Covariance<T>);

    /// Path length parameter to the point of closest approach to `xyz`.
    fn ds_to_point<T: Lane>(&self, particle: &Particle<T>, xyz: &Vector3<T>) -> T;

    /// Path length parameters of both particles to their point of closest approach.
    fn ds_to_particle<T: Lane>(&self, first: &Particle<T>, second: &Particle<T>) -> (T, T);
}

/// Zeroes the lanes where the solver diverged.
pub(crate) fn clamp_path<T: Lane>(ds: T) -> T {
    select(abs(ds).simd_gt(splat(MAX_PATH)), T::zero(), ds)
}

/// Field models available from configuration.
#[derive(Clone, Debug, PartialEq)]
pub enum AnyPropagator {
    Line(StraightLine),
    Homogeneous(HomogeneousField),
    Uniform(VaryingField<UniformField>),
    Gradient(VaryingField<GradientField>),
}

impl FieldProvider for AnyPropagator {
    fn field_at<T: Lane>(&self, position: &Vector3<T>) -> Vector3<T> {
        match self {
            Self::Line(p) => p.field_at(position),
            Self::Homogeneous(p) => p.field_at(position),
            Self::Uniform(p) => p.field_at(position),
            Self::Gradient(p) => p.field_at(position),
        }
    }
}

impl Propagator for AnyPropagator {
    fn transport<T: Lane>(&self, particle: &Particle<T>, ds: T) -> (SVector<T, 8>, Covariance<T>) {
        match self {
            Self::Line(p) => p.transport(particle, ds),
            Self::Homogeneous(p) => p.transport(particle, ds),
            Self::Uniform(p) => p.transport(particle, ds),
            Self::Gradient(p) => p.transport(particle, ds),
        }
    }

    fn ds_to_point<T: Lane>(&self, particle: &Particle<T>, xyz: &Vector3<T>) -> T {
        match self {
            Self::Line(p) => p.ds_to_point(particle, xyz),
            Self::Homogeneous(p) => p.ds_to_point(particle, xyz),
            Self::Uniform(p) => p.ds_to_point(particle, xyz),
            Self::Gradient(p) => p.ds_to_point(particle, xyz),
        }
    }

    fn ds_to_particle<T: Lane>(&self, first: &Particle<T>, second: &Particle<T>) -> (T, T) {
        match self {
            Self::Line(p) => p.ds_to_particle(first, second),
            Self::Homogeneous(p) => p.ds_to_particle(first, second),
            Self::Uniform(p) => p.ds_to_particle(first, second),
            Self::Gradient(p) => p.ds_to_particle(first, second),
        }
    }
}

impl<T: Lane> Particle<T> {
    /// Moves the particle by `ds` along its trajectory.
    pub fn transport_to_ds<P: Propagator>(&mut self, prop: &P, ds: T) {
        let (params, covar) = prop.transport(self, ds);
        self.params = params;
        self.covar = covar;
        self.s_from_decay += ds;
    }

    /// Moves the particle by `ds` along a straight line, whatever the field.
    pub fn transport_to_ds_line(&mut self, ds: T) {
        let (params, covar) = transport_line(&self.params, &self.covar, ds);
        self.params = params;
        self.covar = covar;
        self.s_from_decay += ds;
    }

    /// Moves the particle to its point of closest approach to `xyz`.
    pub fn transport_to_point<P: Propagator>(&mut self, prop: &P, xyz: &Vector3<T>) {
        let ds = prop.ds_to_point(self, xyz);
        self.transport_to_ds(prop, ds);
    }

    /// Moves the particle back to its decay point and expresses its errors there.
    pub fn transport_to_decay_vertex<P: Propagator>(&mut self, prop: &P) {
        self.transport_to_ds(prop, -self.s_from_decay);
        if self.at_production_vertex {
            self.convert(prop, false, crate::lanes::all_lanes::<T>());
        }
        self.at_production_vertex = false;
    }

    /// Moves the particle to its production point and expresses its errors there.
    pub fn transport_to_production_vertex<P: Propagator>(&mut self, prop: &P) {
        let ds = -self.s_from_decay - self.params[7];
        self.transport_to_ds(prop, ds);
        if !self.at_production_vertex {
            self.convert(prop, true, crate::lanes::all_lanes::<T>());
        }
        self.at_production_vertex = true;
    }

    /// Folds the decay length error into the position and momentum errors, moving the reference
    /// point of the covariance to the production point (`to_production`) or back to the decay
    /// point. Only the lanes of `mask` are converted.
    pub fn convert<F: FieldProvider>(&mut self, field: &F, to_production: bool, mask: Mask<T>) {
        let kq = self.charge * splat(K_CLIGHT);
        let b = field.field_at(&self.position()) * kq;
        let mut h = self.momentum();
        if to_production {
            h = -h;
        }
        let dh = h.cross(&b);

        let mut jac = SMatrix::<T, 8, 8>::identity();
        for i in 0..3 {
            jac[(i, 7)] = h[i];
            jac[(i + 3, 7)] = dh[i];
        }
        let converted = self.covar.congruence(&jac);
        self.covar = Covariance::select(mask, &converted, &self.covar);
    }
}
