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

use super::Particle;
use crate::lanes::{abs, atan2, select, splat, sqrt, Lane, Mask};

/// A derived quantity with its 1 sigma error.
///
/// `problem` is set on the lanes where the error is not defined; their error holds a large
/// sentinel instead of a non-finite value.
#[derive(Copy, Clone)]
pub struct Measured<T: Lane> {
    pub value: T,
    pub error: T,
    pub problem: Mask<T>,
}

impl<T: Lane> Measured<T> {
    /// Keeps `error` where `ok` is set and replaces it by `sentinel` elsewhere.
    pub(super) fn guarded(value: T, error: T, ok: Mask<T>, sentinel: f32) -> Self {
        Self {
            value,
            error: select(ok, error, splat(sentinel)),
            problem: !ok,
        }
    }
}

impl<T: Lane> Particle<T> {
    /// Momentum magnitude in GeV/c.
    pub fn momentum_magnitude(&self) -> Measured<T> {
        let c = &self.covar;
        let (x, y, z) = (self.px(), self.py(), self.pz());
        let p2 = x * x + y * y + z * z;
        let p = sqrt(p2);
        let err2 = x * x * c[(3, 3)]
            + y * y * c[(4, 4)]
            + z * z * c[(5, 5)]
            + splat::<T>(2.0) * (x * y * c[(4, 3)] + x * z * c[(5, 3)] + y * z * c[(5, 4)]);
        let ok = err2.simd_gt(T::zero()) & abs(p).simd_gt(splat(1e-4));
        let safe_p = select(ok, p, T::one());
        Measured::guarded(p, sqrt(abs(err2)) / safe_p, ok, 1e20)
    }

    /// Transverse momentum in GeV/c.
    pub fn pt(&self) -> Measured<T> {
        let c = &self.covar;
        let (x, y) = (self.px(), self.py());
        let pt = sqrt(x * x + y * y);
        let err2 = x * x * c[(3, 3)] + y * y * c[(4, 4)] + splat::<T>(2.0) * x * y * c[(4, 3)];
        let ok = err2.simd_gt(T::zero()) & abs(pt).simd_gt(splat(1e-4));
        let safe_pt = select(ok, pt, T::one());
        Measured::guarded(pt, sqrt(abs(err2)) / safe_pt, ok, 1e20)
    }

    /// Pseudorapidity `0.5 ln((p + pz) / (p - pz))`.
    pub fn eta(&self) -> Measured<T> {
        const BIG: f32 = 1e10;
        const SMALL: f32 = 1e-8;
        let c = &self.covar;
        let (px, py, pz) = (self.px(), self.py(), self.pz());
        let pt2 = px * px + py * py;
        let p2 = pt2 + pz * pz;
        let p = sqrt(p2);
        let a = p + pz;
        let b = p - pz;

        let defined = b.simd_gt(splat(SMALL));
        let ratio = select(defined, a / select(defined, b, T::one()), T::zero());
        let positive = abs(ratio).simd_gt(splat(SMALL));
        let log = (select(positive, ratio, T::one())).simd_ln() * splat(0.5);
        let eta = select(positive, log, splat(BIG));

        let h3 = -px * pz;
        let h4 = -py * pz;
        let pt4 = pt2 * pt2;
        let p2pt4 = p2 * pt4;
        let err2 = h3 * h3 * c[(3, 3)]
            + h4 * h4 * c[(4, 4)]
            + pt4 * c[(5, 5)]
            + splat::<T>(2.0) * (h3 * (h4 * c[(4, 3)] + c[(5, 3)] * pt2) + pt2 * h4 * c[(5, 4)]);
        let ok = abs(p2pt4).simd_gt(splat(SMALL)) & err2.simd_gt(T::zero());
        let error = sqrt(abs(err2) / select(ok, p2pt4, T::one()));
        Measured::guarded(eta, error, ok, BIG)
    }

    /// Azimuthal angle `atan2(py, px)`.
    pub fn phi(&self) -> Measured<T> {
        let c = &self.covar;
        let (px, py) = (self.px(), self.py());
        let pt2 = px * px + py * py;
        let phi = atan2(py, px);
        let err2 = py * py * c[(3, 3)] + px * px * c[(4, 4)] - splat::<T>(2.0) * px * py * c[(4, 3)];
        let ok = err2.simd_gt(T::zero()) & pt2.simd_gt(splat(1e-4));
        let error = sqrt(abs(err2)) / select(ok, pt2, T::one());
        Measured::guarded(phi, error, ok, 1e10)
    }

    /// Transverse distance to the beam axis, in cm.
    pub fn r(&self) -> Measured<T> {
        let c = &self.covar;
        let (x, y) = (self.x(), self.y());
        let r = sqrt(x * x + y * y);
        let err2 = x * x * c[(0, 0)] + y * y * c[(1, 1)] + splat::<T>(2.0) * x * y * c[(1, 0)];
        let ok = err2.simd_gt(T::zero()) & r.simd_gt(splat(1e-4));
        let error = sqrt(abs(err2)) / select(ok, r, T::one());
        Measured::guarded(r, error, ok, 1e10)
    }

    /// Invariant mass `sqrt(E^2 - p^2)` in GeV/c^2.
    ///
    /// When `E^2 < p^2` the mass is returned negative, `-sqrt(p^2 - E^2)`, and flagged as a
    /// problem: the signed residual is kept for constraint fitting.
    pub fn mass(&self) -> Measured<T> {
        let c = &self.covar;
        let p = &self.params;
        // variance of m^2 / 2
        let s = p[3] * p[3] * c[(3, 3)]
            + p[4] * p[4] * c[(4, 4)]
            + p[5] * p[5] * c[(5, 5)]
            + p[6] * p[6] * c[(6, 6)]
            + splat::<T>(2.0)
                * (p[3] * p[4] * c[(4, 3)] + p[5] * (p[3] * c[(5, 3)] + p[4] * c[(5, 4)])
                    - p[6] * (p[3] * c[(6, 3)] + p[4] * c[(6, 4)] + p[5] * c[(6, 5)]));
        let m2 = p[6] * p[6] - p[3] * p[3] - p[4] * p[4] - p[5] * p[5];

        let physical = m2.simd_ge(T::zero());
        let m = select(physical, sqrt(abs(m2)), -sqrt(abs(m2)));
        let ok = physical & s.simd_ge(T::zero()) & m.simd_gt(splat(1e-10));
        let error = sqrt(abs(s)) / select(ok, m, T::one());
        Measured::guarded(m, error, ok, 1e20)
    }

    /// Decay length `S * |p|`, in cm.
    pub fn decay_length(&self) -> Measured<T> {
        let c = &self.covar;
        let (x, y, z, t) = (self.px(), self.py(), self.pz(), self.s());
        let p2 = x * x + y * y + z * z;
        let ok = p2.simd_gt(splat(1e-4));
        let safe_p2 = select(ok, p2, T::one());
        let l = t * sqrt(p2);
        let err2 = p2 * c[(7, 7)]
            + t * t / safe_p2
                * (x * x * c[(3, 3)]
                    + y * y * c[(4, 4)]
                    + z * z * c[(5, 5)]
                    + splat::<T>(2.0) * (x * y * c[(4, 3)] + x * z * c[(5, 3)] + y * z * c[(5, 4)]))
            + splat::<T>(2.0) * t * (x * c[(7, 3)] + y * c[(7, 4)] + z * c[(7, 5)]);
        Measured::guarded(l, sqrt(abs(err2)), ok, 1e20)
    }

    /// Decay length projected on the transverse plane, in cm.
    pub fn decay_length_xy(&self) -> Measured<T> {
        let c = &self.covar;
        let (x, y, t) = (self.px(), self.py(), self.s());
        let pt2 = x * x + y * y;
        let ok = pt2.simd_gt(splat(1e-4));
        let safe_pt2 = select(ok, pt2, T::one());
        let l = t * sqrt(pt2);
        let err2 = pt2 * c[(7, 7)]
            + t * t / safe_pt2
                * (x * x * c[(3, 3)] + y * y * c[(4, 4)] + splat::<T>(2.0) * x * y * c[(4, 3)])
            + splat::<T>(2.0) * t * (x * c[(7, 3)] + y * c[(7, 4)]);
        Measured::guarded(l, sqrt(abs(err2)), ok, 1e20)
    }

    /// Proper decay length `c * tau = S * m`, in cm.
    pub fn life_time(&self) -> Measured<T> {
        let c = &self.covar;
        let p = &self.params;
        let mass = self.mass();
        let (m, dm) = (mass.value, mass.error);
        let c_tm = -p[3] * c[(7, 3)] - p[4] * c[(7, 4)] - p[5] * c[(7, 5)] + p[6] * c[(7, 6)];
        let tau_c = p[7] * m;
        let err2 = m * m * c[(7, 7)] + splat::<T>(2.0) * p[7] * c_tm + p[7] * p[7] * dm * dm;
        let ok = err2.simd_gt(T::zero());
        Measured::guarded(tau_c, sqrt(abs(err2)), ok, 1e20)
    }
}
