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

//! Mass constraints.
//!
//! The nonlinear constraint projects the momentum and energy on the mass shell `E^2 - p^2 = m^2`
//! with a single Lagrange multiplier `λ`: `p' = p / (1 - λ)` and `E' = E / (1 + λ)`. The multiplier
//! is a root of `f(λ) = -m²λ⁴ + aλ² + bλ + c`, seeded in closed form and refined by Newton steps.
//! The linear constraint is a scalar Kalman update on the pseudo-measurement `E^2 - p^2 - m^2`.

use crate::lanes::{abs, all_lanes, select, splat, sqrt, Lane, Mask};
use crate::linalg::{Covariance, Sym7};
use crate::particle::Particle;
use nalgebra::{SMatrix, SVector};

/// Newton steps applied to the multiplier, on every lane.
pub const NEWTON_ITERATIONS: usize = 100;

const EPSILON: f32 = 1e-10;

/// Projects `params` and `covar` on the mass shell of `mass` on the lanes of `mask`.
///
/// Returns the 7x7 Jacobian of the projection, which is the identity on the lanes left untouched.
pub(crate) fn project_on_mass_shell<T: Lane>(
    params: &mut SVector<T, 8>,
    covar: &mut Covariance<T>,
    mass: T,
    mask: Mask<T>,
) -> SMatrix<T, 7, 7> {
    let one = T::one();
    let two = splat::<T>(2.0);
    let energy2 = params[6] * params[6];
    let p2 = params[3] * params[3] + params[4] * params[4] + params[5] * params[5];
    let mass2 = mass * mass;

    let a = energy2 - p2 + two * mass2;
    let b = -two * (energy2 + p2);
    let c = energy2 - p2 - mass2;

    let mut lambda = select(abs(b).simd_gt(splat(EPSILON)), -c / b, T::zero());
    let d = splat::<T>(4.0) * energy2 * p2 - mass2 * (energy2 - p2 - two * mass2);
    let quadratic = d.simd_ge(T::zero()) & abs(a).simd_gt(splat(EPSILON));
    lambda = select(quadratic, (energy2 + p2 - sqrt(d)) / a, lambda);
    lambda = select(params[6].simd_lt(T::zero()), splat(-1e6), lambda);

    let slope = |l: T| -splat::<T>(4.0) * mass2 * l * l * l + two * a * l + b;
    for _ in 0..NEWTON_ITERATIONS {
        let l2 = lambda * lambda;
        let f = -mass2 * l2 * l2 + a * l2 + b * lambda + c;
        let df = slope(lambda);
        lambda = select(abs(df).simd_gt(splat(EPSILON)), lambda - f / df, lambda);
    }

    let lpi = one / (one + lambda);
    let lmi = one / (one - lambda);
    let dfl = slope(lambda);
    let dfx = [
        -two * (one + lambda) * (one + lambda) * params[3],
        -two * (one + lambda) * (one + lambda) * params[4],
        -two * (one + lambda) * (one + lambda) * params[5],
        two * (one - lambda) * (one - lambda) * params[6],
    ];
    let steep = abs(dfl).simd_gt(splat(EPSILON));
    let dlx = dfx.map(|dfx_i| select(steep, -dfx_i / dfl, one));
    let dxx = [
        params[3] * lmi * lmi,
        params[4] * lmi * lmi,
        params[5] * lmi * lmi,
        -params[6] * lpi * lpi,
    ];

    let mut jac = SMatrix::<T, 7, 7>::identity();
    for i in 3..7 {
        for j in 3..7 {
            jac[(i, j)] = dlx[j - 3] * dxx[i - 3];
        }
        jac[(i, i)] += if i < 6 { lmi } else { lpi };
    }
    let identity = SMatrix::<T, 7, 7>::identity();
    let jac = jac.zip_map(&identity, |j, i| select(mask, j, i));

    let projected: Sym7<T> = covar.block::<7, 28>(0).congruence(&jac);
    covar.set_block(0, &projected);
    for i in 3..6 {
        params[i] *= select(mask, lmi, one);
    }
    params[6] *= select(mask, lpi, one);
    jac
}

impl<T: Lane> Particle<T> {
    /// Projects the state exactly on the mass shell of `mass`, on every lane.
    ///
    /// The mass becomes the particle hypothesis and the constraint counts as one degree of freedom.
    pub fn set_nonlinear_mass_constraint(&mut self, mass: T) {
        project_on_mass_shell(&mut self.params, &mut self.covar, mass, all_lanes::<T>());
        self.mass_hypothesis = mass;
        self.sum_daughter_mass = mass;
        self.ndf += T::one();
    }

    /// Linearised mass constraint with resolution `sigma`, hard when `sigma` is zero.
    ///
    /// Lanes whose mass is already known exactly (vanishing total variance) are left unchanged.
    pub fn set_mass_constraint(&mut self, mass: T, sigma: T) {
        self.mass_hypothesis = mass;
        self.sum_daughter_mass = mass;

        let two = splat::<T>(2.0);
        let m2 = mass * mass;
        let s2 = m2 * sigma * sigma;
        let p2 = self.params[3] * self.params[3]
            + self.params[4] * self.params[4]
            + self.params[5] * self.params[5];

        let mut h = SVector::<T, 8>::zeros();
        for i in 3..6 {
            h[i] = -two * self.params[i];
        }
        h[6] = two * self.params[6];

        let zeta = m2 - (self.params[6] * self.params[6] - p2);
        let cht = self.covar.mul_vector(&h);
        let s2_est = h.dot(&cht);

        let total = s2 + s2_est;
        let active = total.simd_gt(splat(1e-20));
        let w2 = select(active, T::one() / select(active, total, T::one()), T::zero());

        self.chi2 += zeta * zeta * w2;
        self.ndf += select(active, T::one(), T::zero());
        for i in 0..8 {
            let ki = cht[i] * w2;
            self.params[i] += ki * zeta;
            for j in 0..=i {
                self.covar[(i, j)] -= ki * cht[j];
            }
        }
    }
}
