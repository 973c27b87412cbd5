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

use super::Sym3;
use crate::lanes::{abs, select, splat, sqrt, Lane};

/// Pivots below this magnitude are replaced by a signed epsilon.
const PIVOT_FLOOR: f32 = 1e-8;

/// Inverts a symmetric 3x3 matrix through an `L D L^T` factorization.
///
/// `D` only carries the signs of the pivots, so indefinite matrices are inverted as well.
/// A pivot smaller than `1e-8` in magnitude is clamped to `+/- 1e-8` (keeping its sign), which
/// keeps every lane finite for singular inputs at the cost of exactness near the singularity.
pub fn invert_sym3<T: Lane>(a: &Sym3<T>) -> Sym3<T> {
    let mut d = [T::zero(); 3];
    let mut u = [[T::zero(); 3]; 3];

    for i in 0..3 {
        let mut uud = T::zero();
        for j in 0..i {
            uud += u[j][i] * u[j][i] * d[j];
        }
        uud = a[(i, i)] - uud;

        let small = abs(uud).simd_lt(splat(PIVOT_FLOOR));
        let signed_floor = select(uud.simd_lt(T::zero()), splat(-PIVOT_FLOOR), splat(PIVOT_FLOOR));
        uud = select(small, signed_floor, uud);

        d[i] = uud / abs(uud);
        u[i][i] = sqrt(abs(uud));

        for j in (i + 1)..3 {
            let mut acc = T::zero();
            for k in 0..i {
                acc += u[k][i] * u[k][j] * d[k];
            }
            acc = a[(j, i)] - acc;
            u[i][j] = d[i] / u[i][i] * acc;
        }
    }

    // Invert the upper triangular factor in place.
    let mut diag = [T::zero(); 3];
    for i in 0..3 {
        diag[i] = u[i][i];
        u[i][i] = T::one() / u[i][i];
    }
    for i in 0..2 {
        u[i][i + 1] = -u[i][i + 1] * u[i][i] * u[i + 1][i + 1];
    }
    u[0][2] = u[0][1] * diag[1] * u[1][2] - u[0][2] * u[0][0] * u[2][2];

    let mut out = Sym3::zeros();
    for i in 0..3 {
        out[(2, i)] = u[i][2] * u[2][2] * d[2];
    }
    for i in 0..2 {
        out[(1, i)] = u[i][1] * u[1][1] * d[1] + u[i][2] * u[1][2] * d[2];
    }
    out[(0, 0)] = u[0][0] * u[0][0] * d[0] + u[0][1] * u[0][1] * d[1] + u[0][2] * u[0][2] * d[2];
    out
}
