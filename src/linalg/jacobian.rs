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

use super::Covariance;
use crate::lanes::Lane;
use nalgebra::{SMatrix, SVector};

/// Reduced Jacobian of the varying field transport.
///
/// Only 11 terms are free, the remaining structure of the 8x8 Jacobian is fixed:
///
/// ```text
/// | 1 0 0  j0   j1  j2  0 0 |
/// | 0 1 0  j3   j4  j5  0 0 |
/// | 0 0 1 -j2  -j1  j0  0 0 |
/// | 0 0 0  j6   j7  j8  0 0 |
/// | 0 0 0  j9   1   j10 0 0 |
/// | 0 0 0 -j8  -j7  j6  0 0 |
/// | 0 0 0  0    0   0   1 0 |
/// | 0 0 0  0    0   0   0 1 |
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FieldJacobian<T: Lane>(pub [T; 11]);

impl<T: Lane> FieldJacobian<T> {
    /// Non-zero `(column, value)` pairs of every row, padded with zero weights.
    fn sparse_rows(&self) -> [[(usize, T); 4]; 8] {
        let j = &self.0;
        let one = T::one();
        let nil = (0, T::zero());
        [
            [(0, one), (3, j[0]), (4, j[1]), (5, j[2])],
            [(1, one), (3, j[3]), (4, j[4]), (5, j[5])],
            [(2, one), (3, -j[2]), (4, -j[1]), (5, j[0])],
            [(3, j[6]), (4, j[7]), (5, j[8]), nil],
            [(3, j[9]), (4, one), (5, j[10]), nil],
            [(3, -j[8]), (4, -j[7]), (5, j[6]), nil],
            [(6, one), nil, nil, nil],
            [(7, one), nil, nil, nil],
        ]
    }

    pub fn to_dense(&self) -> SMatrix<T, 8, 8> {
        let mut dense = SMatrix::<T, 8, 8>::zeros();
        for (i, row) in self.sparse_rows().iter().enumerate() {
            for &(k, w) in row {
                dense[(i, k)] += w;
            }
        }
        dense
    }

    /// Applies the Jacobian to a state vector.
    pub fn apply(&self, p: &SVector<T, 8>) -> SVector<T, 8> {
        let rows = self.sparse_rows();
        SVector::<T, 8>::from_fn(|i, _| {
            let mut acc = T::zero();
            for &(k, w) in &rows[i] {
                acc += w * p[k];
            }
            acc
        })
    }

    /// Returns `J * C * J^T` without multiplying out the known zero blocks.
    pub fn congruence(&self, c: &Covariance<T>) -> Covariance<T> {
        let rows = self.sparse_rows();
        let mut cjt = [[T::zero(); 8]; 8];
        for (k, cjt_k) in cjt.iter_mut().enumerate() {
            for (j, row) in rows.iter().enumerate() {
                for &(b, w) in row {
                    cjt_k[j] += c[(k, b)] * w;
                }
            }
        }
        let mut out = Covariance::zeros();
        for i in 0..8 {
            for j in 0..=i {
                let mut acc = T::zero();
                for &(k, w) in &rows[i] {
                    acc += w * cjt[k][j];
                }
                out[(i, j)] = acc;
            }
        }
        out
    }
}
