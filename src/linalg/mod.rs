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

//! Small fixed-size symmetric matrices and the kernels shared by the transport and update engines.

use crate::lanes::{Lane, Mask};
use nalgebra::{SMatrix, SVector};
use std::ops::{Index, IndexMut};

mod inverse;
mod jacobian;

pub use inverse::invert_sym3;
pub use jacobian::FieldJacobian;

/// Symmetric 3x3 matrix, 6 packed terms.
pub type Sym3<T> = SymMatrix<T, 3, 6>;
/// Symmetric 7x7 matrix (position, momentum and energy), 28 packed terms.
pub type Sym7<T> = SymMatrix<T, 7, 28>;
/// Symmetric 8x8 covariance of a particle state, 36 packed terms.
pub type Covariance<T> = SymMatrix<T, 8, 36>;

/// A symmetric `N x N` matrix stored as its packed lower triangle.
///
/// Element `(i, j)` with `j <= i` lives at `i * (i + 1) / 2 + j`. Both triangles can be indexed;
/// `(i, j)` and `(j, i)` refer to the same storage slot. `L` must equal `N * (N + 1) / 2`, which is
/// checked when the matrix is built.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SymMatrix<T, const N: usize, const L: usize> {
    data: [T; L],
}

/// Packed storage slot of element `(i, j)`.
#[inline(always)]
pub const fn packed_index(i: usize, j: usize) -> usize {
    if j <= i {
        i * (i + 1) / 2 + j
    } else {
        j * (j + 1) / 2 + i
    }
}

impl<T: Lane, const N: usize, const L: usize> SymMatrix<T, N, L> {
    const PACKED_LEN: () = assert!(L == N * (N + 1) / 2, "packed length must be N(N+1)/2");

    /// Builds the matrix from its packed lower triangle.
    pub fn from_packed(data: [T; L]) -> Self {
        let () = Self::PACKED_LEN;
        Self { data }
    }

    pub fn zeros() -> Self {
        Self::from_packed([T::zero(); L])
    }

    pub fn identity() -> Self {
        let mut me = Self::zeros();
        for i in 0..N {
            me[(i, i)] = T::one();
        }
        me
    }

    pub fn from_diagonal(diag: &SVector<T, N>) -> Self {
        let mut me = Self::zeros();
        for i in 0..N {
            me[(i, i)] = diag[i];
        }
        me
    }

    /// Builds the matrix from the lower triangle of a dense matrix.
    pub fn from_lower(dense: &SMatrix<T, N, N>) -> Self {
        let mut me = Self::zeros();
        for i in 0..N {
            for j in 0..=i {
                me[(i, j)] = dense[(i, j)];
            }
        }
        me
    }

    /// Packed lower triangle, in storage order.
    pub fn packed(&self) -> &[T; L] {
        &self.data
    }

    pub fn packed_mut(&mut self) -> &mut [T; L] {
        &mut self.data
    }

    pub fn diagonal(&self) -> SVector<T, N> {
        SVector::<T, N>::from_fn(|i, _| self[(i, i)])
    }

    pub fn to_dense(&self) -> SMatrix<T, N, N> {
        SMatrix::<T, N, N>::from_fn(|i, j| self[(i, j)])
    }

    /// Returns `Q * S * Q^T` for a dense square `Q`.
    pub fn congruence(&self, q: &SMatrix<T, N, N>) -> Self {
        let qs = q * self.to_dense();
        let mut out = Self::zeros();
        for i in 0..N {
            for j in 0..=i {
                let mut acc = T::zero();
                for k in 0..N {
                    acc += qs[(i, k)] * q[(j, k)];
                }
                out[(i, j)] = acc;
            }
        }
        out
    }

    /// Quadratic form `v^T * S * v`.
    pub fn quadratic_form(&self, v: &SVector<T, N>) -> T {
        let mut acc = T::zero();
        for i in 0..N {
            acc += self[(i, i)] * v[i] * v[i];
            for j in 0..i {
                acc += T::splat(2.0) * self[(i, j)] * v[i] * v[j];
            }
        }
        acc
    }

    /// `S * v`
    pub fn mul_vector(&self, v: &SVector<T, N>) -> SVector<T, N> {
        SVector::<T, N>::from_fn(|i, _| {
            let mut acc = T::zero();
            for k in 0..N {
                acc += self[(i, k)] * v[k];
            }
            acc
        })
    }

    /// Extracts the `M x M` diagonal block starting at `(start, start)`.
    pub fn block<const M: usize, const LM: usize>(&self, start: usize) -> SymMatrix<T, M, LM> {
        let mut out = SymMatrix::<T, M, LM>::zeros();
        for i in 0..M {
            for j in 0..=i {
                out[(i, j)] = self[(start + i, start + j)];
            }
        }
        out
    }

    /// Overwrites the `M x M` diagonal block starting at `(start, start)`.
    pub fn set_block<const M: usize, const LM: usize>(
        &mut self,
        start: usize,
        block: &SymMatrix<T, M, LM>,
    ) {
        for i in 0..M {
            for j in 0..=i {
                self[(start + i, start + j)] = block[(i, j)];
            }
        }
    }

    /// Lane-wise merge of two matrices.
    pub fn select(mask: Mask<T>, if_true: &Self, if_false: &Self) -> Self {
        let mut out = *if_false;
        for (o, t) in out.data.iter_mut().zip(if_true.data.iter()) {
            *o = t.select(mask, *o);
        }
        out
    }

    /// Zeroes row and column `k`.
    pub fn clear_row(&mut self, k: usize) {
        for j in 0..N {
            self[(k, j)] = T::zero();
        }
    }
}

impl<T: Lane, const N: usize, const L: usize> Default for SymMatrix<T, N, L> {
    fn default() -> Self {
        Self::zeros()
    }
}

impl<T, const N: usize, const L: usize> Index<(usize, usize)> for SymMatrix<T, N, L> {
    type Output = T;

    #[inline(always)]
    fn index(&self, (i, j): (usize, usize)) -> &T {
        &self.data[packed_index(i, j)]
    }
}

impl<T, const N: usize, const L: usize> IndexMut<(usize, usize)> for SymMatrix<T, N, L> {
    #[inline(always)]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        &mut self.data[packed_index(i, j)]
    }
}

impl<T: Lane, const N: usize, const L: usize> std::ops::Add for SymMatrix<T, N, L> {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        for (a, b) in self.data.iter_mut().zip(rhs.data.iter()) {
            *a += *b;
        }
        self
    }
}

impl<T: Lane, const N: usize, const L: usize> std::ops::Sub for SymMatrix<T, N, L> {
    type Output = Self;

    fn sub(mut self, rhs: Self) -> Self {
        for (a, b) in self.data.iter_mut().zip(rhs.data.iter()) {
            *a -= *b;
        }
        self
    }
}
