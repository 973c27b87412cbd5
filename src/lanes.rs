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

//! Lane arithmetic shared by every kernel of the engine.
//!
//! All algorithms are written once over a `T: Lane`. A lane value is either a single `f32`
//! (one particle) or a `WideF32x4` (four independent particles processed in lock-step).
//! Conditionals never branch on lane contents: they build a [`Mask`] and merge with [`select`].

use nalgebra::SVector;
pub use simba::simd::WideF32x4;
use simba::simd::{SimdBool, SimdRealField, SimdValue};
use std::fmt::Debug;

/// Boolean lane mask matching the lane type `T`.
pub type Mask<T> = <T as SimdValue>::SimdBool;

/// A single precision value carried by one or more independent lanes.
pub trait Lane: SimdRealField<Element = f32> + Copy + Send + Sync + 'static {
    /// Number of particles carried by one value.
    const WIDTH: usize;
    /// Per lane particle identifier.
    type Id: Copy + Debug + PartialEq + Default + Send + Sync + 'static;

    /// Returns the identifier stored in `lane`.
    fn id_lane(id: &Self::Id, lane: usize) -> i32;
    /// Stores `value` as the identifier of `lane`.
    fn set_id_lane(id: &mut Self::Id, lane: usize, value: i32);
}

impl Lane for f32 {
    const WIDTH: usize = 1;
    type Id = i32;

    fn id_lane(id: &i32, _lane: usize) -> i32 {
        *id
    }

    fn set_id_lane(id: &mut i32, _lane: usize, value: i32) {
        *id = value;
    }
}

impl Lane for WideF32x4 {
    const WIDTH: usize = 4;
    type Id = [i32; 4];

    fn id_lane(id: &[i32; 4], lane: usize) -> i32 {
        id[lane]
    }

    fn set_id_lane(id: &mut [i32; 4], lane: usize, value: i32) {
        id[lane] = value;
    }
}

/// Broadcasts a constant to every lane.
#[inline(always)]
pub fn splat<T: Lane>(value: f32) -> T {
    T::splat(value)
}

/// Lane-wise `if mask { if_true } else { if_false }`.
#[inline(always)]
pub fn select<T: Lane>(mask: Mask<T>, if_true: T, if_false: T) -> T {
    if_true.select(mask, if_false)
}

/// Lane-wise select on a whole vector.
#[inline]
pub fn select_vector<T: Lane, const D: usize>(
    mask: Mask<T>,
    if_true: &SVector<T, D>,
    if_false: &SVector<T, D>,
) -> SVector<T, D> {
    if_true.zip_map(if_false, |a, b| a.select(mask, b))
}

/// A mask with every lane set.
#[inline(always)]
pub fn all_lanes<T: Lane>() -> Mask<T> {
    T::zero().simd_eq(T::zero())
}

/// A mask with no lane set.
#[inline(always)]
pub fn no_lanes<T: Lane>() -> Mask<T> {
    !all_lanes::<T>()
}

#[inline(always)]
pub fn sqrt<T: Lane>(x: T) -> T {
    x.simd_sqrt()
}

#[inline(always)]
pub fn abs<T: Lane>(x: T) -> T {
    x.simd_abs()
}

#[inline(always)]
pub fn max<T: Lane>(a: T, b: T) -> T {
    a.simd_max(b)
}

#[inline(always)]
pub fn min<T: Lane>(a: T, b: T) -> T {
    a.simd_min(b)
}

/// Four quadrant arctangent of `y / x`.
#[inline(always)]
pub fn atan2<T: Lane>(y: T, x: T) -> T {
    y.simd_atan2(x)
}

/// Returns `true` when at least one lane of the mask is set.
#[inline(always)]
pub fn any<B: SimdBool>(mask: B) -> bool {
    mask.any()
}

/// Returns `true` when every lane of the mask is set.
#[inline(always)]
pub fn all<B: SimdBool>(mask: B) -> bool {
    mask.all()
}

/// Builds a lane value from per-particle scalars. Missing lanes repeat the first value.
pub fn gather<T: Lane>(values: &[f32]) -> T {
    let mut out = T::splat(values.first().copied().unwrap_or_default());
    for (lane, value) in values.iter().enumerate().take(T::WIDTH).skip(1) {
        out.replace(lane, *value);
    }
    out
}

/// Reads back every lane of a value.
pub fn scatter<T: Lane>(value: T) -> Vec<f32> {
    (0..T::WIDTH).map(|lane| value.extract(lane)).collect()
}
