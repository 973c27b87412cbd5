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

//! Helix propagation in a field of constant magnitude along one axis.

use super::line::{ds_to_particle_line, ds_to_point_line};
use super::{clamp_path, Propagator};
use crate::field::{FieldProvider, K_CLIGHT};
use crate::lanes::{abs, all, atan2, max, select, splat, sqrt, Lane, Mask};
use crate::linalg::Covariance;
use crate::particle::Particle;
use nalgebra::{SMatrix, SVector, Vector3};
use serde_derive::{Deserialize, Serialize};

const TWO_PI: f32 = std::f32::consts::TAU;

/// A homogeneous field along z.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HomogeneousField {
    /// Field magnitude in kG
    pub bz: f32,
}

impl HomogeneousField {
    pub fn new(bz: f32) -> Self {
        Self { bz }
    }
}

impl FieldProvider for HomogeneousField {
    fn field_at<T: Lane>(&self, _position: &Vector3<T>) -> Vector3<T> {
        Vector3::new(T::zero(), T::zero(), splat(self.bz))
    }
}

impl Propagator for HomogeneousField {
    fn transport<T: Lane>(&self, particle: &Particle<T>, ds: T) -> (SVector<T, 8>, Covariance<T>) {
        transport_bz(
            splat(self.bz),
            particle.charge,
            &particle.params,
            &particle.covar,
            ds,
        )
    }

    fn ds_to_point<T: Lane>(&self, particle: &Particle<T>, xyz: &Vector3<T>) -> T {
        clamp_path(ds_to_point_bz(
            splat(self.bz),
            particle.charge,
            &particle.params,
            xyz,
        ))
    }

    fn ds_to_particle<T: Lane>(&self, first: &Particle<T>, second: &Particle<T>) -> (T, T) {
        let (ds1, ds2) = ds_to_particle_bz(
            splat(self.bz),
            first.charge,
            &first.params,
            second.charge,
            &second.params,
        );
        (clamp_path(ds1), clamp_path(ds2))
    }
}

/// Rotation and bending coefficients of a helix step.
struct HelixStep<T> {
    sin: T,
    cos: T,
    /// `sin(bq ds) / bq`
    sb: T,
    /// `(1 - cos(bq ds)) / bq`
    cb: T,
}

impl<T: Lane> HelixStep<T> {
    /// Below `small` the bending angle is expanded to second order, which also covers `bq = 0`.
    fn new(bq: T, ds: T, small: f32) -> Self {
        let bs = bq * ds;
        let sin = bs.simd_sin();
        let cos = bs.simd_cos();
        let bent = abs(bs).simd_gt(splat(small));
        let safe_bq = select(bent, bq, T::one());
        let k = splat::<T>(1.0 / 6.0_f32.sqrt());
        let sb_series = (T::one() - bs * k) * (T::one() + bs * k) * ds;
        Self {
            sin,
            cos,
            sb: select(bent, sin / safe_bq, sb_series),
            cb: select(bent, (T::one() - cos) / safe_bq, splat::<T>(0.5) * sb_series * bs),
        }
    }

    /// Position reached from `(x, y)` with momentum `(px, py)`.
    fn position(&self, x: T, y: T, px: T, py: T) -> (T, T) {
        (
            x + self.sb * px + self.cb * py,
            y - self.cb * px + self.sb * py,
        )
    }

    /// Rotated transverse momentum.
    fn momentum(&self, px: T, py: T) -> (T, T) {
        (self.cos * px + self.sin * py, -self.sin * px + self.cos * py)
    }
}

/// Maps a state in a field along y onto the frame where the field is along z.
fn rotate_y_to_z<T: Lane>(params: &SVector<T, 8>) -> SVector<T, 8> {
    let mut out = *params;
    out[1] = -params[2];
    out[2] = params[1];
    out[4] = -params[5];
    out[5] = params[4];
    out
}

/// Transports the state by `ds` in a homogeneous field `bz` (kG) along z.
pub fn transport_bz<T: Lane>(
    bz: T,
    charge: T,
    params: &SVector<T, 8>,
    covar: &Covariance<T>,
    ds: T,
) -> (SVector<T, 8>, Covariance<T>) {
    let bq = bz * charge * splat(K_CLIGHT);
    let step = HelixStep::new(bq, ds, 1e-10);
    let (px, py, pz) = (params[3], params[4], params[5]);

    let mut out = *params;
    let (x, y) = step.position(params[0], params[1], px, py);
    let (qx, qy) = step.momentum(px, py);
    out[0] = x;
    out[1] = y;
    out[2] = params[2] + ds * pz;
    out[3] = qx;
    out[4] = qy;

    let mut jac = SMatrix::<T, 8, 8>::identity();
    jac[(0, 3)] = step.sb;
    jac[(0, 4)] = step.cb;
    jac[(1, 3)] = -step.cb;
    jac[(1, 4)] = step.sb;
    jac[(2, 5)] = ds;
    jac[(3, 3)] = step.cos;
    jac[(3, 4)] = step.sin;
    jac[(4, 3)] = -step.sin;
    jac[(4, 4)] = step.cos;

    (out, covar.congruence(&jac))
}

/// Path length parameter to the point of the helix closest to `xyz`, field along z.
///
/// Solved in the transverse plane, then corrected for the longitudinal offset and refined with one
/// Newton step from the transported point.
pub fn ds_to_point_bz<T: Lane>(bz: T, charge: T, params: &SVector<T, 8>, xyz: &Vector3<T>) -> T {
    const SMALL: f32 = 1e-8;
    let bq = bz * charge * splat(K_CLIGHT);
    let (px, py, pz) = (params[3], params[4], params[5]);
    let pt2 = px * px + py * py;
    let p2 = pt2 + pz * pz;

    let straight = abs(bq).simd_lt(splat(SMALL));
    let line_ds = ds_to_point_line(params, xyz);
    if all(straight) {
        return line_ds;
    }
    let bq = select(straight, splat(SMALL), bq);

    let dx = xyz[0] - params[0];
    let dy = xyz[1] - params[1];
    let dz = xyz[2] - params[2];
    let a = dx * px + dy * py;
    let mut ds = atan2(bq * a, pt2 + bq * (dy * px - dx * py)) / bq;

    // longitudinal correction
    let bs = bq * ds;
    let (s, c) = (bs.simd_sin(), bs.simd_cos());
    let b_coeff = dx * py - dy * px - pt2 / bq;
    let has_pz = abs(pz).simd_gt(splat(1e-4));
    let sz = select(has_pz, dz / select(has_pz, pz, T::one()), T::zero());
    let c_coeff = sz * (bq * (b_coeff * c - a * s) - pz * pz);
    let has_c = abs(c_coeff).simd_gt(splat(1e-8));
    let kz = select(
        has_c,
        (ds * pz - dz) * pz / select(has_c, c_coeff, T::one()),
        T::zero(),
    );
    ds += sz * kz;

    let step = HelixStep::new(bq, ds, SMALL);
    let (x, y) = step.position(params[0], params[1], px, py);
    let (qx, qy) = step.momentum(px, py);
    let dx = xyz[0] - x;
    let dy = xyz[1] - y;
    let dz = xyz[2] - (params[2] + ds * pz);
    let a = dx * qx + dy * qy + dz * pz;
    ds += atan2(bq * a, p2 + bq * (dy * qx - dx * qy)) / bq;

    select(straight, line_ds, ds)
}

/// [`ds_to_point_bz`] for a field `by` along y.
pub fn ds_to_point_by<T: Lane>(by: T, charge: T, params: &SVector<T, 8>, xyz: &Vector3<T>) -> T {
    let point = Vector3::new(xyz[0], -xyz[2], xyz[1]);
    ds_to_point_bz(by, charge, &rotate_y_to_z(params), &point)
}

/// Path length parameters of two helices to their points of closest approach, field along z.
///
/// Both transverse solutions are evaluated and the pair closest in space is kept. The helix turns
/// are then matched in z and a final longitudinal correction applied. Lanes where both particles
/// are neutral fall back to the straight line solution.
pub fn ds_to_particle_bz<T: Lane>(
    bz: T,
    charge1: T,
    params1: &SVector<T, 8>,
    charge2: T,
    params2: &SVector<T, 8>,
) -> (T, T) {
    const SMALL: f32 = 1e-8;
    let kc = splat::<T>(K_CLIGHT);
    let bq1 = bz * charge1 * kc;
    let bq2 = bz * charge2 * kc;
    let straight1 = abs(bq1).simd_lt(splat(SMALL));
    let straight2 = abs(bq2).simd_lt(splat(SMALL));
    let both_straight = straight1 & straight2;

    let (line1, line2) = ds_to_particle_line(params1, params2);
    if all(both_straight) {
        return (line1, line2);
    }
    let safe_bq1 = select(straight1, T::one(), bq1);
    let safe_bq2 = select(straight2, T::one(), bq2);

    let (px1, py1, pz1) = (params1[3], params1[4], params1[5]);
    let (px2, py2, pz2) = (params2[3], params2[4], params2[5]);
    let pt12 = px1 * px1 + py1 * py1;
    let pt22 = px2 * px2 + py2 * py2;
    let (x01, y01, z01) = (params1[0], params1[1], params1[2]);
    let (x02, y02, z02) = (params2[0], params2[1], params2[2]);

    let dx0 = x01 - x02;
    let dy0 = y01 - y02;
    let dr02 = dx0 * dx0 + dy0 * dy0;
    let drp1 = dx0 * px1 + dy0 * py1;
    let dxyp1 = dx0 * py1 - dy0 * px1;
    let drp2 = dx0 * px2 + dy0 * py2;
    let dxyp2 = dx0 * py2 - dy0 * px2;
    let p1p2 = px1 * px2 + py1 * py2;
    let dp1p2 = px1 * py2 - px2 * py1;

    let k11 = bq2 * drp1 - dp1p2;
    let k21 = bq1 * (bq2 * dxyp1 - p1p2) + bq2 * pt12;
    let k12 = bq1 * drp2 - dp1p2;
    let k22 = bq2 * (bq1 * dxyp2 + p1p2) - bq1 * pt22;

    let kp = dxyp1 * bq2 - dxyp2 * bq1 - p1p2;
    let kd = dr02 * splat(0.5) * bq1 * bq2 + kp;
    let c1 = -(bq1 * kd + pt12 * bq2);
    let c2 = bq2 * kd + pt22 * bq1;
    let d = sqrt(max(pt12 * pt22 - kd * kd, T::zero()));

    // both transverse roots of each particle
    let root = |sign: T, bq: T, safe_bq: T, straight: Mask<T>, pt2: T, k1: T, k2: T, cc: T| -> T {
        let curved = atan2(
            bq * k1 * cc + sign * k2 * d * bq,
            sign * bq * k1 * d * bq - k2 * cc,
        ) / safe_bq;
        let den = -k2 * cc;
        let ok = pt2.simd_gt(T::zero()) & den.simd_ne(T::zero());
        let flat = select(ok, (k1 * cc + sign * k2 * d) / select(ok, den, T::one()), T::zero());
        select(straight, flat, curved)
    };
    let plus = T::one();
    let minus = -T::one();
    let ds1 = [
        root(plus, bq1, safe_bq1, straight1, pt12, k11, k21, c1),
        root(minus, bq1, safe_bq1, straight1, pt12, k11, k21, c1),
    ];
    let ds2 = [
        root(plus, bq2, safe_bq2, straight2, pt22, k12, k22, c2),
        root(minus, bq2, safe_bq2, straight2, pt22, k12, k22, c2),
    ];

    let dr2 = |i: usize| -> T {
        let step1 = HelixStep::new(bq1, ds1[i], SMALL);
        let step2 = HelixStep::new(bq2, ds2[i], SMALL);
        let (x1, y1) = step1.position(x01, y01, px1, py1);
        let (x2, y2) = step2.position(x02, y02, px2, py2);
        let z1 = z01 + ds1[i] * pz1;
        let z2 = z02 + ds2[i] * pz2;
        let (dx, dy, dz) = (x1 - x2, y1 - y2, z1 - z2);
        dx * dx + dy * dy + dz * dz
    };
    let first_root = dr2(0).simd_lt(dr2(1));
    let mut ds = select(first_root, ds1[0], ds1[1]);
    let mut ds1 = select(first_root, ds2[0], ds2[1]);

    // match the helix turns in z
    let two_pi = splat::<T>(TWO_PI);
    let mut n1 = T::zero();
    let mut n2 = T::zero();
    let mut dz_min = abs((z01 - z02) + ds * pz1 - ds1 * pz2);
    let turns1_ok = !straight1 & abs(pz1).simd_gt(T::zero());
    let i1_float = select(
        turns1_ok,
        -bq1 / two_pi * (z01 / select(turns1_ok, pz1, T::one()) + ds),
        T::zero(),
    );
    let turns2_ok = !straight2 & abs(pz2).simd_gt(T::zero());
    for di1 in [-1.0_f32, 0.0, 1.0] {
        let i1 = select(straight1, T::zero(), i1_float.simd_trunc() + splat(di1));
        let wind1 = select(straight1, T::zero(), two_pi * i1 / safe_bq1);
        let i2_float = select(
            turns2_ok,
            (((z01 - z02) + (ds + wind1) * pz1) / select(turns2_ok, pz2, T::one()) - ds1) * bq2
                / two_pi,
            T::zero(),
        );
        for di2 in [-1.0_f32, 0.0, 1.0] {
            let i2 = select(straight2, T::zero(), i2_float.simd_trunc() + splat(di2));
            let wind2 = select(straight2, T::zero(), two_pi * i2 / safe_bq2);
            let z1 = z01 + (ds + wind1) * pz1;
            let z2 = z02 + (ds1 + wind2) * pz2;
            let dz = abs(z1 - z2);
            let better = dz.simd_lt(dz_min);
            n1 = select(better, i1, n1);
            n2 = select(better, i2, n2);
            dz_min = select(better, dz, dz_min);
        }
    }
    ds += select(straight1, T::zero(), n1 * two_pi / safe_bq1);
    ds1 += select(straight2, T::zero(), n2 * two_pi / safe_bq2);

    // longitudinal correction
    let bs1 = bq1 * ds;
    let bs2 = bq2 * ds1;
    let (s1, cs1) = (bs1.simd_sin(), bs1.simd_cos());
    let xr1 = s1 * px1 - cs1 * py1;
    let yr1 = cs1 * px1 + s1 * py1;
    let (s2, cs2) = (bs2.simd_sin(), bs2.simd_cos());
    let xr2 = s2 * px2 - cs2 * py2;
    let yr2 = cs2 * px2 + s2 * py2;

    let br = xr1 * xr2 + yr1 * yr2;
    let dx0mod = dx0 * bq1 * bq2 + py1 * bq2 - py2 * bq1;
    let dy0mod = dy0 * bq1 * bq2 - px1 * bq2 + px2 * bq1;
    let ar1 = dx0mod * xr1 + dy0mod * yr1;
    let ar2 = dx0mod * xr2 + dy0mod * yr2;
    let cz = (z01 - z02) + ds * pz1 - ds1 * pz2;

    let kz11 = -ar1 + bq1 * br + bq2 * pz1 * pz1;
    let kz12 = -bq2 * (br + pz1 * pz2);
    let kz21 = bq1 * (br - pz1 * pz2);
    let kz22 = ar2 - bq2 * br - bq1 * pz2 * pz2;

    let delta = kz11 * kz22 - kz12 * kz21;
    let solvable = abs(delta).simd_gt(splat(1e-16));
    let safe_delta = select(solvable, delta, T::one());
    let sz1 = select(
        solvable,
        -cz * (pz1 * bq2 * kz22 - pz2 * bq1 * kz12) / safe_delta,
        T::zero(),
    );
    let sz2 = select(
        solvable,
        -cz * (pz2 * bq1 * kz11 - pz1 * bq2 * kz21) / safe_delta,
        T::zero(),
    );
    ds += sz1;
    ds1 += sz2;

    (
        select(both_straight, line1, ds),
        select(both_straight, line2, ds1),
    )
}

/// [`ds_to_particle_bz`] for a field `by` along y.
pub fn ds_to_particle_by<T: Lane>(
    by: T,
    charge1: T,
    params1: &SVector<T, 8>,
    charge2: T,
    params2: &SVector<T, 8>,
) -> (T, T) {
    ds_to_particle_bz(
        by,
        charge1,
        &rotate_y_to_z(params1),
        charge2,
        &rotate_y_to_z(params2),
    )
}
