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

use super::pion_pair;
use approx::assert_abs_diff_eq;
use kfparticle::prelude::*;
use nalgebra::{SVector, Vector3};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use rstest::*;

const KAON_MASS: f32 = 0.497_6;

#[fixture]
fn kaon() -> Particle<f32> {
    let (pi_plus, pi_minus) = pion_pair();
    let mut kaon = Particle::<f32>::new();
    kaon.construct(&StraightLine, &[&pi_plus, &pi_minus], None, None, false, false)
        .unwrap();
    kaon
}

#[test]
fn projection_on_the_mass_shell() {
    let mut p = Particle::<f32>::new();
    p.params = SVector::<f32, 8>::from_column_slice(&[0.0, 0.0, 0.0, 0.3, 0.1, 0.2, 0.8, 0.0]);
    p.covar = Covariance::from_diagonal(&SVector::repeat(1e-3));
    p.ndf = 1.0;
    p.set_nonlinear_mass_constraint(0.5);

    let m2 = p.energy() * p.energy() - p.momentum().norm_squared();
    assert_abs_diff_eq!(m2 / 0.25, 1.0, epsilon = 1e-5);
    assert_eq!(p.ndf, 2.0);
    assert_eq!(p.mass_hypothesis, 0.5);
    // the direction of flight is kept
    let dir = p.momentum().normalize();
    assert_abs_diff_eq!(dir.x / dir.y, 3.0, epsilon = 1e-5);
}

#[fixture]
fn rng() -> Pcg64Mcg {
    Pcg64Mcg::seed_from_u64(0x5ca1ab1e)
}

/// Random states on either side of the mass shell, some with `E < |p|`, all with `E > 0`.
#[rstest]
fn random_states_land_on_the_mass_shell(mut rng: Pcg64Mcg) {
    let mut below_momentum = 0;
    for _ in 0..500 {
        let momentum = Vector3::<f32>::from_fn(|_, _| rng.gen_range(-1.5..1.5));
        let mass: f32 = rng.gen_range(0.2..1.5);
        let energy = (momentum.norm_squared() + mass * mass).sqrt() * rng.gen_range(0.5..1.5);
        if energy < momentum.norm() {
            below_momentum += 1;
        }

        let mut p = Particle::<f32>::new();
        p.params = SVector::<f32, 8>::from_column_slice(&[
            0.0, 0.0, 0.0, momentum.x, momentum.y, momentum.z, energy, 0.0,
        ]);
        p.covar = Covariance::from_diagonal(&SVector::repeat(1e-3));
        p.set_nonlinear_mass_constraint(mass);

        // single precision lanes reach the shell to a few 1e-5
        let m2 = p.energy() * p.energy() - p.momentum().norm_squared();
        assert_abs_diff_eq!(m2 / (mass * mass), 1.0, epsilon = 2e-4);
        assert!(p.energy() > 0.0);
        assert_abs_diff_eq!(p.momentum().normalize(), momentum.normalize(), epsilon = 1e-4);
    }
    assert!(below_momentum > 0);
}

#[rstest]
fn nonlinear_constraint_on_a_candidate(mut kaon: Particle<f32>) {
    assert!(kaon.mass().value > KAON_MASS + 0.1);
    kaon.set_nonlinear_mass_constraint(KAON_MASS);
    let mass = kaon.mass();
    assert_abs_diff_eq!(mass.value, KAON_MASS, epsilon = 1e-4);
    assert!(!mass.problem);
}

#[rstest]
#[case::hard(0.0)]
#[case::soft(0.01)]
fn linear_constraint_pulls_toward_the_mass(mut kaon: Particle<f32>, #[case] sigma: f32) {
    let before = kaon.mass().value;
    let ndf = kaon.ndf;
    kaon.set_mass_constraint(KAON_MASS, sigma);

    assert!((kaon.mass().value - KAON_MASS).abs() < (before - KAON_MASS).abs());
    assert!(kaon.chi2 > 0.0);
    assert_eq!(kaon.ndf, ndf + 1.0);
    assert_eq!(kaon.sum_daughter_mass, KAON_MASS);
}

#[test]
fn construct_with_a_mass_hypothesis() {
    let (pi_plus, pi_minus) = pion_pair();
    let mut kaon = Particle::<f32>::new();
    kaon.construct(
        &StraightLine,
        &[&pi_plus, &pi_minus],
        None,
        Some(KAON_MASS),
        false,
        false,
    )
    .unwrap();
    assert_eq!(kaon.mass_hypothesis, KAON_MASS);
    assert_eq!(kaon.ndf, 2.0);
}
