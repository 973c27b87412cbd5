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
use nalgebra::{Vector3, Vector4};
use rstest::*;

fn four_momentum(p: &Particle<f32>) -> Vector4<f32> {
    Vector4::new(p.px(), p.py(), p.pz(), p.energy())
}

#[test]
fn two_pion_decay() {
    let _ = pretty_env_logger::try_init();
    let (pi_plus, pi_minus) = pion_pair();

    let mut mother = Particle::<f32>::new();
    mother.set_vtx_guess(Vector3::zeros());
    mother.add_daughter(&StraightLine, &pi_plus, false);
    assert_eq!(mother.ndf, -1.0);
    assert_eq!(mother.charge, 1.0);

    mother.add_daughter(&StraightLine, &pi_minus, false);
    assert_eq!(mother.ndf, 1.0);
    assert_eq!(mother.charge, 0.0);
    assert_eq!(mother.daughter_ids, vec![1, 2]);
    assert_abs_diff_eq!(mother.momentum(), Vector3::new(0.0, 0.0, 0.2), epsilon = 1e-6);
    assert_abs_diff_eq!(
        mother.energy(),
        pi_plus.energy() + pi_minus.energy(),
        epsilon = 1e-6
    );
    assert_abs_diff_eq!(mother.position(), Vector3::zeros(), epsilon = 1e-6);
    // both tracks cross exactly at the vertex
    assert_abs_diff_eq!(mother.chi2, 0.0, epsilon = 1e-6);
    // invariant mass of the pair, with |p1 + p2|^2 = 0.04
    let mass = mother.mass();
    let energy = pi_plus.energy() + pi_minus.energy();
    assert!(!mass.problem);
    assert!(mass.error > 0.0);
    assert_abs_diff_eq!(mass.value, (energy * energy - 0.04).sqrt(), epsilon = mass.error);
    assert!(mother.position_covar()[(0, 0)] < pi_plus.covar[(0, 0)]);
}

#[rstest]
#[case::energy_fit(ConstructMethod::EnergyFit)]
#[case::energy_calculated(ConstructMethod::EnergyCalculated)]
#[case::mass_constrained(ConstructMethod::EnergyFitWithMassConstraint)]
fn construct_from_daughters(#[case] method: ConstructMethod) {
    let (pi_plus, pi_minus) = pion_pair();
    let mut mother = Particle::<f32>::new().with_method(method);
    mother
        .construct(&StraightLine, &[&pi_plus, &pi_minus], None, None, false, false)
        .unwrap();

    assert_eq!(mother.ndf, 1.0);
    assert_eq!(mother.charge, 0.0);
    assert!(!mother.is_linearized);
    assert_abs_diff_eq!(
        four_momentum(&mother),
        four_momentum(&pi_plus) + four_momentum(&pi_minus),
        epsilon = 1e-4
    );
    assert_abs_diff_eq!(mother.sum_daughter_mass, 2.0 * 0.139_57, epsilon = 1e-6);
}

#[test]
fn construct_requires_daughters() {
    let mut mother = Particle::<f32>::new();
    assert!(matches!(
        mother.construct(&StraightLine, &[], None, None, false, false),
        Err(ParticleError::NoDaughters)
    ));
}

#[rstest]
#[case::line(AnyPropagator::Line(StraightLine))]
#[case::homogeneous(AnyPropagator::Homogeneous(HomogeneousField::new(5.0)))]
fn subtracting_a_daughter_restores_the_mother(#[case] prop: AnyPropagator) {
    let (pi_plus, pi_minus) = pion_pair();
    let mut mother = Particle::<f32>::new();
    mother.set_vtx_guess(Vector3::zeros());
    mother.add_daughter(&prop, &pi_plus, false);
    let before = mother.clone();

    mother.add_daughter(&prop, &pi_minus, false);
    pi_minus.subtract_from_particle(&prop, &mut mother);

    assert_eq!(mother.ndf, before.ndf);
    assert_eq!(mother.charge, before.charge);
    assert_abs_diff_eq!(four_momentum(&mother), four_momentum(&before), epsilon = 1e-4);
    assert_abs_diff_eq!(mother.position(), before.position(), epsilon = 1e-4);
}

#[test]
fn subtracting_a_track_from_a_vertex() {
    let (pi_plus, pi_minus) = pion_pair();
    let mut vertex = Particle::<f32>::new();
    vertex.set_vtx_guess(Vector3::zeros());
    vertex.add_daughter(&StraightLine, &pi_plus, false);
    vertex.add_daughter(&StraightLine, &pi_minus, false);
    let fitted = vertex.clone();

    pi_minus.subtract_from_vertex(&StraightLine, &mut vertex);
    assert_eq!(vertex.ndf, fitted.ndf - 2.0);
    // the vertex loses precision without the track
    assert!(vertex.covar[(0, 0)] > fitted.covar[(0, 0)]);
    assert_abs_diff_eq!(vertex.position(), Vector3::zeros(), epsilon = 1e-4);
    // momenta are not touched
    assert_eq!(vertex.momentum(), fitted.momentum());
}
