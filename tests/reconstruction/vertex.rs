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

use crate::{track, PION_MASS};
use approx::assert_abs_diff_eq;
use kfparticle::prelude::*;
use nalgebra::{SVector, Vector3};
use rstest::*;

#[fixture]
fn primary() -> Particle<f32> {
    let cov = Sym3::from_diagonal(&Vector3::repeat(0.01));
    Particle::from_vertex(&Vector3::zeros(), &cov, 0.0, 10.0)
}

/// A kaon flying 2 cm along z before decaying into two pions.
#[fixture]
fn displaced_kaon() -> Particle<f32> {
    let decay = [0.0, 0.0, 2.0];
    let pi_plus = track(decay, [0.3, 0.0, 0.1], 1.0, PION_MASS);
    let pi_minus = track(decay, [-0.3, 0.0, 0.1], -1.0, PION_MASS);
    let mut kaon = Particle::<f32>::new();
    kaon.construct(&StraightLine, &[&pi_plus, &pi_minus], None, None, false, false)
        .unwrap();
    kaon
}

#[rstest]
fn primary_vertex_degrees_of_freedom(primary: Particle<f32>) {
    assert_eq!(primary.ndf, 17.0);
    assert_eq!(primary.momentum(), Vector3::zeros());
    assert_eq!(primary.charge, 0.0);
}

#[rstest]
fn production_vertex_gives_the_decay_length(
    primary: Particle<f32>,
    mut displaced_kaon: Particle<f32>,
) {
    assert_abs_diff_eq!(displaced_kaon.position(), Vector3::new(0.0, 0.0, 2.0), epsilon = 1e-4);
    displaced_kaon.set_production_vertex(&StraightLine, &primary);

    assert_eq!(displaced_kaon.ndf, 3.0);
    assert!(!displaced_kaon.at_production_vertex);
    // back at the decay point
    assert_abs_diff_eq!(displaced_kaon.position(), Vector3::new(0.0, 0.0, 2.0), epsilon = 1e-4);
    let length = displaced_kaon.decay_length();
    assert_abs_diff_eq!(length.value, 2.0, epsilon = 1e-3);
    assert!(length.error > 0.0);
    assert!(!length.problem);
    assert!(displaced_kaon.life_time().value > 0.0);
}

#[rstest]
fn resonances_have_no_decay_length(primary: Particle<f32>, mut displaced_kaon: Particle<f32>) {
    displaced_kaon.set_production_vertex(&StraightLine, &primary);
    let (chi2, ndf) = (displaced_kaon.chi2, displaced_kaon.ndf);

    displaced_kaon.set_no_decay_length(&StraightLine);
    assert_eq!(displaced_kaon.s(), 0.0);
    assert_eq!(displaced_kaon.covar[(7, 7)], 0.0);
    assert_eq!(displaced_kaon.ndf, ndf + 1.0);
    // a 2 cm flight is far from a prompt decay
    assert!(displaced_kaon.chi2 > chi2 + 9.0);
}

#[rstest]
fn impact_parameters(primary: Particle<f32>) {
    let pion = track([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], 1.0, PION_MASS);
    let origin = Vector3::zeros();

    assert_abs_diff_eq!(pion.distance_from_vertex(&StraightLine, &origin), 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(
        pion.deviation_from_vertex(&StraightLine, &origin, None),
        10.0,
        epsilon = 1e-3
    );

    let ip = pion.distance_from_vertex_xy(&StraightLine, &origin, None);
    assert_abs_diff_eq!(ip.value, 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(ip.error, 0.1, epsilon = 1e-5);
    assert!(!ip.problem);

    let cov = primary.position_covar();
    let ip = pion.distance_from_vertex_xy(&StraightLine, &origin, Some(&cov));
    assert_abs_diff_eq!(ip.error, 0.02_f32.sqrt(), epsilon = 1e-5);
    assert_abs_diff_eq!(
        pion.deviation_from_vertex_xy(&StraightLine, &origin, Some(&cov)),
        1.0 / 0.02_f32.sqrt(),
        epsilon = 1e-3
    );

    // the pion flies away from the vertex, more than three errors away
    let (l, dl, from_vertex) = pion.distance_to_vertex_line(&primary);
    assert_abs_diff_eq!(l, 1.0, epsilon = 1e-6);
    assert!(dl < 0.2);
    assert!(!from_vertex);
}

#[test]
fn slices_are_validated() {
    let params = SVector::<f32, 6>::from_column_slice(&[0.0, 0.0, 0.0, 0.3, 0.0, 0.1]);
    let cov = TrackCovariance::<f32>::identity();
    assert!(Particle::from_slices(params.as_slice(), cov.packed(), 1.0, PION_MASS).is_ok());
    assert!(matches!(
        Particle::from_slices(params.as_slice(), &cov.packed()[..20], 1.0, PION_MASS),
        Err(ParticleError::InvalidInput { .. })
    ));
}
