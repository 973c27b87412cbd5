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
use nalgebra::Vector3;
use rstest::*;

#[rstest]
#[case::line(AnyPropagator::Line(StraightLine))]
#[case::positive_field(AnyPropagator::Homogeneous(HomogeneousField::new(5.0)))]
#[case::negative_field(AnyPropagator::Homogeneous(HomogeneousField::new(-5.0)))]
fn crossing_tracks_meet_at_their_vertex(#[case] prop: AnyPropagator) {
    let vertex = [1.0, 2.0, 3.0];
    let mut positive = track(vertex, [0.4, 0.1, 0.3], 1.0, PION_MASS);
    let mut negative = track(vertex, [-0.2, 0.3, 0.2], -1.0, PION_MASS);
    positive.transport_to_ds(&prop, -2.0);
    negative.transport_to_ds(&prop, -3.0);

    let (ds1, ds2) = prop.ds_to_particle(&positive, &negative);
    assert_abs_diff_eq!(ds1, 2.0, epsilon = 1e-2);
    assert_abs_diff_eq!(ds2, 3.0, epsilon = 1e-2);

    positive.transport_to_ds(&prop, ds1);
    negative.transport_to_ds(&prop, ds2);
    assert_abs_diff_eq!(positive.position(), Vector3::from(vertex), epsilon = 1e-2);
    assert_abs_diff_eq!(negative.position(), Vector3::from(vertex), epsilon = 1e-2);
    assert!(positive.distance_from_particle(&prop, &negative) < 1e-2);
}

#[rstest]
#[case::line(AnyPropagator::Line(StraightLine))]
#[case::homogeneous(AnyPropagator::Homogeneous(HomogeneousField::new(5.0)))]
fn closest_point_is_orthogonal(#[case] prop: AnyPropagator) {
    let mut p = track([0.0; 3], [0.5, 0.2, 0.3], 1.0, PION_MASS);
    let target = Vector3::new(3.0, 2.0, 1.0);
    p.transport_to_point(&prop, &target);

    let offset = target - p.position();
    assert_abs_diff_eq!(offset.dot(&p.momentum()), 0.0, epsilon = 1e-3);
    assert_abs_diff_eq!(
        p.distance_from_vertex(&prop, &target),
        offset.norm(),
        epsilon = 1e-3
    );
}

#[rstest]
#[case::positive([0.3, -0.2, 0.1], [0.5, 0.2, 0.3], 1.0, [3.0, 2.0, 1.0])]
#[case::negative([0.0, 1.0, -2.0], [-0.1, 0.8, 0.05], -1.0, [-1.0, 4.0, 0.5])]
#[case::neutral([1.0, 1.0, 1.0], [0.2, -0.3, 1.2], 0.0, [0.0, 0.0, 5.0])]
#[case::slow([-0.5, 0.2, 0.0], [0.05, 0.02, -0.03], 1.0, [0.4, 0.6, -0.2])]
#[case::behind([2.0, 0.0, 0.0], [1.0, 1.0, 0.0], -1.0, [-3.0, -1.0, 0.0])]
fn vanishing_field_matches_the_line(
    #[case] r: [f32; 3],
    #[case] p: [f32; 3],
    #[case] charge: f32,
    #[case] target: [f32; 3],
) {
    let field = HomogeneousField::new(0.0);
    let first = track(r, p, charge, PION_MASS);
    let second = track([0.0, -1.0, 0.5], [0.1, 0.4, 0.2], -charge, PION_MASS);
    let target = Vector3::from(target);

    assert_eq!(
        field.ds_to_point(&first, &target),
        StraightLine.ds_to_point(&first, &target)
    );
    assert_eq!(
        field.ds_to_particle(&first, &second),
        StraightLine.ds_to_particle(&first, &second)
    );

    let ds = StraightLine.ds_to_point(&first, &target);
    let (params, covar) = field.transport(&first, ds);
    let (line_params, line_covar) = StraightLine.transport(&first, ds);
    assert_abs_diff_eq!(params, line_params, epsilon = 1e-5);
    for (a, b) in covar.packed().iter().zip(line_covar.packed().iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-5);
    }
}
