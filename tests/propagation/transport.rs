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
use rstest::*;

/// Field along y growing with z, curl free.
fn bending_gradient() -> GradientField {
    GradientField {
        b0: [0.0, 5.0, 0.0],
        gradient: [[0.0; 3], [0.0, 0.0, 0.001], [0.0, 0.001, 0.0]],
    }
}

#[rstest]
#[case::line(AnyPropagator::Line(StraightLine))]
#[case::homogeneous(AnyPropagator::Homogeneous(HomogeneousField::new(5.0)))]
#[case::varying(AnyPropagator::Uniform(VaryingField::new(UniformField::new(0.0, 5.0, 0.0))))]
#[case::gradient(AnyPropagator::Gradient(VaryingField::new(bending_gradient())))]
fn there_and_back(#[case] prop: AnyPropagator) {
    let start = track([0.2, -0.1, 1.0], [0.4, 0.1, 0.9], 1.0, PION_MASS);
    let mut p = start.clone();
    p.transport_to_ds(&prop, 10.0);
    assert!((p.params - start.params).norm() > 1.0);
    assert_eq!(p.s_from_decay, 10.0);

    p.transport_to_ds(&prop, -10.0);
    assert_abs_diff_eq!(p.params, start.params, epsilon = 1e-3);
    assert_abs_diff_eq!(p.s_from_decay, 0.0);
    for (a, b) in p.covar.packed().iter().zip(start.covar.packed().iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-5);
    }
}

#[rstest]
#[case::homogeneous(AnyPropagator::Homogeneous(HomogeneousField::new(-5.0)))]
#[case::varying(AnyPropagator::Uniform(VaryingField::new(UniformField::new(0.0, 5.0, 0.0))))]
fn field_preserves_momentum_magnitude(#[case] prop: AnyPropagator) {
    let start = track([0.0; 3], [0.2, 0.3, 0.5], -1.0, PION_MASS);
    let mut p = start.clone();
    p.transport_to_ds(&prop, 50.0);
    assert_abs_diff_eq!(p.momentum().norm(), start.momentum().norm(), epsilon = 1e-4);
    assert_abs_diff_eq!(p.energy(), start.energy());
    assert!((p.momentum() - start.momentum()).norm() > 1e-3);
}

#[rstest]
#[case::line(AnyPropagator::Line(StraightLine))]
#[case::homogeneous(AnyPropagator::Homogeneous(HomogeneousField::new(5.0)))]
#[case::varying(AnyPropagator::Uniform(VaryingField::new(UniformField::new(0.0, 5.0, 0.0))))]
#[case::gradient(AnyPropagator::Gradient(VaryingField::new(bending_gradient())))]
fn production_and_decay_vertices(#[case] prop: AnyPropagator) {
    let mut start = track([1.0, 2.0, 3.0], [1.0, 0.0, 0.0], 0.0, 0.497_6);
    start.params[7] = 0.5;

    let mut p = start.clone();
    p.transport_to_production_vertex(&prop);
    assert!(p.at_production_vertex);
    assert_abs_diff_eq!(p.x(), 0.5, epsilon = 1e-6);
    assert_abs_diff_eq!(p.s_from_decay, -0.5, epsilon = 1e-6);
    // the decay length error moves into the position
    assert!(p.covar[(0, 0)] > start.covar[(0, 0)] + 0.5);

    p.transport_to_decay_vertex(&prop);
    assert!(!p.at_production_vertex);
    assert_abs_diff_eq!(p.params, start.params, epsilon = 1e-6);
    assert_abs_diff_eq!(p.s_from_decay, 0.0, epsilon = 1e-6);
    for (a, b) in p.covar.packed().iter().zip(start.covar.packed().iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-5);
    }
}

#[test]
fn diverging_paths_are_discarded() {
    // nearly at rest: the closest point is far beyond any physical path
    let p = track([0.0; 3], [0.011, 0.0, 0.0], 0.0, PION_MASS);
    let ds = StraightLine.ds_to_point(&p, &nalgebra::Vector3::new(1e3, 0.0, 0.0));
    assert_eq!(ds, 0.0);
}
