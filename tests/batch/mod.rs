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
use kfparticle::lanes::{gather, scatter};
use kfparticle::prelude::*;
use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use rayon::prelude::*;
use rstest::*;

/// Daughter pairs from random decay points.
#[fixture]
fn pairs() -> Vec<(Particle<f32>, Particle<f32>)> {
    let mut rng = Pcg64Mcg::seed_from_u64(42);
    (0..64)
        .map(|_| {
            let vtx = [
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(0.0..5.0),
            ];
            let p1 = [rng.gen_range(0.1..1.0), rng.gen_range(-0.5..0.5), rng.gen_range(0.2..2.0)];
            let p2 = [rng.gen_range(-1.0..-0.1), rng.gen_range(-0.5..0.5), rng.gen_range(0.2..2.0)];
            (
                track(vtx, p1, 1.0, PION_MASS),
                track(vtx, p2, -1.0, PION_MASS),
            )
        })
        .collect()
}

fn combine<T: Lane, P: Propagator>(
    prop: &P,
    first: &Particle<T>,
    second: &Particle<T>,
    guess: Vector3<T>,
) -> Particle<T> {
    let mut mother = Particle::<T>::new();
    mother.set_vtx_guess(guess);
    mother.add_daughter(prop, first, false);
    mother.add_daughter(prop, second, false);
    mother
}

fn assert_same(wide: &Particle<f32>, scalar: &Particle<f32>) {
    assert_abs_diff_eq!(wide.params, scalar.params, epsilon = 1e-4);
    for (a, b) in wide.covar.packed().iter().zip(scalar.covar.packed().iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-4);
    }
    assert_eq!(wide.ndf, scalar.ndf);
    assert_eq!(wide.charge, scalar.charge);
    assert_abs_diff_eq!(wide.chi2, scalar.chi2, epsilon = 1e-3);
}

#[test]
fn gather_and_scatter() {
    let v: WideF32x4 = gather(&[1.0, 2.0]);
    assert_eq!(scatter(v), vec![1.0, 2.0, 1.0, 1.0]);
}

#[test]
fn batch_size_is_checked() {
    assert!(matches!(
        Particle::<WideF32x4>::pack(&[]),
        Err(ParticleError::BatchSize { len: 0, .. })
    ));
    let five = vec![Particle::<f32>::new(); 5];
    assert!(Particle::<WideF32x4>::pack(&five).is_err());
}

#[rstest]
#[case::line(AnyPropagator::Line(StraightLine))]
#[case::homogeneous(AnyPropagator::Homogeneous(HomogeneousField::new(5.0)))]
fn lanes_match_scalar_particles(
    pairs: Vec<(Particle<f32>, Particle<f32>)>,
    #[case] prop: AnyPropagator,
) {
    let _ = pretty_env_logger::try_init();
    for chunk in pairs.chunks(4) {
        let firsts: Vec<_> = chunk.iter().map(|(a, _)| a.clone()).collect();
        let seconds: Vec<_> = chunk.iter().map(|(_, b)| b.clone()).collect();
        let wide_first = Particle::<WideF32x4>::pack(&firsts).unwrap();
        let wide_second = Particle::<WideF32x4>::pack(&seconds).unwrap();

        let wide = combine(&prop, &wide_first, &wide_second, wide_first.position());
        for (lane, (a, b)) in chunk.iter().enumerate() {
            let scalar = combine(&prop, a, b, a.position());
            assert_same(&wide.unpack()[lane], &scalar);
        }
    }
}

#[rstest]
fn lanes_at_different_stages(pairs: Vec<(Particle<f32>, Particle<f32>)>) {
    let prop = HomogeneousField::new(5.0);
    // lanes 0 and 2 hold one daughter, lanes 1 and 3 are empty
    let mothers: Vec<Particle<f32>> = pairs[..4]
        .iter()
        .enumerate()
        .map(|(lane, (a, _))| {
            let mut mother = Particle::<f32>::new();
            mother.set_vtx_guess(a.position());
            if lane % 2 == 0 {
                mother.add_daughter(&prop, a, false);
            }
            mother
        })
        .collect();
    let seconds: Vec<_> = pairs[..4].iter().map(|(_, b)| b.clone()).collect();

    let mut wide = Particle::<WideF32x4>::pack(&mothers).unwrap();
    wide.add_daughter(&prop, &Particle::<WideF32x4>::pack(&seconds).unwrap(), false);
    let lanes = wide.unpack();

    for (lane, mut mother) in mothers.into_iter().enumerate() {
        mother.add_daughter(&prop, &seconds[lane], false);
        assert_same(&lanes[lane], &mother);
    }
    assert_eq!(lanes[0].ndf, 1.0);
    assert_eq!(lanes[1].ndf, -1.0);
}

#[rstest]
fn parallel_reconstruction(pairs: Vec<(Particle<f32>, Particle<f32>)>) {
    let prop = AnyPropagator::Homogeneous(HomogeneousField::new(-5.0));
    let sequential: Vec<Particle<f32>> = pairs
        .iter()
        .map(|(a, b)| combine(&prop, a, b, a.position()))
        .collect();
    let parallel: Vec<Particle<f32>> = pairs
        .par_iter()
        .map(|(a, b)| combine(&prop, a, b, a.position()))
        .collect();

    for (p, s) in parallel.iter().zip(sequential.iter()) {
        assert_eq!(p.params, s.params);
        assert_eq!(p.chi2, s.chi2);
    }
}
