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
use kfparticle::prelude::*;

mod daughters;
mod mass;
mod vertex;

/// Two pions from a decay at the origin.
pub fn pion_pair() -> (Particle<f32>, Particle<f32>) {
    (
        track([0.0; 3], [0.3, 0.0, 0.1], 1.0, PION_MASS).with_id(1),
        track([0.0; 3], [-0.3, 0.0, 0.1], -1.0, PION_MASS).with_id(2),
    )
}
