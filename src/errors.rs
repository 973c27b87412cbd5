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

use snafu::prelude::*;
use std::io::Error as IoError;

/// Errors raised at the boundary of the engine, when building particles from upstream inputs.
///
/// The numeric kernels themselves never fail: ill-conditioned inputs degrade to sentinel values
/// and per-lane problem flags.
#[derive(Debug, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ParticleError {
    #[snafu(display(
        "expected 6 parameters with 21 covariance terms or 7 with 28, got {params} and {covariance}"
    ))]
    InvalidInput { params: usize, covariance: usize },
    #[snafu(display("cannot construct a particle without daughters"))]
    NoDaughters,
    #[snafu(display("a batch holds between 1 and {width} particles, got {len}"))]
    BatchSize { len: usize, width: usize },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("failed to read configuration file: {source}"))]
    ReadConfig { source: IoError },
    #[snafu(display("failed to parse YAML configuration: {source}"))]
    ParseConfig { source: serde_yaml::Error },
    #[snafu(display("invalid configuration: {msg}"))]
    InvalidConfig { msg: String },
}

impl PartialEq for ConfigError {
    /// No two configuration errors match
    fn eq(&self, _other: &Self) -> bool {
        false
    }
}
