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

use crate::errors::{ConfigError, InvalidConfigSnafu, ParseConfigSnafu, ReadConfigSnafu};
use crate::field::{GradientField, UniformField};
use crate::kalman::ConstructMethod;
use crate::transport::{AnyPropagator, HomogeneousField, StraightLine, VaryingField};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_derive::{Deserialize, Serialize};
use snafu::{ensure, ResultExt};
use std::fmt::Debug;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use typed_builder::TypedBuilder;

/// A configuration structure which can be read from YAML.
pub trait ConfigRepr: Debug + Sized + Serialize + DeserializeOwned {
    /// Builds the configuration representation from the path to a yaml
    fn load<P>(path: P) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path).context(ReadConfigSnafu)?;
        let reader = BufReader::new(file);

        serde_yaml::from_reader(reader).context(ParseConfigSnafu)
    }

    /// Builds a sequence of "Selves" from the provided path to a yaml
    fn load_many<P>(path: P) -> Result<Vec<Self>, ConfigError>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path).context(ReadConfigSnafu)?;
        let reader = BufReader::new(file);

        serde_yaml::from_reader(reader).context(ParseConfigSnafu)
    }

    /// Builds "Self" from the provided string of a yaml
    fn loads(data: &str) -> Result<Self, ConfigError> {
        debug!("Loading YAML:\n{data}");
        serde_yaml::from_str(data).context(ParseConfigSnafu)
    }

    /// Builds a sequence of "Selves" from the provided string of a yaml
    fn loads_many(data: &str) -> Result<Vec<Self>, ConfigError> {
        debug!("Loading YAML:\n{data}");
        serde_yaml::from_str(data).context(ParseConfigSnafu)
    }
}

/// Magnetic field model used to transport particles.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum FieldConfig {
    /// No field, straight line trajectories.
    #[default]
    Line,
    /// Homogeneous field along z, in kG.
    Homogeneous { bz: f32 },
    /// Constant field vector, in kG, with the slowly varying field transport.
    Uniform { b: [f32; 3] },
    /// Linear field map `B(r) = b0 + G r`, in kG and kG/cm.
    Gradient {
        b0: [f32; 3],
        gradient: [[f32; 3]; 3],
    },
}

impl FieldConfig {
    fn values(&self) -> Vec<f32> {
        match self {
            Self::Line => Vec::new(),
            Self::Homogeneous { bz } => vec![*bz],
            Self::Uniform { b } => b.to_vec(),
            Self::Gradient { b0, gradient } => {
                b0.iter().chain(gradient.iter().flatten()).copied().collect()
            }
        }
    }
}

/// Engine configuration: the field model and the default rule used to add daughters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[builder(doc)]
pub struct EngineConfig {
    #[builder(default)]
    #[serde(default)]
    pub field: FieldConfig,
    #[builder(default)]
    #[serde(default)]
    pub construct_method: ConstructMethod,
}

impl ConfigRepr for EngineConfig {}

impl EngineConfig {
    /// Builds the propagator of the configured field model.
    pub fn propagator(&self) -> Result<AnyPropagator, ConfigError> {
        let values = self.field.values();
        ensure!(
            values.iter().all(|v| v.is_finite()),
            InvalidConfigSnafu {
                msg: format!("non finite field value in {:?}", self.field)
            }
        );
        let prop = match &self.field {
            FieldConfig::Line => AnyPropagator::Line(StraightLine),
            FieldConfig::Homogeneous { bz } => AnyPropagator::Homogeneous(HomogeneousField::new(*bz)),
            FieldConfig::Uniform { b } => {
                AnyPropagator::Uniform(VaryingField::new(UniformField { b: *b }))
            }
            FieldConfig::Gradient { b0, gradient } => {
                AnyPropagator::Gradient(VaryingField::new(GradientField {
                    b0: *b0,
                    gradient: *gradient,
                }))
            }
        };
        info!("field model {:?}, daughters added with {:?}", self.field, self.construct_method);
        Ok(prop)
    }
}
