//! Validation contract for configuration loaded from files and the environment

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Configuration that is checked once after it is merged from its sources.
///
/// Implementors are exercised through `textgen::settings::Settings`.
pub trait ValidatedConfig:
    Send + Sync + Clone + Debug + Serialize + for<'de> Deserialize<'de>
{
    type Error: std::error::Error + Send + Sync + 'static;

    fn validate(&self) -> Result<(), Self::Error>;

    /// One line naming what the configuration controls, used in log output.
    fn description() -> &'static str;
}

/// Default values that must themselves pass validation.
pub trait DefaultConfig: ValidatedConfig + Default {
    fn validated_default() -> Result<Self, Self::Error> {
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }
}

impl<T> DefaultConfig for T where T: ValidatedConfig + Default {}
