//! Errors raised by the periodic scheduler loops.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use cf_federation_data::FederationDataError;

/// Result alias for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors raised while reconciling the federation/pool registry.
#[derive(Debug)]
pub enum SchedulerError {
    /// Federation or pool persistence failed while reconciling the registry.
    Data(FederationDataError),
}

impl Display for SchedulerError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(source) => write!(formatter, "federation data error: {source}"),
        }
    }
}

impl Error for SchedulerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Data(source) => Some(source),
        }
    }
}

impl From<FederationDataError> for SchedulerError {
    fn from(source: FederationDataError) -> Self {
        Self::Data(source)
    }
}
