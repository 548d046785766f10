use std::collections::TryReserveError;

/// Errors surfaced by fallible `ChainMap` operations.
///
/// Whenever one of these is returned the map is left exactly as it was
/// before the call.
#[derive(Debug)]
pub enum Error {
    /// The bucket table could not be allocated
    Alloc(TryReserveError),

    /// Growth would exceed the configured or addressable bucket limit
    CapacityOverflow,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChainMapError: {self:?}")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Alloc(e) => Some(e),
            Self::CapacityOverflow => None,
        }
    }
}

impl From<TryReserveError> for Error {
    fn from(value: TryReserveError) -> Self {
        Self::Alloc(value)
    }
}

/// Map result
pub type Result<T> = std::result::Result<T, Error>;
