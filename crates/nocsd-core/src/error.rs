use thiserror::Error;

/// Why a structure-layout probe could not produce a result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("could not create throwaway {0} object")]
    ObjectCreation(&'static str),

    #[error("size of the private region is not known yet")]
    PrivateRegionUnknown,

    #[error("private region already held the pointer before the operation")]
    AlreadyPresent,

    #[error("pointer not found in private region")]
    NotFound,

    #[error("pointer found {matches} times in private region")]
    Ambiguous { matches: usize },

    #[error("signal callback for {0} was not captured")]
    CallbackMissing(&'static str),

    #[error("sanity check failed: {0}")]
    SanityCheck(&'static str),

    #[error("toolkit version does not have this field")]
    NotApplicable,
}

impl ProbeError {
    /// Errors that leave the probe free to run again later.
    ///
    /// Only a missing private-size record qualifies: the type has not finished
    /// registering, so nothing was learned about its layout.
    pub fn is_deferred(&self) -> bool {
        matches!(self, ProbeError::PrivateRegionUnknown)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("decoration layout is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, ProbeError>;
