use std::convert::Infallible;

/// Failures surfaced by a feature provider.
///
/// `E` is the backing store's error type. Store failures are passed through
/// as-is; the provider never retries.
#[derive(thiserror::Error, Debug)]
pub enum Error<E: std::error::Error + 'static = Infallible> {
    #[error("Invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: &'static str,
    },

    #[error("The feature `{0}` does not exist")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    #[error(transparent)]
    Store(E),
}

impl<E: std::error::Error + 'static> Error<E> {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
