//! Conditional logging macros for library-level tracing.
//!
//! With the `logging` feature the macros are tracing's own. Without it they
//! swallow their arguments and compile to nothing.
//!
//! # Example
//!
//! ```rust,ignore
//! use crate::logging::{debug, info};
//!
//! info!(path = %path.display(), "store opened");
//! debug!(family = %cf.name(), key_len = key.len(), "put");
//! ```

#[cfg(feature = "logging")]
pub(crate) use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "logging"))]
mod disabled {
    macro_rules! discard {
        ($($arg:tt)*) => {};
    }

    pub(crate) use discard as debug;
    pub(crate) use discard as error;
    pub(crate) use discard as info;
    pub(crate) use discard as trace;
    pub(crate) use discard as warn;
}

#[cfg(not(feature = "logging"))]
pub(crate) use disabled::{debug, error, info, trace, warn};
