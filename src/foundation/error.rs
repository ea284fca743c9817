use std::sync::Arc;
use std::time::Duration;

/// Crate-wide result alias.
pub type TexforgeResult<T> = Result<T, TexforgeError>;

/// Error taxonomy for the compilation pipeline.
///
/// The enum is `Clone` so that a shared in-flight cache outcome can be handed
/// to every waiter; the `anyhow` passthrough is wrapped in an `Arc` for the
/// same reason.
#[derive(thiserror::Error, Debug, Clone)]
pub enum TexforgeError {
    /// A stage contract was violated by the caller.
    #[error("validation error: {0}")]
    Validation(String),

    /// An external tool could not be located in any search location.
    #[error("binary '{name}' not found: {detail}")]
    BinaryNotFound {
        /// Tool name as configured (e.g. `latex`).
        name: String,
        /// Remediation text listing what was searched.
        detail: String,
    },

    /// The typesetting tool rejected the expression.
    #[error("typeset error: {diagnostic}")]
    Typeset {
        /// Concise diagnostic parsed from the tool's log, or raw stderr.
        diagnostic: String,
    },

    /// The vector-conversion tool failed.
    #[error("vector conversion error: {0}")]
    VectorConvert(String),

    /// An external tool exceeded its wall-clock deadline and was killed.
    #[error("process '{program}' timed out after {timeout:?}")]
    Timeout {
        /// Program that was killed.
        program: String,
        /// Configured deadline.
        timeout: Duration,
    },

    /// The intermediate vector document could not be parsed.
    ///
    /// Soft at the geometry stage boundary: logged and converted into an
    /// empty result rather than propagated.
    #[error("invalid vector document: {0}")]
    InvalidVector(String),

    /// The request was superseded or explicitly aborted. Not a real error;
    /// callers swallow it at the boundary they control.
    #[error("render cancelled")]
    Cancelled,

    /// Any other failure, with context.
    #[error("{0}")]
    Other(Arc<anyhow::Error>),
}

impl TexforgeError {
    /// Construct a [`TexforgeError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Construct a [`TexforgeError::Typeset`].
    pub fn typeset(diagnostic: impl Into<String>) -> Self {
        Self::Typeset {
            diagnostic: diagnostic.into(),
        }
    }

    /// Construct a [`TexforgeError::VectorConvert`].
    pub fn vector_convert(msg: impl Into<String>) -> Self {
        Self::VectorConvert(msg.into())
    }

    /// Construct a [`TexforgeError::InvalidVector`].
    pub fn invalid_vector(msg: impl Into<String>) -> Self {
        Self::InvalidVector(msg.into())
    }

    /// Return `true` for [`TexforgeError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<anyhow::Error> for TexforgeError {
    fn from(e: anyhow::Error) -> Self {
        Self::Other(Arc::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            TexforgeError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            TexforgeError::typeset("x")
                .to_string()
                .contains("typeset error:")
        );
        assert!(
            TexforgeError::vector_convert("x")
                .to_string()
                .contains("vector conversion error:")
        );
        assert!(
            TexforgeError::invalid_vector("x")
                .to_string()
                .contains("invalid vector document:")
        );
    }

    #[test]
    fn binary_not_found_names_the_tool() {
        let err = TexforgeError::BinaryNotFound {
            name: "latex".into(),
            detail: "searched PATH".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("latex"));
        assert!(msg.contains("searched PATH"));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = TexforgeError::from(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn cancelled_is_cloneable_and_detectable() {
        let err = TexforgeError::Cancelled;
        assert!(err.clone().is_cancelled());
        assert!(!TexforgeError::validation("x").is_cancelled());
    }
}
