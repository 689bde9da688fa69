//! Error taxonomy for the import pipeline.
//!
//! Only three kinds of failure ever reach a caller. Per-field parse failures
//! are not errors: they are absorbed into the data as absent values and
//! reported through [`crate::coerce::CoercionFailure`].

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ImportError {
    /// CSV input unreadable or undecodable, or store unreachable.
    #[error("{context}")]
    Resource {
        context: String,
        #[source]
        source: BoxError,
    },
    /// Header/row width or column name disagreement with the schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    /// Target insert rejected; the batch was rolled back.
    #[error("load rejected: {reason}")]
    Load {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl ImportError {
    pub fn resource<E>(context: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        ImportError::Resource {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        ImportError::SchemaMismatch(message.into())
    }

    pub fn load(reason: impl Into<String>) -> Self {
        ImportError::Load {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn load_with<E>(reason: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        ImportError::Load {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }
}
