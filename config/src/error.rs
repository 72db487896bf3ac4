use std::sync::Arc;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::diagnostics::json5_error_span;

#[allow(unused_assignments)]
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{0}")]
    #[diagnostic(code(config::io))]
    Io(String),

    #[error("invalid solution config: {message}")]
    #[diagnostic(code(config::parse), help("Solution configs are JSON5 objects."))]
    Parse {
        message: String,
        #[source_code]
        src: NamedSource<Arc<str>>,
        #[label("{message}")]
        span: SourceSpan,
    },

    #[error("{0}")]
    #[diagnostic(code(config::invalid))]
    Validation(String),

    #[error("{0}")]
    #[diagnostic(
        code(config::env),
        help(
            "Settable fields: SHARR_SOLUTION_SOLUTION_ID, SHARR_SOLUTION_NAMESPACE, \
             SHARR_SOLUTION_VERSION, SHARR_SOLUTION_DISTRIBUTION_BUCKET, \
             SHARR_SOLUTION_DESCRIPTION."
        )
    )]
    Env(String),
}

impl ConfigError {
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    pub fn json5(name: impl AsRef<str>, source: Arc<str>, err: &json5::Error) -> Self {
        let (message, span) = json5_error_span(&source, err);
        Self::Parse {
            message,
            src: NamedSource::new(name, source).with_language("json5"),
            span,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn env(message: impl Into<String>) -> Self {
        Self::Env(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
