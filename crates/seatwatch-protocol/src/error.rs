//! Protocol errors.

use thiserror::Error;

/// Errors raised while interpreting a server line.
///
/// None of these are fatal to the session: the offending line is logged
/// and dropped.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// No grammar rule matched the line.
    #[error("Unrecognized report: {0:?}")]
    Unrecognized(String),

    /// An attempt report carried a status digit outside 0/2/4/6.
    #[error("Unknown task status code {0:?}")]
    UnknownStatus(String),

    /// A rule matched but its JSON body did not decode.
    #[error("Invalid {rule} payload: {source}")]
    Json {
        rule: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The line had no leading task key.
    #[error("Message has no task key")]
    MissingTaskKey,
}

impl ProtocolError {
    pub(crate) fn json(rule: &'static str) -> impl FnOnce(serde_json::Error) -> Self {
        move |source| Self::Json { rule, source }
    }
}
