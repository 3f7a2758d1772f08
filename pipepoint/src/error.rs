use crate::message::HookKind;
use std::fmt::Debug;
use thiserror::Error;

/// Errors raised by the pipeline engine.
///
/// Contract violations (`MissingTransport`, `MissingContext`, `DuplicateHook`,
/// `StreamClosed`) are returned synchronously from the call that broke the contract.
/// Application errors travel backward as `error` messages and only show up here when
/// nothing intercepted them (`Unhandled`) or when a caller-facing completion surfaces
/// them (`Rejected`).
#[derive(Debug, Error)]
pub enum PipelineError<E: Debug> {
    /// Neither the context nor the pipeline provides a transport.
    #[error("transport is not provided")]
    MissingTransport,

    /// A message was sent from a point that is not bound to any context.
    #[error("context is missing, make sure the point is bound first")]
    MissingContext,

    /// A second hook was registered for the same point, context and message type.
    #[error(
        "hook for `{0}` has already been registered, only one hook per message type is allowed"
    )]
    DuplicateHook(HookKind),

    /// A chunk was written to a stream that has already been ended.
    #[error("the stream has been closed already")]
    StreamClosed,

    /// An `error` message ran out of backward neighbours without being intercepted.
    #[error("unhandled error reached the end of the pipeline")]
    Unhandled(E),

    /// The exchange completed with an application error delivered to the caller.
    #[error("the exchange completed with an error")]
    Rejected(E),

    /// Every handle that could complete the exchange was dropped.
    #[error("the exchange was dropped before it completed")]
    Abandoned,
}

impl<E: Debug> PipelineError<E> {
    /// Returns `true` for errors caused by misusing the pipeline API.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            PipelineError::MissingTransport
                | PipelineError::MissingContext
                | PipelineError::DuplicateHook(_)
                | PipelineError::StreamClosed
        )
    }

    /// Extracts the application error, if this error carries one.
    pub fn into_application(self) -> Option<E> {
        match self {
            PipelineError::Unhandled(err) | PipelineError::Rejected(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type used throughout the crate, parameterized by the application error type.
pub type Result<T, E> = std::result::Result<T, PipelineError<E>>;
