//! Messages exchanged between pipeline points.
//!
//! A [`Message`] is created for every send operation and is fully consumed by the
//! dispatcher. Its kind decides which hook is looked up at each point, its direction
//! decides which neighbour it moves to next.

use crate::context::Context;
use std::fmt;

/// The payload family carried by a pipeline.
///
/// The engine treats payloads as opaque values; an `Exchange` only fixes their types so
/// that hooks are strongly typed. Stream chunks travel as `Option<Request>` or
/// `Option<Response>`, where `None` is the end-of-stream sentinel.
///
/// ```rust
/// use pipepoint::Exchange;
///
/// struct Text;
///
/// impl Exchange for Text {
///     type Request = String;
///     type Response = String;
///     type Error = std::io::Error;
/// }
/// ```
pub trait Exchange: 'static {
    /// Payload travelling toward the transport.
    type Request: 'static;
    /// Payload travelling back toward the caller.
    type Response: 'static;
    /// Application error travelling back toward the caller.
    type Error: fmt::Debug + 'static;
}

/// Flow direction of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Toward the transport (`next` links).
    Forward,
    /// Toward the caller (`prev` links).
    Backward,
}

/// Type tag of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Synchronous binding pass that lets every stage register its hooks.
    Context,
    /// A request travelling forward.
    Request,
    /// A response travelling backward.
    Response,
    /// An application error travelling backward.
    Error,
    /// A request stream chunk.
    RequestData,
    /// A response stream chunk.
    ResponseData,
}

impl MessageKind {
    /// Returns the hook kind looked up for this message, `None` for the context pass.
    pub fn hook_kind(self) -> Option<HookKind> {
        match self {
            MessageKind::Context => None,
            MessageKind::Request => Some(HookKind::Request),
            MessageKind::Response => Some(HookKind::Response),
            MessageKind::Error => Some(HookKind::Error),
            MessageKind::RequestData => Some(HookKind::RequestData),
            MessageKind::ResponseData => Some(HookKind::ResponseData),
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            MessageKind::Context => "context",
            MessageKind::Request => "request",
            MessageKind::Response => "response",
            MessageKind::Error => "error",
            MessageKind::RequestData => "request:data",
            MessageKind::ResponseData => "response:data",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type tag under which a hook is registered.
///
/// Besides one kind per message type, `RequestEnd` and `ResponseEnd` let a stage handle
/// the end of a stream separately from its chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// `request`
    Request,
    /// `response`
    Response,
    /// `error`
    Error,
    /// `request:data`
    RequestData,
    /// `response:data`
    ResponseData,
    /// `request:end`
    RequestEnd,
    /// `response:end`
    ResponseEnd,
}

impl HookKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            HookKind::Request => "request",
            HookKind::Response => "response",
            HookKind::Error => "error",
            HookKind::RequestData => "request:data",
            HookKind::ResponseData => "response:data",
            HookKind::RequestEnd => "request:end",
            HookKind::ResponseEnd => "response:end",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) enum Body<X: Exchange> {
    Context,
    Request(X::Request),
    Response(X::Response),
    Error(X::Error),
    RequestData(Option<X::Request>),
    ResponseData(Option<X::Response>),
}

impl<X: Exchange> Body<X> {
    fn kind(&self) -> MessageKind {
        match self {
            Body::Context => MessageKind::Context,
            Body::Request(_) => MessageKind::Request,
            Body::Response(_) => MessageKind::Response,
            Body::Error(_) => MessageKind::Error,
            Body::RequestData(_) => MessageKind::RequestData,
            Body::ResponseData(_) => MessageKind::ResponseData,
        }
    }
}

/// Envelope passed between points.
pub struct Message<X: Exchange> {
    pub(crate) body: Body<X>,
    pub(crate) direction: Direction,
    pub(crate) context: Option<Context<X>>,
    pub(crate) synchronous: bool,
}

impl<X: Exchange> Message<X> {
    pub(crate) fn from_parts(
        body: Body<X>,
        direction: Direction,
        context: Option<Context<X>>,
        synchronous: bool,
    ) -> Self {
        Self {
            body,
            direction,
            context,
            synchronous,
        }
    }

    pub(crate) fn context_pass(context: Context<X>) -> Self {
        Self::from_parts(Body::Context, Direction::Forward, Some(context), true)
    }

    /// Creates a forward `request` message.
    pub fn request(payload: X::Request) -> Self {
        Self::from_parts(Body::Request(payload), Direction::Forward, None, false)
    }

    /// Creates a backward `response` message.
    pub fn response(payload: X::Response) -> Self {
        Self::from_parts(Body::Response(payload), Direction::Backward, None, false)
    }

    /// Creates a backward `error` message. Errors always travel backward.
    pub fn error(err: X::Error) -> Self {
        Self::from_parts(Body::Error(err), Direction::Backward, None, false)
    }

    /// Creates a forward `request:data` message; `None` ends the stream.
    pub fn request_data(chunk: Option<X::Request>) -> Self {
        Self::from_parts(Body::RequestData(chunk), Direction::Forward, None, false)
    }

    /// Creates a backward `response:data` message; `None` ends the stream.
    pub fn response_data(chunk: Option<X::Response>) -> Self {
        Self::from_parts(Body::ResponseData(chunk), Direction::Backward, None, false)
    }

    /// Flags the message for synchronous delivery.
    ///
    /// Hooks still receive a continuation, but the message moves on as soon as the hook
    /// returns instead of waiting for an asynchronous resume.
    pub fn synchronous(mut self) -> Self {
        self.synchronous = true;
        self
    }

    /// Binds the message to a context explicitly.
    pub fn with_context(mut self, context: Context<X>) -> Self {
        self.context = Some(context);
        self
    }

    /// Returns the message type tag.
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Returns the flow direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the context the message is bound to, if any.
    pub fn context(&self) -> Option<&Context<X>> {
        self.context.as_ref()
    }

    /// Returns `true` if the message was flagged synchronous.
    pub fn is_synchronous(&self) -> bool {
        self.synchronous
    }

    /// Returns `true` for a data message carrying the end-of-stream sentinel.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(
            self.body,
            Body::RequestData(None) | Body::ResponseData(None)
        )
    }
}

impl<X: Exchange> fmt::Debug for Message<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("kind", &self.kind())
            .field("direction", &self.direction)
            .field("bound", &self.context.is_some())
            .field("synchronous", &self.synchronous)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Text;

    impl Exchange for Text {
        type Request = String;
        type Response = String;
        type Error = String;
    }

    #[test]
    fn errors_always_travel_backward() {
        let msg = Message::<Text>::error("boom".to_owned());
        assert_eq!(msg.kind(), MessageKind::Error);
        assert_eq!(msg.direction(), Direction::Backward);
    }

    #[test]
    fn only_empty_chunks_end_a_stream() {
        assert!(Message::<Text>::request_data(None).is_end_of_stream());
        assert!(Message::<Text>::response_data(None).is_end_of_stream());
        assert!(!Message::<Text>::request_data(Some("a".to_owned())).is_end_of_stream());
        assert!(!Message::<Text>::request("a".to_owned()).is_end_of_stream());
    }

    #[test]
    fn context_pass_has_no_hook_kind() {
        assert_eq!(MessageKind::Context.hook_kind(), None);
        assert_eq!(
            MessageKind::ResponseData.hook_kind(),
            Some(HookKind::ResponseData)
        );
        assert_eq!(HookKind::RequestEnd.to_string(), "request:end");
    }
}
