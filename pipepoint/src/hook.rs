//! Hooks and the continuations handed to them.
//!
//! A hook is registered per context-bound point and per [`HookKind`]. When a matching
//! message arrives the dispatcher hands the payload to the hook together with a
//! continuation ([`Next`] or, for end-of-stream hooks, [`Resume`]). The message stays
//! parked until the continuation is consumed; only its holder can move it on.

use crate::error::Result;
use crate::message::{Body, Direction, Exchange, HookKind, Message};
use crate::point::Point;
use log::trace;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type PayloadFn<X, T> = dyn Fn(T, Next<X, T>) -> Result<(), <X as Exchange>::Error>;
type EndFn<X> = dyn Fn(Resume<X>) -> Result<(), <X as Exchange>::Error>;

/// A typed hook, tagged by the message type it subscribes to.
///
/// Hooks must not capture the [`Point`] they are registered on: the context owns its
/// hooks, so a captured point would keep the context alive forever. Use
/// [`Next::point`] or [`Resume::point`] instead.
///
/// ```rust
/// use pipepoint::{Exchange, Hook};
///
/// struct Text;
/// impl Exchange for Text {
///     type Request = String;
///     type Response = String;
///     type Error = String;
/// }
///
/// let hook = Hook::<Text>::response(|res, next| next.resume(res.to_uppercase()));
/// assert_eq!(hook.kind().to_string(), "response");
/// ```
pub enum Hook<X: Exchange> {
    /// Subscribes to `request`.
    Request(Rc<PayloadFn<X, X::Request>>),
    /// Subscribes to `response`.
    Response(Rc<PayloadFn<X, X::Response>>),
    /// Subscribes to `error`.
    Error(Rc<PayloadFn<X, X::Error>>),
    /// Subscribes to `request:data`, including the end-of-stream chunk.
    RequestData(Rc<PayloadFn<X, Option<X::Request>>>),
    /// Subscribes to `response:data`, including the end-of-stream chunk.
    ResponseData(Rc<PayloadFn<X, Option<X::Response>>>),
    /// Subscribes to the end of a request stream.
    RequestEnd(Rc<EndFn<X>>),
    /// Subscribes to the end of a response stream.
    ResponseEnd(Rc<EndFn<X>>),
}

impl<X: Exchange> Hook<X> {
    /// Hook for `request` messages.
    pub fn request<F>(f: F) -> Self
    where
        F: Fn(X::Request, Next<X, X::Request>) -> Result<(), X::Error> + 'static,
    {
        Hook::Request(Rc::new(f))
    }

    /// Hook for `response` messages.
    pub fn response<F>(f: F) -> Self
    where
        F: Fn(X::Response, Next<X, X::Response>) -> Result<(), X::Error> + 'static,
    {
        Hook::Response(Rc::new(f))
    }

    /// Hook for `error` messages.
    pub fn error<F>(f: F) -> Self
    where
        F: Fn(X::Error, Next<X, X::Error>) -> Result<(), X::Error> + 'static,
    {
        Hook::Error(Rc::new(f))
    }

    /// Hook for `request:data` messages.
    pub fn request_data<F>(f: F) -> Self
    where
        F: Fn(Option<X::Request>, Next<X, Option<X::Request>>) -> Result<(), X::Error>
            + 'static,
    {
        Hook::RequestData(Rc::new(f))
    }

    /// Hook for `response:data` messages.
    pub fn response_data<F>(f: F) -> Self
    where
        F: Fn(Option<X::Response>, Next<X, Option<X::Response>>) -> Result<(), X::Error>
            + 'static,
    {
        Hook::ResponseData(Rc::new(f))
    }

    /// Hook invoked when a request stream ends and no `request:data` hook took the chunk.
    pub fn request_end<F>(f: F) -> Self
    where
        F: Fn(Resume<X>) -> Result<(), X::Error> + 'static,
    {
        Hook::RequestEnd(Rc::new(f))
    }

    /// Hook invoked when a response stream ends and no `response:data` hook took the chunk.
    pub fn response_end<F>(f: F) -> Self
    where
        F: Fn(Resume<X>) -> Result<(), X::Error> + 'static,
    {
        Hook::ResponseEnd(Rc::new(f))
    }

    /// Returns the kind this hook is registered under.
    pub fn kind(&self) -> HookKind {
        match self {
            Hook::Request(_) => HookKind::Request,
            Hook::Response(_) => HookKind::Response,
            Hook::Error(_) => HookKind::Error,
            Hook::RequestData(_) => HookKind::RequestData,
            Hook::ResponseData(_) => HookKind::ResponseData,
            Hook::RequestEnd(_) => HookKind::RequestEnd,
            Hook::ResponseEnd(_) => HookKind::ResponseEnd,
        }
    }
}

impl<X: Exchange> Clone for Hook<X> {
    fn clone(&self) -> Self {
        match self {
            Hook::Request(f) => Hook::Request(Rc::clone(f)),
            Hook::Response(f) => Hook::Response(Rc::clone(f)),
            Hook::Error(f) => Hook::Error(Rc::clone(f)),
            Hook::RequestData(f) => Hook::RequestData(Rc::clone(f)),
            Hook::ResponseData(f) => Hook::ResponseData(Rc::clone(f)),
            Hook::RequestEnd(f) => Hook::RequestEnd(Rc::clone(f)),
            Hook::ResponseEnd(f) => Hook::ResponseEnd(Rc::clone(f)),
        }
    }
}

impl<X: Exchange> fmt::Debug for Hook<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hook").field(&self.kind()).finish()
    }
}

/// Slot a synchronous delivery records the resumed payload into.
///
/// The dispatcher closes it once the hook has returned; a resume arriving after that
/// takes the asynchronous path instead.
pub(crate) struct SyncSlot<X: Exchange> {
    resumed: Option<Body<X>>,
    closed: bool,
}

impl<X: Exchange> SyncSlot<X> {
    pub(crate) fn open() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            resumed: None,
            closed: false,
        }))
    }

    /// Closes the slot and returns what the hook resumed with, if anything.
    pub(crate) fn close(&mut self) -> Option<Body<X>> {
        self.closed = true;
        self.resumed.take()
    }
}

/// Continuation of a message parked at a hook.
///
/// Consuming it with [`resume`](Next::resume) moves the message on to the neighbouring
/// point, carrying the payload passed in. Dropping it without resuming stalls the message
/// for good, which is how a stage absorbs a message (for example a cache answering a
/// request on its own).
pub struct Next<X: Exchange, T> {
    point: Point<X>,
    direction: Direction,
    wrap: fn(T) -> Body<X>,
    slot: Option<Rc<RefCell<SyncSlot<X>>>>,
}

impl<X: Exchange, T> Next<X, T> {
    pub(crate) fn new(
        point: Point<X>,
        direction: Direction,
        wrap: fn(T) -> Body<X>,
        slot: Option<Rc<RefCell<SyncSlot<X>>>>,
    ) -> Self {
        Self {
            point,
            direction,
            wrap,
            slot,
        }
    }

    /// The context-bound point the message is parked at.
    pub fn point(&self) -> &Point<X> {
        &self.point
    }

    /// Returns `true` while a synchronous delivery is waiting for the hook to return.
    pub fn is_synchronous(&self) -> bool {
        self.slot.as_ref().is_some_and(|slot| !slot.borrow().closed)
    }

    /// Moves the message on with `payload`.
    ///
    /// During a synchronous delivery the payload is only recorded and the dispatcher moves
    /// it once the hook returns. Otherwise, errors raised further down the chain, including
    /// an unhandled `error` that ran out of backward neighbours, are returned here.
    pub fn resume(self, payload: T) -> Result<(), X::Error> {
        let body = (self.wrap)(payload);
        if let Some(slot) = &self.slot {
            let mut slot = slot.borrow_mut();
            if !slot.closed {
                slot.resumed = Some(body);
                return Ok(());
            }
        }
        let message =
            Message::from_parts(body, self.direction, self.point.context().cloned(), false);
        trace!("resuming {} at {}", message.kind(), self.point.name());
        self.point.complete(message)
    }
}

impl<X: Exchange, T> fmt::Debug for Next<X, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("point", &self.point)
            .field("direction", &self.direction)
            .field("synchronous", &self.is_synchronous())
            .finish()
    }
}

/// Continuation handed to `request:end` / `response:end` hooks.
pub struct Resume<X: Exchange> {
    point: Point<X>,
    message: Message<X>,
}

impl<X: Exchange> Resume<X> {
    pub(crate) fn new(point: Point<X>, message: Message<X>) -> Self {
        Self { point, message }
    }

    /// The context-bound point the end-of-stream is parked at.
    pub fn point(&self) -> &Point<X> {
        &self.point
    }

    /// Lets the end-of-stream chunk move on.
    pub fn resume(self) -> Result<(), X::Error> {
        self.point.send(self.message)
    }
}

impl<X: Exchange> fmt::Debug for Resume<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resume")
            .field("point", &self.point)
            .field("message", &self.message)
            .finish()
    }
}
