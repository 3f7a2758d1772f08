//! # Point - Pipeline Node and Dispatcher
//!
//! A [`Point`] is one node of a built chain. The chain itself is static and shared by
//! every request; a point becomes useful once it is bound to a [`Context`], which turns
//! it into a lightweight per-request view of the same node.
//!
//! ## Message Flow
//!
//! ```text
//!   caller
//!     |  request()                                     /|\ response / error
//!    \|/                                                |
//!  +------+   next   +---------+   next   +---------+   next   +-----------+
//!  | head | -------> | stage 1 | -------> | stage N | -------> | transport |
//!  +------+ <------- +---------+ <------- +---------+ <------- +-----------+
//!             prev                prev                 prev
//! ```
//!
//! Every message is dispatched at each point it reaches:
//!
//! - **context**: the stage handler runs synchronously so it can register hooks.
//! - **request / response / error / data**: the hook registered for the exact message
//!   type is invoked with the payload and a [`Next`] continuation. The message moves on
//!   only when the continuation is resumed. Without a hook the message passes through.
//! - **end of stream**: when no data hook is registered, a `request:end` /
//!   `response:end` hook gets a [`Resume`] continuation instead.
//!
//! A message running out of neighbours terminates silently, except an `error`, which is
//! returned as [`PipelineError::Unhandled`] from the call that dispatched it.

use crate::chain::{Chain, PointId, Stage};
use crate::context::Context;
use crate::error::{PipelineError, Result};
use crate::hook::{Hook, Next, Resume, SyncSlot};
use crate::message::{Body, Direction, Exchange, HookKind, Message, MessageKind};
use crate::stream::{RequestWriter, ResponseWriter, StreamWriter};
use futures::channel::oneshot;
use log::{debug, trace};
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

/// A node of a pipeline chain, optionally bound to a request context.
///
/// Cloning a point is cheap: it shares the chain and the context.
pub struct Point<X: Exchange> {
    chain: Rc<Chain<X>>,
    index: usize,
    context: Option<Context<X>>,
}

impl<X: Exchange> Clone for Point<X> {
    fn clone(&self) -> Self {
        Self {
            chain: Rc::clone(&self.chain),
            index: self.index,
            context: self.context.clone(),
        }
    }
}

impl<X: Exchange> fmt::Debug for Point<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Point")
            .field("name", &self.name())
            .field("id", &self.id())
            .field("bound", &self.context.is_some())
            .finish()
    }
}

impl<X: Exchange> Point<X> {
    pub(crate) fn new(chain: Rc<Chain<X>>, index: usize) -> Self {
        Self {
            chain,
            index,
            context: None,
        }
    }

    fn stage(&self) -> &Stage<X> {
        self.chain.stage(self.index)
    }

    /// Identity shared by the static point and all its context-bound copies.
    pub fn id(&self) -> PointId {
        self.stage().id
    }

    /// Name of the stage handler.
    pub fn name(&self) -> &str {
        self.stage().handler.name()
    }

    /// Returns `true` for the caller-facing head of the chain.
    pub fn is_head(&self) -> bool {
        self.stage().prev.is_none()
    }

    /// Returns `true` for the transport end of the chain.
    pub fn is_tail(&self) -> bool {
        self.stage().next.is_none()
    }

    /// The context this point is bound to.
    pub fn context(&self) -> Option<&Context<X>> {
        self.context.as_ref()
    }

    /// Context-bound copy of this point; the static point is left untouched.
    fn bound_to(&self, context: Context<X>) -> Self {
        Self {
            chain: Rc::clone(&self.chain),
            index: self.index,
            context: Some(context),
        }
    }

    fn require_context(&self) -> Result<&Context<X>, X::Error> {
        self.context.as_ref().ok_or(PipelineError::MissingContext)
    }

    fn ensure_bound(&self) -> Result<Point<X>, X::Error> {
        match self.context {
            Some(_) => Ok(self.clone()),
            None => self.bind(None),
        }
    }

    /// Binds `context` (or a fresh one) to this point and initializes the chain.
    ///
    /// When this point already carries a context, the new context inherits its
    /// non-reserved values and its transport override. The hook registry always starts
    /// empty. Every stage after this point is then bound synchronously, in forward order,
    /// so all hooks are registered before any traffic.
    pub fn bind(&self, context: Option<Context<X>>) -> Result<Point<X>, X::Error> {
        let context = context.unwrap_or_default();
        if let Some(parent) = &self.context {
            context.inherit(parent);
        }
        context.reset_hooks();

        let point = self.bound_to(context.clone());
        debug!("binding context at {} ({})", point.name(), point.id());
        point.send(Message::context_pass(context))?;
        Ok(point)
    }

    /// Registers `hook` for this point and context.
    ///
    /// Fails with [`PipelineError::DuplicateHook`] if a hook of the same kind is already
    /// registered here.
    pub fn on(&self, hook: Hook<X>) -> Result<&Self, X::Error> {
        self.require_context()?.register(self.id(), hook, false)?;
        Ok(self)
    }

    /// Registers `hook` for its first invocation only.
    pub fn once(&self, hook: Hook<X>) -> Result<&Self, X::Error> {
        self.require_context()?.register(self.id(), hook, true)?;
        Ok(self)
    }

    /// Queues a request to be sent on the next [`flush`](Point::flush).
    ///
    /// Binds a fresh context first if this point has none and returns the bound point, so
    /// the caller can register hooks on it before the request starts flowing. In
    /// request-streaming mode the request is sent immediately.
    pub fn request(&self, payload: X::Request) -> Result<Point<X>, X::Error> {
        let point = self.ensure_bound()?;
        let context = point.require_context()?;
        if context.is_request_stream() {
            point.send(Message::request(payload))?;
        } else {
            trace!("deferring request at {}", point.name());
            context.defer(Deferred::new(&point, Message::request(payload)));
        }
        Ok(point)
    }

    /// Sends a request immediately and reports its outcome to `callback`.
    ///
    /// One-shot `error` and `response` hooks are registered before the request is sent,
    /// so the reply cannot be missed. The callback runs at most once.
    pub fn request_with<F>(&self, payload: X::Request, callback: F) -> Result<Point<X>, X::Error>
    where
        F: FnOnce(std::result::Result<X::Response, X::Error>) + 'static,
    {
        let point = self.ensure_bound()?;
        let on_response = Rc::new(RefCell::new(Some(callback)));
        let on_error = Rc::clone(&on_response);
        point
            .once(Hook::error(move |err, _next| {
                let callback = on_error.borrow_mut().take();
                if let Some(callback) = callback {
                    callback(Err(err));
                }
                Ok(())
            }))?
            .once(Hook::response(move |res, _next| {
                let callback = on_response.borrow_mut().take();
                if let Some(callback) = callback {
                    callback(Ok(res));
                }
                Ok(())
            }))?;
        point.send(Message::request(payload))?;
        Ok(point)
    }

    /// Sends a request immediately and resolves with its response.
    ///
    /// The future fails with [`PipelineError::Rejected`] when an application error comes
    /// back, and with [`PipelineError::Abandoned`] when the exchange is dropped before
    /// anything comes back.
    pub fn call(
        &self,
        payload: X::Request,
    ) -> impl Future<Output = Result<X::Response, X::Error>> + use<X> {
        let (tx, rx) = oneshot::channel();
        let sent = self
            .request_with(payload, move |result| {
                let _ = tx.send(result);
            })
            .map(drop);

        async move {
            sent?;
            match rx.await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(err)) => Err(PipelineError::Rejected(err)),
                Err(oneshot::Canceled) => Err(PipelineError::Abandoned),
            }
        }
    }

    /// Dispatches every request deferred on this point's context, in order.
    pub fn flush(&self) -> Result<(), X::Error> {
        let context = self.require_context()?;
        while let Some(deferred) = context.pop_deferred() {
            deferred.dispatch(context)?;
        }
        Ok(())
    }

    /// Sends a response backward, immediately.
    pub fn respond(&self, payload: X::Response) -> Result<&Self, X::Error> {
        self.send(Message::response(payload))?;
        Ok(self)
    }

    /// Sends an application error backward.
    ///
    /// If no `error` hook intercepts it, the error comes back as
    /// [`PipelineError::Unhandled`].
    pub fn throw(&self, err: X::Error) -> Result<(), X::Error> {
        self.send(Message::error(err))
    }

    /// Starts a request stream: sends `payload` as the request right away and returns a
    /// writer for the `request:data` chunks.
    pub fn stream_request(&self, payload: X::Request) -> Result<RequestWriter<X>, X::Error> {
        let point = self.ensure_bound()?;
        point.require_context()?.set_request_stream();
        let point = point.request(payload)?;
        Ok(StreamWriter::request(point))
    }

    /// Starts a response stream: responds with `payload` and returns a writer for the
    /// `response:data` chunks.
    pub fn stream_response(&self, payload: X::Response) -> Result<ResponseWriter<X>, X::Error> {
        self.require_context()?.set_response_stream();
        self.respond(payload)?;
        Ok(StreamWriter::response(self.clone()))
    }

    /// Moves `message` to the neighbour in its direction.
    ///
    /// The current context is attached to the message if it has none. Without a
    /// neighbour the message terminates, except an `error`, which is returned as
    /// [`PipelineError::Unhandled`].
    pub fn send(&self, mut message: Message<X>) -> Result<(), X::Error> {
        let neighbour = match message.direction {
            Direction::Forward => self.stage().next,
            Direction::Backward => self.stage().prev,
        };

        let Some(index) = neighbour else {
            return match message.body {
                Body::Error(err) => Err(PipelineError::Unhandled(err)),
                _ => {
                    debug!(
                        "{} reached end of pipeline at {}",
                        message.kind(),
                        self.name()
                    );
                    Ok(())
                }
            };
        };

        if message.context.is_none() {
            message.context = Some(self.require_context()?.clone());
        }
        Point::new(Rc::clone(&self.chain), index).process(message)
    }

    fn process(&self, message: Message<X>) -> Result<(), X::Error> {
        let context = message
            .context
            .clone()
            .ok_or(PipelineError::MissingContext)?;
        let point = self.bound_to(context);

        let Some(kind) = message.kind().hook_kind() else {
            trace!("binding {} ({})", point.name(), point.id());
            point.stage().handler.bind(&point)?;
            return point.send(message);
        };

        match point.require_context()?.take_hook(point.id(), kind) {
            Some(hook) => point.invoke(hook, message),
            None => point.complete(message),
        }
    }

    /// Continues a message that a hook is done with, or that no hook wanted.
    ///
    /// The end-of-stream chunk is offered to the end hook of its direction first.
    pub(crate) fn complete(&self, message: Message<X>) -> Result<(), X::Error> {
        if message.is_end_of_stream() {
            let kind = match message.kind() {
                MessageKind::RequestData => HookKind::RequestEnd,
                _ => HookKind::ResponseEnd,
            };
            let hook = self
                .context
                .as_ref()
                .and_then(|context| context.take_hook(self.id(), kind));
            if let Some(Hook::RequestEnd(f) | Hook::ResponseEnd(f)) = hook {
                trace!("invoking {} hook at {}", kind, self.name());
                return f(Resume::new(self.clone(), message));
            }
        }
        self.send(message)
    }

    fn invoke(&self, hook: Hook<X>, message: Message<X>) -> Result<(), X::Error> {
        let Message {
            body,
            direction,
            context,
            synchronous,
        } = message;
        let slot = synchronous.then(SyncSlot::<X>::open);
        trace!(
            "invoking {} hook at {} ({})",
            hook.kind(),
            self.name(),
            self.id()
        );

        let outcome = match (hook, body) {
            (Hook::Request(f), Body::Request(payload)) => f(
                payload,
                Next::new(self.clone(), direction, Body::Request, slot.clone()),
            ),
            (Hook::Response(f), Body::Response(payload)) => f(
                payload,
                Next::new(self.clone(), direction, Body::Response, slot.clone()),
            ),
            (Hook::Error(f), Body::Error(err)) => f(
                err,
                Next::new(self.clone(), direction, Body::Error, slot.clone()),
            ),
            (Hook::RequestData(f), Body::RequestData(chunk)) => f(
                chunk,
                Next::new(self.clone(), direction, Body::RequestData, slot.clone()),
            ),
            (Hook::ResponseData(f), Body::ResponseData(chunk)) => f(
                chunk,
                Next::new(self.clone(), direction, Body::ResponseData, slot.clone()),
            ),
            // hooks are looked up under the hook kind of the message
            _ => unreachable!("hook registered under a foreign message kind"),
        };

        let Some(slot) = slot else {
            return outcome;
        };
        let resumed = slot.borrow_mut().close();
        outcome?;
        match resumed {
            Some(body) => self.send(Message::from_parts(body, direction, context, true)),
            None => {
                debug!("synchronous message not resumed at {}", self.name());
                Ok(())
            }
        }
    }
}

/// A send queued on a context until the caller flushes it.
pub(crate) struct Deferred<X: Exchange> {
    chain: Rc<Chain<X>>,
    index: usize,
    message: Message<X>,
}

impl<X: Exchange> Deferred<X> {
    fn new(point: &Point<X>, message: Message<X>) -> Self {
        Self {
            chain: Rc::clone(&point.chain),
            index: point.index,
            message,
        }
    }

    fn dispatch(self, context: &Context<X>) -> Result<(), X::Error> {
        let point = Point::new(self.chain, self.index).bound_to(context.clone());
        point.send(self.message)
    }
}
