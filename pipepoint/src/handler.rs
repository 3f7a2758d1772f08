//! # Handler Trait - Pipeline Stages
//!
//! A [`Handler`] is the static part of a pipeline stage: its behaviour and its
//! configuration. It is invoked exactly once per context, during the synchronous
//! binding pass, with the context-bound [`Point`] of its stage. There it subscribes to the
//! message types it cares about:
//!
//! ```rust
//! use pipepoint::{Exchange, Handler, Hook, Point, Result};
//!
//! struct Text;
//! impl Exchange for Text {
//!     type Request = String;
//!     type Response = String;
//!     type Error = String;
//! }
//!
//! /// Upper-cases every response on its way back to the caller.
//! struct Shout;
//!
//! impl Handler<Text> for Shout {
//!     fn name(&self) -> &str {
//!         "Shout"
//!     }
//!
//!     fn bind(&self, point: &Point<Text>) -> Result<(), String> {
//!         point.on(Hook::response(|res: String, next| next.resume(res.to_uppercase())))?;
//!         Ok(())
//!     }
//! }
//! ```
//!
//! ## Transports
//!
//! A transport is a handler installed at the end of the chain. It subscribes to
//! `request` (or `request:data`) and eventually calls
//! [`Point::respond`], [`Point::stream_response`] or [`Point::throw`]. The terminal stage
//! resolves it per context: a transport set with
//! [`Context::set_transport`](crate::Context::set_transport) wins over the one configured
//! on the [`Pipeline`](crate::Pipeline).
//!
//! ## Closures and configuration
//!
//! [`handler_fn`] turns a closure into a handler and [`with_config`] pairs a closure with
//! an opaque configuration value handed to it on every binding.

use crate::error::{PipelineError, Result};
use crate::message::Exchange;
use crate::point::Point;
use log::trace;
use std::borrow::Cow;
use std::rc::Rc;

/// Name of the no-op stage at the head of every chain.
pub const RESERVED_HEAD_NAME: &str = "PipelineHead";

/// Name of the transport-injection stage at the tail of every chain.
pub const RESERVED_TRANSPORT_NAME: &str = "TransportInjector";

/// A pipeline stage.
pub trait Handler<X: Exchange> {
    /// Returns the stage name, used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called once per context with the context-bound point of this stage.
    ///
    /// Register hooks here with [`Point::on`] / [`Point::once`]. Errors abort the binding
    /// and are returned to the caller of [`Point::bind`].
    fn bind(&self, point: &Point<X>) -> Result<(), X::Error>;
}

impl<X: Exchange, H: Handler<X> + ?Sized> Handler<X> for Rc<H> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn bind(&self, point: &Point<X>) -> Result<(), X::Error> {
        (**self).bind(point)
    }
}

impl<X: Exchange, H: Handler<X> + ?Sized> Handler<X> for Box<H> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn bind(&self, point: &Point<X>) -> Result<(), X::Error> {
        (**self).bind(point)
    }
}

/// Handler backed by a closure, see [`handler_fn`].
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

/// Wraps `f` into a [`Handler`] named `name`.
///
/// ```rust
/// use pipepoint::{Exchange, Hook, handler_fn};
///
/// # struct Text;
/// # impl Exchange for Text {
/// #     type Request = String;
/// #     type Response = String;
/// #     type Error = String;
/// # }
/// let echo = handler_fn("echo", |point: &pipepoint::Point<Text>| {
///     point.on(Hook::request(|req, next| {
///         next.point().respond(req)?;
///         Ok(())
///     }))?;
///     Ok(())
/// });
/// # let _ = echo;
/// ```
pub fn handler_fn<X, F>(name: impl Into<Cow<'static, str>>, f: F) -> HandlerFn<F>
where
    X: Exchange,
    F: Fn(&Point<X>) -> Result<(), X::Error>,
{
    HandlerFn {
        name: name.into(),
        f,
    }
}

impl<X, F> Handler<X> for HandlerFn<F>
where
    X: Exchange,
    F: Fn(&Point<X>) -> Result<(), X::Error>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&self, point: &Point<X>) -> Result<(), X::Error> {
        (self.f)(point)
    }
}

/// Handler function paired with its static configuration, see [`with_config`].
pub struct Configured<F, C> {
    name: Cow<'static, str>,
    f: F,
    config: C,
}

/// Pairs `f` with `config`; every binding calls `f(point, &config)`.
pub fn with_config<X, F, C>(
    name: impl Into<Cow<'static, str>>,
    f: F,
    config: C,
) -> Configured<F, C>
where
    X: Exchange,
    F: Fn(&Point<X>, &C) -> Result<(), X::Error>,
{
    Configured {
        name: name.into(),
        f,
        config,
    }
}

impl<F, C> Configured<F, C> {
    /// Returns the configuration value.
    pub fn config(&self) -> &C {
        &self.config
    }
}

impl<X, F, C> Handler<X> for Configured<F, C>
where
    X: Exchange,
    F: Fn(&Point<X>, &C) -> Result<(), X::Error>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&self, point: &Point<X>) -> Result<(), X::Error> {
        (self.f)(point, &self.config)
    }
}

/// No-op stage prepended to every chain; it absorbs the initial binding message.
pub(crate) struct Head;

impl<X: Exchange> Handler<X> for Head {
    fn name(&self) -> &str {
        RESERVED_HEAD_NAME
    }

    fn bind(&self, _point: &Point<X>) -> Result<(), X::Error> {
        Ok(())
    }
}

/// Terminal stage resolving the transport for the bound context.
pub(crate) struct TransportInjector<X: Exchange> {
    transport: Option<Rc<dyn Handler<X>>>,
}

impl<X: Exchange> TransportInjector<X> {
    pub(crate) fn new(transport: Option<Rc<dyn Handler<X>>>) -> Self {
        Self { transport }
    }
}

impl<X: Exchange> Handler<X> for TransportInjector<X> {
    fn name(&self) -> &str {
        RESERVED_TRANSPORT_NAME
    }

    fn bind(&self, point: &Point<X>) -> Result<(), X::Error> {
        let context = point.context().ok_or(PipelineError::MissingContext)?;
        let transport = context
            .transport()
            .or_else(|| self.transport.clone())
            .ok_or(PipelineError::MissingTransport)?;
        trace!("injecting transport {}", transport.name());
        transport.bind(point)
    }
}
