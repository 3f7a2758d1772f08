//! # Pipeline - Builder of Handler Chains
//!
//! A [`Pipeline`] collects the stage handlers of a pipeline and its transport, and builds
//! the static chain of points out of them on first use.
//!
//! ## Architecture
//!
//! ```text
//!               caller
//!                 |  create(context)
//!                \|/
//!   +--------------------------------+
//!   |          PipelineHead          |   no-op, absorbs the binding pass
//!   +--------------------------------+
//!          | request         /|\ response / error
//!         \|/                 |
//!   +--------------------------------+
//!   |            stage 1             |
//!   +--------------------------------+
//!          |                 /|\
//!         \|/                 |
//!   +--------------------------------+
//!   |            stage N             |
//!   +--------------------------------+
//!          |                 /|\
//!         \|/                 |
//!   +--------------------------------+
//!   |       TransportInjector        |   binds the transport of the context
//!   +--------------------------------+
//! ```
//!
//! The chain is immutable once built and shared by every request. Per-request state lives
//! in the [`Context`] bound by [`Pipeline::create`].
//!
//! ## Example
//!
//! ```rust
//! use pipepoint::{Exchange, Hook, Pipeline, Point, handler_fn};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! struct Text;
//! impl Exchange for Text {
//!     type Request = String;
//!     type Response = String;
//!     type Error = String;
//! }
//!
//! let pipeline: Pipeline<Text> = Pipeline::new();
//! pipeline
//!     .transport(handler_fn("echo", |point: &Point<Text>| {
//!         point.on(Hook::request(|req, next| {
//!             next.point().respond(format!("echo: {req}"))?;
//!             Ok(())
//!         }))?;
//!         Ok(())
//!     }))
//!     .add_back(handler_fn("shout", |point: &Point<Text>| {
//!         point.on(Hook::response(|res: String, next| next.resume(res.to_uppercase())))?;
//!         Ok(())
//!     }));
//!
//! let reply = Rc::new(RefCell::new(None));
//! let sink = Rc::clone(&reply);
//! pipeline
//!     .create(None)?
//!     .request_with("hi".to_owned(), move |res| *sink.borrow_mut() = Some(res))?;
//!
//! assert_eq!(reply.borrow_mut().take(), Some(Ok("ECHO: HI".to_owned())));
//! # Ok::<(), pipepoint::PipelineError<String>>(())
//! ```

use crate::chain::Chain;
use crate::context::Context;
use crate::error::Result;
use crate::handler::Handler;
use crate::message::Exchange;
use crate::point::Point;
use log::debug;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Builder and owner of a handler chain.
///
/// Handlers are visited in the order they are configured by requests, and in the reverse
/// order by responses and errors. Configuration methods take `&self` and return `&Self`
/// for chaining; any change invalidates the cached chain.
///
/// # Thread Safety
///
/// Pipelines use `Rc` (not `Arc`) and are **not** thread-safe. Requests complete on the
/// thread that started them, typically inside a `LocalSet`.
pub struct Pipeline<X: Exchange> {
    handlers: RefCell<Vec<Rc<dyn Handler<X>>>>,
    transport: RefCell<Option<Rc<dyn Handler<X>>>>,
    chain: RefCell<Option<Rc<Chain<X>>>>,
}

impl<X: Exchange> Default for Pipeline<X> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X: Exchange> Pipeline<X> {
    /// Creates an empty pipeline without transport.
    pub fn new() -> Self {
        Self {
            handlers: RefCell::new(Vec::new()),
            transport: RefCell::new(None),
            chain: RefCell::new(None),
        }
    }

    /// Sets the transport terminating the chain.
    ///
    /// A transport set on a [`Context`] takes precedence for requests bound to it.
    pub fn transport(&self, transport: impl Handler<X> + 'static) -> &Self {
        *self.transport.borrow_mut() = Some(Rc::new(transport));
        self.invalidate();
        self
    }

    /// Appends a stage, visited by requests after all stages added so far.
    pub fn add_back(&self, handler: impl Handler<X> + 'static) -> &Self {
        self.handlers.borrow_mut().push(Rc::new(handler));
        self.invalidate();
        self
    }

    /// Prepends a stage, visited by requests before all stages added so far.
    pub fn add_front(&self, handler: impl Handler<X> + 'static) -> &Self {
        self.handlers.borrow_mut().insert(0, Rc::new(handler));
        self.invalidate();
        self
    }

    /// Number of configured stages, excluding the head and the transport.
    pub fn len(&self) -> usize {
        self.handlers.borrow().len()
    }

    /// Returns `true` if no stage is configured.
    pub fn is_empty(&self) -> bool {
        self.handlers.borrow().is_empty()
    }

    fn invalidate(&self) {
        self.chain.borrow_mut().take();
    }

    /// Returns the unbound head point, building the chain on first use.
    ///
    /// Repeated calls share the same chain until the pipeline is reconfigured.
    pub fn head(&self) -> Point<X> {
        let mut cached = self.chain.borrow_mut();
        let chain = cached.get_or_insert_with(|| {
            let chain = Chain::build(&self.handlers.borrow(), self.transport.borrow().clone());
            debug!("built pipeline chain of {} points", chain.len());
            chain
        });
        Point::new(Rc::clone(chain), 0)
    }

    /// Binds `context` (or a fresh one) to the head of the chain.
    ///
    /// Every stage and the transport register their hooks before this returns.
    pub fn create(&self, context: Option<Context<X>>) -> Result<Point<X>, X::Error> {
        self.head().bind(context)
    }

    /// Builds a custom facade over the pipeline.
    ///
    /// The factory only gets a [`Binder`], which can do nothing but bind contexts.
    pub fn interface<A>(&self, factory: impl FnOnce(Binder<X>) -> A) -> A {
        factory(Binder { head: self.head() })
    }
}

impl<X: Exchange> fmt::Debug for Pipeline<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.borrow();
        f.debug_struct("Pipeline")
            .field(
                "handlers",
                &handlers.iter().map(|h| h.name()).collect::<Vec<_>>(),
            )
            .field("transport", &self.transport.borrow().as_ref().map(|t| t.name()))
            .field("built", &self.chain.borrow().is_some())
            .finish()
    }
}

/// Minimal handle given to [`Pipeline::interface`] factories.
///
/// ```rust
/// use pipepoint::{Binder, Context, Exchange, Pipeline, Point, Result};
///
/// # struct Text;
/// # impl Exchange for Text {
/// #     type Request = String;
/// #     type Response = String;
/// #     type Error = String;
/// # }
/// struct Client {
///     binder: Binder<Text>,
/// }
///
/// impl Client {
///     fn session(&self, user: &str) -> Result<Point<Text>, String> {
///         let ctx = Context::new();
///         ctx.insert("user", user.to_owned());
///         self.binder.bind(Some(ctx))
///     }
/// }
///
/// let pipeline: Pipeline<Text> = Pipeline::new();
/// let client = pipeline.interface(|binder| Client { binder });
/// # let _ = client;
/// ```
pub struct Binder<X: Exchange> {
    head: Point<X>,
}

impl<X: Exchange> Binder<X> {
    /// Binds `context` (or a fresh one) to the head of the chain.
    pub fn bind(&self, context: Option<Context<X>>) -> Result<Point<X>, X::Error> {
        self.head.bind(context)
    }
}

impl<X: Exchange> Clone for Binder<X> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
        }
    }
}

impl<X: Exchange> fmt::Debug for Binder<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder").field("head", &self.head).finish()
    }
}
