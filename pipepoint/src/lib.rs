//! # pipepoint - Bidirectional Request/Response Pipelines
//!
//! `pipepoint` composes a client-side request/response exchange out of small stages. A
//! request travels from the caller through every stage to a pluggable transport; the
//! response, or an error, travels back through the same stages in reverse order. Any stage
//! can transform, short-circuit, retry or stream the messages it sees.
//!
//! ## Core Concepts
//!
//! ### Pipeline
//!
//! The [`Pipeline`] collects [`Handler`]s and a transport and builds a static chain of
//! [`Point`]s out of them, once. The chain is shared read-only by every request.
//!
//! ### Context
//!
//! Each logical request binds its own [`Context`] to the chain. Binding runs every stage
//! handler once, synchronously and in order, so each stage can register its hooks for
//! that request before any message flows. Two requests on the same chain never see each
//! other's hooks.
//!
//! ### Hooks and continuations
//!
//! A [`Hook`] subscribes a stage to one message type. It receives the payload and a
//! continuation ([`Next`]); the message waits at the stage until the continuation is
//! resumed, which may happen later from any task on the same thread.
//!
//! ## Message Flow
//!
//! ```text
//!                        | request()                       /|\ response / error
//!   +--------------------+----------------------------------+-----------------+
//!   |                    |        Pipeline                  |                 |
//!   |                   \|/                                 |                 |
//!   |    +---------------+----------------------------------+----------+      |
//!   |    |                        PipelineHead                         |      |
//!   |    +---------------+----------------------------------+----------+      |
//!   |                    |                                 /|\                |
//!   |                   \|/                                 |                 |
//!   |    +---------------+----------------------------------+----------+      |
//!   |    |                          Stage 1                            |      |
//!   |    +---------------+----------------------------------+----------+      |
//!   |                    |                                 /|\                |
//!   |                   \|/                                 |                 |
//!   |    +---------------+----------------------------------+----------+      |
//!   |    |                          Stage N                            |      |
//!   |    +---------------+----------------------------------+----------+      |
//!   |                    |                                 /|\                |
//!   |                   \|/                                 |                 |
//!   |    +---------------+----------------------------------+----------+      |
//!   |    |               TransportInjector -> transport                |      |
//!   |    +-------------------------------------------------------------+      |
//!   +-------------------------------------------------------------------------+
//! ```
//!
//! ## Example: Retrying Stage
//!
//! A stage can re-issue a request from its own point, which makes retrying a few lines:
//!
//! ```rust
//! use pipepoint::{Exchange, Hook, Pipeline, Point, handler_fn};
//! use std::cell::{Cell, RefCell};
//! use std::rc::Rc;
//!
//! struct Text;
//! impl Exchange for Text {
//!     type Request = String;
//!     type Response = String;
//!     type Error = String;
//! }
//!
//! let attempts = Rc::new(Cell::new(0));
//! let counter = Rc::clone(&attempts);
//!
//! let pipeline: Pipeline<Text> = Pipeline::new();
//! pipeline
//!     .transport(handler_fn("flaky", move |point: &Point<Text>| {
//!         let counter = Rc::clone(&counter);
//!         point.on(Hook::request(move |req, next| {
//!             counter.set(counter.get() + 1);
//!             if counter.get() < 2 {
//!                 next.point().throw("busy".to_owned())
//!             } else {
//!                 next.point().respond(req)?;
//!                 Ok(())
//!             }
//!         }))?;
//!         Ok(())
//!     }))
//!     .add_back(handler_fn("retry", |point: &Point<Text>| {
//!         let last = Rc::new(RefCell::new(None::<String>));
//!         let seen = Rc::clone(&last);
//!         point.on(Hook::request(move |req: String, next| {
//!             *seen.borrow_mut() = Some(req.clone());
//!             next.resume(req)
//!         }))?;
//!         point.once(Hook::error(move |_err, next| {
//!             let req = last.borrow_mut().take().unwrap_or_default();
//!             next.point().request(req)?;
//!             next.point().flush()
//!         }))?;
//!         Ok(())
//!     }));
//!
//! let reply = Rc::new(RefCell::new(None));
//! let sink = Rc::clone(&reply);
//! pipeline
//!     .create(None)?
//!     .request_with("ping".to_owned(), move |res| *sink.borrow_mut() = Some(res))?;
//!
//! assert_eq!(reply.borrow_mut().take(), Some(Ok("ping".to_owned())));
//! assert_eq!(attempts.get(), 2);
//! # Ok::<(), pipepoint::PipelineError<String>>(())
//! ```
//!
//! ## Streaming
//!
//! [`Point::stream_request`] and [`Point::stream_response`] return a [`StreamWriter`]
//! sending `request:data` / `response:data` chunks. `None` is the end-of-stream chunk; a
//! stage that only cares about the end of a stream can subscribe to `request:end` /
//! `response:end` instead of every chunk.

#![warn(rust_2018_idioms)]
#![allow(dead_code)]
#![warn(missing_docs)]

pub(crate) mod chain;
pub(crate) mod context;
pub(crate) mod error;
pub(crate) mod handler;
pub(crate) mod hook;
pub(crate) mod message;
pub(crate) mod pipeline;
pub(crate) mod point;
pub(crate) mod stream;

pub use chain::PointId;
pub use context::{Context, RESERVED_PREFIX, is_reserved};
pub use error::{PipelineError, Result};
pub use handler::{
    Configured, Handler, HandlerFn, RESERVED_HEAD_NAME, RESERVED_TRANSPORT_NAME, handler_fn,
    with_config,
};
pub use hook::{Hook, Next, Resume};
pub use message::{Direction, Exchange, HookKind, Message, MessageKind};
pub use pipeline::{Binder, Pipeline};
pub use point::Point;
pub use stream::{RequestWriter, ResponseWriter, StreamWriter};
