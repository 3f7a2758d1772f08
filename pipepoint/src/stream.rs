//! Writers for request and response streams.

use crate::error::{PipelineError, Result};
use crate::message::{Body, Direction, Exchange, Message};
use crate::point::Point;
use log::trace;
use std::fmt;

/// Writes data chunks from a point in one direction.
///
/// Every chunk is sent immediately as a `request:data` or `response:data` message.
/// [`end`](StreamWriter::end) sends the end-of-stream sentinel; after that the writer is
/// closed and further writes fail with [`PipelineError::StreamClosed`].
pub struct StreamWriter<X: Exchange, T> {
    point: Point<X>,
    direction: Direction,
    wrap: fn(Option<T>) -> Body<X>,
    closed: bool,
}

/// Writer of `request:data` chunks, see [`Point::stream_request`].
pub type RequestWriter<X> = StreamWriter<X, <X as Exchange>::Request>;

/// Writer of `response:data` chunks, see [`Point::stream_response`].
pub type ResponseWriter<X> = StreamWriter<X, <X as Exchange>::Response>;

impl<X: Exchange> StreamWriter<X, X::Request> {
    pub(crate) fn request(point: Point<X>) -> Self {
        Self {
            point,
            direction: Direction::Forward,
            wrap: Body::RequestData,
            closed: false,
        }
    }
}

impl<X: Exchange> StreamWriter<X, X::Response> {
    pub(crate) fn response(point: Point<X>) -> Self {
        Self {
            point,
            direction: Direction::Backward,
            wrap: Body::ResponseData,
            closed: false,
        }
    }
}

impl<X: Exchange, T> StreamWriter<X, T> {
    /// Sends one chunk.
    pub fn write(&mut self, chunk: T) -> Result<&mut Self, X::Error> {
        self.push(Some(chunk))?;
        Ok(self)
    }

    /// Ends the stream and returns the point it was written from.
    pub fn end(&mut self) -> Result<Point<X>, X::Error> {
        self.push(None)?;
        Ok(self.point.clone())
    }

    /// Returns `true` once the stream has been ended.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The point chunks are written from.
    pub fn point(&self) -> &Point<X> {
        &self.point
    }

    fn push(&mut self, chunk: Option<T>) -> Result<(), X::Error> {
        if self.closed {
            return Err(PipelineError::StreamClosed);
        }
        if chunk.is_none() {
            trace!("closing stream at {}", self.point.name());
            self.closed = true;
        }
        let message = Message::from_parts((self.wrap)(chunk), self.direction, None, false);
        self.point.send(message)
    }
}

impl<X: Exchange, T> fmt::Debug for StreamWriter<X, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamWriter")
            .field("point", &self.point)
            .field("direction", &self.direction)
            .field("closed", &self.closed)
            .finish()
    }
}
