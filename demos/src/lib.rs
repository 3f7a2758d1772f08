//! # pipepoint demos
//!
//! Building blocks shared by the examples: a line-oriented [`Line`] exchange, a logging
//! stage, a command service answering requests in-process and a TCP transport
//! forwarding requests to a remote command service.
//!
//! ## Running Examples
//!
//! ```bash
//! cargo run --example rpc_server_tcp -- --debug
//! cargo run --example rpc_client_tcp -- --debug
//! ```
//!
//! The wire protocol is one request line per exchange, answered by one `OK <response>` or
//! `ERR <reason>` line.

#![warn(rust_2018_idioms)]

use anyhow::anyhow;
use log::{info, trace, warn};
use pipepoint::{Context, Exchange, Handler, Hook, Pipeline, PipelineError, Point, Result};
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

/// Context key of the remote peer a request came from.
pub const PEER_KEY: &str = "peer";

const STARTED_KEY: &str = "$started";

/// Text requests and responses, `anyhow` errors.
pub struct Line;

impl Exchange for Line {
    type Request = String;
    type Response = String;
    type Error = anyhow::Error;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Logs every exchange with its latency.
pub struct LoggingStage;

impl Handler<Line> for LoggingStage {
    fn name(&self) -> &str {
        "LoggingStage"
    }

    fn bind(&self, point: &Point<Line>) -> Result<(), anyhow::Error> {
        point.on(Hook::request(|req, next| {
            let peer = next.point().context().and_then(|ctx| {
                ctx.insert(STARTED_KEY, Instant::now());
                ctx.get::<SocketAddr>(PEER_KEY)
            });
            match peer {
                Some(peer) => info!("--> {req} from {peer}"),
                None => info!("--> {req}"),
            }
            next.resume(req)
        }))?;
        point.on(Hook::response(|res, next| {
            info!("<-- {res} ({:?})", elapsed(next.point()));
            next.resume(res)
        }))?;
        point.on(Hook::error(|err, next| {
            warn!("<-- error: {err} ({:?})", elapsed(next.point()));
            next.resume(err)
        }))?;
        Ok(())
    }
}

fn elapsed(point: &Point<Line>) -> Duration {
    point
        .context()
        .and_then(|ctx| ctx.get::<Instant>(STARTED_KEY))
        .map(|started| started.elapsed())
        .unwrap_or_default()
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Transport answering simple text commands in-process.
pub struct CommandService;

impl CommandService {
    /// Runs one command line: `ping`, `echo <text>`, `upper <text>` or `reverse <text>`.
    pub fn execute(line: &str) -> anyhow::Result<String> {
        let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "ping" => Ok("pong".to_owned()),
            "echo" => Ok(arg.to_owned()),
            "upper" => Ok(arg.to_uppercase()),
            "reverse" => Ok(arg.chars().rev().collect()),
            "" => Err(anyhow!("empty request")),
            other => Err(anyhow!("unknown command `{other}`")),
        }
    }
}

impl Handler<Line> for CommandService {
    fn name(&self) -> &str {
        "CommandService"
    }

    fn bind(&self, point: &Point<Line>) -> Result<(), anyhow::Error> {
        point.on(Hook::request(|req: String, next| {
            match CommandService::execute(req.trim()) {
                Ok(res) => next.point().respond(res).map(drop),
                Err(err) => next.point().throw(err),
            }
        }))?;
        Ok(())
    }
}

/// Runs one request line through `pipeline` and encodes the outcome as a reply line.
pub async fn serve(pipeline: &Pipeline<Line>, context: Context<Line>, line: String) -> String {
    let outcome = match pipeline.create(Some(context)) {
        Ok(point) => point.call(line).await,
        Err(err) => Err(err),
    };
    match outcome {
        Ok(res) => format!("OK {res}"),
        Err(PipelineError::Rejected(err)) => format!("ERR {err}"),
        Err(err) => {
            warn!("pipeline failure: {err}");
            format!("ERR {err}")
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// Transport forwarding each request over one shared TCP connection.
///
/// Requests are answered in order; concurrent requests wait for the connection.
#[derive(Clone)]
pub struct TcpTransport {
    conn: Rc<Mutex<Connection>>,
}

impl TcpTransport {
    /// Connects to a command server at `addr`.
    pub async fn connect(addr: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        info!("connected to {}", stream.peer_addr()?);
        let (reader, writer) = stream.into_split();
        Ok(Self {
            conn: Rc::new(Mutex::new(Connection {
                reader: BufReader::new(reader),
                writer,
            })),
        })
    }
}

async fn roundtrip(conn: Rc<Mutex<Connection>>, req: String) -> anyhow::Result<String> {
    let mut conn = conn.lock().await;
    conn.writer.write_all(format!("{req}\n").as_bytes()).await?;

    let mut line = String::new();
    let n = conn.reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(anyhow!("connection closed by peer"));
    }
    trace!("stream read {} bytes", n);
    decode_reply(line.trim_end())
}

/// Decodes an `OK <response>` / `ERR <reason>` reply line.
pub fn decode_reply(line: &str) -> anyhow::Result<String> {
    if let Some(reason) = line.strip_prefix("ERR ") {
        return Err(anyhow!("{reason}"));
    }
    line.strip_prefix("OK ")
        .or_else(|| line.strip_prefix("OK"))
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("malformed reply `{line}`"))
}

impl Handler<Line> for TcpTransport {
    fn name(&self) -> &str {
        "TcpTransport"
    }

    fn bind(&self, point: &Point<Line>) -> Result<(), anyhow::Error> {
        let conn = Rc::clone(&self.conn);
        point.on(Hook::request(move |req, next| {
            let conn = Rc::clone(&conn);
            tokio::task::spawn_local(async move {
                let point = next.point();
                let completed = match roundtrip(conn, req).await {
                    Ok(res) => point.respond(res).map(drop),
                    Err(err) => point.throw(err),
                };
                if let Err(err) = completed {
                    warn!("completing request failed: {err}");
                }
            });
            Ok(())
        }))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn service() -> Pipeline<Line> {
        let pipeline: Pipeline<Line> = Pipeline::new();
        pipeline.transport(CommandService).add_back(LoggingStage);
        pipeline
    }

    #[test]
    fn commands_are_answered() {
        let pipeline = service();
        let reply = block_on(serve(&pipeline, Context::new(), "upper abc".to_owned()));
        assert_eq!(reply, "OK ABC");
        let reply = block_on(serve(&pipeline, Context::new(), "reverse abc".to_owned()));
        assert_eq!(reply, "OK cba");
    }

    #[test]
    fn unknown_commands_are_rejected() {
        let pipeline = service();
        let reply = block_on(serve(&pipeline, Context::new(), "launch".to_owned()));
        assert_eq!(reply, "ERR unknown command `launch`");
    }

    #[test]
    fn started_marker_is_not_inherited() {
        let pipeline = service();
        let outer = pipeline.create(None).unwrap();
        outer
            .context()
            .unwrap()
            .insert(STARTED_KEY, Instant::now());
        let inner = outer.bind(None).unwrap();
        assert!(!inner.context().unwrap().contains(STARTED_KEY));
    }

    #[test]
    fn replies_decode() {
        assert_eq!(decode_reply("OK pong").unwrap(), "pong");
        assert_eq!(decode_reply("OK").unwrap(), "");
        assert_eq!(decode_reply("ERR nope").unwrap_err().to_string(), "nope");
        assert!(decode_reply("??").is_err());
    }
}
