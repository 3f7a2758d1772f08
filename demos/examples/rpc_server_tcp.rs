use clap::Parser;
use log::{error, info, trace, warn};
use std::{io::Write, net::SocketAddr, rc::Rc, str::FromStr};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::broadcast,
    task::{JoinSet, LocalSet},
};

use pipepoint::{Context, Pipeline};
use pipepoint_demos::{CommandService, Line, LoggingStage, PEER_KEY, serve};

#[derive(Parser)]
#[command(name = "RPC Server TCP")]
#[command(author = "Rusty Rain <y@liu.mx>")]
#[command(version = "0.0.0")]
#[command(about = "An example of line based rpc server tcp", long_about = None)]
struct Cli {
    #[arg(short, long)]
    debug: bool,
    #[arg(long, default_value_t = format!("0.0.0.0"))]
    host: String,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    #[arg(long, default_value_t = format!("INFO"))]
    log_level: String,
}

fn build_pipeline() -> Rc<Pipeline<Line>> {
    let pipeline: Pipeline<Line> = Pipeline::new();
    pipeline.transport(CommandService).add_back(LoggingStage);
    Rc::new(pipeline)
}

async fn process_connection(
    stream: TcpStream,
    mut stop_rx: broadcast::Receiver<()>,
    pipeline: Rc<Pipeline<Line>>,
) -> anyhow::Result<()> {
    let peer: SocketAddr = stream.peer_addr()?;
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                trace!("connection {peer} exit loop");
                break;
            }
            res = lines.next_line() => {
                match res {
                    Ok(Some(line)) => {
                        let context = Context::new();
                        context.insert(PEER_KEY, peer);
                        let reply = serve(&pipeline, context, line).await;
                        if let Err(err) = writer.write_all(format!("{reply}\n").as_bytes()).await {
                            warn!("stream write error {}", err);
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!("stream read error {}", err);
                        break;
                    }
                }
            }
        }
    }

    trace!("tcp connection on {} is gracefully down", peer);
    Ok(())
}

async fn run(mut stop_rx: broadcast::Receiver<()>, host: String, port: u16) -> anyhow::Result<()> {
    let pipeline = build_pipeline();
    let mut workers = JoinSet::new();

    let listener = TcpListener::bind(format!("{host}:{port}")).await?;

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                trace!("listener exit loop");
                break;
            }
            res = listener.accept() => {
                match res {
                    Ok((stream, addr)) => {
                        info!("Connection from {addr}");
                        let stream_stop_rx = stop_rx.resubscribe();
                        let pipeline = Rc::clone(&pipeline);
                        workers.spawn_local(async move {
                            if let Err(err) = process_connection(stream, stream_stop_rx, pipeline).await {
                                error!("process_connection got error: {}", err);
                            }
                        });
                    }
                    Err(err) => {
                        warn!("listener accept error {}", err);
                        break;
                    }
                }
            }
        }
    }

    info!("Wait for Gracefully Shutdown...");
    while workers.join_next().await.is_some() {}
    info!("Server is Gracefully Shutdown Completed");

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let host = cli.host;
    let port = cli.port;
    let log_level = log::LevelFilter::from_str(&cli.log_level)?;
    if cli.debug {
        env_logger::Builder::new()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{}:{} [{}] {} - {}",
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.level(),
                    chrono::Local::now().format("%H:%M:%S.%6f"),
                    record.args()
                )
            })
            .filter(None, log_level)
            .init();
    }

    let (stop_tx, stop_rx) = broadcast::channel::<()>(1);

    info!("Press Ctrl-C to stop");
    info!("try `nc {} {}` in another shell", host, port);
    let mut stop_tx = Some(stop_tx);
    ctrlc::set_handler(move || {
        if let Some(stop_tx) = stop_tx.take() {
            let _ = stop_tx.send(());
        }
    })?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    LocalSet::new().block_on(&runtime, async move {
        if let Err(err) = run(stop_rx, host, port).await {
            error!("run got error: {}", err);
        }
    });

    Ok(())
}
