use clap::Parser;
use futures::StreamExt;
use log::{error, info};
use std::{io::Write, str::FromStr};
use tokio::task::LocalSet;

use pipepoint::{Pipeline, PipelineError};
use pipepoint_demos::{Line, LoggingStage, TcpTransport};

#[derive(Parser)]
#[command(name = "RPC Client TCP")]
#[command(author = "Rusty Rain <y@liu.mx>")]
#[command(version = "0.0.0")]
#[command(about = "An example of line based rpc client tcp", long_about = None)]
struct Cli {
    #[arg(short, long)]
    debug: bool,
    #[arg(long, default_value_t = format!("127.0.0.1"))]
    host: String,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    #[arg(long, default_value_t = format!("INFO"))]
    log_level: String,
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

    info!("Connecting {}:{}...", host, port);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    LocalSet::new().block_on(&runtime, async move {
        let transport = TcpTransport::connect(&format!("{host}:{port}")).await?;

        let pipeline: Pipeline<Line> = Pipeline::new();
        pipeline.transport(transport).add_back(LoggingStage);

        info!("Enter bye to stop");
        let (mut tx, mut rx) = futures::channel::mpsc::channel(8);
        std::thread::spawn(move || {
            let mut buffer = String::new();
            while std::io::stdin().read_line(&mut buffer).is_ok() {
                match buffer.trim_end() {
                    "" => break,
                    line => {
                        if tx.try_send(line.to_string()).is_err() {
                            break;
                        }
                        if line == "bye" {
                            break;
                        }
                    }
                };
                buffer.clear();
            }
        });

        while let Some(line) = rx.next().await {
            if line == "bye" {
                break;
            }
            match pipeline.head().call(line).await {
                Ok(res) => println!("{res}"),
                Err(PipelineError::Rejected(err)) => println!("error: {err}"),
                Err(err) => {
                    error!("pipeline failure: {err}");
                    break;
                }
            }
        }

        anyhow::Ok(())
    })?;

    Ok(())
}
