//! Interactive chat client.
//!
//! Races three things on one task: the next server line, a short tick that
//! polls the local line source, and Ctrl-C. Neither side ever blocks the
//! other: socket reads are pinned across ticks and keyboard input arrives
//! through the non-blocking [`LineSource`].

pub mod input;

use crate::config::Config;
use crate::runtime::resolve_addr;
use input::{LineSource, StdinLineSource};
use std::io::{self, Write as _};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

const PROMPT: &str = "# ";
/// Clear the current terminal line and return the carriage.
const CLEAR_LINE: &str = "\x1b[2K\r";
/// How often the local line source is polled for finished input.
const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(30);

/// Run the client until the user says `bye`, interrupts, or the server goes
/// away. Connection-level failures are reported, not propagated: they end
/// the session, not the process's success status.
pub fn run(config: Config) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let addr = match resolve_addr(&config.host, config.port, "127.0.0.1") {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("{e}");
                return Ok(());
            }
        };

        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) => {
                eprintln!("Connexion impossible à {addr}: {e}");
                return Ok(());
            }
        };
        println!("Connecté à {addr}");

        let mut source = StdinLineSource::spawn();
        session(stream, &mut source).await
    })
}

/// The interactive loop, driven by any line source.
async fn session(stream: TcpStream, source: &mut dyn LineSource) -> io::Result<()> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut ticker = tokio::time::interval(INPUT_POLL_INTERVAL);

    print!("{CLEAR_LINE}{PROMPT}");
    flush_stdout();

    'session: loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line);
        tokio::pin!(read);

        loop {
            tokio::select! {
                result = &mut read => {
                    match result {
                        Ok(0) => {
                            println!("{CLEAR_LINE}Connexion terminée");
                            break 'session;
                        }
                        Ok(_) => {
                            print!("{CLEAR_LINE}{line}{PROMPT}");
                            flush_stdout();
                        }
                        Err(e) => {
                            eprintln!("\n{e}");
                            break 'session;
                        }
                    }
                    break;
                }
                _ = ticker.tick() => {
                    while let Some(typed) = source.poll_line() {
                        if let Err(e) = writer.write_all(typed.as_bytes()).await {
                            eprintln!("\n{e}");
                            break 'session;
                        }
                        print!("{PROMPT}");
                        flush_stdout();
                        if typed.trim().eq_ignore_ascii_case("bye") {
                            break 'session;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    debug!("Interrupted");
                    break 'session;
                }
            }
        }
    }

    Ok(())
}

fn flush_stdout() {
    let _ = io::stdout().flush();
}
