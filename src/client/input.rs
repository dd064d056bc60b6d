//! Local input collection for the interactive client.
//!
//! The network loop must never block on the keyboard, so input is exposed
//! through a polling abstraction: ask for a completed line, get one or none.
//! A background thread does the blocking stdin reads and hands finished
//! lines over a channel.

use std::sync::mpsc::{Receiver, TryRecvError};
use tracing::debug;

/// Produces completed input lines without blocking the caller.
pub trait LineSource {
    /// The next finished line (newline included), or `None` when nothing is
    /// ready yet.
    fn poll_line(&mut self) -> Option<String>;
}

/// Stdin-backed line source.
pub struct StdinLineSource {
    receiver: Receiver<String>,
}

impl StdinLineSource {
    /// Spawn the blocking reader thread and return the polling handle.
    pub fn spawn() -> Self {
        let (sender, receiver) = std::sync::mpsc::channel();
        std::thread::Builder::new()
            .name("stdin-reader".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                let mut line = String::new();
                loop {
                    line.clear();
                    match std::io::BufRead::read_line(&mut stdin.lock(), &mut line) {
                        Ok(0) => break,
                        Ok(_) => {
                            if sender.send(line.clone()).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            debug!(error = %e, "Stdin read failed");
                            break;
                        }
                    }
                }
            })
            .ok();
        Self { receiver }
    }

    #[cfg(test)]
    fn from_receiver(receiver: Receiver<String>) -> Self {
        Self { receiver }
    }
}

impl LineSource for StdinLineSource {
    fn poll_line(&mut self) -> Option<String> {
        match self.receiver.try_recv() {
            Ok(line) => Some(line),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_returns_lines_in_order_then_none() {
        let (sender, receiver) = std::sync::mpsc::channel();
        let mut source = StdinLineSource::from_receiver(receiver);

        assert_eq!(source.poll_line(), None);

        sender.send("first\n".to_string()).unwrap();
        sender.send("second\n".to_string()).unwrap();
        assert_eq!(source.poll_line().as_deref(), Some("first\n"));
        assert_eq!(source.poll_line().as_deref(), Some("second\n"));
        assert_eq!(source.poll_line(), None);
    }

    #[test]
    fn test_poll_after_sender_closed() {
        let (sender, receiver) = std::sync::mpsc::channel::<String>();
        let mut source = StdinLineSource::from_receiver(receiver);
        drop(sender);
        assert_eq!(source.poll_line(), None);
    }
}
