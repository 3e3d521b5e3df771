//! Inbound and outbound queue seams to the host daemon.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::warn;

use crate::check::CheckRequest;

/// Envelope the host daemon puts on the inbound queue
#[derive(Debug, Clone)]
pub struct Message {
    data: CheckRequest,
}

impl Message {
    pub fn new(data: CheckRequest) -> Self {
        Self { data }
    }

    pub fn get_data(self) -> CheckRequest {
        self.data
    }
}

impl From<CheckRequest> for Message {
    fn from(data: CheckRequest) -> Self {
        Self::new(data)
    }
}

/// Outcome of one bounded wait on the inbound queue
#[derive(Debug)]
pub enum Received {
    Check(CheckRequest),
    Empty,
    /// Every producer is gone
    Closed,
}

/// Where workers pull check requests from.
pub trait Inbound: Send + Sync {
    /// Wait at most `timeout` for the next request.
    fn receive(&self, timeout: Duration) -> Received;
}

/// Where finished checks are handed back. Must not block.
pub trait Outbound: Send + Sync {
    fn send(&self, check: CheckRequest);
}

fn received<T: Into<CheckRequest>>(result: Result<T, RecvTimeoutError>) -> Received {
    match result {
        Ok(item) => Received::Check(item.into()),
        Err(RecvTimeoutError::Timeout) => Received::Empty,
        Err(RecvTimeoutError::Disconnected) => Received::Closed,
    }
}

impl From<Message> for CheckRequest {
    fn from(msg: Message) -> Self {
        msg.get_data()
    }
}

impl Inbound for Receiver<CheckRequest> {
    fn receive(&self, timeout: Duration) -> Received {
        received(self.recv_timeout(timeout))
    }
}

impl Inbound for Receiver<Message> {
    fn receive(&self, timeout: Duration) -> Received {
        received(self.recv_timeout(timeout))
    }
}

impl Outbound for Sender<CheckRequest> {
    fn send(&self, check: CheckRequest) {
        if let Err(e) = Sender::send(self, check) {
            warn!("Outbound queue closed, dropping result of check {}", e.0.id);
        }
    }
}

/// Bridge into an async host running on tokio
impl Outbound for tokio::sync::mpsc::UnboundedSender<CheckRequest> {
    fn send(&self, check: CheckRequest) {
        if let Err(e) = tokio::sync::mpsc::UnboundedSender::send(self, check) {
            warn!("Outbound queue closed, dropping result of check {}", e.0.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receiver_timeout_is_empty() {
        let (_tx, rx) = crossbeam_channel::unbounded::<CheckRequest>();
        assert!(matches!(rx.receive(Duration::from_millis(10)), Received::Empty));
    }

    #[test]
    fn test_receiver_disconnected_is_closed() {
        let (tx, rx) = crossbeam_channel::unbounded::<CheckRequest>();
        drop(tx);
        assert!(matches!(rx.receive(Duration::from_millis(10)), Received::Closed));
    }

    #[test]
    fn test_message_envelope_is_unwrapped() {
        let (tx, rx) = crossbeam_channel::unbounded::<Message>();
        tx.send(CheckRequest::new(7, "check_disk /").into()).unwrap();
        match rx.receive(Duration::from_millis(100)) {
            Received::Check(check) => {
                assert_eq!(check.id, 7);
                assert_eq!(check.command, "check_disk /");
            }
            other => panic!("expected a check, got {:?}", other),
        }
    }

    #[test]
    fn test_send_to_closed_outbound_does_not_panic() {
        let (tx, rx) = crossbeam_channel::unbounded::<CheckRequest>();
        drop(rx);
        Outbound::send(&tx, CheckRequest::new(1, "x"));
    }

    #[tokio::test]
    async fn test_tokio_outbound_bridge() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<CheckRequest>();
        let sender = std::thread::spawn(move || {
            Outbound::send(&tx, CheckRequest::new(3, "check_ping"));
        });
        let check = rx.recv().await.unwrap();
        assert_eq!(check.id, 3);
        sender.join().unwrap();
    }
}
