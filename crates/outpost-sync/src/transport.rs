//! Transport traits for the state feed
//!
//! The feed deals in encoded frames (one JSON document each). These traits
//! are the seam to whatever carries them: a streaming HTTP response, a
//! WebSocket, an in-process channel. Users implement them for their own
//! stack; implementations for std channels and plain buffers are provided.

use crate::{Error, Result};
use std::collections::VecDeque;
use std::sync::mpsc;

/// Outbound half: reliable, ordered delivery of frames to one peer
pub trait FrameSink {
    /// Send one encoded frame
    fn send_frame(&mut self, frame: String) -> Result<()>;
}

/// Inbound half: frames from one peer, in arrival order
pub trait FrameSource {
    /// Receive one encoded frame (non-blocking)
    ///
    /// Returns `Ok(None)` if no frame is waiting.
    fn recv_frame(&mut self) -> Result<Option<String>>;
}

impl FrameSink for Vec<String> {
    fn send_frame(&mut self, frame: String) -> Result<()> {
        self.push(frame);
        Ok(())
    }
}

impl FrameSink for VecDeque<String> {
    fn send_frame(&mut self, frame: String) -> Result<()> {
        self.push_back(frame);
        Ok(())
    }
}

impl FrameSink for mpsc::Sender<String> {
    fn send_frame(&mut self, frame: String) -> Result<()> {
        self.send(frame)
            .map_err(|_| Error::Transport("peer disconnected".to_string()))
    }
}

impl FrameSource for VecDeque<String> {
    fn recv_frame(&mut self) -> Result<Option<String>> {
        Ok(self.pop_front())
    }
}

impl FrameSource for mpsc::Receiver<String> {
    fn recv_frame(&mut self) -> Result<Option<String>> {
        match self.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(mpsc::TryRecvError::Empty) => Ok(None),
            Err(mpsc::TryRecvError::Disconnected) => {
                Err(Error::Transport("peer disconnected".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_round_trip() {
        let (mut tx, mut rx) = mpsc::channel();
        tx.send_frame("one".to_string()).unwrap();
        tx.send_frame("two".to_string()).unwrap();

        assert_eq!(rx.recv_frame().unwrap().as_deref(), Some("one"));
        assert_eq!(rx.recv_frame().unwrap().as_deref(), Some("two"));
        assert_eq!(rx.recv_frame().unwrap(), None);

        drop(tx);
        assert!(matches!(rx.recv_frame(), Err(Error::Transport(_))));
    }

    #[test]
    fn test_buffer_queue() {
        let mut queue = VecDeque::new();
        queue.send_frame("a".to_string()).unwrap();
        assert_eq!(queue.recv_frame().unwrap().as_deref(), Some("a"));
        assert_eq!(queue.recv_frame().unwrap(), None);
    }
}
