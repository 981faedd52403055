//! Sequenced state feed with gap detection and resync
//!
//! The publisher flattens a root wire object into numbered frames: one
//! snapshot frame for a new peer, then a patch frame per root patch, plus a
//! fresh snapshot frame every `resync_interval` patches. The receiver
//! checks the numbering and turns frames back into a root wire object for
//! the read side.
//!
//! Frame numbering: every frame the publisher emits takes the next number.
//! A snapshot frame handed to a newly connected peer carries the number of
//! the last frame emitted, so the next patch continues from it.

use crate::transport::{FrameSink, FrameSource};
use crate::{apply_patch, Error, PatchMessage, Result, WireObject};
use outpost_core::{EventStream, StreamSink, Subscription};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::cell::RefCell;
use std::rc::Rc;

/// One message on the state feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedFrame {
    /// The whole root value
    Snapshot { seq: u64, snapshot: Json },
    /// One root patch
    Patch {
        seq: u64,
        path: Vec<String>,
        data: Json,
    },
}

impl FeedFrame {
    /// Sequence number
    pub fn seq(&self) -> u64 {
        match self {
            FeedFrame::Snapshot { seq, .. } | FeedFrame::Patch { seq, .. } => *seq,
        }
    }

    /// Encode as one line of JSON
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode one line of JSON
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

fn default_resync_interval() -> Option<u64> {
    Some(100)
}

/// Feed settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Emit a full snapshot frame after this many patches (`None` disables)
    #[serde(default = "default_resync_interval")]
    pub resync_interval: Option<u64>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            resync_interval: default_resync_interval(),
        }
    }
}

struct PublisherState {
    replica: Json,
    seq: u64,
    since_resync: u64,
    resync_interval: Option<u64>,
}

impl PublisherState {
    /// Record one root patch, returning the frames it produces
    fn record(&mut self, patch: &PatchMessage) -> (FeedFrame, Option<FeedFrame>) {
        if let Err(err) = apply_patch(&mut self.replica, patch) {
            tracing::warn!(%err, "server replica rejected its own patch");
        }
        self.seq += 1;
        let frame = FeedFrame::Patch {
            seq: self.seq,
            path: patch.path.clone(),
            data: patch.data.clone(),
        };
        self.since_resync += 1;
        let resync = match self.resync_interval {
            Some(interval) if interval > 0 && self.since_resync >= interval => {
                self.since_resync = 0;
                self.seq += 1;
                Some(FeedFrame::Snapshot {
                    seq: self.seq,
                    snapshot: self.replica.clone(),
                })
            }
            _ => None,
        };
        (frame, resync)
    }
}

/// Server side of the feed
///
/// Keeps the root's patch stream active for as long as it runs.
pub struct FeedPublisher {
    state: Rc<RefCell<PublisherState>>,
    frames: StreamSink<FeedFrame>,
    sub: Subscription,
}

impl FeedPublisher {
    /// Start sequencing the patches of `root`
    pub fn start(root: &WireObject, config: &FeedConfig) -> Result<Self> {
        let state = Rc::new(RefCell::new(PublisherState {
            replica: root.snapshot()?.clone(),
            seq: 0,
            since_resync: 0,
            resync_interval: config.resync_interval,
        }));
        let frames = StreamSink::new();

        let sub = {
            let state = Rc::clone(&state);
            let frames = frames.clone();
            root.updates().try_listen(move |patch: &PatchMessage| {
                let (frame, resync) = state.borrow_mut().record(patch);
                frames.send(frame);
                if let Some(resync) = resync {
                    tracing::debug!(seq = resync.seq(), "emitting resync snapshot");
                    frames.send(resync);
                }
            })?
        };
        tracing::debug!(resync_interval = ?config.resync_interval, "feed publisher started");

        Ok(Self { state, frames, sub })
    }

    /// Every frame emitted from now on
    pub fn frames(&self) -> EventStream<FeedFrame> {
        self.frames.stream()
    }

    /// A snapshot frame for a peer joining now
    pub fn snapshot_frame(&self) -> FeedFrame {
        let state = self.state.borrow();
        FeedFrame::Snapshot {
            seq: state.seq,
            snapshot: state.replica.clone(),
        }
    }

    /// Number of the last frame emitted
    pub fn seq(&self) -> u64 {
        self.state.borrow().seq
    }

    /// The server-side replica of the root value
    pub fn document(&self) -> Json {
        self.state.borrow().replica.clone()
    }

    /// Send a snapshot frame to `sink`, then every later frame
    ///
    /// Frames the sink fails to take are logged and skipped; the returned
    /// subscription detaches the sink.
    pub fn connect(&self, mut sink: impl FrameSink + 'static) -> Result<Subscription> {
        sink.send_frame(self.snapshot_frame().encode()?)?;
        let sink = RefCell::new(sink);
        let sub = self.frames().try_listen(move |frame: &FeedFrame| {
            let sent = frame
                .encode()
                .and_then(|text| sink.borrow_mut().send_frame(text));
            if let Err(err) = sent {
                tracing::warn!(%err, seq = frame.seq(), "dropping frame for peer");
            }
        })?;
        Ok(sub)
    }

    /// Stop following the root
    pub fn stop(&mut self) -> Result<()> {
        self.sub.cancel()?;
        tracing::debug!(seq = self.seq(), "feed publisher stopped");
        Ok(())
    }
}

/// Client side of the feed
pub struct FeedReceiver {
    replica: Json,
    last_seq: u64,
    synced: bool,
    patches: StreamSink<PatchMessage>,
}

impl FeedReceiver {
    /// Start from the first frame of a feed, which must be a snapshot
    pub fn new(first: &FeedFrame) -> Result<Self> {
        match first {
            FeedFrame::Snapshot { seq, snapshot } => Ok(Self {
                replica: snapshot.clone(),
                last_seq: *seq,
                synced: true,
                patches: StreamSink::new(),
            }),
            FeedFrame::Patch { .. } => Err(Error::MissingSnapshot),
        }
    }

    /// Start from the first encoded frame of a feed
    pub fn from_encoded(text: &str) -> Result<Self> {
        Self::new(&FeedFrame::decode(text)?)
    }

    /// The root wire object as of now, followed by every applied patch
    pub fn root(&self) -> WireObject {
        WireObject::new(self.replica.clone(), self.patches.stream())
    }

    /// Number of the last frame applied
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// `false` between a detected gap and the next snapshot frame
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// The client-side replica of the root value
    pub fn document(&self) -> &Json {
        &self.replica
    }

    /// Apply one frame; returns whether it changed anything
    ///
    /// Stale frames are ignored. A skipped frame fails with `SequenceGap`,
    /// after which patches are dropped until a snapshot frame arrives.
    pub fn receive(&mut self, frame: &FeedFrame) -> Result<bool> {
        match frame {
            FeedFrame::Snapshot { seq, snapshot } => {
                if *seq < self.last_seq || (self.synced && *seq == self.last_seq) {
                    tracing::debug!(seq, last = self.last_seq, "ignoring stale snapshot");
                    return Ok(false);
                }
                let recovered = !self.synced;
                let changed = self.resync(*seq, snapshot);
                Ok(recovered || changed > 0)
            }
            FeedFrame::Patch { seq, path, data } => {
                if *seq <= self.last_seq {
                    tracing::debug!(seq, last = self.last_seq, "ignoring stale patch");
                    return Ok(false);
                }
                if !self.synced {
                    tracing::warn!(seq, "dropping patch while out of sync");
                    return Ok(false);
                }
                let expected = self.last_seq + 1;
                if *seq != expected {
                    self.synced = false;
                    let err = Error::SequenceGap {
                        expected,
                        got: *seq,
                    };
                    tracing::warn!(%err, "feed out of sync until next snapshot");
                    return Err(err);
                }
                self.last_seq = *seq;
                let patch = PatchMessage::new(path.clone(), data.clone());
                if let Err(err) = apply_patch(&mut self.replica, &patch) {
                    tracing::warn!(%err, "dropping patch");
                    return Ok(false);
                }
                self.patches.send(patch);
                Ok(true)
            }
        }
    }

    /// Decode and apply one frame
    pub fn receive_encoded(&mut self, text: &str) -> Result<bool> {
        self.receive(&FeedFrame::decode(text)?)
    }

    /// Apply every frame waiting in `source`; returns how many changed state
    ///
    /// Undecodable frames and sequence gaps are logged and skipped; only a
    /// failing source ends the drain early.
    pub fn drain(&mut self, source: &mut impl FrameSource) -> Result<usize> {
        let mut applied = 0;
        while let Some(text) = source.recv_frame()? {
            match self.receive_encoded(&text) {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(err) => tracing::warn!(%err, "skipping frame"),
            }
        }
        Ok(applied)
    }

    /// Replace the replica and re-seed the root keys whose value differs
    ///
    /// Returns how many replacements went out. Keys missing from the new
    /// snapshot cannot be addressed by a patch and are only logged.
    fn resync(&mut self, seq: u64, snapshot: &Json) -> usize {
        self.last_seq = seq;
        self.synced = true;
        let previous = std::mem::replace(&mut self.replica, snapshot.clone());
        let patches: Vec<PatchMessage> = match (&previous, snapshot) {
            (Json::Object(old), Json::Object(entries)) => {
                for key in old.keys().filter(|key| !entries.contains_key(*key)) {
                    tracing::warn!(%key, "root key vanished in snapshot");
                }
                entries
                    .iter()
                    .filter(|(key, value)| old.get(*key) != Some(*value))
                    .map(|(key, value)| PatchMessage::new(vec![key.clone()], value.clone()))
                    .collect()
            }
            (old, new) if old == new => Vec::new(),
            (_, new) => vec![PatchMessage::replace(new.clone())],
        };
        tracing::debug!(seq, changed = patches.len(), "feed resynchronized");
        let changed = patches.len();
        for patch in patches {
            self.patches.send(patch);
        }
        changed
    }
}
