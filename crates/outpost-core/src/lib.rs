//! Outpost Core - Push-based reactive runtime
//!
//! This crate provides the single-threaded reactive primitives the rest of
//! outpost is built from:
//! - Discrete event streams with lazy activation (`EventStream`, `StreamSink`)
//! - Continuous values and switching (`Cell`, `MutableCell`)
//! - Forward references for cyclic definitions (`StreamLoop`, `CellLoop`)
//! - Set-valued cells (`ReactiveCollection`, `MutableCollection`)
//! - An injected virtual clock for time-driven streams (`Scheduler`)
//!
//! ## Activation
//!
//! Every node is dormant until its first listener arrives. Activation links
//! the node to its sources (or opens its timer), and losing the last
//! listener unlinks it again. Each root occurrence propagates synchronously
//! to a fixpoint before `send` returns.
//!
//! ```
//! use outpost_core::StreamSink;
//!
//! let clicks = StreamSink::new();
//! let total = clicks.stream().accum_sum(0);
//! let mut sub = total.listen(|n| println!("total is now {n}"));
//!
//! clicks.send(2);
//! clicks.send(3);
//! assert_eq!(total.value(), 5);
//! sub.cancel().unwrap();
//! ```

mod cell;
mod collection;
mod error;
mod looped;
pub mod scheduler;
mod stream;

pub use cell::{Cell, MutableCell};
pub use collection::{Members, MutableCollection, ReactiveCollection};
pub use error::{Error, Result};
pub use looped::{CellLoop, StreamLoop};
pub use scheduler::{Scheduler, TimerId};
pub use stream::{Emitter, EventStream, ListenerId, StreamSink, Subscription};
