//! Forward references for cyclic graph construction
//!
//! A loop is created unbound, handed to the code that builds the dependent
//! graph, then bound to its real source before anything listens to it.

use crate::cell::{Cell, Sampler};
use crate::stream::{forward, release, Emitter, EventStream, StreamNode, Subscription, Upstream};
use crate::{Error, Result};
use std::cell::RefCell;
use std::rc::Rc;

struct LoopLink<A> {
    source: Rc<RefCell<Option<EventStream<A>>>>,
    sub: RefCell<Option<Subscription>>,
}

impl<A: Clone + 'static> Upstream<A> for LoopLink<A> {
    fn link(&self, out: &Emitter<A>) -> Result<()> {
        let source = self.source.borrow().clone().ok_or(Error::NotYetBound)?;
        let sub = forward(&source, out)?;
        *self.sub.borrow_mut() = Some(sub);
        Ok(())
    }

    fn unlink(&self) {
        let sub = self.sub.borrow_mut().take();
        release(sub);
    }
}

/// Placeholder for a stream defined later
///
/// The bound source is held strongly, so a feedback cycle closed through a
/// loop lives as long as any handle to it.
pub struct StreamLoop<A> {
    source: Rc<RefCell<Option<EventStream<A>>>>,
    stream: EventStream<A>,
}

impl<A: Clone + 'static> StreamLoop<A> {
    /// Create an unbound loop
    pub fn new() -> Self {
        let source = Rc::new(RefCell::new(None));
        let stream = EventStream::with_upstream(LoopLink {
            source: Rc::clone(&source),
            sub: RefCell::new(None),
        });
        Self { source, stream }
    }

    /// The placeholder stream
    pub fn stream(&self) -> EventStream<A> {
        self.stream.clone()
    }

    /// Supply the real source; only the first call succeeds
    pub fn bind(&self, source: &EventStream<A>) -> Result<()> {
        let mut slot = self.source.borrow_mut();
        if slot.is_some() {
            return Err(Error::AlreadyBound);
        }
        *slot = Some(source.clone());
        Ok(())
    }

    /// Check whether `bind` already succeeded
    pub fn is_bound(&self) -> bool {
        self.source.borrow().is_some()
    }
}

impl<A: Clone + 'static> Default for StreamLoop<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Placeholder for a cell defined later
pub struct CellLoop<A> {
    source: Rc<RefCell<Option<Cell<A>>>>,
    cell: Cell<A>,
}

impl<A: Clone + 'static> CellLoop<A> {
    /// Create an unbound loop
    ///
    /// Sampling the placeholder before `bind` panics; a value read during
    /// graph construction would be a value nobody defined.
    pub fn new() -> Self {
        let source: Rc<RefCell<Option<Cell<A>>>> = Rc::new(RefCell::new(None));
        let link_source = Rc::clone(&source);
        let node = StreamNode::new(
            Some(Rc::new(CellLoopLink {
                source: link_source,
                sub: RefCell::new(None),
            })),
            None,
        );
        let pull_source = Rc::clone(&source);
        let pull = move || {
            let bound = pull_source.borrow().clone();
            match bound {
                Some(cell) => cell.value(),
                None => panic!("cannot sample cell loop: {}", Error::NotYetBound),
            }
        };
        let cell = Cell::from_parts(node, Sampler::Pull(Rc::new(pull)));
        Self { source, cell }
    }

    /// The placeholder cell
    pub fn cell(&self) -> Cell<A> {
        self.cell.clone()
    }

    /// Supply the real source; only the first call succeeds
    pub fn bind(&self, source: &Cell<A>) -> Result<()> {
        let mut slot = self.source.borrow_mut();
        if slot.is_some() {
            return Err(Error::AlreadyBound);
        }
        *slot = Some(source.clone());
        Ok(())
    }

    /// Check whether `bind` already succeeded
    pub fn is_bound(&self) -> bool {
        self.source.borrow().is_some()
    }
}

impl<A: Clone + 'static> Default for CellLoop<A> {
    fn default() -> Self {
        Self::new()
    }
}

struct CellLoopLink<A> {
    source: Rc<RefCell<Option<Cell<A>>>>,
    sub: RefCell<Option<Subscription>>,
}

impl<A: Clone + 'static> Upstream<A> for CellLoopLink<A> {
    fn link(&self, out: &Emitter<A>) -> Result<()> {
        let cell = self.source.borrow().clone().ok_or(Error::NotYetBound)?;
        let sub = forward(&cell.updates(), out)?;
        *self.sub.borrow_mut() = Some(sub);
        Ok(())
    }

    fn unlink(&self) {
        let sub = self.sub.borrow_mut().take();
        release(sub);
    }
}

impl<A: Clone + 'static> Cell<A> {
    /// Build a cell that refers to itself
    pub fn looped(f: impl FnOnce(&Cell<A>) -> Cell<A>) -> Result<Cell<A>> {
        let placeholder = CellLoop::new();
        let cell = f(&placeholder.cell());
        placeholder.bind(&cell)?;
        Ok(cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StreamSink;

    #[test]
    fn test_listen_before_bind() {
        let placeholder: StreamLoop<i32> = StreamLoop::new();
        let result = placeholder.stream().try_listen(|_| {});
        assert_eq!(result.err(), Some(Error::NotYetBound));
        assert!(!placeholder.stream().is_active());
    }

    #[test]
    fn test_bind_twice() {
        let placeholder = StreamLoop::new();
        let sink: StreamSink<i32> = StreamSink::new();

        assert!(placeholder.bind(&sink.stream()).is_ok());
        assert!(placeholder.is_bound());
        assert_eq!(placeholder.bind(&sink.stream()), Err(Error::AlreadyBound));
    }

    #[test]
    fn test_bound_loop_forwards() {
        let placeholder = StreamLoop::new();
        let doubled = placeholder.stream().map(|x: &i32| x * 2);
        let sink = StreamSink::new();
        placeholder.bind(&sink.stream()).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let record = Rc::clone(&seen);
        let _sub = doubled.listen(move |x| record.borrow_mut().push(*x));
        sink.send(4);

        assert_eq!(*seen.borrow(), vec![8]);
    }

    #[test]
    fn test_stream_feeding_itself() {
        let sink = StreamSink::new();
        let countdown = EventStream::looped(|this| {
            let next = this.filter(|x: &u32| *x > 0).map(|x| x - 1);
            sink.stream().merge(&next)
        })
        .unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let record = Rc::clone(&seen);
        let _sub = countdown.listen(move |x| record.borrow_mut().push(*x));
        sink.send(3);

        assert_eq!(*seen.borrow(), vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_cell_defined_in_terms_of_itself() {
        let sink = StreamSink::new();
        let total = Cell::looped(|total| {
            let previous = total.clone();
            sink.stream().map(move |x: &i32| previous.value() + x).hold(0)
        })
        .unwrap();
        let _sub = total.listen(|_| {});

        sink.send(5);
        sink.send(3);

        assert_eq!(total.value(), 8);
    }

    #[test]
    fn test_unbound_cell_loop_rejects_listeners() {
        let placeholder: CellLoop<i32> = CellLoop::new();
        let result = placeholder.cell().try_listen(|_| {});
        assert_eq!(result.err(), Some(Error::NotYetBound));
    }

    #[test]
    #[should_panic(expected = "not been bound")]
    fn test_unbound_cell_loop_panics_on_sample() {
        let placeholder: CellLoop<i32> = CellLoop::new();
        placeholder.cell().value();
    }
}
