//! Cells: values that always have a "now" and change at discrete moments
//!
//! A [`Cell`] pairs a current value with the stream of its future values.
//! Listening to a cell never replays the value it had when the listener was
//! attached; read [`Cell::value`] for that.
//!
//! Cells come in two flavours:
//!
//! - **Stateful** cells (`hold`, `accum`, [`MutableCell`]) own their value.
//!   `hold` and `accum` only integrate occurrences while active.
//! - **Derived** cells (`map`, `sequence`, `switch_c`) cache their value
//!   while active and sample their sources while dormant, so reading them
//!   is always consistent with what they are derived from.

use crate::stream::{forward, release, Emitter, EventStream, StreamNode, Subscription, Upstream};
use crate::Result;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// How a cell answers `value()`
pub(crate) enum Sampler<A> {
    /// The node's held slot is authoritative
    Held(Rc<RefCell<A>>),
    /// Held slot while active, `pull` while dormant
    Derived {
        cache: Rc<RefCell<A>>,
        pull: Rc<dyn Fn() -> A>,
    },
    /// Always delegate
    Pull(Rc<dyn Fn() -> A>),
}

impl<A> Clone for Sampler<A> {
    fn clone(&self) -> Self {
        match self {
            Sampler::Held(value) => Sampler::Held(Rc::clone(value)),
            Sampler::Derived { cache, pull } => Sampler::Derived {
                cache: Rc::clone(cache),
                pull: Rc::clone(pull),
            },
            Sampler::Pull(pull) => Sampler::Pull(Rc::clone(pull)),
        }
    }
}

/// Keeps a cell active for as long as one of its handles lives
struct Retainer {
    sub: RefCell<Subscription>,
}

impl Drop for Retainer {
    fn drop(&mut self) {
        if let Err(err) = self.sub.borrow_mut().cancel() {
            tracing::error!(%err, "failed to release retained cell");
        }
    }
}

/// A continuous value of type `A`
///
/// Handles are cheap to clone; equality is node identity.
pub struct Cell<A> {
    node: Rc<StreamNode<A>>,
    sampler: Sampler<A>,
    retainer: Option<Rc<Retainer>>,
}

impl<A> Clone for Cell<A> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
            sampler: self.sampler.clone(),
            retainer: self.retainer.clone(),
        }
    }
}

impl<A> PartialEq for Cell<A> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }
}

impl<A: fmt::Debug + Clone + 'static> fmt::Debug for Cell<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell").field("value", &self.value()).finish()
    }
}

impl<A: Clone + 'static> Cell<A> {
    pub(crate) fn from_parts(node: Rc<StreamNode<A>>, sampler: Sampler<A>) -> Self {
        Self {
            node,
            sampler,
            retainer: None,
        }
    }

    /// Build a derived cell around an upstream that keeps `cache` current
    /// while active
    pub(crate) fn derived(
        upstream: impl Upstream<A> + 'static,
        cache: Rc<RefCell<A>>,
        pull: impl Fn() -> A + 'static,
    ) -> Self {
        let node = StreamNode::new(Some(Rc::new(upstream)), Some(Rc::clone(&cache)));
        Self::from_parts(
            node,
            Sampler::Derived {
                cache,
                pull: Rc::new(pull),
            },
        )
    }

    /// A cell that never changes
    pub fn constant(value: A) -> Self {
        let value = Rc::new(RefCell::new(value));
        let node = StreamNode::new(None, Some(Rc::clone(&value)));
        Self::from_parts(node, Sampler::Held(value))
    }

    /// The current value
    pub fn value(&self) -> A {
        match &self.sampler {
            Sampler::Held(value) => value.borrow().clone(),
            Sampler::Derived { cache, pull } => {
                if self.node.is_active() {
                    cache.borrow().clone()
                } else {
                    pull()
                }
            }
            Sampler::Pull(pull) => pull(),
        }
    }

    /// Stream of future values
    pub fn updates(&self) -> EventStream<A> {
        EventStream::from_node(Rc::clone(&self.node))
    }

    /// Listen for future values
    pub fn try_listen(&self, handler: impl Fn(&A) + 'static) -> Result<Subscription> {
        self.updates().try_listen(handler)
    }

    /// Listen for future values
    ///
    /// # Panics
    ///
    /// Panics when activation reaches a loop that was never bound.
    pub fn listen(&self, handler: impl Fn(&A) + 'static) -> Subscription {
        self.updates().listen(handler)
    }

    /// Check whether the cell currently has listeners
    pub fn is_active(&self) -> bool {
        self.node.is_active()
    }

    /// Keep this cell active for as long as the returned handle (or a clone
    /// of it) lives
    ///
    /// Stateful cells only track their source while active; a retained cell
    /// keeps tracking with nobody listening.
    pub fn retain(&self) -> Result<Cell<A>> {
        let sub = self.try_listen(|_| {})?;
        Ok(Self {
            node: Rc::clone(&self.node),
            sampler: self.sampler.clone(),
            retainer: Some(Rc::new(Retainer {
                sub: RefCell::new(sub),
            })),
        })
    }

    // ========================================================================
    // Combinators
    // ========================================================================

    /// Transform the value
    pub fn map<B: Clone + 'static>(&self, f: impl Fn(&A) -> B + 'static) -> Cell<B> {
        let f: Rc<dyn Fn(&A) -> B> = Rc::new(f);
        let cache = Rc::new(RefCell::new(f(&self.value())));
        let upstream = MapLink {
            source: self.clone(),
            f: Rc::clone(&f),
            cache: Rc::clone(&cache),
            sub: RefCell::new(None),
        };
        let source = self.clone();
        Cell::derived(upstream, cache, move || f(&source.value()))
    }

    /// Replace the value with a constant, changing whenever the source does
    pub fn map_to<B: Clone + 'static>(&self, b: B) -> Cell<B> {
        self.map(move |_| b.clone())
    }

    /// `switch_c . map`
    pub fn switch_map_c<B: Clone + 'static>(&self, f: impl Fn(&A) -> Cell<B> + 'static) -> Cell<B> {
        Cell::switch_c(&self.map(f))
    }

    /// `switch_s . map`
    pub fn switch_map_s<B: Clone + 'static>(
        &self,
        f: impl Fn(&A) -> EventStream<B> + 'static,
    ) -> EventStream<B> {
        Cell::switch_s(&self.map(f))
    }

    /// Combine two cells
    pub fn lift2<B, C>(a: &Cell<A>, b: &Cell<B>, f: impl Fn(&A, &B) -> C + 'static) -> Cell<C>
    where
        B: Clone + 'static,
        C: Clone + 'static,
    {
        let f = Rc::new(f);
        let b = b.clone();
        a.switch_map_c(move |x| {
            let x = x.clone();
            let f = Rc::clone(&f);
            b.map(move |y| f(&x, y))
        })
    }

    /// Flatten a cell of cells
    ///
    /// When the outer cell switches, the old inner cell is unsubscribed, the
    /// new one subscribed, and its current value is emitted at once.
    pub fn switch_c(outer: &Cell<Cell<A>>) -> Cell<A> {
        let cache = Rc::new(RefCell::new(outer.value().value()));
        let upstream = SwitchCLink {
            outer: outer.clone(),
            cache: Rc::clone(&cache),
            outer_sub: RefCell::new(None),
            inner_sub: Rc::new(RefCell::new(None)),
        };
        let outer = outer.clone();
        Cell::derived(upstream, cache, move || outer.value().value())
    }

    /// Flatten a cell of streams into the stream currently held
    ///
    /// Nothing is forwarded from an inner stream once the outer cell has moved
    /// past it. An inner stream firing inside the very propagation pass that
    /// switched to it may or may not be observed.
    pub fn switch_s(outer: &Cell<EventStream<A>>) -> EventStream<A> {
        EventStream::with_upstream(SwitchSLink {
            outer: outer.clone(),
            outer_sub: RefCell::new(None),
            inner_sub: Rc::new(RefCell::new(None)),
        })
    }

    /// The values of all `cells`, re-emitted whole whenever any of them changes
    pub fn sequence(cells: impl IntoIterator<Item = Cell<A>>) -> Cell<Vec<A>> {
        let cells: Rc<Vec<Cell<A>>> = Rc::new(cells.into_iter().collect());
        let cache = Rc::new(RefCell::new(sample_all(&cells)));
        let upstream = SequenceLink {
            cells: Rc::clone(&cells),
            cache: Rc::clone(&cache),
            subs: RefCell::new(Vec::new()),
        };
        Cell::derived(upstream, cache, move || sample_all(&cells))
    }
}

fn sample_all<A: Clone + 'static>(cells: &[Cell<A>]) -> Vec<A> {
    cells.iter().map(Cell::value).collect()
}

struct MapLink<A, B> {
    source: Cell<A>,
    f: Rc<dyn Fn(&A) -> B>,
    cache: Rc<RefCell<B>>,
    sub: RefCell<Option<Subscription>>,
}

impl<A: Clone + 'static, B: Clone + 'static> Upstream<B> for MapLink<A, B> {
    fn link(&self, out: &Emitter<B>) -> Result<()> {
        let out = out.clone();
        let f = Rc::clone(&self.f);
        let sub = self.source.try_listen(move |a| out.emit(f(a)))?;
        *self.cache.borrow_mut() = (self.f)(&self.source.value());
        *self.sub.borrow_mut() = Some(sub);
        Ok(())
    }

    fn unlink(&self) {
        let sub = self.sub.borrow_mut().take();
        release(sub);
    }
}

struct SwitchCLink<A> {
    outer: Cell<Cell<A>>,
    cache: Rc<RefCell<A>>,
    outer_sub: RefCell<Option<Subscription>>,
    inner_sub: Rc<RefCell<Option<Subscription>>>,
}

impl<A: Clone + 'static> Upstream<A> for SwitchCLink<A> {
    fn link(&self, out: &Emitter<A>) -> Result<()> {
        let inner_sub = Rc::clone(&self.inner_sub);
        let on_switch = out.clone();
        let outer_sub = self.outer.try_listen(move |inner: &Cell<A>| {
            let previous = inner_sub.borrow_mut().take();
            release(previous);
            match forward(&inner.updates(), &on_switch) {
                Ok(sub) => *inner_sub.borrow_mut() = Some(sub),
                Err(err) => tracing::error!(%err, "switch_c could not subscribe to the new inner cell"),
            }
            on_switch.emit(inner.value());
        })?;

        let current = self.outer.value();
        match forward(&current.updates(), out) {
            Ok(sub) => *self.inner_sub.borrow_mut() = Some(sub),
            Err(err) => {
                release(Some(outer_sub));
                return Err(err);
            }
        }
        *self.cache.borrow_mut() = current.value();
        *self.outer_sub.borrow_mut() = Some(outer_sub);
        Ok(())
    }

    fn unlink(&self) {
        let inner = self.inner_sub.borrow_mut().take();
        release(inner);
        let outer = self.outer_sub.borrow_mut().take();
        release(outer);
    }
}

struct SwitchSLink<A> {
    outer: Cell<EventStream<A>>,
    outer_sub: RefCell<Option<Subscription>>,
    inner_sub: Rc<RefCell<Option<Subscription>>>,
}

impl<A: Clone + 'static> Upstream<A> for SwitchSLink<A> {
    fn link(&self, out: &Emitter<A>) -> Result<()> {
        let inner_sub = Rc::clone(&self.inner_sub);
        let on_switch = out.clone();
        let outer_sub = self.outer.try_listen(move |inner: &EventStream<A>| {
            let previous = inner_sub.borrow_mut().take();
            release(previous);
            match forward(inner, &on_switch) {
                Ok(sub) => *inner_sub.borrow_mut() = Some(sub),
                Err(err) => tracing::error!(%err, "switch_s could not subscribe to the new inner stream"),
            }
        })?;

        match forward(&self.outer.value(), out) {
            Ok(sub) => *self.inner_sub.borrow_mut() = Some(sub),
            Err(err) => {
                release(Some(outer_sub));
                return Err(err);
            }
        }
        *self.outer_sub.borrow_mut() = Some(outer_sub);
        Ok(())
    }

    fn unlink(&self) {
        let inner = self.inner_sub.borrow_mut().take();
        release(inner);
        let outer = self.outer_sub.borrow_mut().take();
        release(outer);
    }
}

struct SequenceLink<A> {
    cells: Rc<Vec<Cell<A>>>,
    cache: Rc<RefCell<Vec<A>>>,
    subs: RefCell<Vec<Subscription>>,
}

impl<A: Clone + 'static> Upstream<Vec<A>> for SequenceLink<A> {
    fn link(&self, out: &Emitter<Vec<A>>) -> Result<()> {
        let mut subs = Vec::with_capacity(self.cells.len());
        for cell in self.cells.iter() {
            let cells = Rc::clone(&self.cells);
            let out = out.clone();
            match cell.try_listen(move |_| out.emit(sample_all(&cells))) {
                Ok(sub) => subs.push(sub),
                Err(err) => {
                    for sub in subs {
                        release(Some(sub));
                    }
                    return Err(err);
                }
            }
        }
        *self.cache.borrow_mut() = sample_all(&self.cells);
        *self.subs.borrow_mut() = subs;
        Ok(())
    }

    fn unlink(&self) {
        let subs = std::mem::take(&mut *self.subs.borrow_mut());
        for sub in subs {
            release(Some(sub));
        }
    }
}

/// A cell written from outside the graph
///
/// This is the only way to change a cell's value directly.
pub struct MutableCell<A> {
    cell: Cell<A>,
}

impl<A> Clone for MutableCell<A> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<A: Clone + 'static> MutableCell<A> {
    /// Create with an initial value
    pub fn new(initial: A) -> Self {
        Self {
            cell: Cell::constant(initial),
        }
    }

    /// Replace the value and notify listeners
    pub fn set(&self, value: A) {
        self.cell.node.fire(value);
    }

    /// The current value
    pub fn value(&self) -> A {
        self.cell.value()
    }

    /// Read-only view
    pub fn cell(&self) -> Cell<A> {
        self.cell.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StreamSink;

    fn recorder<A: Clone + 'static>() -> (Rc<RefCell<Vec<A>>>, impl Fn(&A) + 'static) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        (seen, move |a: &A| sink.borrow_mut().push(a.clone()))
    }

    #[test]
    fn test_listener_sees_only_later_values() {
        let cell = MutableCell::new(1);
        cell.set(2);
        let (seen, handler) = recorder::<i32>();
        let _sub = cell.cell().listen(handler);
        assert_eq!(cell.value(), 2);

        cell.set(3);
        assert_eq!(*seen.borrow(), vec![3]);
    }

    #[test]
    fn test_constant() {
        let cell = Cell::constant("fixed");
        assert_eq!(cell.value(), "fixed");
        assert!(!cell.is_active());
    }

    #[test]
    fn test_map_dormant_and_active() {
        let source = MutableCell::new(2);
        let doubled = source.cell().map(|x| x * 2);

        // Dormant derived cells sample their source
        source.set(5);
        assert_eq!(doubled.value(), 10);

        let (seen, handler) = recorder::<i32>();
        let _sub = doubled.listen(handler);
        source.set(6);
        assert_eq!(doubled.value(), 12);
        assert_eq!(*seen.borrow(), vec![12]);
    }

    #[test]
    fn test_switch_c() {
        let a = MutableCell::new(1);
        let b = MutableCell::new(2);
        let outer = MutableCell::new(a.cell());
        let switched = Cell::switch_c(&outer.cell());
        let (seen, handler) = recorder::<i32>();
        let _sub = switched.listen(handler);
        assert_eq!(switched.value(), 1);

        outer.set(b.cell());
        assert_eq!(switched.value(), 2);

        a.set(10);
        assert_eq!(switched.value(), 2);

        b.set(20);
        assert_eq!(switched.value(), 20);
        assert_eq!(*seen.borrow(), vec![2, 20]);
    }

    #[test]
    fn test_switch_c_releases_old_inner() {
        let a = MutableCell::new(1);
        let b = MutableCell::new(2);
        let outer = MutableCell::new(a.cell());
        let switched = Cell::switch_c(&outer.cell());
        let _sub = switched.listen(|_| {});
        assert!(a.cell().is_active());

        outer.set(b.cell());
        assert!(!a.cell().is_active());
        assert!(b.cell().is_active());

        // Switching back and forth never accumulates listeners
        for _ in 0..5 {
            outer.set(a.cell());
            outer.set(b.cell());
        }
        assert_eq!(b.cell().updates().listener_count(), 1);
        assert_eq!(a.cell().updates().listener_count(), 0);
    }

    #[test]
    fn test_switch_s() {
        let first = StreamSink::new();
        let second = StreamSink::new();
        let outer = MutableCell::new(first.stream());
        let switched = Cell::switch_s(&outer.cell());
        let (seen, handler) = recorder::<&'static str>();
        let _sub = switched.listen(handler);

        first.send("first-1");
        outer.set(second.stream());
        first.send("first-2");
        second.send("second-1");

        assert_eq!(*seen.borrow(), vec!["first-1", "second-1"]);
        assert!(!first.stream().is_active());
    }

    #[test]
    fn test_switch_s_deactivates_with_last_listener() {
        let inner = StreamSink::<i32>::new();
        let outer = MutableCell::new(inner.stream());
        let switched = Cell::switch_s(&outer.cell());

        let mut sub = switched.listen(|_| {});
        assert!(inner.stream().is_active());
        assert!(outer.cell().is_active());

        sub.cancel().unwrap();
        assert!(!inner.stream().is_active());
        assert!(!outer.cell().is_active());
    }

    #[test]
    fn test_sequence_snapshots_whole_array() {
        let a = MutableCell::new(1);
        let b = MutableCell::new(2);
        let seq = Cell::sequence([a.cell(), b.cell()]);
        let (seen, handler) = recorder::<Vec<i32>>();
        let _sub = seq.listen(handler);
        assert_eq!(seq.value(), vec![1, 2]);

        b.set(3);
        a.set(4);

        assert_eq!(*seen.borrow(), vec![vec![1, 3], vec![4, 3]]);
    }

    #[test]
    fn test_lift2() {
        let a = MutableCell::new(1);
        let b = MutableCell::new(10);
        let sum = Cell::lift2(&a.cell(), &b.cell(), |x, y| x + y);
        let _sub = sum.listen(|_| {});
        assert_eq!(sum.value(), 11);

        a.set(2);
        assert_eq!(sum.value(), 12);
        b.set(20);
        assert_eq!(sum.value(), 22);
    }

    #[test]
    fn test_retain_keeps_hold_tracking() {
        let sink = StreamSink::new();
        let held = sink.stream().hold(0).retain().unwrap();

        sink.send(4);
        assert_eq!(held.value(), 4);
        assert!(held.is_active());

        let updates = held.updates();
        drop(held);
        assert!(!updates.is_active());
    }

    #[test]
    fn test_cell_identity() {
        let a = MutableCell::new(0);
        let b = MutableCell::new(0);
        assert_eq!(a.cell(), a.cell());
        assert_ne!(a.cell(), b.cell());
    }
}
