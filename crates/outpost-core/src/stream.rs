//! Event streams: discrete occurrences pushed to the listeners registered now
//!
//! A stream node is *dormant* while it has no listeners and *active* while it
//! has at least one. The first listener links the node to its upstream
//! sources, the last one leaving unlinks it again, so an unobserved chain of
//! combinators costs nothing and holds no subscriptions.

use crate::cell::{Cell, Sampler};
use crate::{Error, Result};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::ops::Add;
use std::rc::{Rc, Weak};

pub(crate) type Handler<A> = Rc<dyn Fn(&A)>;

/// Identifier of a listener registered on a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Get the raw ID value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener:{}", self.0)
    }
}

/// The activation effect of a node
///
/// `link` runs on the dormant→active edge and `unlink` on the matching
/// active→dormant edge. A failed `link` must leave nothing subscribed.
pub(crate) trait Upstream<A> {
    fn link(&self, out: &Emitter<A>) -> Result<()>;
    fn unlink(&self);
}

pub(crate) struct StreamNode<A> {
    listeners: RefCell<IndexMap<ListenerId, Handler<A>>>,
    next_id: RefCell<u64>,
    upstream: Option<Rc<dyn Upstream<A>>>,
    /// Latest value slot of cell nodes, written before listeners run
    held: Option<Rc<RefCell<A>>>,
}

impl<A: Clone + 'static> StreamNode<A> {
    pub(crate) fn new(
        upstream: Option<Rc<dyn Upstream<A>>>,
        held: Option<Rc<RefCell<A>>>,
    ) -> Rc<Self> {
        Rc::new(Self {
            listeners: RefCell::new(IndexMap::new()),
            next_id: RefCell::new(0),
            upstream,
            held,
        })
    }

    pub(crate) fn is_active(&self) -> bool {
        !self.listeners.borrow().is_empty()
    }

    fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    fn add_listener(self: &Rc<Self>, handler: Handler<A>) -> Result<ListenerId> {
        let id = {
            let mut next = self.next_id.borrow_mut();
            *next += 1;
            ListenerId(*next)
        };
        let was_dormant = !self.is_active();
        self.listeners.borrow_mut().insert(id, handler);

        if was_dormant {
            if let Some(upstream) = &self.upstream {
                tracing::trace!(%id, "stream node activating");
                if let Err(err) = upstream.link(&Emitter(Rc::downgrade(self))) {
                    let _rolled_back = self.listeners.borrow_mut().shift_remove(&id);
                    return Err(err);
                }
            }
        }
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) -> Result<()> {
        let removed = self.listeners.borrow_mut().shift_remove(&id);
        if removed.is_none() {
            return Err(Error::InvalidSubscription);
        }
        if !self.is_active() {
            if let Some(upstream) = &self.upstream {
                tracing::trace!(%id, "stream node deactivating");
                upstream.unlink();
            }
        }
        Ok(())
    }

    /// Deliver one occurrence to the listeners registered at this moment
    pub(crate) fn fire(&self, a: A) {
        if let Some(held) = &self.held {
            *held.borrow_mut() = a.clone();
        }
        let snapshot: Vec<(ListenerId, Handler<A>)> = self
            .listeners
            .borrow()
            .iter()
            .map(|(id, handler)| (*id, Rc::clone(handler)))
            .collect();
        for (id, handler) in snapshot {
            // A listener cancelled by an earlier one must not see this occurrence
            if self.listeners.borrow().contains_key(&id) {
                handler(&a);
            }
        }
    }
}

/// Type-erased detach half of a node, held by subscriptions
pub(crate) trait Detach {
    fn detach(&self, id: ListenerId) -> Result<()>;
}

impl<A: Clone + 'static> Detach for StreamNode<A> {
    fn detach(&self, id: ListenerId) -> Result<()> {
        self.remove_listener(id)
    }
}

/// Write handle into a stream node
///
/// Holds the node weakly: emitting into a node nobody references any more
/// is a no-op.
pub struct Emitter<A>(Weak<StreamNode<A>>);

impl<A> Clone for Emitter<A> {
    fn clone(&self) -> Self {
        Self(Weak::clone(&self.0))
    }
}

impl<A: Clone + 'static> Emitter<A> {
    /// Push one occurrence downstream
    pub fn emit(&self, a: A) {
        if let Some(node) = self.0.upgrade() {
            node.fire(a);
        }
    }
}

/// Handle returned by `listen`
///
/// Cancellation is explicit: dropping a subscription leaves the listener
/// registered.
pub struct Subscription {
    node: Rc<dyn Detach>,
    id: ListenerId,
    cancelled: bool,
}

impl Subscription {
    /// Remove the listener; a second call fails with `InvalidSubscription`
    pub fn cancel(&mut self) -> Result<()> {
        if self.cancelled {
            return Err(Error::InvalidSubscription);
        }
        self.cancelled = true;
        self.node.detach(self.id)
    }

    /// Check whether `cancel` already ran
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// The listener this subscription controls
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}

/// Cancel an internal upstream subscription, if any
pub(crate) fn release(sub: Option<Subscription>) {
    if let Some(mut sub) = sub {
        if let Err(err) = sub.cancel() {
            tracing::error!(%err, id = %sub.id(), "failed to release upstream subscription");
        }
    }
}

/// Forward every occurrence of `source` into `out`
pub(crate) fn forward<A: Clone + 'static>(
    source: &EventStream<A>,
    out: &Emitter<A>,
) -> Result<Subscription> {
    let out = out.clone();
    source.try_listen(move |a| out.emit(a.clone()))
}

/// Single-source upstream: runs `step` for every occurrence of `source`
struct Relay<A, B> {
    source: EventStream<A>,
    step: Rc<dyn Fn(&Emitter<B>, &A)>,
    sub: RefCell<Option<Subscription>>,
}

impl<A, B> Relay<A, B> {
    fn new(source: EventStream<A>, step: impl Fn(&Emitter<B>, &A) + 'static) -> Self {
        Self {
            source,
            step: Rc::new(step),
            sub: RefCell::new(None),
        }
    }
}

impl<A: Clone + 'static, B: Clone + 'static> Upstream<B> for Relay<A, B> {
    fn link(&self, out: &Emitter<B>) -> Result<()> {
        let out = out.clone();
        let step = Rc::clone(&self.step);
        let sub = self.source.try_listen(move |a| step(&out, a))?;
        *self.sub.borrow_mut() = Some(sub);
        Ok(())
    }

    fn unlink(&self) {
        let sub = self.sub.borrow_mut().take();
        release(sub);
    }
}

struct Merge<A> {
    sources: Vec<EventStream<A>>,
    subs: RefCell<Vec<Subscription>>,
}

impl<A: Clone + 'static> Upstream<A> for Merge<A> {
    fn link(&self, out: &Emitter<A>) -> Result<()> {
        let mut subs = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match forward(source, out) {
                Ok(sub) => subs.push(sub),
                Err(err) => {
                    for sub in subs {
                        release(Some(sub));
                    }
                    return Err(err);
                }
            }
        }
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

struct Activation<A> {
    on_link: Box<dyn Fn(Emitter<A>)>,
    on_unlink: Box<dyn Fn()>,
}

impl<A: Clone + 'static> Upstream<A> for Activation<A> {
    fn link(&self, out: &Emitter<A>) -> Result<()> {
        (self.on_link)(out.clone());
        Ok(())
    }

    fn unlink(&self) {
        (self.on_unlink)();
    }
}

/// A stream of discrete occurrences of `A`
///
/// Handles are cheap to clone and all clones share one node. New listeners
/// only see occurrences fired after they were added.
pub struct EventStream<A> {
    pub(crate) node: Rc<StreamNode<A>>,
}

impl<A> Clone for EventStream<A> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
        }
    }
}

impl<A> PartialEq for EventStream<A> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }
}

impl<A> fmt::Debug for EventStream<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("listeners", &self.node.listeners.borrow().len())
            .finish()
    }
}

impl<A: Clone + 'static> EventStream<A> {
    pub(crate) fn from_node(node: Rc<StreamNode<A>>) -> Self {
        Self { node }
    }

    pub(crate) fn with_upstream(upstream: impl Upstream<A> + 'static) -> Self {
        Self::from_node(StreamNode::new(Some(Rc::new(upstream)), None))
    }

    /// A stream that never fires
    pub fn never() -> Self {
        Self::from_node(StreamNode::new(None, None))
    }

    /// A root stream driven by a custom activation effect
    ///
    /// `on_link` receives an emitter when the first listener arrives (open a
    /// timer, subscribe to a socket, ...); `on_unlink` runs when the last
    /// listener leaves.
    pub fn from_activation(
        on_link: impl Fn(Emitter<A>) + 'static,
        on_unlink: impl Fn() + 'static,
    ) -> Self {
        Self::with_upstream(Activation {
            on_link: Box::new(on_link),
            on_unlink: Box::new(on_unlink),
        })
    }

    /// Build a stream that refers to itself
    ///
    /// `f` receives a placeholder for the stream it is defining; the
    /// placeholder is bound to the result once `f` returns.
    pub fn looped(f: impl FnOnce(&EventStream<A>) -> EventStream<A>) -> Result<Self> {
        let placeholder = crate::StreamLoop::new();
        let stream = f(&placeholder.stream());
        placeholder.bind(&stream)?;
        Ok(stream)
    }

    // ========================================================================
    // Listening
    // ========================================================================

    /// Register a handler and return its listener ID
    pub fn add_listener(&self, handler: impl Fn(&A) + 'static) -> Result<ListenerId> {
        self.node.add_listener(Rc::new(handler))
    }

    /// Remove a handler registered with `add_listener`
    pub fn remove_listener(&self, id: ListenerId) -> Result<()> {
        self.node.remove_listener(id)
    }

    /// Listen for future occurrences
    pub fn try_listen(&self, handler: impl Fn(&A) + 'static) -> Result<Subscription> {
        let id = self.add_listener(handler)?;
        Ok(Subscription {
            node: Rc::clone(&self.node) as Rc<dyn Detach>,
            id,
            cancelled: false,
        })
    }

    /// Listen for future occurrences
    ///
    /// # Panics
    ///
    /// Panics when activation reaches a loop that was never bound. Use
    /// [`EventStream::try_listen`] to get the error instead.
    pub fn listen(&self, handler: impl Fn(&A) + 'static) -> Subscription {
        match self.try_listen(handler) {
            Ok(sub) => sub,
            Err(err) => panic!("cannot listen to stream: {err}"),
        }
    }

    /// Check whether at least one listener is registered
    pub fn is_active(&self) -> bool {
        self.node.is_active()
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.node.listener_count()
    }

    // ========================================================================
    // Combinators
    // ========================================================================

    /// Transform every occurrence
    pub fn map<B: Clone + 'static>(&self, f: impl Fn(&A) -> B + 'static) -> EventStream<B> {
        EventStream::with_upstream(Relay::new(self.clone(), move |out: &Emitter<B>, a: &A| {
            out.emit(f(a))
        }))
    }

    /// Replace every occurrence with the same value
    pub fn map_to<B: Clone + 'static>(&self, b: B) -> EventStream<B> {
        self.map(move |_| b.clone())
    }

    /// Keep the occurrences satisfying `predicate`
    pub fn filter(&self, predicate: impl Fn(&A) -> bool + 'static) -> EventStream<A> {
        EventStream::with_upstream(Relay::new(self.clone(), move |out: &Emitter<A>, a: &A| {
            if predicate(a) {
                out.emit(a.clone());
            }
        }))
    }

    /// Transform occurrences, dropping those mapped to `None`
    pub fn filter_map<B: Clone + 'static>(
        &self,
        f: impl Fn(&A) -> Option<B> + 'static,
    ) -> EventStream<B> {
        EventStream::with_upstream(Relay::new(self.clone(), move |out: &Emitter<B>, a: &A| {
            if let Some(b) = f(a) {
                out.emit(b);
            }
        }))
    }

    /// Merge with another stream
    pub fn merge(&self, other: &EventStream<A>) -> EventStream<A> {
        Self::merge_set([self.clone(), other.clone()])
    }

    /// Fire once per occurrence of any member stream
    ///
    /// Occurrences are delivered in the order the members actually fire;
    /// simultaneous occurrences are never combined.
    pub fn merge_set(streams: impl IntoIterator<Item = EventStream<A>>) -> EventStream<A> {
        let sources: Vec<_> = streams.into_iter().collect();
        if sources.is_empty() {
            return Self::never();
        }
        Self::with_upstream(Merge {
            sources,
            subs: RefCell::new(Vec::new()),
        })
    }

    /// Hold the latest occurrence in a cell seeded with `initial`
    ///
    /// The cell tracks occurrences while it is active; see
    /// [`Cell::retain`] to keep it active without a listener.
    pub fn hold(&self, initial: A) -> Cell<A> {
        let value = Rc::new(RefCell::new(initial));
        let relay = Relay::new(self.clone(), |out: &Emitter<A>, a: &A| out.emit(a.clone()));
        let node = StreamNode::new(Some(Rc::new(relay)), Some(Rc::clone(&value)));
        Cell::from_parts(node, Sampler::Held(value))
    }

    /// Fold occurrences into a cell: `next = f(current, occurrence)`
    pub fn accum<B: Clone + 'static>(
        &self,
        initial: B,
        f: impl Fn(&B, &A) -> B + 'static,
    ) -> Cell<B> {
        let value = Rc::new(RefCell::new(initial));
        let acc = Rc::clone(&value);
        let relay = Relay::new(self.clone(), move |out: &Emitter<B>, a: &A| {
            let next = f(&acc.borrow(), a);
            out.emit(next);
        });
        let node = StreamNode::new(Some(Rc::new(relay)), Some(Rc::clone(&value)));
        Cell::from_parts(node, Sampler::Held(value))
    }
}

impl<A: Clone + Add<Output = A> + 'static> EventStream<A> {
    /// Running total of all occurrences
    pub fn accum_sum(&self, initial: A) -> Cell<A> {
        self.accum(initial, |acc, a| acc.clone() + a.clone())
    }
}

impl<A: Clone + 'static> EventStream<Option<A>> {
    /// Drop `None` occurrences and unwrap the rest
    pub fn filter_some(&self) -> EventStream<A> {
        self.filter_map(|a| a.clone())
    }
}

/// A root stream fed by hand
pub struct StreamSink<A> {
    stream: EventStream<A>,
}

impl<A> Clone for StreamSink<A> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream.clone(),
        }
    }
}

impl<A: Clone + 'static> StreamSink<A> {
    /// Create a new sink
    pub fn new() -> Self {
        Self {
            stream: EventStream::never(),
        }
    }

    /// Fire one occurrence, synchronously, to the current listeners
    pub fn send(&self, a: A) {
        self.stream.node.fire(a);
    }

    /// The stream this sink feeds
    pub fn stream(&self) -> EventStream<A> {
        self.stream.clone()
    }
}

impl<A: Clone + 'static> Default for StreamSink<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recorder<A: Clone + 'static>() -> (Rc<RefCell<Vec<A>>>, impl Fn(&A) + 'static) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        (seen, move |a: &A| sink.borrow_mut().push(a.clone()))
    }

    /// A stream whose activation effects are counted
    fn counted_stream() -> (EventStream<i32>, Rc<RefCell<(u32, u32)>>) {
        let counts = Rc::new(RefCell::new((0, 0)));
        let on_link = Rc::clone(&counts);
        let on_unlink = Rc::clone(&counts);
        let stream = EventStream::from_activation(
            move |_emitter| on_link.borrow_mut().0 += 1,
            move || on_unlink.borrow_mut().1 += 1,
        );
        (stream, counts)
    }

    #[test]
    fn test_listen_then_send_delivers_once() {
        let sink = StreamSink::new();
        let (seen, handler) = recorder::<i32>();
        let _sub = sink.stream().listen(handler);

        sink.send(7);

        assert_eq!(*seen.borrow(), vec![7]);
    }

    #[test]
    fn test_new_listener_misses_past_occurrences() {
        let sink = StreamSink::new();
        sink.send(1);
        let (seen, handler) = recorder::<i32>();
        let _sub = sink.stream().listen(handler);
        sink.send(2);

        assert_eq!(*seen.borrow(), vec![2]);
    }

    #[test]
    fn test_activation_runs_once_per_edge() {
        let (stream, counts) = counted_stream();
        let mapped = stream.map(|x| x + 1);

        let mut first = mapped.listen(|_| {});
        let mut second = mapped.listen(|_| {});
        assert_eq!(*counts.borrow(), (1, 0));

        first.cancel().unwrap();
        assert_eq!(*counts.borrow(), (1, 0));

        second.cancel().unwrap();
        assert_eq!(*counts.borrow(), (1, 1));

        let mut third = mapped.listen(|_| {});
        assert_eq!(*counts.borrow(), (2, 1));
        third.cancel().unwrap();
        assert_eq!(*counts.borrow(), (2, 2));
    }

    #[test]
    fn test_double_cancel_is_rejected() {
        let sink: StreamSink<i32> = StreamSink::new();
        let mut sub = sink.stream().listen(|_| {});

        assert!(sub.cancel().is_ok());
        assert_eq!(sub.cancel(), Err(Error::InvalidSubscription));
        assert!(sub.is_cancelled());
    }

    #[test]
    fn test_remove_unknown_listener() {
        let sink: StreamSink<i32> = StreamSink::new();
        let id = sink.stream().add_listener(|_| {}).unwrap();

        assert!(sink.stream().remove_listener(id).is_ok());
        assert_eq!(
            sink.stream().remove_listener(id),
            Err(Error::InvalidSubscription)
        );
    }

    #[test]
    fn test_map_filter() {
        let sink = StreamSink::new();
        let evens = sink.stream().filter(|x: &i32| x % 2 == 0).map(|x| x * 10);
        let (seen, handler) = recorder::<i32>();
        let _sub = evens.listen(handler);

        for x in 1..=4 {
            sink.send(x);
        }

        assert_eq!(*seen.borrow(), vec![20, 40]);
    }

    #[test]
    fn test_filter_map_and_filter_some() {
        let sink = StreamSink::new();
        let parsed = sink.stream().filter_map(|s: &&str| s.parse::<i32>().ok());
        let (seen, handler) = recorder::<i32>();
        let _sub = parsed.listen(handler);

        sink.send("1");
        sink.send("x");
        sink.send("3");
        assert_eq!(*seen.borrow(), vec![1, 3]);

        let options = StreamSink::new();
        let (some_seen, some_handler) = recorder::<char>();
        let _sub = options.stream().filter_some().listen(some_handler);
        options.send(None);
        options.send(Some('a'));
        assert_eq!(*some_seen.borrow(), vec!['a']);
    }

    #[test]
    fn test_merge_set_keeps_firing_order() {
        let a = StreamSink::new();
        let b = StreamSink::new();
        let merged = EventStream::merge_set([a.stream(), b.stream()]);
        let (seen, handler) = recorder::<&'static str>();
        let _sub = merged.listen(handler);

        b.send("b1");
        a.send("a1");
        b.send("b2");

        assert_eq!(*seen.borrow(), vec!["b1", "a1", "b2"]);
    }

    #[test]
    fn test_merge_delivers_simultaneous_occurrences_separately() {
        let sink = StreamSink::new();
        let doubled = sink.stream().map(|x: &i32| x * 2);
        let merged = sink.stream().merge(&doubled);
        let (seen, handler) = recorder::<i32>();
        let _sub = merged.listen(handler);

        sink.send(3);

        assert_eq!(*seen.borrow(), vec![3, 6]);
    }

    #[test]
    fn test_merge_set_of_nothing_never_fires() {
        let merged: EventStream<i32> = EventStream::merge_set(Vec::new());
        let _sub = merged.listen(|_| panic!("never fires"));
    }

    #[test]
    fn test_hold() {
        let sink = StreamSink::new();
        let cell = sink.stream().hold(0);
        let _sub = cell.listen(|_| {});
        assert_eq!(cell.value(), 0);

        sink.send(5);
        assert_eq!(cell.value(), 5);
    }

    #[test]
    fn test_accum_running_sum() {
        let sink = StreamSink::new();
        let sum = sink.stream().accum(0, |acc: &i32, a: &i32| acc + a);
        let (seen, handler) = recorder::<i32>();
        let _sub = sum.listen(handler);

        for x in [1, 2, 3] {
            sink.send(x);
        }

        assert_eq!(*seen.borrow(), vec![1, 3, 6]);
        assert_eq!(sum.value(), 6);
    }

    #[test]
    fn test_accum_activation_follows_source() {
        let (stream, counts) = counted_stream();
        let sum = stream.accum_sum(0);
        assert_eq!(*counts.borrow(), (0, 0));

        let mut sub = sum.listen(|_| {});
        assert_eq!(*counts.borrow(), (1, 0));
        sub.cancel().unwrap();
        assert_eq!(*counts.borrow(), (1, 1));
    }

    #[test]
    fn test_listener_cancelled_mid_delivery_is_skipped() {
        let sink = StreamSink::new();
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let (seen, handler) = recorder::<i32>();

        let killer = Rc::clone(&victim);
        let _first = sink.stream().listen(move |_: &i32| {
            if let Some(mut sub) = killer.borrow_mut().take() {
                sub.cancel().unwrap();
            }
        });
        *victim.borrow_mut() = Some(sink.stream().listen(handler));

        sink.send(1);
        sink.send(2);

        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_emitter_into_dropped_node_is_noop() {
        let emitter: Rc<RefCell<Option<Emitter<i32>>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&emitter);
        let stream = EventStream::from_activation(move |e| *slot.borrow_mut() = Some(e), || {});
        let mut sub = stream.listen(|_| {});
        sub.cancel().unwrap();
        drop(sub);
        drop(stream);

        if let Some(e) = emitter.borrow().as_ref() {
            e.emit(1);
        };
    }
}
