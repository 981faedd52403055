//! Reactive collections: a cell over a set of members
//!
//! Membership changes are observed as whole-set replacements. Members keep
//! insertion order so that derived values (and their serialized form) are
//! stable.

use crate::stream::{forward, release, Emitter, Subscription, Upstream};
use crate::{Cell, EventStream, MutableCell, Result};
use std::cell::RefCell;
use std::rc::Rc;

/// Snapshot of a collection's members
pub type Members<A> = Rc<Vec<A>>;

/// A continuous set of `A`
pub struct ReactiveCollection<A> {
    cell: Cell<Members<A>>,
}

impl<A> Clone for ReactiveCollection<A> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<A: Clone + 'static> ReactiveCollection<A> {
    /// Wrap a cell of member snapshots
    pub fn from_cell(cell: Cell<Members<A>>) -> Self {
        Self { cell }
    }

    /// A collection that never changes
    pub fn constant(members: Vec<A>) -> Self {
        Self::from_cell(Cell::constant(Rc::new(members)))
    }

    /// The underlying cell of member snapshots
    pub fn as_cell(&self) -> Cell<Members<A>> {
        self.cell.clone()
    }

    /// Current members
    pub fn members(&self) -> Members<A> {
        self.cell.value()
    }

    /// Current member count
    pub fn len(&self) -> usize {
        self.members().len()
    }

    /// Check whether the collection is currently empty
    pub fn is_empty(&self) -> bool {
        self.members().is_empty()
    }

    /// Transform every member
    pub fn map<B: Clone + 'static>(&self, f: impl Fn(&A) -> B + 'static) -> ReactiveCollection<B> {
        ReactiveCollection::from_cell(
            self.cell
                .map(move |members| Rc::new(members.iter().map(&f).collect::<Vec<_>>())),
        )
    }

    /// Map every member to a cell and flatten
    ///
    /// The result re-snapshots when membership changes or when any member's
    /// cell changes.
    pub fn fuse_map<B: Clone + 'static>(
        &self,
        f: impl Fn(&A) -> Cell<B> + 'static,
    ) -> ReactiveCollection<B> {
        let fused = self.cell.switch_map_c(move |members| {
            Cell::sequence(members.iter().map(&f)).map(|values| Rc::new(values.clone()))
        });
        ReactiveCollection::from_cell(fused)
    }

    /// The unique member satisfying `predicate`
    ///
    /// `None` when no member or more than one member matches.
    pub fn single_where(&self, predicate: impl Fn(&A) -> bool + 'static) -> Cell<Option<A>> {
        self.cell.map(move |members| {
            let mut matching = members.iter().filter(|a| predicate(*a));
            match (matching.next(), matching.next()) {
                (Some(only), None) => Some(only.clone()),
                _ => None,
            }
        })
    }
}

impl<A: Clone + PartialEq + 'static> ReactiveCollection<A> {
    /// Whether `item` is currently a member
    pub fn contains(&self, item: A) -> Cell<bool> {
        self.cell.map(move |members| members.contains(&item))
    }

    /// Fires whenever the stream derived from any current member fires
    ///
    /// On a membership change only added members are subscribed and only
    /// removed ones released; members that stay keep their subscription.
    pub fn merge_map<B: Clone + 'static>(
        &self,
        f: impl Fn(&A) -> EventStream<B> + 'static,
    ) -> EventStream<B> {
        EventStream::with_upstream(MergeMapLink {
            members: self.cell.clone(),
            f: Rc::new(f),
            outer_sub: RefCell::new(None),
            inner: Rc::new(RefCell::new(Vec::new())),
        })
    }
}

type MemberSubs<A> = Rc<RefCell<Vec<(A, Subscription)>>>;

struct MergeMapLink<A, B> {
    members: Cell<Members<A>>,
    f: Rc<dyn Fn(&A) -> EventStream<B>>,
    outer_sub: RefCell<Option<Subscription>>,
    inner: MemberSubs<A>,
}

/// Bring the per-member subscriptions in line with `members`
///
/// Members that fail to subscribe are left out; the first failure is
/// returned once every other member has been handled.
fn reconcile<A: Clone + PartialEq + 'static, B: Clone + 'static>(
    inner: &MemberSubs<A>,
    members: &[A],
    f: &dyn Fn(&A) -> EventStream<B>,
    out: &Emitter<B>,
) -> Result<()> {
    let mut previous = std::mem::take(&mut *inner.borrow_mut());
    let mut next = Vec::with_capacity(members.len());
    let mut failure = None;
    for member in members {
        if let Some(pos) = previous.iter().position(|(kept, _)| kept == member) {
            next.push(previous.swap_remove(pos));
            continue;
        }
        match forward(&f(member), out) {
            Ok(sub) => next.push((member.clone(), sub)),
            Err(err) => {
                failure.get_or_insert(err);
            }
        }
    }
    for (_, sub) in previous {
        release(Some(sub));
    }
    *inner.borrow_mut() = next;
    failure.map_or(Ok(()), Err)
}

impl<A: Clone + PartialEq + 'static, B: Clone + 'static> Upstream<B> for MergeMapLink<A, B> {
    fn link(&self, out: &Emitter<B>) -> Result<()> {
        let inner = Rc::clone(&self.inner);
        let f = Rc::clone(&self.f);
        let on_change = out.clone();
        let outer_sub = self.members.try_listen(move |members: &Members<A>| {
            if let Err(err) = reconcile(&inner, members, &*f, &on_change) {
                tracing::error!(%err, "merge_map could not subscribe to a new member");
            }
        })?;

        if let Err(err) = reconcile(&self.inner, &self.members.value(), &*self.f, out) {
            release(Some(outer_sub));
            self.release_members();
            return Err(err);
        }
        *self.outer_sub.borrow_mut() = Some(outer_sub);
        Ok(())
    }

    fn unlink(&self) {
        self.release_members();
        let outer = self.outer_sub.borrow_mut().take();
        release(outer);
    }
}

impl<A, B> MergeMapLink<A, B> {
    fn release_members(&self) {
        let subs = std::mem::take(&mut *self.inner.borrow_mut());
        for (_, sub) in subs {
            release(Some(sub));
        }
    }
}

impl<A: Clone + 'static> ReactiveCollection<Cell<A>> {
    /// Flatten a collection of cells into a collection of their values
    pub fn fuse(&self) -> ReactiveCollection<A> {
        self.fuse_map(Cell::clone)
    }
}

impl<A: Clone + 'static> ReactiveCollection<Option<A>> {
    /// Drop absent members
    pub fn filter_some(&self) -> ReactiveCollection<A> {
        ReactiveCollection::from_cell(
            self.cell
                .map(|members| Rc::new(members.iter().flatten().cloned().collect::<Vec<_>>())),
        )
    }
}

/// A collection written from outside the graph
///
/// Inserting and removing members is the only external write path for a
/// collection.
pub struct MutableCollection<A> {
    members: MutableCell<Members<A>>,
}

impl<A> Clone for MutableCollection<A> {
    fn clone(&self) -> Self {
        Self {
            members: self.members.clone(),
        }
    }
}

impl<A: Clone + PartialEq + 'static> MutableCollection<A> {
    /// Create an empty collection
    pub fn new() -> Self {
        Self {
            members: MutableCell::new(Rc::new(Vec::new())),
        }
    }

    /// Add a member; returns `false` if an equal member is already present
    pub fn insert(&self, item: A) -> bool {
        let current = self.members.value();
        if current.contains(&item) {
            return false;
        }
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(item);
        self.members.set(Rc::new(next));
        true
    }

    /// Remove a member; returns `false` if it was not present
    pub fn remove(&self, item: &A) -> bool {
        let current = self.members.value();
        if !current.contains(item) {
            return false;
        }
        let next: Vec<A> = current.iter().filter(|a| *a != item).cloned().collect();
        self.members.set(Rc::new(next));
        true
    }

    /// Read-only view
    pub fn collection(&self) -> ReactiveCollection<A> {
        ReactiveCollection::from_cell(self.members.cell())
    }

    /// Current members
    pub fn members(&self) -> Members<A> {
        self.members.value()
    }

    /// Current member count
    pub fn len(&self) -> usize {
        self.members.value().len()
    }

    /// Check whether the collection is currently empty
    pub fn is_empty(&self) -> bool {
        self.members.value().is_empty()
    }
}

impl<A: Clone + PartialEq + 'static> Default for MutableCollection<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StreamSink;

    #[test]
    fn test_insert_remove() {
        let set = MutableCollection::new();
        assert!(set.insert(1));
        assert!(set.insert(2));
        assert!(!set.insert(1));
        assert_eq!(*set.members(), vec![1, 2]);

        assert!(set.remove(&1));
        assert!(!set.remove(&1));
        assert_eq!(*set.members(), vec![2]);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_single_where() {
        let set = MutableCollection::new();
        set.insert(2);
        set.insert(4);
        set.insert(5);
        let even = set.collection().single_where(|x: &i32| x % 2 == 0);
        let _sub = even.listen(|_| {});
        assert_eq!(even.value(), None);

        set.remove(&4);
        assert_eq!(even.value(), Some(2));

        set.remove(&2);
        assert_eq!(even.value(), None);
    }

    #[test]
    fn test_map_and_contains() {
        let set = MutableCollection::new();
        set.insert(1);
        let doubled = set.collection().map(|x: &i32| x * 2);
        let has_three = set.collection().contains(3);
        let _a = doubled.as_cell().listen(|_| {});
        let _b = has_three.listen(|_| {});

        set.insert(3);

        assert_eq!(*doubled.members(), vec![2, 6]);
        assert!(has_three.value());
    }

    #[test]
    fn test_fuse_follows_members_and_values() {
        let a = MutableCell::new(1);
        let b = MutableCell::new(2);
        let set = MutableCollection::new();
        set.insert(a.cell());
        let fused = set.collection().fuse();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let record = Rc::clone(&seen);
        let _sub = fused
            .as_cell()
            .listen(move |members| record.borrow_mut().push((**members).clone()));

        set.insert(b.cell());
        a.set(10);
        set.remove(&a.cell());
        a.set(11);
        b.set(20);

        assert_eq!(
            *seen.borrow(),
            vec![vec![1, 2], vec![10, 2], vec![2], vec![20]]
        );
    }

    #[test]
    fn test_merge_map_follows_membership() {
        let first = StreamSink::new();
        let second = StreamSink::new();
        let set = MutableCollection::new();
        set.insert(first.stream());
        let merged = set.collection().merge_map(EventStream::clone);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let record = Rc::clone(&seen);
        let _sub = merged.listen(move |x: &i32| record.borrow_mut().push(*x));

        first.send(1);
        set.insert(second.stream());
        second.send(2);
        set.remove(&first.stream());
        first.send(3);
        second.send(4);

        assert_eq!(*seen.borrow(), vec![1, 2, 4]);
        assert!(!first.stream().is_active());
    }

    #[test]
    fn test_merge_map_keeps_staying_members_linked() {
        let links = Rc::new(RefCell::new(Vec::new()));
        let counted = |name: &'static str| {
            let on_link = Rc::clone(&links);
            let on_unlink = Rc::clone(&links);
            EventStream::<i32>::from_activation(
                move |_| on_link.borrow_mut().push(format!("link {name}")),
                move || on_unlink.borrow_mut().push(format!("unlink {name}")),
            )
        };
        let a = counted("a");
        let b = counted("b");
        let c = counted("c");
        let set = MutableCollection::new();
        set.insert(a.clone());
        let merged = set.collection().merge_map(EventStream::clone);
        let mut sub = merged.listen(|_| {});

        set.insert(b.clone());
        set.insert(c.clone());
        set.remove(&b);
        sub.cancel().unwrap();

        assert_eq!(
            *links.borrow(),
            vec![
                "link a", "link b", "link c", "unlink b", "unlink a", "unlink c"
            ]
        );
    }

    #[test]
    fn test_filter_some() {
        let set = MutableCollection::new();
        set.insert(Some(1));
        set.insert(None);
        set.insert(Some(3));

        assert_eq!(*set.collection().filter_some().members(), vec![1, 3]);
    }
}
