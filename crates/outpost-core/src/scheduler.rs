//! Injected virtual clock and timers
//!
//! Time-driven streams are opened against a [`Scheduler`] handle instead of
//! ambient wall-clock timers. Tests drive it with [`Scheduler::advance_by`];
//! a host process drives it from its own timer.

use crate::stream::Emitter;
use crate::EventStream;
use std::cell::{Cell as StdCell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Identifier of a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer:{}", self.0)
    }
}

type Action = Rc<dyn Fn()>;

struct Clock {
    now: u64,
    next_id: u64,
    /// Ordered by due time, then creation order
    timers: BTreeMap<(u64, TimerId), Action>,
}

/// Virtual millisecond clock shared by every time-driven stream
#[derive(Clone)]
pub struct Scheduler {
    clock: Rc<RefCell<Clock>>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clock = self.clock.borrow();
        f.debug_struct("Scheduler")
            .field("now", &clock.now)
            .field("pending", &clock.timers.len())
            .finish()
    }
}

impl Scheduler {
    /// Create a clock reading `start_ms`
    pub fn new(start_ms: u64) -> Self {
        Self {
            clock: Rc::new(RefCell::new(Clock {
                now: start_ms,
                next_id: 0,
                timers: BTreeMap::new(),
            })),
        }
    }

    /// Current time in milliseconds
    pub fn now(&self) -> u64 {
        self.clock.borrow().now
    }

    /// Number of timers waiting to fire
    pub fn pending(&self) -> usize {
        self.clock.borrow().timers.len()
    }

    /// Run `action` once when the clock reaches `due`
    pub fn schedule(&self, due: u64, action: impl Fn() + 'static) -> TimerId {
        let mut clock = self.clock.borrow_mut();
        clock.next_id += 1;
        let id = TimerId(clock.next_id);
        clock.timers.insert((due, id), Rc::new(action));
        id
    }

    /// Drop a pending timer; returns `false` if it already fired or never existed
    pub fn cancel(&self, id: TimerId) -> bool {
        let mut clock = self.clock.borrow_mut();
        let key = clock.timers.keys().find(|(_, timer)| *timer == id).copied();
        match key {
            Some(key) => clock.timers.remove(&key).is_some(),
            None => false,
        }
    }

    /// Move the clock forward to `t`, firing every timer due on the way
    ///
    /// Each firing is a separate propagation pass, run with the clock set to
    /// the timer's due time. Moving backwards is ignored.
    pub fn advance_to(&self, t: u64) {
        loop {
            let next = {
                let mut clock = self.clock.borrow_mut();
                match clock.timers.keys().next().copied() {
                    Some(key) if key.0 <= t => {
                        clock.now = clock.now.max(key.0);
                        clock.timers.remove(&key).map(|action| (key.1, action))
                    }
                    _ => None,
                }
            };
            let Some((id, action)) = next else { break };
            tracing::trace!(%id, now = self.now(), "timer firing");
            action();
        }
        let mut clock = self.clock.borrow_mut();
        clock.now = clock.now.max(t);
    }

    /// Move the clock forward by `ms`
    pub fn advance_by(&self, ms: u64) {
        let target = self.now().saturating_add(ms);
        self.advance_to(target);
    }

    /// A stream firing every `period_ms` while it has listeners
    ///
    /// The timer opens on activation (first firing one period later) and is
    /// closed on deactivation.
    pub fn periodic(&self, period_ms: u64) -> EventStream<()> {
        self.repeating(period_ms, |now, period| now + period)
    }

    /// A stream firing at `anchor + k * period_ms` (`k >= 1`) while it has
    /// listeners
    ///
    /// Activation arms the first of those instants still ahead of the
    /// clock, so relinking never shifts the phase.
    pub fn periodic_from(&self, anchor: u64, period_ms: u64) -> EventStream<()> {
        self.repeating(period_ms, move |now, period| {
            let k = if now < anchor {
                1
            } else {
                (now - anchor) / period + 1
            };
            anchor + k * period
        })
    }

    fn repeating(
        &self,
        period_ms: u64,
        first_due: impl Fn(u64, u64) -> u64 + 'static,
    ) -> EventStream<()> {
        let period_ms = period_ms.max(1);
        let armed: Rc<RefCell<Option<TimerId>>> = Rc::new(RefCell::new(None));
        let link_scheduler = self.clone();
        let link_armed = Rc::clone(&armed);
        let unlink_scheduler = self.clone();
        EventStream::from_activation(
            move |emitter| {
                let due = first_due(link_scheduler.now(), period_ms);
                arm_periodic(&link_scheduler, due, period_ms, emitter, &link_armed);
            },
            move || {
                if let Some(id) = armed.borrow_mut().take() {
                    unlink_scheduler.cancel(id);
                }
            },
        )
    }

    /// A stream firing once, when the clock reaches `due`
    ///
    /// A due time already in the past never fires.
    pub fn at(&self, due: u64) -> EventStream<()> {
        let fired = Rc::new(StdCell::new(false));
        let armed: Rc<RefCell<Option<TimerId>>> = Rc::new(RefCell::new(None));
        let link_scheduler = self.clone();
        let link_armed = Rc::clone(&armed);
        let unlink_scheduler = self.clone();
        EventStream::from_activation(
            move |emitter: Emitter<()>| {
                if fired.get() || due < link_scheduler.now() {
                    return;
                }
                let fired = Rc::clone(&fired);
                let slot = Rc::clone(&link_armed);
                let id = link_scheduler.schedule(due, move || {
                    fired.set(true);
                    slot.borrow_mut().take();
                    emitter.emit(());
                });
                *link_armed.borrow_mut() = Some(id);
            },
            move || {
                if let Some(id) = armed.borrow_mut().take() {
                    unlink_scheduler.cancel(id);
                }
            },
        )
    }
}

fn arm_periodic(
    scheduler: &Scheduler,
    due: u64,
    period_ms: u64,
    emitter: Emitter<()>,
    armed: &Rc<RefCell<Option<TimerId>>>,
) {
    let clock = Rc::downgrade(&scheduler.clock);
    let next_armed = Rc::clone(armed);
    let id = scheduler.schedule(due, move || {
        // Re-arm before emitting so a listener leaving in this pass cancels
        // the next firing
        if let Some(clock) = clock.upgrade() {
            let scheduler = Scheduler { clock };
            arm_periodic(&scheduler, due + period_ms, period_ms, emitter.clone(), &next_armed);
        }
        emitter.emit(());
    });
    *armed.borrow_mut() = Some(id);
}
