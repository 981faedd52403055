//! Hex coordinates and buildings

use crate::{Error, GameConfig, Result};
use outpost_core::{Cell, EventStream, Scheduler};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// Axial hex grid coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HexCoord {
    pub i: i32,
    pub j: i32,
}

impl HexCoord {
    pub fn new(i: i32, j: i32) -> Self {
        Self { i, j }
    }

    /// Stable identifier, `"i:j"`
    pub fn key(&self) -> String {
        format!("{}:{}", self.i, self.j)
    }
}

impl fmt::Display for HexCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.i, self.j)
    }
}

/// What a building is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildingKind {
    Habitat,
    Mineshaft,
}

impl BuildingKind {
    /// Wire name
    pub fn name(&self) -> &'static str {
        match self {
            BuildingKind::Habitat => "Habitat",
            BuildingKind::Mineshaft => "Mineshaft",
        }
    }

    /// Time from placement to completion
    pub fn construction_ms(&self, config: &GameConfig) -> u64 {
        match self {
            BuildingKind::Habitat => config.habitat_construction_ms,
            BuildingKind::Mineshaft => config.mineshaft_construction_ms,
        }
    }
}

impl FromStr for BuildingKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Habitat" => Ok(BuildingKind::Habitat),
            "Mineshaft" => Ok(BuildingKind::Mineshaft),
            other => Err(Error::unrecognized("building kind", other)),
        }
    }
}

/// Construction state of a building
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildingState {
    Incomplete { start_time: u64, duration: u64 },
    Complete,
}

impl BuildingState {
    pub fn is_complete(&self) -> bool {
        matches!(self, BuildingState::Complete)
    }

    /// Construction progress at `now`, from 0.0 to 1.0
    pub fn progress(&self, now: u64) -> f64 {
        match *self {
            BuildingState::Complete => 1.0,
            BuildingState::Incomplete { duration: 0, .. } => 1.0,
            BuildingState::Incomplete {
                start_time,
                duration,
            } => (now.saturating_sub(start_time) as f64 / duration as f64).min(1.0),
        }
    }
}

/// A building on the map
///
/// Equality is kind, coordinate and state identity: two buildings placed
/// separately are different even when they look alike.
#[derive(Debug, Clone)]
pub struct Building {
    pub kind: BuildingKind,
    pub coord: HexCoord,
    pub state: Cell<BuildingState>,
    mining: Rc<OnceCell<EventStream<u64>>>,
}

impl PartialEq for Building {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.coord == other.coord && self.state == other.state
    }
}

impl Building {
    /// Wrap an existing state cell
    pub fn new(kind: BuildingKind, coord: HexCoord, state: Cell<BuildingState>) -> Self {
        Self {
            kind,
            coord,
            state,
            mining: Rc::new(OnceCell::new()),
        }
    }

    /// Place a new building, starting construction now
    ///
    /// The construction timer is opened on `scheduler` right away and the
    /// building completes when it fires.
    pub fn create(
        kind: BuildingKind,
        coord: HexCoord,
        scheduler: &Scheduler,
        config: &GameConfig,
    ) -> Result<Self> {
        let start_time = scheduler.now();
        let duration = kind.construction_ms(config);
        let state = scheduler
            .at(start_time + duration)
            .map_to(BuildingState::Complete)
            .hold(BuildingState::Incomplete {
                start_time,
                duration,
            })
            .retain()?;
        tracing::debug!(kind = kind.name(), %coord, duration, "construction started");
        Ok(Self::new(kind, coord, state))
    }

    /// Fires once, when construction completes
    pub fn on_construction_finished(&self) -> EventStream<()> {
        self.state
            .updates()
            .filter(BuildingState::is_complete)
            .map_to(())
    }

    /// Inhabitants living here
    pub fn inhabitants(&self, config: &GameConfig) -> Cell<u32> {
        let kind = self.kind;
        let per_habitat = config.habitat_inhabitants;
        self.state.map(move |state| match (kind, state.is_complete()) {
            (BuildingKind::Habitat, true) => per_habitat,
            _ => 0,
        })
    }

    /// Iron mined per cycle, while this is a complete mineshaft
    ///
    /// Built once per building and shared by every caller. Cycles are
    /// counted from the moment construction completes; a building already
    /// complete when first asked counts from now.
    pub fn on_iron_mined(&self, scheduler: &Scheduler, config: &GameConfig) -> EventStream<u64> {
        if self.kind != BuildingKind::Mineshaft {
            return EventStream::never();
        }
        self.mining
            .get_or_init(|| {
                let completes_at = match self.state.value() {
                    BuildingState::Incomplete {
                        start_time,
                        duration,
                    } => start_time + duration,
                    BuildingState::Complete => scheduler.now(),
                };
                let cycles = scheduler
                    .periodic_from(completes_at, config.mining_period_ms)
                    .map_to(config.iron_per_cycle);
                self.state.switch_map_s(move |state| {
                    if state.is_complete() {
                        cycles.clone()
                    } else {
                        EventStream::never()
                    }
                })
            })
            .clone()
    }
}
