//! Decides when the layer recomputes marker heights.
//!
//! Surface lifecycle events are coalesced behind a short debounce window, and
//! a bounded bootstrap burst keeps refreshing for a few seconds after the
//! layer is attached while terrain tiles are still arriving. Times are
//! durations since the host's epoch, so the scheduler is driven the same way
//! from a Bevy clock or from a test.

use std::time::Duration;

use bevy::prelude::Event;
use bitflags::bitflags;

use crate::config::ScheduleConfig;

bitflags! {
    /// Why a refresh ran.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RefreshTrigger: u16 {
        const STYLE_DATA = 1 << 0;
        const SOURCE_DATA = 1 << 1;
        const MOVE_END = 1 << 2;
        const ZOOM_END = 1 << 3;
        const LOAD = 1 << 4;
        const BOOTSTRAP = 1 << 5;
        const CALIBRATED = 1 << 6;
        const TUNING = 1 << 7;
        const MANUAL = 1 << 8;
        const CONFIG_RELOAD = 1 << 9;

        const DATA_CHANGED = Self::STYLE_DATA.bits() | Self::SOURCE_DATA.bits();
        const VIEW_CHANGED = Self::MOVE_END.bits() | Self::ZOOM_END.bits();
    }
}

impl Default for RefreshTrigger {
    fn default() -> Self {
        Self::empty()
    }
}

/// Lifecycle notifications from the render surface.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceEvent {
    StyleData,
    SourceData,
    MoveEnd,
    ZoomEnd,
    Load,
}

impl SurfaceEvent {
    pub fn trigger(self) -> RefreshTrigger {
        match self {
            SurfaceEvent::StyleData => RefreshTrigger::STYLE_DATA,
            SurfaceEvent::SourceData => RefreshTrigger::SOURCE_DATA,
            SurfaceEvent::MoveEnd => RefreshTrigger::MOVE_END,
            SurfaceEvent::ZoomEnd => RefreshTrigger::ZOOM_END,
            SurfaceEvent::Load => RefreshTrigger::LOAD,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "styledata" => Some(SurfaceEvent::StyleData),
            "sourcedata" => Some(SurfaceEvent::SourceData),
            "moveend" => Some(SurfaceEvent::MoveEnd),
            "zoomend" => Some(SurfaceEvent::ZoomEnd),
            "load" => Some(SurfaceEvent::Load),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingRefresh {
    due: Duration,
    triggers: RefreshTrigger,
}

#[derive(Debug, Clone, Copy)]
struct Bootstrap {
    next_due: Duration,
    interval: Duration,
    remaining: u32,
}

#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    debounce: Duration,
    bootstrap_interval: Duration,
    bootstrap_ticks: u32,
    pending: Option<PendingRefresh>,
    bootstrap: Option<Bootstrap>,
    load_seen: bool,
}

impl RefreshScheduler {
    pub fn new(config: &ScheduleConfig) -> Self {
        Self {
            debounce: config.debounce(),
            bootstrap_interval: config.bootstrap_interval(),
            bootstrap_ticks: config.bootstrap_ticks,
            pending: None,
            bootstrap: None,
            load_seen: false,
        }
    }

    /// Pick up new timings. Work already queued keeps its deadline.
    pub fn reconfigure(&mut self, config: &ScheduleConfig) {
        self.debounce = config.debounce();
        self.bootstrap_interval = config.bootstrap_interval();
        self.bootstrap_ticks = config.bootstrap_ticks;
    }

    /// Queue a debounced refresh. Events arriving while one is queued join
    /// it without pushing the deadline back. `Load` is honoured once.
    pub fn notify(&mut self, event: SurfaceEvent, now: Duration) -> bool {
        if event == SurfaceEvent::Load {
            if self.load_seen {
                return false;
            }
            self.load_seen = true;
        }

        let trigger = event.trigger();
        match self.pending.as_mut() {
            Some(pending) => pending.triggers |= trigger,
            None => {
                self.pending = Some(PendingRefresh {
                    due: now + self.debounce,
                    triggers: trigger,
                })
            }
        }
        true
    }

    /// Arm the bootstrap burst: one refresh every interval, a fixed number
    /// of times, then it cancels itself.
    pub fn start_bootstrap(&mut self, now: Duration) {
        if self.bootstrap_ticks == 0 {
            self.bootstrap = None;
            return;
        }
        self.bootstrap = Some(Bootstrap {
            next_due: now + self.bootstrap_interval,
            interval: self.bootstrap_interval,
            remaining: self.bootstrap_ticks,
        });
    }

    pub fn bootstrap_remaining(&self) -> u32 {
        self.bootstrap.map_or(0, |b| b.remaining)
    }

    /// Everything due at `now`, folded into a single refresh.
    pub fn poll(&mut self, now: Duration) -> Option<RefreshTrigger> {
        let mut due = RefreshTrigger::empty();

        if let Some(pending) = self.pending {
            if pending.due <= now {
                due |= pending.triggers;
                self.pending = None;
            }
        }

        if let Some(mut bootstrap) = self.bootstrap {
            if bootstrap.next_due <= now {
                due |= RefreshTrigger::BOOTSTRAP;
                bootstrap.remaining -= 1;
                bootstrap.next_due += bootstrap.interval;
                if bootstrap.next_due <= now {
                    bootstrap.next_due = now + bootstrap.interval;
                }
            }
            self.bootstrap = (bootstrap.remaining > 0).then_some(bootstrap);
        }

        (!due.is_empty()).then_some(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn scheduler() -> RefreshScheduler {
        RefreshScheduler::new(&ScheduleConfig::default())
    }

    #[test]
    fn events_wait_for_the_debounce_window() {
        let mut scheduler = scheduler();
        assert!(scheduler.notify(SurfaceEvent::MoveEnd, ms(1_000)));
        assert_eq!(scheduler.poll(ms(1_100)), None);
        assert_eq!(scheduler.poll(ms(1_120)), Some(RefreshTrigger::MOVE_END));
        assert_eq!(scheduler.poll(ms(1_200)), None);
    }

    #[test]
    fn bursts_coalesce_into_one_refresh() {
        let mut scheduler = scheduler();
        scheduler.notify(SurfaceEvent::StyleData, ms(0));
        scheduler.notify(SurfaceEvent::SourceData, ms(40));
        scheduler.notify(SurfaceEvent::ZoomEnd, ms(110));
        let fired = scheduler.poll(ms(120)).expect("burst fires at the first deadline");
        assert!(fired.contains(RefreshTrigger::DATA_CHANGED));
        assert!(fired.contains(RefreshTrigger::ZOOM_END));
        assert_eq!(scheduler.poll(ms(1_000)), None);
    }

    #[test]
    fn load_is_only_honoured_once() {
        let mut scheduler = scheduler();
        assert!(scheduler.notify(SurfaceEvent::Load, ms(0)));
        assert_eq!(scheduler.poll(ms(200)), Some(RefreshTrigger::LOAD));
        assert!(!scheduler.notify(SurfaceEvent::Load, ms(300)));
        assert_eq!(scheduler.poll(ms(1_000)), None);
    }

    #[test]
    fn bootstrap_fires_a_bounded_number_of_times() {
        let mut scheduler = scheduler();
        scheduler.start_bootstrap(ms(0));
        let mut fired = 0;
        for step in 1..=60 {
            if let Some(trigger) = scheduler.poll(ms(step * 100)) {
                assert_eq!(trigger, RefreshTrigger::BOOTSTRAP);
                fired += 1;
            }
        }
        assert_eq!(fired, 10);
        assert_eq!(scheduler.bootstrap_remaining(), 0);
    }

    #[test]
    fn late_polls_do_not_replay_missed_bootstrap_ticks() {
        let mut scheduler = scheduler();
        scheduler.start_bootstrap(ms(0));
        assert_eq!(scheduler.poll(ms(3_000)), Some(RefreshTrigger::BOOTSTRAP));
        assert_eq!(scheduler.poll(ms(3_000)), None);
        assert_eq!(scheduler.poll(ms(3_500)), Some(RefreshTrigger::BOOTSTRAP));
        assert_eq!(scheduler.bootstrap_remaining(), 8);
    }

    #[test]
    fn zero_bootstrap_ticks_disables_the_burst() {
        let mut scheduler = RefreshScheduler::new(&ScheduleConfig {
            bootstrap_ticks: 0,
            ..ScheduleConfig::default()
        });
        scheduler.start_bootstrap(ms(0));
        assert_eq!(scheduler.poll(ms(10_000)), None);
    }

    #[test]
    fn event_names_match_surface_vocabulary() {
        assert_eq!(SurfaceEvent::parse("moveend"), Some(SurfaceEvent::MoveEnd));
        assert_eq!(SurfaceEvent::parse("load"), Some(SurfaceEvent::Load));
        assert_eq!(SurfaceEvent::parse("click"), None);
    }
}
