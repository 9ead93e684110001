//! Frame timing for shader effects.
//!
//! A host drives a [`FrameTicker`] once per displayed frame. Anything that
//! needs to react to frames subscribes to the ticker and keeps the returned
//! [`Subscription`] alive for as long as it wants to hear about them:
//!
//! ```text
//!   FrameDriver ──tick()──▶ FrameTicker ──▶ FrameClock (live time)
//!                                      ├──▶ FrameStats
//!                                      └──▶ mounted effects (paint)
//! ```
//!
//! Listeners run in subscription order, so a [`FrameClock`] created before
//! the effects that read it always observes a tick first.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::thread;
use std::time::{Duration, Instant};

/// Frames at or above this duration count as stalls and are left out of
/// [`FrameStats`] averages.
pub const STALL_THRESHOLD: Duration = Duration::from_millis(40);

/// One frame notification delivered to ticker listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTick {
    /// Zero-based index of the frame within the ticker's lifetime.
    pub frame_index: u64,
    /// Host frame timestamp, measured from an arbitrary fixed origin.
    pub timestamp: Duration,
}

type Listener = Box<dyn FnMut(&FrameTick)>;

struct Registration {
    id: u64,
    callback: Listener,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    frame_index: u64,
    dispatching: bool,
    listeners: Vec<Registration>,
    cancelled: Vec<u64>,
}

/// Push-based frame event source.
#[derive(Clone, Default)]
pub struct FrameTicker {
    registry: Rc<RefCell<Registry>>,
}

impl FrameTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for every subsequent tick.
    ///
    /// Listeners added while a tick is being dispatched first run on the next
    /// tick.
    pub fn subscribe(&self, listener: impl FnMut(&FrameTick) + 'static) -> Subscription {
        let mut registry = self.registry.borrow_mut();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push(Registration {
            id,
            callback: Box::new(listener),
        });
        Subscription {
            id,
            registry: Rc::downgrade(&self.registry),
        }
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.registry.borrow().listeners.len()
    }

    /// Index the next tick will carry.
    pub fn frame_index(&self) -> u64 {
        self.registry.borrow().frame_index
    }

    /// Notifies every listener of a new frame at `timestamp`.
    pub fn tick(&self, timestamp: Duration) {
        let (tick, mut active) = {
            let mut registry = self.registry.borrow_mut();
            if registry.dispatching {
                tracing::warn!("ignoring frame tick issued from inside a tick listener");
                return;
            }
            registry.dispatching = true;
            let tick = FrameTick {
                frame_index: registry.frame_index,
                timestamp,
            };
            registry.frame_index += 1;
            (tick, std::mem::take(&mut registry.listeners))
        };

        for registration in &mut active {
            if self.registry.borrow().cancelled.contains(&registration.id) {
                continue;
            }
            (registration.callback)(&tick);
        }

        let cancelled = std::mem::take(&mut self.registry.borrow_mut().cancelled);
        let (dropped, mut kept): (Vec<_>, Vec<_>) = active
            .into_iter()
            .partition(|registration| cancelled.contains(&registration.id));
        {
            let mut registry = self.registry.borrow_mut();
            kept.append(&mut registry.listeners);
            registry.listeners = kept;
            registry.dispatching = false;
        }
        // Listener captures may own subscriptions of their own; release them
        // only once the registry is no longer borrowed.
        drop(dropped);
    }
}

/// Keeps a ticker listener registered; dropping it unsubscribes.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<RefCell<Registry>>,
}

impl Subscription {
    /// Unsubscribes now. Equivalent to dropping the handle.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let id = self.id;
        let removed: Vec<Registration> = {
            let mut registry = registry.borrow_mut();
            let (removed, kept) = std::mem::take(&mut registry.listeners)
                .into_iter()
                .partition(|registration| registration.id == id);
            registry.listeners = kept;
            if registry.dispatching {
                registry.cancelled.push(id);
            }
            removed
        };
        drop(removed);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Unit the bound shader expects its `time` uniform in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeUnit {
    #[default]
    Seconds,
    Milliseconds,
}

impl TimeUnit {
    pub fn convert(self, elapsed: Duration) -> f32 {
        match self {
            TimeUnit::Seconds => elapsed.as_secs_f32(),
            TimeUnit::Milliseconds => (elapsed.as_secs_f64() * 1_000.0) as f32,
        }
    }
}

impl std::str::FromStr for TimeUnit {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "secs" | "seconds" => Ok(TimeUnit::Seconds),
            "ms" | "millis" | "milliseconds" => Ok(TimeUnit::Milliseconds),
            other => Err(format!(
                "unknown time unit '{other}'; expected 'seconds' or 'milliseconds'"
            )),
        }
    }
}

/// Capability yielding the current animation time.
pub trait TimeProducer {
    fn current_time(&self) -> f32;
}

/// Time producer that always reports the same value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedTimeProducer {
    time: f32,
}

impl FixedTimeProducer {
    pub fn new(time: f32) -> Self {
        Self { time }
    }
}

impl TimeProducer for FixedTimeProducer {
    fn current_time(&self) -> f32 {
        self.time
    }
}

#[derive(Debug, Default)]
struct ClockState {
    origin: Cell<Option<Duration>>,
    latest: Cell<Duration>,
}

impl ClockState {
    fn observe(&self, tick: &FrameTick) {
        let origin = match self.origin.get() {
            Some(origin) => origin,
            None => {
                self.origin.set(Some(tick.timestamp));
                tick.timestamp
            }
        };
        let elapsed = tick.timestamp.saturating_sub(origin);
        if elapsed > self.latest.get() {
            self.latest.set(elapsed);
        }
    }
}

/// Live time producer fed by a [`FrameTicker`].
///
/// Time is measured from the first tick the clock observes and never moves
/// backwards.
pub struct FrameClock {
    unit: TimeUnit,
    state: Rc<ClockState>,
    _subscription: Subscription,
}

impl FrameClock {
    pub fn new(ticker: &FrameTicker, unit: TimeUnit) -> Self {
        let state = Rc::new(ClockState::default());
        let listener_state = Rc::clone(&state);
        let subscription = ticker.subscribe(move |tick| listener_state.observe(tick));
        Self {
            unit,
            state,
            _subscription: subscription,
        }
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn elapsed(&self) -> Duration {
        self.state.latest.get()
    }
}

impl TimeProducer for FrameClock {
    fn current_time(&self) -> f32 {
        self.unit.convert(self.elapsed())
    }
}

/// Running frame-time average that ignores stalls.
#[derive(Debug, Clone, Default)]
pub struct FrameStats {
    last_timestamp: Option<Duration>,
    total: Duration,
    samples: u32,
    stalls: u32,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, tick: &FrameTick) {
        if let Some(last) = self.last_timestamp.replace(tick.timestamp) {
            let frame = tick.timestamp.saturating_sub(last);
            if frame < STALL_THRESHOLD {
                self.total += frame;
                self.samples += 1;
            } else {
                self.stalls += 1;
            }
        }
    }

    pub fn average_frame_ms(&self) -> f32 {
        if self.samples == 0 {
            return 0.0;
        }
        self.total.as_secs_f32() * 1_000.0 / self.samples as f32
    }

    pub fn fps(&self) -> u32 {
        let average = self.average_frame_ms();
        if average <= f32::EPSILON {
            0
        } else {
            (1_000.0 / average).round() as u32
        }
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn stalls(&self) -> u32 {
        self.stalls
    }
}

/// Produces tick timestamps for a [`FrameTicker`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameDriver {
    /// Synthetic `index * interval` timestamps, no sleeping.
    Fixed { interval: Duration },
    /// Monotonic-clock timestamps, paced to `interval`.
    Realtime { interval: Duration },
}

impl FrameDriver {
    /// Builds a driver for `fps` frames per second; rates with no
    /// representable interval fall back to 60.
    pub fn from_fps(fps: f32, realtime: bool) -> Self {
        let interval = Some(fps)
            .filter(|fps| *fps > 0.0)
            .and_then(|fps| Duration::try_from_secs_f32(1.0 / fps).ok())
            .unwrap_or_else(|| Duration::from_secs_f32(1.0 / 60.0));
        if realtime {
            FrameDriver::Realtime { interval }
        } else {
            FrameDriver::Fixed { interval }
        }
    }

    pub fn interval(&self) -> Duration {
        match self {
            FrameDriver::Fixed { interval } | FrameDriver::Realtime { interval } => *interval,
        }
    }

    /// Issues `frames` ticks on `ticker`.
    pub fn run(&self, ticker: &FrameTicker, frames: u64) {
        match *self {
            FrameDriver::Fixed { interval } => {
                for index in 0..frames {
                    ticker.tick(mul_duration(interval, index));
                }
            }
            FrameDriver::Realtime { interval } => {
                let origin = Instant::now();
                for index in 0..frames {
                    let deadline = mul_duration(interval, index);
                    let elapsed = origin.elapsed();
                    if deadline > elapsed {
                        thread::sleep(deadline - elapsed);
                    }
                    ticker.tick(origin.elapsed());
                }
            }
        }
        tracing::debug!(frames, driver = ?self, "frame driver finished");
    }
}

fn mul_duration(interval: Duration, index: u64) -> Duration {
    interval.saturating_mul(u32::try_from(index).unwrap_or(u32::MAX))
}
