//! One timer abstraction for every polling concern.
//!
//! Each task has at most one timer and at most one invocation in flight.
//! Ticks that land while the previous invocation is still running are
//! dropped, never queued. Stopping a task bumps its generation so a late
//! result can tell it is stale via [`PollTicket::is_current`].

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskId {
    Notifications,
    ChatMessages,
    OnlineUsers,
    BanStatus,
    Heartbeat,
}

impl TaskId {
    pub const ALL: [TaskId; 5] = [
        TaskId::Notifications,
        TaskId::ChatMessages,
        TaskId::OnlineUsers,
        TaskId::BanStatus,
        TaskId::Heartbeat,
    ];
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskId::Notifications => "notifications",
            TaskId::ChatMessages => "chat-messages",
            TaskId::OnlineUsers => "online-users",
            TaskId::BanStatus => "ban-status",
            TaskId::Heartbeat => "heartbeat",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Stopped,
    Running,
    Paused,
}

pub type PollFn = Arc<dyn Fn(PollTicket) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`PollFn`].
pub fn poll_fn<F, Fut>(f: F) -> PollFn
where
    F: Fn(PollTicket) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |ticket| f(ticket).boxed())
}

/// Handed to every invocation; tells it whether its task was stopped or
/// restarted since it began.
#[derive(Debug, Clone)]
pub struct PollTicket {
    task: TaskId,
    generation: u64,
    current: Arc<AtomicU64>,
}

impl PollTicket {
    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    /// A ticket that is always current, for direct calls outside the
    /// scheduler.
    pub fn detached(task: TaskId) -> Self {
        Self {
            task,
            generation: 0,
            current: Arc::new(AtomicU64::new(0)),
        }
    }
}

struct TaskSlot {
    interval: Duration,
    func: Option<PollFn>,
    started: bool,
    // Shared with running timers and invocations; survive restarts so a
    // stale call still blocks the next one.
    in_flight: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    timer: Option<JoinHandle<()>>,
}

impl TaskSlot {
    fn idle() -> Self {
        Self {
            interval: MIN_INTERVAL,
            func: None,
            started: false,
            in_flight: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            timer: None,
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn arm(&mut self, task: TaskId) {
        let Some(func) = self.func.clone() else {
            return;
        };
        let interval = self.interval.max(MIN_INTERVAL);
        let in_flight = self.in_flight.clone();
        let generation = self.generation.clone();

        self.cancel_timer();
        self.timer = Some(tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                fire(task, &func, &in_flight, &generation);
            }
        }));
    }
}

fn fire(task: TaskId, func: &PollFn, in_flight: &Arc<AtomicBool>, generation: &Arc<AtomicU64>) -> bool {
    if in_flight.swap(true, Ordering::SeqCst) {
        log::debug!("{task}: previous poll still in flight, tick dropped");
        return false;
    }

    let ticket = PollTicket {
        task,
        generation: generation.load(Ordering::SeqCst),
        current: generation.clone(),
    };
    let invocation = func(ticket);
    let in_flight = in_flight.clone();
    tokio::spawn(async move {
        invocation.await;
        in_flight.store(false, Ordering::SeqCst);
    });
    true
}

#[derive(Default)]
struct SchedulerState {
    tasks: HashMap<TaskId, TaskSlot>,
    paused: bool,
}

/// Must be used from within a tokio runtime.
#[derive(Default)]
pub struct PollScheduler {
    state: Mutex<SchedulerState>,
}

impl PollScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or replace) the timer for `task`. The first tick is immediate.
    pub fn start(&self, task: TaskId, interval: Duration, func: PollFn) {
        let mut state = self.state.lock();
        let paused = state.paused;
        let slot = state.tasks.entry(task).or_insert_with(TaskSlot::idle);

        slot.cancel_timer();
        slot.generation.fetch_add(1, Ordering::SeqCst);
        slot.interval = interval;
        slot.func = Some(func);
        slot.started = true;
        if !paused {
            slot.arm(task);
        }
        log::debug!("{task}: started every {interval:?}{}", if paused { " (paused)" } else { "" });
    }

    /// Cancel the timer. A call already in flight runs to completion but its
    /// ticket goes stale.
    pub fn stop(&self, task: TaskId) {
        let mut state = self.state.lock();
        if let Some(slot) = state.tasks.get_mut(&task) {
            stop_slot(task, slot);
        }
    }

    pub fn stop_all(&self) {
        let mut state = self.state.lock();
        for (task, slot) in state.tasks.iter_mut() {
            stop_slot(*task, slot);
        }
    }

    /// Suspend every started task, keeping its configuration.
    pub fn pause(&self) {
        let mut state = self.state.lock();
        if state.paused {
            return;
        }
        state.paused = true;
        for slot in state.tasks.values_mut() {
            slot.cancel_timer();
        }
        log::debug!("poll scheduler paused");
    }

    pub fn resume(&self) {
        let mut state = self.state.lock();
        if !state.paused {
            return;
        }
        state.paused = false;
        for (task, slot) in state.tasks.iter_mut() {
            if slot.started {
                slot.arm(*task);
            }
        }
        log::debug!("poll scheduler resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Run one out-of-band invocation now, unless the task is not running or
    /// already has a call in flight. Returns whether it fired.
    pub fn trigger(&self, task: TaskId) -> bool {
        let state = self.state.lock();
        if state.paused {
            return false;
        }
        match state.tasks.get(&task) {
            Some(slot) if slot.started => match &slot.func {
                Some(func) => fire(task, func, &slot.in_flight, &slot.generation),
                None => false,
            },
            _ => false,
        }
    }

    pub fn state(&self, task: TaskId) -> TaskState {
        let state = self.state.lock();
        match state.tasks.get(&task) {
            Some(slot) if slot.started && state.paused => TaskState::Paused,
            Some(slot) if slot.started => TaskState::Running,
            _ => TaskState::Stopped,
        }
    }

    pub fn is_in_flight(&self, task: TaskId) -> bool {
        self.state
            .lock()
            .tasks
            .get(&task)
            .is_some_and(|slot| slot.in_flight.load(Ordering::SeqCst))
    }
}

fn stop_slot(task: TaskId, slot: &mut TaskSlot) {
    slot.cancel_timer();
    slot.func = None;
    if slot.started {
        slot.started = false;
        slot.generation.fetch_add(1, Ordering::SeqCst);
        log::debug!("{task}: stopped");
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        for slot in self.state.get_mut().tasks.values_mut() {
            slot.cancel_timer();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn counting(calls: Arc<AtomicUsize>, work: Duration) -> PollFn {
        poll_fn(move |_ticket| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                time::sleep(work).await;
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn slow_invocations_never_overlap() {
        let scheduler = PollScheduler::new();
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));

        let func = {
            let (running, max_running, calls) = (running.clone(), max_running.clone(), calls.clone());
            poll_fn(move |_ticket| {
                let (running, max_running, calls) =
                    (running.clone(), max_running.clone(), calls.clone());
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max_running.fetch_max(now, Ordering::SeqCst);
                    time::sleep(Duration::from_millis(250)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                }
            })
        };

        scheduler.start(TaskId::ChatMessages, Duration::from_millis(100), func);
        time::sleep(Duration::from_millis(1_000)).await;

        assert_eq!(max_running.load(Ordering::SeqCst), 1);
        let calls = calls.load(Ordering::SeqCst);
        assert!((2..=4).contains(&calls), "unexpected call count {calls}");
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_a_task_replaces_its_timer() {
        let scheduler = PollScheduler::new();
        let calls = Arc::new(AtomicUsize::new(0));

        scheduler.start(TaskId::OnlineUsers, Duration::from_millis(100), counting(calls.clone(), Duration::ZERO));
        scheduler.start(TaskId::OnlineUsers, Duration::from_millis(100), counting(calls.clone(), Duration::ZERO));
        time::sleep(Duration::from_millis(950)).await;

        let calls = calls.load(Ordering::SeqCst);
        assert!(calls <= 11, "timers stacked: {calls} calls");
        assert_eq!(scheduler.state(TaskId::OnlineUsers), TaskState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_marks_in_flight_ticket_stale() {
        let scheduler = PollScheduler::new();
        let gate = Arc::new(Notify::new());
        let observed = Arc::new(Mutex::new(None));

        let func = {
            let (gate, observed) = (gate.clone(), observed.clone());
            poll_fn(move |ticket| {
                let (gate, observed) = (gate.clone(), observed.clone());
                async move {
                    gate.notified().await;
                    *observed.lock() = Some(ticket.is_current());
                }
            })
        };

        scheduler.start(TaskId::Notifications, Duration::from_secs(30), func);
        time::sleep(Duration::from_millis(10)).await;
        assert!(scheduler.is_in_flight(TaskId::Notifications));

        scheduler.stop(TaskId::Notifications);
        gate.notify_one();
        time::sleep(Duration::from_millis(10)).await;

        assert_eq!(*observed.lock(), Some(false));
        assert_eq!(scheduler.state(TaskId::Notifications), TaskState::Stopped);
        assert!(!scheduler.is_in_flight(TaskId::Notifications));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_suspends_and_resume_restarts() {
        let scheduler = PollScheduler::new();
        let calls = Arc::new(AtomicUsize::new(0));
        scheduler.start(TaskId::Heartbeat, Duration::from_millis(100), counting(calls.clone(), Duration::ZERO));
        time::sleep(Duration::from_millis(50)).await;
        let before = calls.load(Ordering::SeqCst);

        scheduler.pause();
        assert_eq!(scheduler.state(TaskId::Heartbeat), TaskState::Paused);
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), before);

        scheduler.resume();
        time::sleep(Duration::from_millis(50)).await;
        assert!(calls.load(Ordering::SeqCst) > before);
        assert_eq!(scheduler.state(TaskId::Heartbeat), TaskState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_respects_in_flight_guard() {
        let scheduler = PollScheduler::new();
        let calls = Arc::new(AtomicUsize::new(0));
        assert!(!scheduler.trigger(TaskId::ChatMessages));

        scheduler.start(TaskId::ChatMessages, Duration::from_secs(60), counting(calls.clone(), Duration::from_millis(200)));
        time::sleep(Duration::from_millis(10)).await;
        assert!(!scheduler.trigger(TaskId::ChatMessages));

        time::sleep(Duration::from_millis(300)).await;
        assert!(scheduler.trigger(TaskId::ChatMessages));
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
