//! Periodic task runner and single-flight coalescing

use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Flight<T> = Shared<BoxFuture<'static, T>>;

/// Runs at most one instance of a job at a time
///
/// A caller that arrives while a run is in progress awaits that run and gets
/// its output instead of starting a second one. Each run is driven to the end
/// by its own task, which clears the slot when it finishes, so a run whose
/// callers were all dropped is never handed to a later caller.
pub struct SingleFlight<T: Clone> {
    inflight: Arc<Mutex<Option<Flight<T>>>>,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(None)),
        }
    }

    /// Joins the in-flight run, or starts `make()` if there is none
    ///
    /// `make` is only called when a new run starts.
    pub async fn run<F, Fut>(&self, make: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let flight = {
            let mut slot = lock(&self.inflight);
            match slot.as_ref() {
                Some(existing) if existing.peek().is_none() => {
                    tracing::debug!("Joining in-flight run");
                    existing.clone()
                }
                _ => {
                    let flight = make().boxed().shared();
                    *slot = Some(flight.clone());
                    self.drive(flight.clone());
                    flight
                }
            }
        };

        let output = flight.clone().await;
        clear_if_current(&self.inflight, &flight);
        output
    }

    /// Polls the run to completion even if every caller goes away
    fn drive(&self, flight: Flight<T>) {
        let inflight = self.inflight.clone();
        tokio::spawn(async move {
            flight.clone().await;
            clear_if_current(&inflight, &flight);
        });
    }

    /// True while a run is in progress
    pub fn is_running(&self) -> bool {
        lock(&self.inflight)
            .as_ref()
            .is_some_and(|current| current.peek().is_none())
    }
}

fn clear_if_current<T: Clone>(inflight: &Mutex<Option<Flight<T>>>, flight: &Flight<T>) {
    let mut slot = lock(inflight);
    if slot.as_ref().is_some_and(|current| current.ptr_eq(flight)) {
        *slot = None;
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Timing of a periodic task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Wait after warm-up before the first run
    pub initial_delay: Duration,
    /// Wait between the end of one run and the start of the next
    pub interval: Duration,
}

impl Schedule {
    /// Run immediately, then every `interval`
    pub fn every(interval: Duration) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            interval,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }
}

struct RunningTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// A background job with explicit start/stop
///
/// Runs never overlap: the next run is scheduled only after the previous one
/// finishes. `stop()` prevents further runs but lets a run in progress finish.
pub struct PeriodicTask {
    name: &'static str,
    running: Mutex<Option<RunningTask>>,
}

impl PeriodicTask {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            running: Mutex::new(None),
        }
    }

    /// Spawns the task loop
    ///
    /// `warmup` is awaited before the initial delay. Returns false if the task
    /// is already running.
    pub fn start<W, J, Fut>(&self, schedule: Schedule, warmup: W, job: J) -> bool
    where
        W: Future<Output = ()> + Send + 'static,
        J: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = lock(&self.running);
        if running
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
        {
            tracing::debug!(task = self.name, "Periodic task already running");
            return false;
        }

        let (stop, mut stop_rx) = watch::channel(false);
        let name = self.name;

        let handle = tokio::spawn(async move {
            tracing::info!(
                task = name,
                interval_secs = schedule.interval.as_secs_f64(),
                "Starting periodic task"
            );

            tokio::select! {
                _ = warmup => {}
                _ = stop_rx.changed() => return,
            }

            if !schedule.initial_delay.is_zero() {
                tokio::select! {
                    _ = sleep(schedule.initial_delay) => {}
                    _ = stop_rx.changed() => return,
                }
            }

            loop {
                if *stop_rx.borrow() {
                    break;
                }

                job().await;

                tokio::select! {
                    _ = sleep(schedule.interval) => {}
                    _ = stop_rx.changed() => break,
                }
            }

            tracing::info!(task = name, "Periodic task stopped");
        });

        *running = Some(RunningTask { stop, handle });
        true
    }

    /// Stops scheduling new runs; returns false if the task was not running
    pub fn stop(&self) -> bool {
        match lock(&self.running).take() {
            Some(task) => {
                // A run in progress is not aborted.
                let _ = task.stop.send(true);
                !task.handle.is_finished()
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running)
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.running).take() {
            let _ = task.stop.send(true);
        }
    }
}
