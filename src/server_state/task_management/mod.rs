//! # Task Management System
//!
//! A small pool of worker threads for CPU-heavy work that must stay off the
//! game loop. World generation is the only such work today.
//!
//! ## Architecture Overview
//! - `TaskManager`: owns the workers and distributes tasks round-robin
//! - `Task`: a unit of work producing a typed output
//! - `TaskChannel`: the pair of channels linking the owner to one worker
//!
//! Each worker has a dedicated task channel and result channel. A channel
//! accepts at most [`MAX_TASKS_IN_FLIGHT`] tasks at a time; anything beyond
//! that waits in a FIFO queue on the owning thread.
//!
//! ## Task Lifecycle
//! 1. Tasks are published via `TaskManager::publish_task()`
//! 2. The manager sends them to an available worker or queues them
//! 3. Workers run `Task::process()` and send the output back
//! 4. The owner collects outputs with `wait_for_all()`, which blocks until
//!    nothing is queued or in flight
//!
//! A panicking task does not take its worker down. The panic is caught on
//! the worker, logged, and the task produces no output.
//!
//! ## Example Usage
//! ```rust,ignore
//! let mut task_manager = TaskManager::new(4);
//! task_manager.publish_task(Box::new(MyTask::new(...)));
//! let outputs = task_manager.wait_for_all();
//! ```

pub mod task;

use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::{self, JoinHandle};
use task::Task;

type BoxedTask<T> = Box<dyn Task<Output = T> + Send>;

/// A communication channel between the owning thread and one worker.
///
/// # Fields
/// - `task_sender`: sends tasks to the worker
/// - `result_receiver`: receives outputs, `None` for a task that panicked
/// - `num_tasks_in_flight`: tasks sent but not yet answered
/// - `alive`: cleared once the worker has hung up
/// - `_worker`: handle to the worker thread
struct TaskChannel<T> {
    task_sender: Sender<BoxedTask<T>>,
    result_receiver: Receiver<Option<T>>,
    num_tasks_in_flight: usize,
    alive: bool,
    _worker: JoinHandle<()>,
}

/// Manages a pool of worker threads and coordinates task execution.
///
/// The manager is owned by a single thread; it is not itself shared. With
/// zero workers every task runs inline on the owning thread during
/// `wait_for_all()`.
pub struct TaskManager<T: Send + 'static> {
    channels: Vec<TaskChannel<T>>,
    queued_tasks: VecDeque<BoxedTask<T>>,
    current_channel: usize,
}

/// Maximum number of tasks that can be in flight per worker channel.
///
/// Keeping this at 1 leaves the remaining work in the shared queue, so a
/// slow task never holds back work another worker could pick up.
pub const MAX_TASKS_IN_FLIGHT: usize = 1;

impl<T: Send + 'static> TaskManager<T> {
    /// Creates a new `TaskManager` with the specified number of worker threads.
    ///
    /// # Arguments
    /// * `num_workers` - Number of worker threads to spawn. Typically the
    ///   available parallelism of the host.
    pub fn new(num_workers: usize) -> Self {
        let mut channels = Vec::with_capacity(num_workers);

        for index in 0..num_workers {
            let (task_tx, task_rx) = channel::<BoxedTask<T>>();
            let (result_tx, result_rx) = channel::<Option<T>>();

            let task_closure = move || {
                while let Ok(task) = task_rx.recv() {
                    let output = panic::catch_unwind(AssertUnwindSafe(|| task.process())).ok();
                    if output.is_none() {
                        error!("Task panicked on worker {}", index);
                    }
                    if result_tx.send(output).is_err() {
                        break;
                    }
                }
            };

            let worker = match thread::Builder::new()
                .name(format!("task-worker-{index}"))
                .spawn(task_closure)
            {
                Ok(worker) => worker,
                Err(err) => {
                    warn!("Failed to spawn task worker {}: {}", index, err);
                    continue;
                }
            };

            channels.push(TaskChannel {
                task_sender: task_tx,
                result_receiver: result_rx,
                num_tasks_in_flight: 0,
                alive: true,
                _worker: worker,
            });
        }

        info!("Task manager started with {} workers", channels.len());

        TaskManager {
            channels,
            queued_tasks: VecDeque::new(),
            current_channel: 0,
        }
    }

    /// Number of live workers.
    pub fn worker_count(&self) -> usize {
        self.channels.iter().filter(|channel| channel.alive).count()
    }

    /// Attempts to send a task to a specific worker channel.
    ///
    /// # Returns
    /// - `Ok(())` if the worker accepted the task
    /// - `Err(task)` if the worker has hung up; the channel is marked dead
    fn try_send_task(&mut self, task: BoxedTask<T>, channel_idx: usize) -> Result<(), BoxedTask<T>> {
        let channel = &mut self.channels[channel_idx];
        match channel.task_sender.send(task) {
            Ok(_) => {
                channel.num_tasks_in_flight += 1;
                Ok(())
            }
            Err(returned) => {
                warn!("Task worker {} disconnected", channel_idx);
                channel.alive = false;
                Err(returned.0)
            }
        }
    }

    /// Finds an available worker channel using round-robin starting from the
    /// last used channel.
    ///
    /// # Returns
    /// - `Some(usize)` index of a live channel below `MAX_TASKS_IN_FLIGHT`
    /// - `None` if all channels are busy, dead, or there are none
    fn find_available_channel(&self) -> Option<usize> {
        let count = self.channels.len();
        (0..count)
            .map(|offset| (self.current_channel + offset) % count)
            .find(|&idx| {
                let channel = &self.channels[idx];
                channel.alive && channel.num_tasks_in_flight < MAX_TASKS_IN_FLIGHT
            })
    }

    /// Publishes a new task for execution.
    ///
    /// # Returns
    /// - `true` if the task was immediately sent to a worker
    /// - `false` if it was queued because every worker is busy
    pub fn publish_task(&mut self, task: BoxedTask<T>) -> bool {
        match self.find_available_channel() {
            Some(channel_idx) => match self.try_send_task(task, channel_idx) {
                Ok(_) => {
                    self.current_channel = (channel_idx + 1) % self.channels.len();
                    true
                }
                Err(task) => {
                    self.queued_tasks.push_back(task);
                    false
                }
            },
            None => {
                self.queued_tasks.push_back(task);
                false
            }
        }
    }

    /// Moves queued tasks onto workers while any worker has capacity.
    ///
    /// Tasks leave the queue in FIFO order.
    fn process_queued_tasks(&mut self) {
        while !self.queued_tasks.is_empty() {
            let Some(channel_idx) = self.find_available_channel() else {
                break;
            };
            let Some(task) = self.queued_tasks.pop_front() else {
                break;
            };
            match self.try_send_task(task, channel_idx) {
                Ok(_) => self.current_channel = (channel_idx + 1) % self.channels.len(),
                Err(task) => self.queued_tasks.push_front(task),
            }
        }
    }

    /// True when no task is queued or running.
    pub fn is_idle(&self) -> bool {
        self.queued_tasks.is_empty()
            && self
                .channels
                .iter()
                .all(|channel| channel.num_tasks_in_flight == 0)
    }

    /// Blocks until every published task has finished and returns all
    /// outputs collected along the way.
    ///
    /// Tasks left in the queue once no worker is alive are run inline.
    pub fn wait_for_all(&mut self) -> Vec<T> {
        let mut outputs = Vec::new();

        loop {
            self.process_queued_tasks();

            let mut waited = false;
            for (idx, channel) in self.channels.iter_mut().enumerate() {
                if channel.num_tasks_in_flight == 0 {
                    continue;
                }
                waited = true;
                match channel.result_receiver.recv() {
                    Ok(result) => {
                        channel.num_tasks_in_flight -= 1;
                        outputs.extend(result);
                    }
                    Err(_) => {
                        warn!("Task worker {} hung up with {} tasks in flight", idx, channel.num_tasks_in_flight);
                        channel.num_tasks_in_flight = 0;
                        channel.alive = false;
                    }
                }
            }

            if !waited {
                if self.queued_tasks.is_empty() {
                    break;
                }
                if self.find_available_channel().is_none() {
                    debug!("No live workers, running {} tasks inline", self.queued_tasks.len());
                    while let Some(task) = self.queued_tasks.pop_front() {
                        match panic::catch_unwind(AssertUnwindSafe(|| task.process())) {
                            Ok(output) => outputs.push(output),
                            Err(_) => error!("Task panicked while running inline"),
                        }
                    }
                }
            }
        }

        outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Square(u64);

    impl Task for Square {
        type Output = u64;

        fn process(&self) -> u64 {
            self.0 * self.0
        }
    }

    struct Explode;

    impl Task for Explode {
        type Output = u64;

        fn process(&self) -> u64 {
            panic!("boom")
        }
    }

    #[test]
    fn waits_for_every_task() {
        let mut manager = TaskManager::new(3);
        for n in 0..20 {
            manager.publish_task(Box::new(Square(n)));
        }
        let mut outputs = manager.wait_for_all();
        outputs.sort_unstable();
        assert_eq!(outputs, (0..20).map(|n| n * n).collect::<Vec<_>>());
        assert!(manager.is_idle());
    }

    #[test]
    fn extra_tasks_are_queued() {
        let mut manager = TaskManager::new(1);
        assert!(manager.publish_task(Box::new(Square(2))));
        assert!(!manager.publish_task(Box::new(Square(3))));
        assert!(!manager.is_idle());
        assert_eq!(manager.wait_for_all().len(), 2);
    }

    #[test]
    fn zero_workers_run_inline() {
        let mut manager = TaskManager::new(0);
        assert_eq!(manager.worker_count(), 0);
        manager.publish_task(Box::new(Square(7)));
        assert_eq!(manager.wait_for_all(), vec![49]);
    }

    #[test]
    fn panicking_task_does_not_kill_its_worker() {
        let mut manager = TaskManager::new(1);
        manager.publish_task(Box::new(Explode));
        manager.publish_task(Box::new(Square(4)));
        assert_eq!(manager.wait_for_all(), vec![16]);
        assert_eq!(manager.worker_count(), 1);
    }
}
