//! # Task System Core Trait
//!
//! A `Task` is a self-contained unit of work executed on a pool worker. It
//! owns everything it needs (shared read-only state goes in an `Arc`) and
//! hands its output back to the thread that published it.
//!
//! ## Task Lifecycle
//! 1. A `Task` is created and scheduled via `TaskManager::publish_task()`
//! 2. The task's `process()` method is called on a worker thread
//! 3. The output travels back over the worker's result channel
//! 4. The owner collects it with `wait_for_all()`

/// A unit of work that can run on a background worker.
///
/// # Implementation Guidelines
/// - Must be `Send` to be transferred between threads
/// - Should be coarse-grained to amortize scheduling overhead
/// - Must not hold references to state mutated elsewhere
pub trait Task: Send {
    /// The value handed back to the publishing thread.
    type Output: Send + 'static;

    /// Performs the work. Runs on a worker thread.
    fn process(&self) -> Self::Output;
}
