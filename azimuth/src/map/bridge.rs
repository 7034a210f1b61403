//! Forwarding of native map events to the element hosting the map.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{MapEvent, NativeEvent};

/// Element of the host page a map is mounted on.
pub trait HostElement: Send + Sync {
    /// Identifier of the element, used in log messages.
    fn id(&self) -> &str;

    /// Dispatches a map event on the element so that element-level listeners see it.
    fn trigger(&self, event: &MapEvent);

    /// Lets the host react to state changed by event handlers, e.g. re-render bound views.
    fn notify(&self) {}
}

/// Deferred execution of host notifications.
pub trait NotificationScheduler: Send + Sync {
    /// Runs `task` at some later point.
    fn schedule(&self, task: Box<dyn FnOnce() + Send>);
}

/// Scheduler running notifications as tasks of the ambient tokio runtime.
///
/// Outside a runtime tasks run immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl NotificationScheduler for TokioScheduler {
    fn schedule(&self, task: Box<dyn FnOnce() + Send>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { task() });
            }
            Err(_) => {
                log::trace!("No runtime for host notification, running inline");
                task();
            }
        }
    }
}

/// Scheduler that queues notifications until the host drains them.
#[derive(Default)]
pub struct QueueScheduler {
    queue: Mutex<VecDeque<Box<dyn FnOnce() + Send>>>,
}

impl QueueScheduler {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Runs queued tasks, including tasks queued while running. Returns the number of tasks run.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        loop {
            let Some(task) = self.queue.lock().pop_front() else {
                break;
            };
            task();
            count += 1;
        }
        count
    }
}

impl NotificationScheduler for QueueScheduler {
    fn schedule(&self, task: Box<dyn FnOnce() + Send>) {
        self.queue.lock().push_back(task);
    }
}

/// Connects native map events with the host element.
///
/// Any number of events fired before the host is notified result in a single notification.
pub struct EventBridge {
    host: Arc<dyn HostElement>,
    scheduler: Arc<dyn NotificationScheduler>,
    pending: Arc<AtomicBool>,
}

impl EventBridge {
    /// Creates a bridge for `host`.
    pub fn new(host: Arc<dyn HostElement>, scheduler: Arc<dyn NotificationScheduler>) -> Self {
        Self {
            host,
            scheduler,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Host element of the map.
    pub fn host(&self) -> &Arc<dyn HostElement> {
        &self.host
    }

    /// Whether a host notification is scheduled but has not run yet.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Forwards a native event: triggers it on the host under `name`, passes it to `handler` and
    /// schedules a host notification.
    pub fn dispatch(&self, name: &str, native: &NativeEvent, handler: &dyn Fn(&MapEvent)) {
        let event = MapEvent::from_native(name, native);
        log::trace!("Map event `{name}` on {}", self.host.id());

        self.host.trigger(&event);
        handler(&event);
        self.request_notification();
    }

    /// Schedules a host notification unless one is already pending. Returns whether a new one was
    /// scheduled.
    pub fn request_notification(&self) -> bool {
        if self.pending.swap(true, Ordering::AcqRel) {
            return false;
        }

        let host = self.host.clone();
        let pending = self.pending.clone();
        self.scheduler.schedule(Box::new(move || {
            pending.store(false, Ordering::Release);
            host.notify();
        }));
        true
    }
}
