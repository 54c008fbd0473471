//! Listener dispatch for a cache instance.
//!
//! Synchronous registrations run on the mutating thread, in registration order.
//! Asynchronous registrations are handed to one worker thread per cache over
//! an unbounded crossbeam channel. The worker is spawned on `start` and drained
//! and joined on `stop`, so no event queued before `stop` is lost. A `stop`
//! issued from the worker itself (an asynchronous listener stopping its own
//! cache) closes the channel without joining, and the worker drains the rest
//! before it exits.
//!
//! Listener errors and panics are caught here and logged. They never reach the
//! mutating caller, and they do not prevent later listeners from running.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::event::{CacheEntryEvent, CacheEntryListener, DispatchMode, ListenerRegistration};

type Job<K, V> = (Arc<dyn CacheEntryListener<K, V>>, Arc<CacheEntryEvent<K, V>>);

struct Worker<K, V> {
    sender: Sender<Job<K, V>>,
    handle: JoinHandle<()>,
}

pub(crate) struct Dispatcher<K, V> {
    cache_name: Arc<str>,
    registrations: Vec<ListenerRegistration<K, V>>,
    worker: Mutex<Option<Worker<K, V>>>,
}

impl<K, V> Dispatcher<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Keeps only registrations that can receive locally originated events.
    pub(crate) fn new(cache_name: Arc<str>, registrations: &[ListenerRegistration<K, V>]) -> Self {
        let registrations = registrations
            .iter()
            .filter(|r| r.scope.receives_local())
            .cloned()
            .collect();
        Self {
            cache_name,
            registrations,
            worker: Mutex::new(None),
        }
    }

    pub(crate) fn has_listeners(&self) -> bool {
        !self.registrations.is_empty()
    }

    fn has_async(&self) -> bool {
        self.registrations
            .iter()
            .any(|r| r.mode == DispatchMode::Asynchronous)
    }

    /// Spawns the asynchronous worker if any registration needs it.
    pub(crate) fn start(&self) -> io::Result<()> {
        if !self.has_async() {
            return Ok(());
        }
        let (sender, receiver) = unbounded::<Job<K, V>>();
        let handle = thread::Builder::new()
            .name(format!("cache-events-{}", self.cache_name))
            .spawn(move || {
                for (listener, event) in receiver {
                    invoke(listener.as_ref(), &event);
                }
            })?;
        *self.worker.lock() = Some(Worker { sender, handle });
        Ok(())
    }

    /// Closes the queue, waits for pending asynchronous events, and joins the worker.
    pub(crate) fn stop(&self) {
        let worker = self.worker.lock().take();
        if let Some(Worker { sender, handle }) = worker {
            drop(sender);
            if handle.thread().id() == thread::current().id() {
                debug!("Event worker for cache {} closed from its own thread", self.cache_name);
                return;
            }
            if handle.join().is_err() {
                warn!("Event worker for cache {} terminated abnormally", self.cache_name);
            }
            debug!("Event worker for cache {} stopped", self.cache_name);
        }
    }

    /// Delivers `event` to every registration.
    pub(crate) fn dispatch(&self, event: CacheEntryEvent<K, V>) {
        if self.registrations.is_empty() {
            return;
        }
        let event = Arc::new(event);
        for registration in &self.registrations {
            match registration.mode {
                DispatchMode::Synchronous => invoke(registration.listener.as_ref(), &event),
                DispatchMode::Asynchronous => self.enqueue(&registration.listener, &event),
            }
        }
    }

    fn enqueue(&self, listener: &Arc<dyn CacheEntryListener<K, V>>, event: &Arc<CacheEntryEvent<K, V>>) {
        let worker = self.worker.lock();
        let Some(worker) = worker.as_ref() else {
            debug!("Dropping event for cache {}: worker not running", self.cache_name);
            return;
        };
        if worker
            .sender
            .send((Arc::clone(listener), Arc::clone(event)))
            .is_err()
        {
            warn!("Event worker for cache {} is gone", self.cache_name);
        }
    }
}

fn invoke<K, V>(listener: &dyn CacheEntryListener<K, V>, event: &CacheEntryEvent<K, V>) {
    match panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(
            "Listener failed on {:?} event for cache {}: {}",
            event.event_type, event.cache_name, e
        ),
        Err(_) => warn!(
            "Listener panicked on {:?} event for cache {}",
            event.event_type, event.cache_name
        ),
    }
}
