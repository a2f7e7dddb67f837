//! Per-output delayed sends, delivered by a dedicated thread.
//!
//! The thread starts on the first delayed send. Items are delivered in (due time, call order)
//! order. `clear()` drops everything pending; `shutdown()` also stops the thread, and nothing
//! queued before it reaches the host afterwards.

use crate::error::{Error, Result};
use crate::host::MidiOutputHandle;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const IDLE_POLL: Duration = Duration::from_millis(100);

struct Scheduled {
    due: Instant,
    seq: u64,
    bytes: Vec<u8>,
    timestamp: f64,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

enum SchedulerCommand {
    Schedule(Scheduled),
    Clear,
    Shutdown,
}

pub(crate) struct Scheduler {
    port_name: String,
    handle: Arc<dyn MidiOutputHandle>,
    sender: Mutex<Option<Sender<SchedulerCommand>>>,
    stopped: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
    seq: AtomicU64,
}

impl Scheduler {
    pub(crate) fn new(port_name: impl Into<String>, handle: Arc<dyn MidiOutputHandle>) -> Self {
        Self {
            port_name: port_name.into(),
            handle,
            sender: Mutex::new(None),
            stopped: Arc::new(AtomicBool::new(false)),
            pending: Arc::new(AtomicUsize::new(0)),
            seq: AtomicU64::new(0),
        }
    }

    /// Queues `bytes` for delivery after `delay`. `timestamp` is passed to the host as is.
    pub(crate) fn schedule(&self, delay: Duration, bytes: Vec<u8>, timestamp: f64) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(Error::PortDestroyed(self.port_name.clone()));
        }
        let due = Instant::now().checked_add(delay).ok_or_else(|| {
            Error::range(format!("Delay of {:?} cannot be scheduled", delay))
        })?;
        let item = Scheduled {
            due,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            bytes,
            timestamp,
        };
        // Counted here so callers observe the item as pending right away
        self.pending.fetch_add(1, Ordering::AcqRel);
        let sender = self.sender()?;
        sender
            .send(SchedulerCommand::Schedule(item))
            .map_err(|_| Error::Port(format!("Scheduler for {} is not running", self.port_name)))
    }

    /// Drops every pending item.
    pub(crate) fn clear(&self) {
        if let Some(sender) = self.sender.lock().as_ref() {
            let _ = sender.send(SchedulerCommand::Clear);
        }
        self.pending.store(0, Ordering::Release);
    }

    /// Drops every pending item and stops the thread for good.
    pub(crate) fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(SchedulerCommand::Shutdown);
        }
        self.pending.store(0, Ordering::Release);
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    fn sender(&self) -> Result<Sender<SchedulerCommand>> {
        let mut guard = self.sender.lock();
        if let Some(sender) = guard.as_ref() {
            return Ok(sender.clone());
        }

        let (sender, receiver) = unbounded();
        let handle = Arc::clone(&self.handle);
        let stopped = Arc::clone(&self.stopped);
        let pending = Arc::clone(&self.pending);
        thread::Builder::new()
            .name(format!("midi-scheduler-{}", self.port_name))
            .spawn(move || Self::scheduler_thread(receiver, handle, stopped, pending))
            .map_err(|e| Error::Port(format!("Failed to spawn MIDI scheduler thread: {}", e)))?;
        debug!("Started MIDI scheduler for {}", self.port_name);

        *guard = Some(sender.clone());
        Ok(sender)
    }

    fn scheduler_thread(
        receiver: Receiver<SchedulerCommand>,
        handle: Arc<dyn MidiOutputHandle>,
        stopped: Arc<AtomicBool>,
        pending: Arc<AtomicUsize>,
    ) {
        let mut queue: BinaryHeap<Reverse<Scheduled>> = BinaryHeap::new();

        loop {
            let timeout = queue
                .peek()
                .map(|Reverse(next)| next.due.saturating_duration_since(Instant::now()))
                .unwrap_or(IDLE_POLL);

            match receiver.recv_timeout(timeout) {
                Ok(SchedulerCommand::Schedule(item)) => queue.push(Reverse(item)),
                Ok(SchedulerCommand::Clear) => queue.clear(),
                Ok(SchedulerCommand::Shutdown) => break,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            let now = Instant::now();
            while queue.peek().is_some_and(|Reverse(next)| next.due <= now) {
                let Some(Reverse(item)) = queue.pop() else {
                    break;
                };
                if stopped.load(Ordering::Acquire) {
                    queue.clear();
                    break;
                }
                if let Err(e) = handle.send(&item.bytes, item.timestamp) {
                    warn!("Scheduled MIDI send failed: {}", e);
                }
                let _ = pending.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    Some(n.saturating_sub(1))
                });
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::VirtualHost;

    fn scheduler() -> (Scheduler, Arc<crate::host::VirtualOutput>) {
        let host = VirtualHost::new();
        let port = host.plug_output("out-1", "Synth");
        (Scheduler::new("Synth", port.clone()), port)
    }

    #[test]
    fn test_delivers_in_due_order() {
        let (scheduler, port) = scheduler();
        scheduler
            .schedule(Duration::from_millis(40), vec![0x80, 60, 0], 40.0)
            .unwrap();
        scheduler
            .schedule(Duration::from_millis(10), vec![0x90, 60, 100], 10.0)
            .unwrap();
        scheduler
            .schedule(Duration::from_millis(10), vec![0x90, 64, 100], 10.0)
            .unwrap();

        let timeout = Duration::from_secs(2);
        assert_eq!(port.recv_timeout(timeout).unwrap().bytes, vec![0x90, 60, 100]);
        assert_eq!(port.recv_timeout(timeout).unwrap().bytes, vec![0x90, 64, 100]);
        assert_eq!(port.recv_timeout(timeout).unwrap().bytes, vec![0x80, 60, 0]);
    }

    #[test]
    fn test_rejects_unrepresentable_delay() {
        let (scheduler, _port) = scheduler();
        let result = scheduler.schedule(Duration::MAX, vec![0xF8], f64::MAX);
        assert!(matches!(
            result,
            Err(Error::Core(webmidi_core::Error::Range(_)))
        ));
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_clear_drops_pending() {
        let (scheduler, port) = scheduler();
        scheduler
            .schedule(Duration::from_millis(50), vec![0xF8], 50.0)
            .unwrap();
        assert_eq!(scheduler.pending(), 1);
        scheduler.clear();
        assert_eq!(scheduler.pending(), 0);
        assert!(port.recv_timeout(Duration::from_millis(150)).is_none());
    }

    #[test]
    fn test_shutdown_cancels_and_rejects() {
        let (scheduler, port) = scheduler();
        scheduler
            .schedule(Duration::from_millis(30), vec![0xFA], 30.0)
            .unwrap();
        scheduler.shutdown();
        assert!(matches!(
            scheduler.schedule(Duration::ZERO, vec![0xFC], 0.0),
            Err(Error::PortDestroyed(_))
        ));
        assert!(port.recv_timeout(Duration::from_millis(120)).is_none());
    }
}
