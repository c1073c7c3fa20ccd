//! Notification dispatch: handler trait, foreground execution context and
//! a channel-backed event stream.
//!
//! # Overview
//! Every flag reaches a [`ResponseHandler`] twice: first synchronously on
//! the worker thread (`on_background`, for work that must not wait on the
//! host, such as persistence), then as a job queued on the [`Foreground`]
//! context (`on_foreground`). Progress updates only go to the foreground.
//!
//! # Design
//! The foreground context is a single-consumer job queue. `Foreground` is
//! the cloneable producer side, `MainLoop` the consumer, which the host
//! drives from whichever thread it treats as its main thread (or hands to
//! [`Foreground::spawn`]). Jobs run in enqueue order, which preserves the
//! per-request flag order; nothing orders jobs across concurrent requests.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, warn};

use crate::flag::Flag;
use crate::progress::Progress;
use crate::response::Response;

/// A unit of work for the foreground context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Receives the notifications of every request issued through an `HttpCall`.
///
/// All methods default to doing nothing, so handlers implement only the
/// stages they care about.
pub trait ResponseHandler: Send + Sync {
    /// Runs on the worker thread, before the foreground copy is queued.
    fn on_background(&self, _flag: Flag, _response: &Response) {}

    /// Runs on the foreground context.
    fn on_foreground(&self, _flag: Flag, _response: &Response) {}

    /// Runs on the foreground context.
    fn on_progress(&self, _progress: Progress) {}
}

/// Handler that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl ResponseHandler for NoopHandler {}

/// Producer side of the foreground job queue.
#[derive(Clone)]
pub struct Foreground {
    tx: Sender<Job>,
}

impl Foreground {
    /// A new queue. Jobs run only while the returned `MainLoop` is driven.
    pub fn channel() -> (Foreground, MainLoop) {
        let (tx, rx) = unbounded();
        (Foreground { tx }, MainLoop { rx })
    }

    /// A queue drained by a dedicated thread. The thread exits once every
    /// `Foreground` clone has been dropped.
    pub fn spawn(name: &str) -> io::Result<(Foreground, JoinHandle<()>)> {
        let (foreground, main_loop) = Foreground::channel();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || main_loop.run())?;
        Ok((foreground, handle))
    }

    /// Queue a job. Returns false when the consumer is gone.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Box::new(job)).is_ok()
    }
}

/// Consumer side of the foreground job queue.
pub struct MainLoop {
    rx: Receiver<Job>,
}

impl MainLoop {
    /// Run jobs until every producer is dropped.
    pub fn run(self) {
        for job in self.rx.iter() {
            run_job(job);
        }
        debug!("Foreground loop finished");
    }

    /// Run the jobs already queued, without blocking. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            run_job(job);
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one job and run it.
    pub fn run_one(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(job) => {
                run_job(job);
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

fn run_job(job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        error!("Foreground job panicked");
    }
}

/// A notification as seen by an [`EventStream`] receiver.
#[derive(Debug, Clone)]
pub enum Event {
    Flag { flag: Flag, response: Response },
    Progress(Progress),
}

impl Event {
    pub fn flag(&self) -> Option<Flag> {
        match self {
            Event::Flag { flag, .. } => Some(*flag),
            Event::Progress(_) => None,
        }
    }
}

/// Handler that forwards foreground notifications into a channel, for
/// callers that prefer pulling events to implementing a trait.
pub struct EventStream {
    tx: Sender<Event>,
}

impl EventStream {
    pub fn channel() -> (Arc<EventStream>, Receiver<Event>) {
        let (tx, rx) = unbounded();
        (Arc::new(EventStream { tx }), rx)
    }
}

impl ResponseHandler for EventStream {
    fn on_foreground(&self, flag: Flag, response: &Response) {
        let _ = self.tx.send(Event::Flag {
            flag,
            response: response.clone(),
        });
    }

    fn on_progress(&self, progress: Progress) {
        let _ = self.tx.send(Event::Progress(progress));
    }
}

/// Delivers one request's notifications to its handler.
#[derive(Clone)]
pub struct Notifier {
    handler: Arc<dyn ResponseHandler>,
    foreground: Foreground,
}

impl Notifier {
    pub fn new(handler: Arc<dyn ResponseHandler>, foreground: Foreground) -> Self {
        Self {
            handler,
            foreground,
        }
    }

    /// Background callback now, then a snapshot queued for the foreground.
    pub fn flag(&self, flag: Flag, response: &Response) {
        debug!("Notify {} for {}", flag, response.url().unwrap_or("<no url>"));
        self.handler.on_background(flag, response);

        let handler = Arc::clone(&self.handler);
        let snapshot = response.clone();
        if !self
            .foreground
            .post(move || handler.on_foreground(flag, &snapshot))
        {
            warn!("Foreground loop is gone; dropped {}", flag);
        }
    }

    pub fn progress(&self, progress: Progress) {
        let handler = Arc::clone(&self.handler);
        if !self.foreground.post(move || handler.on_progress(progress)) {
            warn!("Foreground loop is gone; dropped progress {}%", progress.percentage);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ResponseHandler for Recorder {
        fn on_background(&self, flag: Flag, _response: &Response) {
            self.calls.lock().unwrap().push(format!("bg {}", flag.name()));
        }

        fn on_foreground(&self, flag: Flag, response: &Response) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("fg {} {}", flag.name(), response.text().unwrap_or("")));
        }

        fn on_progress(&self, progress: Progress) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("progress {}", progress.percentage));
        }
    }

    fn progress(percentage: u8) -> Progress {
        Progress {
            percentage,
            total_size: 100,
            bytes_read: percentage as u64,
        }
    }

    #[test]
    fn background_runs_before_foreground_and_order_is_kept() {
        let recorder = Arc::new(Recorder::default());
        let (foreground, main_loop) = Foreground::channel();
        let notifier = Notifier::new(recorder.clone(), foreground);

        let mut response = Response::new();
        notifier.flag(Flag::RequestAccepted, response.set_result("accepted"));
        notifier.progress(progress(50));
        notifier.flag(Flag::ResponseIsReady, response.set_result("done"));

        assert_eq!(recorder.calls(), vec!["bg REQUEST_ACCEPTED", "bg RESPONSE_IS_READY"]);
        assert_eq!(main_loop.run_pending(), 3);
        assert_eq!(
            recorder.calls()[2..].to_vec(),
            vec![
                "fg REQUEST_ACCEPTED accepted",
                "progress 50",
                "fg RESPONSE_IS_READY done"
            ]
        );
    }

    #[test]
    fn event_stream_receives_snapshots() {
        let (stream, events) = EventStream::channel();
        let (foreground, main_loop) = Foreground::channel();
        let notifier = Notifier::new(stream, foreground);

        let mut response = Response::new();
        notifier.flag(Flag::RequestAccepted, response.set_result("first"));
        notifier.flag(Flag::DataSent, response.set_result("second"));
        main_loop.run_pending();

        let received: Vec<(Flag, String)> = events
            .try_iter()
            .map(|event| match event {
                Event::Flag { flag, response } => (flag, response.text().unwrap().to_string()),
                Event::Progress(_) => panic!("unexpected progress"),
            })
            .collect();
        assert_eq!(
            received,
            vec![
                (Flag::RequestAccepted, "first".to_string()),
                (Flag::DataSent, "second".to_string())
            ]
        );
    }

    #[test]
    fn spawned_loop_runs_jobs_and_exits_when_producers_drop() {
        let (foreground, handle) = Foreground::spawn("test-foreground").unwrap();
        let (tx, rx) = unbounded();
        assert!(foreground.post(move || tx.send(thread::current().name().map(String::from)).unwrap()));

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("test-foreground"));

        drop(foreground);
        handle.join().unwrap();
    }

    #[test]
    fn panicking_job_does_not_stop_the_loop() {
        let (foreground, main_loop) = Foreground::channel();
        let (tx, rx) = unbounded();
        foreground.post(|| panic!("boom"));
        foreground.post(move || tx.send(()).unwrap());
        assert_eq!(main_loop.run_pending(), 2);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn post_fails_once_loop_is_dropped() {
        let (foreground, main_loop) = Foreground::channel();
        drop(main_loop);
        assert!(!foreground.post(|| {}));
        // Notifier only logs.
        Notifier::new(Arc::new(NoopHandler), foreground).flag(Flag::ErrorMessage, &Response::new());
    }

    #[test]
    fn run_one_times_out_on_empty_queue() {
        let (_foreground, main_loop) = Foreground::channel();
        assert!(!main_loop.run_one(Duration::from_millis(10)));
    }
}
