//! Log spooling facade over the bounded MPSC ring.
//!
//! Arbitrary threads post text messages through [`LogSender`] handles; a
//! single drain thread pulls them off the ring and writes them to a byte
//! sink (standard output by default), one line per message.
//!
//! The core queue is lossy; the retry policy lives here: [`LogSender::post`]
//! backs off and retries until the message is accepted, while
//! [`LogSender::try_post`] surfaces the rejection to the caller.
//!
//! # Example
//!
//! ```no_run
//! use spool::logger::{Logger, LoggerConfig};
//!
//! let logger = Logger::spawn(LoggerConfig { capacity: 1024 })?;
//!
//! let sender = logger.sender();
//! let worker = std::thread::spawn(move || {
//!     sender.post("hello from a worker");
//! });
//!
//! worker.join().unwrap();
//! logger.shutdown();
//! # Ok::<(), spool::logger::LoggerError>(())
//! ```

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_utils::Backoff;
use thiserror::Error;

use crate::sync::mpsc::{self, CapacityError, Consumer, Producer};
use crate::trace::{debug, info, warn};

/// Default spool capacity: 16 Mi messages.
pub const DEFAULT_CAPACITY: usize = 16 * 1024 * 1024;

/// Configuration for [`Logger::spawn`].
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Ring capacity in messages. Must be a power of two >= 2.
    pub capacity: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Error spawning the logger.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// The configured ring capacity is unusable.
    #[error("invalid spool capacity: {0}")]
    Capacity(#[from] CapacityError),
}

/// Handle to a running logger.
///
/// Dropping the handle signals shutdown but does not wait for the drain
/// thread to exit. Use [`Logger::shutdown`] for graceful shutdown with join.
pub struct Logger {
    sender: LogSender,
    /// Shutdown flag shared with the drain thread.
    shutdown_flag: Arc<AtomicBool>,
    drain_handle: Option<JoinHandle<()>>,
}

impl Logger {
    /// Spawns a logger draining to standard output.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured capacity is not a power of two
    /// >= 2.
    pub fn spawn(config: LoggerConfig) -> Result<Self, LoggerError> {
        Self::with_sink(config, Box::new(io::stdout()))
    }

    /// Spawns a logger draining to the given sink.
    ///
    /// # Errors
    ///
    /// See [`Logger::spawn`].
    ///
    /// # Panics
    ///
    /// Panics if thread spawning fails.
    pub fn with_sink(
        config: LoggerConfig,
        sink: Box<dyn Write + Send>,
    ) -> Result<Self, LoggerError> {
        let (producer, consumer) = mpsc::channel::<String>(config.capacity)?;

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown_flag);

        debug!(capacity = config.capacity, "spawning drain thread");
        let drain_handle = thread::Builder::new()
            .name("spool-drain".into())
            .spawn(move || {
                info!("drain thread started");
                drain_loop(&consumer, sink, &flag);
                info!("drain thread exiting");
            })
            .expect("failed to spawn drain thread");

        Ok(Self {
            sender: LogSender { producer },
            shutdown_flag,
            drain_handle: Some(drain_handle),
        })
    }

    /// Returns a posting handle. Clone one per producer thread.
    #[must_use]
    pub fn sender(&self) -> LogSender {
        self.sender.clone()
    }

    /// Posts a message from the owning thread. See [`LogSender::post`].
    pub fn post(&self, message: impl Into<String>) {
        self.sender.post(message);
    }

    /// Initiates graceful shutdown and waits for the drain thread to exit.
    ///
    /// Everything accepted before this call is written and flushed before
    /// the thread exits.
    pub fn shutdown(mut self) {
        info!("logger shutdown initiated");
        self.shutdown_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.drain_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }
}

/// Cloneable posting handle for producer threads.
#[derive(Clone)]
pub struct LogSender {
    producer: Producer<String>,
}

impl LogSender {
    /// Posts a message, retrying with backoff until the spool accepts it.
    ///
    /// Loss-free from the caller's perspective; may spin while the spool is
    /// full (including indefinitely if the drain thread has already shut
    /// down).
    pub fn post(&self, message: impl Into<String>) {
        let mut message = message.into();
        let backoff = Backoff::new();
        loop {
            match self.producer.push(message) {
                Ok(()) => return,
                Err(returned) => {
                    message = returned;
                    backoff.snooze();
                }
            }
        }
    }

    /// Posts a message without retrying.
    ///
    /// # Errors
    ///
    /// Returns `Err(message)` if the spool is full (lossy rejection).
    pub fn try_post(&self, message: impl Into<String>) -> Result<(), String> {
        self.producer.push(message.into())
    }
}

/// Drains the spool until shutdown is signalled, then drains the backlog.
fn drain_loop(consumer: &Consumer<String>, mut sink: Box<dyn Write + Send>, shutdown: &AtomicBool) {
    let backoff = Backoff::new();
    while !shutdown.load(Ordering::Relaxed) {
        if drain_burst(consumer, &mut sink) {
            let _ = sink.flush();
            backoff.reset();
        } else {
            backoff.snooze();
        }
    }

    // Everything accepted before the signal is still in the ring; write it
    // out before exiting.
    debug!("draining backlog before exit");
    drain_burst(consumer, &mut sink);
    let _ = sink.flush();
}

/// Writes every message currently in the ring. Returns whether any was seen.
fn drain_burst(consumer: &Consumer<String>, sink: &mut Box<dyn Write + Send>) -> bool {
    let mut drained = false;
    while let Some(message) = consumer.pop() {
        if let Err(_e) = writeln!(sink, "{message}") {
            warn!(error = %_e, "dropping log line");
        }
        drained = true;
    }
    drained
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Sink capturing everything written, shareable with the test body.
    #[derive(Clone)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl SharedSink {
        fn new() -> Self {
            Self(Arc::new(Mutex::new(Vec::new())))
        }

        fn lines(&self) -> Vec<String> {
            let bytes = self.0.lock().unwrap();
            String::from_utf8(bytes.clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn default_config_capacity() {
        assert_eq!(LoggerConfig::default().capacity, 16 * 1024 * 1024);
        assert!(DEFAULT_CAPACITY.is_power_of_two());
    }

    #[test]
    fn rejects_invalid_capacity() {
        assert!(Logger::spawn(LoggerConfig { capacity: 3 }).is_err());
    }

    #[test]
    fn posts_reach_sink_in_thread_order() {
        let sink = SharedSink::new();
        let logger =
            Logger::with_sink(LoggerConfig { capacity: 64 }, Box::new(sink.clone())).unwrap();

        let mut handles = vec![];
        for t in 0..3 {
            let sender = logger.sender();
            handles.push(thread::spawn(move || {
                for i in 0..50 {
                    sender.post(format!("t{t} {i}"));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        logger.shutdown();

        let lines = sink.lines();
        assert_eq!(lines.len(), 150);

        // Each thread's messages appear in posting order.
        for t in 0..3 {
            let prefix = format!("t{t} ");
            let got: Vec<&String> = lines.iter().filter(|l| l.starts_with(&prefix)).collect();
            assert_eq!(got.len(), 50);
            for (i, line) in got.iter().enumerate() {
                assert_eq!(**line, format!("t{t} {i}"));
            }
        }
    }

    #[test]
    fn shutdown_flushes_backlog() {
        let sink = SharedSink::new();
        let logger =
            Logger::with_sink(LoggerConfig { capacity: 256 }, Box::new(sink.clone())).unwrap();

        for i in 0..100 {
            logger.post(format!("line {i}"));
        }
        logger.shutdown();

        let lines = sink.lines();
        assert_eq!(lines.len(), 100);
        assert_eq!(lines[0], "line 0");
        assert_eq!(lines[99], "line 99");
    }

    #[test]
    fn try_post_roundtrip() {
        let sink = SharedSink::new();
        let logger =
            Logger::with_sink(LoggerConfig { capacity: 64 }, Box::new(sink.clone())).unwrap();

        let sender = logger.sender();
        while sender.try_post("maybe").is_err() {
            thread::yield_now();
        }
        logger.shutdown();

        assert_eq!(sink.lines(), vec!["maybe".to_string()]);
    }
}
