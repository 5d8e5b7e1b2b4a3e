//! Core station abstraction and runner for the decoder pipeline.

use crate::pipeline::error::{ErrorReporter, StationError};
use crossbeam_channel::{Receiver, Sender};
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A processing station in the decoder pipeline.
///
/// Each station receives input, processes it, and produces zero or more
/// outputs. Stations run in their own threads and are connected by channels.
pub trait Station: Send + 'static {
    /// The input type this station receives.
    type Input: Send + 'static;
    /// The output type this station produces.
    type Output: Send + 'static;

    /// Processes a single input item, pushing any outputs onto `out`.
    ///
    /// Windowed stations buffer input and push a whole window at once,
    /// so a call may push nothing or many items.
    fn process(
        &mut self,
        input: Self::Input,
        out: &mut Vec<Self::Output>,
    ) -> Result<(), StationError>;

    /// Called once when the input channel closes, before `shutdown`.
    ///
    /// Push whatever buffered data the station's end-of-stream policy keeps.
    fn flush(&mut self, _out: &mut Vec<Self::Output>) {}

    /// Returns the name of this station for logging and error reporting.
    fn name(&self) -> &'static str;

    /// Called when the station is shutting down.
    fn shutdown(&mut self) {}
}

/// Runs a station in a dedicated thread.
pub struct StationRunner<S: Station> {
    /// Handle to the spawned thread. Yields the fatal error, if any.
    handle: Option<JoinHandle<Option<StationError>>>,
    /// Name of the station (cached for error reporting).
    station_name: &'static str,
    _phantom: PhantomData<S>,
}

impl<S: Station> StationRunner<S> {
    /// Spawns a new station in a dedicated thread.
    ///
    /// # Arguments
    /// * `station` - The station implementation to run
    /// * `input_rx` - Channel to receive inputs from
    /// * `output_tx` - Channel to send outputs to
    /// * `error_reporter` - Reporter for handling errors
    pub fn spawn(
        mut station: S,
        input_rx: Receiver<S::Input>,
        output_tx: Sender<S::Output>,
        error_reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let station_name = station.name();

        let handle = thread::Builder::new()
            .name(format!("cw-{}", station_name))
            .spawn(move || Self::run_station(&mut station, input_rx, output_tx, error_reporter));

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(station = station_name, "failed to spawn thread: {}", e);
                None
            }
        };

        Self {
            handle,
            station_name,
            _phantom: PhantomData,
        }
    }

    /// Main processing loop for the station.
    fn run_station(
        station: &mut S,
        input_rx: Receiver<S::Input>,
        output_tx: Sender<S::Output>,
        error_reporter: Arc<dyn ErrorReporter>,
    ) -> Option<StationError> {
        let station_name = station.name();
        let mut out = Vec::new();
        let mut fatal = None;
        let mut downstream_closed = false;

        while let Ok(input) = input_rx.recv() {
            match station.process(input, &mut out) {
                Ok(()) => {
                    if !forward(&output_tx, &mut out) {
                        downstream_closed = true;
                        break;
                    }
                }
                Err(StationError::Recoverable(msg)) => {
                    out.clear();
                    error_reporter.report(station_name, &StationError::Recoverable(msg));
                }
                Err(StationError::Fatal(msg)) => {
                    let error = StationError::Fatal(msg);
                    error_reporter.report(station_name, &error);
                    fatal = Some(error);
                    break;
                }
            }
        }

        // A fatal station stops abnormally and keeps its partial state to itself.
        if fatal.is_none() && !downstream_closed {
            out.clear();
            station.flush(&mut out);
            if !forward(&output_tx, &mut out) {
                tracing::debug!(station = station_name, "flush dropped: receiver gone");
            }
        }

        station.shutdown();
        tracing::debug!(station = station_name, "station stopped");
        fatal
    }

    /// Waits for the station thread to complete.
    ///
    /// Returns `Ok(None)` on a clean shutdown, `Ok(Some(error))` if the
    /// station stopped on a fatal error, and `Err` if the thread panicked.
    pub fn join(mut self) -> Result<Option<StationError>, String> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| format!("Station '{}' thread panicked", self.station_name)),
            None => Err(format!("Station '{}' thread never started", self.station_name)),
        }
    }

    /// Returns the name of the station.
    pub fn name(&self) -> &'static str {
        self.station_name
    }
}

/// Sends every buffered output in order. Returns false once the receiver is gone.
fn forward<T>(output_tx: &Sender<T>, out: &mut Vec<T>) -> bool {
    for item in out.drain(..) {
        if output_tx.send(item).is_err() {
            return false;
        }
    }
    true
}
