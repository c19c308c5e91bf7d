//! Round statistics.
//!
//! A [`RoundStats`] is handed to whichever node should report. Measurements are kept in
//! memory, logged, and optionally written as JSON lines to a sink the owner attaches and
//! closes.
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::messages::StatusReturnMessage;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Measure {
    pub name: &'static str,
    pub round: u64,
    pub value: u64,
    /// Milliseconds since the round was started, when known.
    pub wall_ms: Option<u64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub completed: u64,
    pub abandoned: u64,
    /// Payload items signed over all completed rounds.
    pub messages: u64,
    pub exceptions: u64,
    pub responders: u64,
    pub peers: u64,
}

#[derive(Default)]
struct StatsState {
    snapshot: StatsSnapshot,
    started: BTreeMap<u64, Instant>,
    measures: Vec<Measure>,
    sink: Option<Box<dyn Write + Send>>,
}

#[derive(Clone, Default)]
pub struct RoundStats {
    state: Arc<Mutex<StatsState>>,
}

impl RoundStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write every measure to `sink`, one JSON object per line.
    pub fn connect_sink(&self, sink: impl Write + Send + 'static) {
        self.lock().sink = Some(Box::new(sink));
    }

    pub fn record_started(&self, round: u64) {
        self.lock().started.insert(round, Instant::now());
    }

    pub fn record_completed(&self, round: u64, messages: u64, exceptions: u64) {
        let mut state = self.lock();
        state.snapshot.completed += 1;
        state.snapshot.messages += messages;
        state.snapshot.exceptions += exceptions;
        let total = state.snapshot.messages;
        info!(
            round,
            messages,
            exceptions,
            total_messages = total,
            "round completed"
        );
        state.measure("round", round, messages);
    }

    pub fn record_abandoned(&self, round: u64) {
        let mut state = self.lock();
        state.snapshot.abandoned += 1;
        warn!(round, "round abandoned");
        state.measure("abandoned", round, 0);
    }

    pub fn record_status(&self, round: u64, status: StatusReturnMessage) {
        let mut state = self.lock();
        state.snapshot.responders = status.responders;
        state.snapshot.peers = status.peers;
        info!(
            round,
            responders = status.responders,
            peers = status.peers,
            "status of the tree"
        );
        state.measure("responders", round, status.responders);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.lock().snapshot
    }

    pub fn measures(&self) -> Vec<Measure> {
        self.lock().measures.clone()
    }

    /// Flush and detach the sink.
    pub fn close(&self) {
        if let Some(mut sink) = self.lock().sink.take() {
            if let Err(e) = sink.flush() {
                warn!(error = %e, "could not flush stats sink");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StatsState {
    fn measure(&mut self, name: &'static str, round: u64, value: u64) {
        let wall_ms = self
            .started
            .get(&round)
            .map(|start| start.elapsed().as_millis() as u64);
        let measure = Measure {
            name,
            round,
            value,
            wall_ms,
        };
        if let Some(sink) = self.sink.as_mut() {
            let written = serde_json::to_writer(&mut *sink, &measure)
                .map_err(std::io::Error::from)
                .and_then(|_| sink.write_all(b"\n"));
            if let Err(e) = written {
                warn!(error = %e, "dropping stats sink");
                self.sink = None;
            }
        }
        self.measures.push(measure);
        // older rounds are done reporting
        self.started.retain(|started, _| *started >= round);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn counts_and_writes_measures() {
        let stats = RoundStats::new();
        let buffer = SharedBuffer::default();
        stats.connect_sink(buffer.clone());

        stats.record_started(1);
        stats.record_completed(1, 5, 1);
        stats.record_abandoned(2);
        stats.record_status(
            1,
            StatusReturnMessage {
                responders: 3,
                peers: 4,
            },
        );
        stats.close();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.abandoned, 1);
        assert_eq!(snapshot.messages, 5);
        assert_eq!((snapshot.responders, snapshot.peers), (3, 4));

        let written = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(written.lines().count(), 3);
        assert!(written.lines().next().unwrap().contains("\"name\":\"round\""));
    }
}
