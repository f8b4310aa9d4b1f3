//! Serialized measurement ingestion
//!
//! Producers (one per sensor driver, socket reader, simulator...) push raw
//! records into a bounded queue; a single consumer owns the `FusionEkf` and
//! applies them strictly in arrival order. The engine itself is never shared.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use serde::Serialize;

use crate::error::{FusionError, FusionResult, QueueClosed};
use crate::filters::{FusionEkf, IngestOutcome};
use crate::types::RawMeasurement;

/// Create a bounded multi-producer, single-consumer measurement queue
pub fn measurement_queue(capacity: usize) -> (MeasurementSender, MeasurementReceiver) {
    let (tx, rx) = channel::bounded(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        MeasurementSender {
            tx,
            dropped: Arc::clone(&dropped),
        },
        MeasurementReceiver { rx, dropped },
    )
}

#[derive(Clone)]
pub struct MeasurementSender {
    tx: Sender<RawMeasurement>,
    dropped: Arc<AtomicU64>,
}

impl MeasurementSender {
    /// Block until there is room in the queue
    pub fn send(&self, measurement: RawMeasurement) -> Result<(), QueueClosed> {
        self.tx.send(measurement).map_err(|e| QueueClosed(e.into_inner()))
    }

    /// Enqueue without blocking. Returns `Ok(false)` when the queue is full and
    /// the record was dropped.
    pub fn try_send(&self, measurement: RawMeasurement) -> Result<bool, QueueClosed> {
        match self.tx.try_send(measurement) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Ok(false)
            }
            Err(TrySendError::Disconnected(m)) => Err(QueueClosed(m)),
        }
    }
}

pub struct MeasurementReceiver {
    rx: Receiver<RawMeasurement>,
    dropped: Arc<AtomicU64>,
}

/// Tally of one drain pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Records pulled off the queue
    pub processed: u64,
    pub initialized: u64,
    pub updated: u64,
    /// Numerical failures (estimate kept, engine moved on)
    pub skipped: u64,
    /// Malformed or out-of-order records
    pub rejected: u64,
}

impl DrainReport {
    fn record(&mut self, result: FusionResult<IngestOutcome>) {
        self.processed += 1;
        match result {
            Ok(IngestOutcome::Initialized) => self.initialized += 1,
            Ok(IngestOutcome::Updated) => self.updated += 1,
            Err(FusionError::SingularInput { .. } | FusionError::UpdateFailure { .. }) => {
                self.skipped += 1
            }
            Err(e) => {
                log::warn!("[FEED] rejected measurement: {}", e);
                self.rejected += 1;
            }
        }
    }
}

impl MeasurementReceiver {
    /// Apply everything currently queued, without waiting for more
    pub fn drain_into(&self, ekf: &mut FusionEkf) -> DrainReport {
        let mut report = DrainReport::default();
        for raw in self.rx.try_iter() {
            report.record(ekf.ingest_raw(&raw));
        }
        report
    }

    /// Apply records as they arrive until every sender has been dropped
    pub fn run(&self, ekf: &mut FusionEkf) -> DrainReport {
        self.run_with(ekf, |_, _| {})
    }

    /// Like `run`, calling `on_ingest` after every record with the engine
    /// and the ingest result
    pub fn run_with<F>(&self, ekf: &mut FusionEkf, mut on_ingest: F) -> DrainReport
    where
        F: FnMut(&FusionEkf, &FusionResult<IngestOutcome>),
    {
        let mut report = DrainReport::default();
        for raw in self.rx.iter() {
            let result = ekf.ingest_raw(&raw);
            on_ingest(ekf, &result);
            report.record(result);
        }
        log::info!(
            "[FEED] producers closed after {} measurements ({} dropped at enqueue)",
            report.processed,
            self.dropped_count()
        );
        report
    }

    /// Records discarded by `try_send` on a full queue
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FusionConfig;
    use crate::types::{Measurement, SensorKind};
    use std::thread;

    fn laser(ts: i64, px: f64, py: f64) -> RawMeasurement {
        Measurement::laser(ts, px, py).into()
    }

    #[test]
    fn test_drain_applies_in_order() {
        let (tx, rx) = measurement_queue(16);
        tx.send(laser(0, 0.0, 0.0)).unwrap();
        tx.send(laser(100_000, 1.0, 0.0)).unwrap();
        tx.send(laser(200_000, 2.0, 0.0)).unwrap();

        let mut ekf = FusionEkf::new(FusionConfig::default());
        let report = rx.drain_into(&mut ekf);
        assert_eq!(report.processed, 3);
        assert_eq!(report.initialized, 1);
        assert_eq!(report.updated, 2);
        assert!(rx.is_empty());

        let (x, _) = ekf.state().unwrap();
        assert!(x[2] > 8.0 && x[2] < 12.0);
    }

    #[test]
    fn test_drain_counts_failures() {
        let (tx, rx) = measurement_queue(16);
        tx.send(laser(0, 0.0, 0.0)).unwrap();
        // Zero-range radar update
        tx.send(Measurement::radar(10, 0.0, 0.0, 0.0).into()).unwrap();
        // Wrong arity
        tx.send(RawMeasurement {
            sensor_kind: SensorKind::Radar,
            raw_values: vec![1.0],
            timestamp: 20,
        })
        .unwrap();
        // Earlier than the initializing laser fix
        tx.send(laser(-5, 0.0, 0.0)).unwrap();

        let mut ekf = FusionEkf::new(FusionConfig::default());
        let report = rx.drain_into(&mut ekf);
        assert_eq!(
            report,
            DrainReport {
                processed: 4,
                initialized: 1,
                updated: 0,
                skipped: 1,
                rejected: 2,
            }
        );
    }

    #[test]
    fn test_try_send_drops_when_full() {
        let (tx, rx) = measurement_queue(1);
        assert!(tx.try_send(laser(0, 0.0, 0.0)).unwrap());
        assert!(!tx.try_send(laser(1, 0.0, 0.0)).unwrap());
        assert_eq!(rx.dropped_count(), 1);
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = measurement_queue(4);
        drop(rx);
        let err = tx.send(laser(0, 1.0, 2.0)).unwrap_err();
        assert_eq!(err.0.timestamp, 0);
        assert!(tx.try_send(laser(1, 1.0, 2.0)).is_err());
    }

    #[test]
    fn test_run_until_producers_close() {
        let (tx, rx) = measurement_queue(8);
        let producer = {
            let tx = tx.clone();
            thread::spawn(move || {
                for i in 0..20 {
                    tx.send(laser(i * 100_000, 3.0, 4.0)).unwrap();
                }
            })
        };
        drop(tx);

        let mut ekf = FusionEkf::new(FusionConfig::default());
        let report = rx.run(&mut ekf);
        producer.join().unwrap();

        assert_eq!(report.processed, 20);
        assert_eq!(report.updated, 19);
        let snapshot = ekf.snapshot().unwrap();
        assert_eq!(snapshot.laser_updates, 19);
        assert_eq!(snapshot.position, (3.0, 4.0));
    }

    #[test]
    fn test_run_with_observes_each_ingest() {
        let (tx, rx) = measurement_queue(8);
        tx.send(laser(0, 1.0, 1.0)).unwrap();
        tx.send(laser(100_000, 1.0, 1.0)).unwrap();
        tx.send(laser(50_000, 1.0, 1.0)).unwrap();
        drop(tx);

        let mut ekf = FusionEkf::new(FusionConfig::default());
        let mut seen = Vec::new();
        let report = rx.run_with(&mut ekf, |engine, result| {
            seen.push((result.is_ok(), engine.snapshot().map(|s| s.timestamp)));
        });

        assert_eq!(report.rejected, 1);
        assert_eq!(
            seen,
            vec![(true, Some(0)), (true, Some(100_000)), (false, Some(100_000))]
        );
    }
}
