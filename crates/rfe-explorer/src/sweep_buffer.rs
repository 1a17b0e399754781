//! Bounded, insertion-ordered sweep storage with a running max-hold trace.

use std::collections::VecDeque;

use rfe_core::error::{Error, Result};
use rfe_core::types::{MAX_AMPLITUDE_DBM, MIN_AMPLITUDE_DBM};

use crate::calibration::CalibrationTable;
use crate::sweep::SweepRecord;

/// Absolute number of sweeps a buffer may hold.
pub const MAX_SWEEP_ELEMENTS: usize = 1000;

/// Default auto-grow increment.
pub const DEFAULT_GROWTH_CHUNK: usize = 100;

/// How a buffer makes room for new sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    /// Grow in steps of `chunk` until [`MAX_SWEEP_ELEMENTS`], then refuse.
    AutoGrow { chunk: usize },
    /// Keep only the newest `n` sweeps, evicting the oldest.
    Window(usize),
}

impl Default for Growth {
    fn default() -> Self {
        Growth::AutoGrow {
            chunk: DEFAULT_GROWTH_CHUNK,
        }
    }
}

/// Collection of sweeps plus their per-point maximum.
///
/// The max-hold trace always has the frequency plan of the most recently
/// added sweep; adding a sweep with a different plan restarts it.
#[derive(Debug, Clone)]
pub struct SweepBuffer {
    records: VecDeque<SweepRecord>,
    max_hold: Option<SweepRecord>,
    growth: Growth,
    allocated: usize,
}

impl Default for SweepBuffer {
    fn default() -> Self {
        Self::new(Growth::default())
    }
}

impl SweepBuffer {
    pub fn new(growth: Growth) -> Self {
        let growth = match growth {
            Growth::AutoGrow { chunk } => Growth::AutoGrow {
                chunk: chunk.clamp(1, MAX_SWEEP_ELEMENTS),
            },
            Growth::Window(n) => Growth::Window(n.clamp(1, MAX_SWEEP_ELEMENTS)),
        };
        let allocated = initial_allocation(growth);
        SweepBuffer {
            records: VecDeque::with_capacity(allocated),
            max_hold: None,
            growth,
            allocated,
        }
    }

    pub fn growth(&self) -> Growth {
        self.growth
    }

    /// Number of sweeps held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Slots reserved so far. Grows by the auto-grow chunk as sweeps arrive.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Whether the hard cap has been reached. A window buffer is never full.
    pub fn is_full(&self) -> bool {
        match self.growth {
            Growth::AutoGrow { .. } => self.records.len() >= MAX_SWEEP_ELEMENTS,
            Growth::Window(_) => false,
        }
    }

    /// Append a sweep. Returns `false`, leaving the buffer untouched, when
    /// the hard cap is reached.
    pub fn add(&mut self, record: SweepRecord) -> bool {
        match self.growth {
            Growth::AutoGrow { chunk } => {
                if self.is_full() {
                    return false;
                }
                if self.records.len() >= self.allocated {
                    self.allocated = (self.allocated + chunk).min(MAX_SWEEP_ELEMENTS);
                    self.records
                        .reserve(self.allocated.saturating_sub(self.records.len()));
                }
            }
            Growth::Window(n) => {
                while self.records.len() >= n {
                    self.records.pop_front();
                }
            }
        }

        self.update_max_hold(&record);
        self.records.push_back(record);
        true
    }

    /// [`add`](Self::add), reporting a refused sweep as
    /// [`Error::Capacity`].
    pub fn try_add(&mut self, record: SweepRecord) -> Result<()> {
        if self.add(record) {
            Ok(())
        } else {
            Err(Error::Capacity(MAX_SWEEP_ELEMENTS))
        }
    }

    fn update_max_hold(&mut self, record: &SweepRecord) {
        let same_plan = self
            .max_hold
            .as_ref()
            .is_some_and(|hold| hold.is_same_configuration(record));
        if !same_plan {
            let mut hold = SweepRecord::from_amplitudes(
                record.start_mhz(),
                record.step_mhz(),
                record.amplitudes().to_vec(),
            );
            hold.set_captured_at(record.captured_at());
            self.max_hold = Some(hold);
            return;
        }

        if let Some(hold) = self.max_hold.as_mut() {
            for (i, &value) in record.amplitudes().iter().enumerate() {
                if value > hold.amplitude(i) {
                    hold.set_amplitude(i, value);
                }
            }
            hold.set_captured_at(record.captured_at());
        }
    }

    /// Sweep at `index`, oldest first.
    pub fn get(&self, index: usize) -> Option<&SweepRecord> {
        self.records.get(index)
    }

    /// The newest sweep.
    pub fn latest(&self) -> Option<&SweepRecord> {
        self.records.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SweepRecord> {
        self.records.iter()
    }

    /// Per-point maximum of every sweep added since the last clean or plan
    /// change.
    pub fn max_hold(&self) -> Option<&SweepRecord> {
        self.max_hold.as_ref()
    }

    /// Drop every sweep and the max-hold trace.
    pub fn clean_all(&mut self) {
        self.records.clear();
        self.max_hold = None;
        self.allocated = initial_allocation(self.growth);
    }

    /// Per-point mean over sweeps `start..=end`.
    ///
    /// `None` when the range is invalid or any sweep in it has a different
    /// frequency plan than the sweep at `end`.
    pub fn average(&self, start: usize, end: usize) -> Option<SweepRecord> {
        let range = self.uniform_range(start, end)?;
        let count = range.len() as f64;
        let template = range.last()?;
        let mut out =
            SweepRecord::new(template.start_mhz(), template.step_mhz(), template.points());
        for point in 0..template.points() {
            let sum: f64 = range.iter().map(|r| r.amplitude(point)).sum();
            out.set_amplitude(point, sum / count);
        }
        Some(out)
    }

    /// Per-point median over sweeps `start..=end`; the upper middle value
    /// for an even count. Same failure rules as [`SweepBuffer::average`].
    pub fn median(&self, start: usize, end: usize) -> Option<SweepRecord> {
        let range = self.uniform_range(start, end)?;
        let template = range.last()?;
        let mut out =
            SweepRecord::new(template.start_mhz(), template.step_mhz(), template.points());
        let mut column = Vec::with_capacity(range.len());
        for point in 0..template.points() {
            column.clear();
            column.extend(range.iter().map(|r| r.amplitude(point)));
            column.sort_by(f64::total_cmp);
            out.set_amplitude(point, column[column.len() / 2]);
        }
        Some(out)
    }

    fn uniform_range(&self, start: usize, end: usize) -> Option<Vec<&SweepRecord>> {
        if start > end || end >= self.records.len() {
            return None;
        }
        let range: Vec<&SweepRecord> = self.records.range(start..=end).collect();
        let last = range.last()?;
        if range.iter().all(|r| r.is_same_configuration(last)) {
            Some(range)
        } else {
            tracing::debug!(start, end, "sweep range mixes frequency plans");
            None
        }
    }

    /// Highest and lowest amplitude across every held sweep, as
    /// `(top, bottom)` dBm, with calibration corrections applied when a
    /// table is given. `None` when the buffer is empty.
    pub fn top_bottom_range(&self, calibration: Option<&CalibrationTable>) -> Option<(f64, f64)> {
        if self.records.is_empty() {
            return None;
        }
        let mut top = MIN_AMPLITUDE_DBM;
        let mut bottom = MAX_AMPLITUDE_DBM;
        for record in &self.records {
            for point in 0..record.points() {
                let value = match calibration {
                    Some(table) => record.corrected_amplitude(point, table),
                    None => record.amplitude(point),
                };
                top = top.max(value);
                bottom = bottom.min(value);
            }
        }
        Some((top, bottom))
    }

    /// Every held sweep's dump, one after the other.
    pub fn dump(&self) -> String {
        self.records
            .iter()
            .map(SweepRecord::dump)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn initial_allocation(growth: Growth) -> usize {
    match growth {
        Growth::AutoGrow { chunk } => chunk,
        Growth::Window(n) => n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sweep(values: &[f64]) -> SweepRecord {
        SweepRecord::from_amplitudes(430.0, 0.1, values.to_vec())
    }

    // =======================================================================
    // Growth
    // =======================================================================

    #[test]
    fn auto_grow_in_chunks() {
        let mut buffer = SweepBuffer::new(Growth::AutoGrow { chunk: 10 });
        assert_eq!(buffer.allocated(), 10);
        for _ in 0..10 {
            assert!(buffer.add(sweep(&[-50.0])));
        }
        assert_eq!(buffer.allocated(), 10);
        assert!(buffer.add(sweep(&[-50.0])));
        assert_eq!(buffer.allocated(), 20);
        assert_eq!(buffer.len(), 11);
    }

    #[test]
    fn auto_grow_stops_at_cap() {
        let mut buffer = SweepBuffer::new(Growth::AutoGrow { chunk: 400 });
        for _ in 0..MAX_SWEEP_ELEMENTS {
            assert!(buffer.add(sweep(&[-50.0])));
        }
        assert!(buffer.is_full());
        assert_eq!(buffer.allocated(), MAX_SWEEP_ELEMENTS);
        assert!(!buffer.add(sweep(&[-10.0])));
        assert!(matches!(
            buffer.try_add(sweep(&[-10.0])),
            Err(Error::Capacity(MAX_SWEEP_ELEMENTS))
        ));
        assert_eq!(buffer.len(), MAX_SWEEP_ELEMENTS);
        // The refused sweep did not reach max hold either.
        assert_eq!(buffer.max_hold().unwrap().amplitude(0), -50.0);
    }

    #[test]
    fn window_evicts_oldest() {
        let mut buffer = SweepBuffer::new(Growth::Window(3));
        for i in 0..4 {
            assert!(buffer.add(sweep(&[-(i as f64)])));
        }
        assert_eq!(buffer.len(), 3);
        let held: Vec<f64> = buffer.iter().map(|r| r.amplitude(0)).collect();
        assert_eq!(held, vec![-1.0, -2.0, -3.0]);
        assert!(!buffer.is_full());
    }

    #[test]
    fn clean_all_resets() {
        let mut buffer = SweepBuffer::new(Growth::AutoGrow { chunk: 2 });
        for _ in 0..5 {
            buffer.add(sweep(&[-50.0]));
        }
        buffer.clean_all();
        assert!(buffer.is_empty());
        assert!(buffer.max_hold().is_none());
        assert!(buffer.latest().is_none());
        assert_eq!(buffer.allocated(), 2);
    }

    // =======================================================================
    // Max hold
    // =======================================================================

    #[test]
    fn max_hold_restarts_on_plan_change() {
        let mut buffer = SweepBuffer::default();
        buffer.add(sweep(&[-10.0, -10.0]));
        buffer.add(SweepRecord::from_amplitudes(500.0, 0.1, vec![-80.0, -70.0, -60.0]));
        let hold = buffer.max_hold().unwrap();
        assert_eq!(hold.points(), 3);
        assert_eq!(hold.start_mhz(), 500.0);
        assert_eq!(hold.amplitudes(), &[-80.0, -70.0, -60.0]);
    }

    #[test]
    fn max_hold_keeps_levels_below_display_floor() {
        let mut buffer = SweepBuffer::default();
        buffer.add(sweep(&[-125.0]));
        buffer.add(sweep(&[-126.0]));
        assert_eq!(buffer.max_hold().unwrap().amplitude(0), -125.0);
    }

    proptest! {
        #[test]
        fn max_hold_is_pointwise_max(
            sweeps in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 8), 1..40)
        ) {
            // Amplitudes as decoded from a sweep byte with no offset.
            let decoded = |byte: u8| -(byte as f64) / 2.0;
            let mut buffer = SweepBuffer::default();
            for bytes in &sweeps {
                let values: Vec<f64> = bytes.iter().map(|&b| decoded(b)).collect();
                prop_assert!(buffer.add(sweep(&values)));
            }
            let hold = buffer.max_hold().unwrap();
            for point in 0..8 {
                let lowest_byte = sweeps.iter().map(|s| s[point]).min().unwrap();
                prop_assert_eq!(hold.amplitude(point), decoded(lowest_byte));
            }
        }
    }

    // =======================================================================
    // Statistics
    // =======================================================================

    #[test]
    fn average_and_median() {
        let mut buffer = SweepBuffer::default();
        buffer.add(sweep(&[-10.0, -40.0]));
        buffer.add(sweep(&[-20.0, -50.0]));
        buffer.add(sweep(&[-60.0, -30.0]));

        let avg = buffer.average(0, 2).unwrap();
        assert_eq!(avg.amplitudes(), &[-30.0, -40.0]);

        let median = buffer.median(0, 2).unwrap();
        assert_eq!(median.amplitudes(), &[-20.0, -40.0]);

        let pair = buffer.median(0, 1).unwrap();
        assert_eq!(pair.amplitudes(), &[-10.0, -40.0]);
    }

    #[test]
    fn statistics_reject_bad_ranges() {
        let mut buffer = SweepBuffer::default();
        buffer.add(sweep(&[-10.0]));
        buffer.add(sweep(&[-20.0]));
        assert!(buffer.average(1, 0).is_none());
        assert!(buffer.average(0, 2).is_none());
        assert!(buffer.median(2, 2).is_none());
        assert!(SweepBuffer::default().average(0, 0).is_none());
    }

    #[test]
    fn statistics_reject_mixed_plans() {
        let mut buffer = SweepBuffer::default();
        buffer.add(sweep(&[-10.0, -10.0]));
        buffer.add(SweepRecord::from_amplitudes(431.0, 0.1, vec![-10.0, -10.0]));
        buffer.add(sweep(&[-10.0, -10.0]));
        assert!(buffer.average(0, 2).is_none());
        assert!(buffer.median(0, 2).is_none());
        // A uniform sub-range still works.
        assert!(buffer.average(2, 2).is_some());
    }

    #[test]
    fn top_bottom_range_with_and_without_calibration() {
        let mut buffer = SweepBuffer::default();
        assert!(buffer.top_bottom_range(None).is_none());

        buffer.add(SweepRecord::from_amplitudes(430.0, 1.0, vec![-70.0, -30.0]));
        buffer.add(SweepRecord::from_amplitudes(430.0, 1.0, vec![-90.0, -40.0]));
        assert_eq!(buffer.top_bottom_range(None), Some((-30.0, -90.0)));

        let table = CalibrationTable::parse("--RFEAT01\n430 5\n431 5\n").unwrap();
        assert_eq!(buffer.top_bottom_range(Some(&table)), Some((-25.0, -85.0)));
    }

    #[test]
    fn dump_joins_records() {
        let mut buffer = SweepBuffer::default();
        buffer.add(sweep(&[-10.0]));
        buffer.add(sweep(&[-20.0]));
        assert_eq!(buffer.dump().matches("Sweep data:").count(), 2);
    }
}
