//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::fmt::Error;
use std::fmt::Formatter;
use std::time::Instant;

use log::info;

/// A simple struct that allows to do naive timing outputs
///
/// Logger is used as an output source, make sure logger backend is configured
///
/// Log output may look like
/// `[Party 0] [psi | hash+encrypt size: 10000] elapsed: 0.00625 sec [qps: 1600435]`
///
/// Besides logging, [`Timer::lap`] hands the measured seconds back so
/// the caller can record them as a named phase.
///
/// # Example
///
/// ```
/// use common::timer;
/// let mut t = timer::Timer::new_silent("pipeline");
/// let values = vec![1, 2, 3];
/// t.qps("read input", values.len());
/// let secs = t.lap("Data Normalization");
/// assert!(secs >= 0.0);
/// ```
pub struct Timer {
    start: Instant,
    label: String,
    silent: bool,
}

impl Timer {
    /// Returns a new timer that logs its total lifetime on drop
    ///
    /// # Arguments
    ///
    /// * label - will work as a prefix to all outputs of a timer
    pub fn new(label: &str) -> Timer {
        Timer {
            start: Instant::now(),
            label: String::from(label),
            silent: false,
        }
    }

    /// A silent timer means, timer will not fire on exiting the
    /// execution block
    pub fn new_silent(label: &str) -> Timer {
        let mut t = Timer::new(label);
        t.silent = true;
        t
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Resets the duration of an internal timer
    pub fn reset(&mut self) {
        self.start = Instant::now();
    }

    /// Returns a formatted string with labels and elapsed times
    ///
    /// - label - optional extra label
    ///
    /// - size - optional size of operation required for qps output
    pub fn qps_str(&self, label: Option<&str>, size: Option<usize>) -> String {
        let e = self.elapsed_secs();

        let fixed_label = label.map(|x| format!(" | {}", x)).unwrap_or_default();
        let fixed_size = size.map(|x| format!(" size: {}", x)).unwrap_or_default();
        let fixed_qps = size
            .filter(|_| e > 0.0)
            .map(|x| format!(" [qps: {:.0}]", (x as f64) / e))
            .unwrap_or_default();

        format!(
            "[{}{}{}] elapsed: {:.5} sec{}",
            self.label, fixed_label, fixed_size, e, fixed_qps
        )
    }

    /// Logs throughput of a step and restarts the clock
    pub fn qps(&mut self, label: &str, size: usize) {
        info!("{}", self.qps_str(Some(label), Some(size)));
        self.reset();
    }

    /// Logs the elapsed time of a phase, restarts the clock and
    /// returns the phase duration in seconds
    pub fn lap(&mut self, phase: &str) -> f64 {
        let secs = self.elapsed_secs();
        info!("{}", self.qps_str(Some(phase), None));
        self.reset();
        secs
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "timer, label: {}", self.label)
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if !self.silent {
            info!("{}", self.qps_str(None, None));
        }
    }
}
