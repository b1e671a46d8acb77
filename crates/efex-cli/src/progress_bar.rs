//! A `pbr`-backed [`ProgressReporter`] for the `read`/`write` file-bound
//! subcommands: a single-line carriage-return bar showing percent,
//! bytes/s, and ETA, finalised with a newline. The core never depends on
//! `pbr` itself — this is the seam `efex_core::ProgressReporter` draws
//! between the protocol logic and the terminal.

use std::io::Stdout;

use efex_core::ProgressReporter;
use log::{LevelFilter, max_level};
use pbr::{ProgressBar, Units};

pub struct ProgressBarReporter {
    pb: Option<ProgressBar<Stdout>>,
}

impl ProgressReporter for ProgressBarReporter {
    fn start(&mut self, total_bytes: usize) {
        if let Some(pb) = self.pb.as_mut() {
            pb.total = total_bytes as u64;
            pb.set_units(Units::Bytes);
        }
    }

    fn advance(&mut self, bytes: usize) {
        if let Some(pb) = self.pb.as_mut() {
            pb.add(bytes as u64);
        }
    }

    fn finish(&mut self) {
        if let Some(pb) = self.pb.as_mut() {
            pb.finish();
        }
    }
}

impl ProgressBarReporter {
    pub fn new() -> Self {
        let should_log = max_level() >= LevelFilter::Info;

        if should_log {
            Self {
                pb: Some(ProgressBar::new(0)),
            }
        } else {
            Self { pb: None }
        }
    }
}
