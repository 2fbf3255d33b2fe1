pub use std::{
    sync::{Arc, atomic::{AtomicBool, Ordering}},
    collections::HashMap,
    path::PathBuf,
    time::{Duration, Instant},
    thread,
};
pub use thiserror::Error;
pub use itertools::Itertools;
pub use indexmap::IndexMap;
pub use crossbeam::queue::SegQueue;
pub use clap::{Parser, ValueEnum};

pub use crate::{SpComponent, SpEdgeData, SpMultispawnComponent,
    nullable::Nullable,
};

/// Nodes of the full trace graph are addressed by index into an
/// append-only arena, never by pointer. Indices survive any growth
/// of the underlying storage, which is what makes the single-writer
/// sharing story boring (in the good sense).
pub type NodeId = usize;

/// One spawn/sync structure event of the barebone encoding. Two
/// bits: was this a spawn, and did it open a brand new join point
/// (as opposed to re-arming the one already at the top of the
/// region stack).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpEvent {
    pub spawn:    bool,
    pub new_sync: bool,
}

/// A togglable stdout printer. The writer path is latency-sensitive,
/// so all chatter goes through here and is compiled down to a single
/// branch when disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceLog {
    active: bool,
}

impl TraceLog {
    pub fn new(active: bool) -> Self {
        Self { active }
    }

    #[inline(always)]
    pub fn active(&self) -> bool {
        self.active
    }
}

/// Prints through a [`TraceLog`], skipping the formatting work
/// entirely when the log is quiet.
#[macro_export]
macro_rules! tracelog {
    ($log:expr, $($arg:tt)*) => {
        if $log.active() {
            println!($($arg)*);
        }
    };
}

/// Renders a byte count with thousands separators, for the DOT
/// labels and the driver summary.
pub fn format_with_commas(v: i64) -> String {
    let digits = v.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if v < 0 {
        out.push('-');
    }
    let lead = digits.len() % 3;
    for (idx, ch) in digits.chars().enumerate() {
        if idx != 0 && idx % 3 == lead % 3 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
