//! Translation configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a translation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Use the partitioned parallel decomposer and chunked lattice assembly.
    pub multithreading: bool,

    /// Maximum number of worker threads.
    /// None means use the available parallelism of the machine.
    pub max_threads: Option<usize>,

    /// Slack allowed when deciding that one piece dominates another.
    pub lattice_tolerance: f64,

    /// Slack allowed by the LP oracle for feasibility and sign decisions.
    pub feasibility_tolerance: f64,

    /// Refuse to assemble the join formula unless lattice covering holds.
    pub check_lattice: bool,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            multithreading: true,
            max_threads: None,
            lattice_tolerance: 1e-5,
            feasibility_tolerance: 1e-9,
            check_lattice: true,
        }
    }
}

impl TranslationConfig {
    /// Single-threaded configuration with default tolerances.
    pub fn sequential() -> Self {
        Self {
            multithreading: false,
            ..Self::default()
        }
    }

    pub fn with_multithreading(mut self, multithreading: bool) -> Self {
        self.multithreading = multithreading;
        self
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = Some(max_threads.max(1));
        self
    }

    pub fn with_lattice_tolerance(mut self, tolerance: f64) -> Self {
        self.lattice_tolerance = tolerance;
        self
    }

    pub fn with_feasibility_tolerance(mut self, tolerance: f64) -> Self {
        self.feasibility_tolerance = tolerance;
        self
    }

    pub fn with_lattice_check(mut self, check: bool) -> Self {
        self.check_lattice = check;
        self
    }

    /// Worker budget: the configured maximum, else the available parallelism.
    pub fn thread_budget(&self) -> usize {
        if !self.multithreading {
            return 1;
        }
        self.max_threads
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }
}
