//! rheo_buffers — throughput-constrained elastic-buffer placement.
//!
//! Formulates buffer placement over a [`rheo_netlist::Netlist`] as a MILP
//! (timing, elasticity, and per-region throughput constraints), solves it
//! through a [`rheo_solver::MilpBackend`], and materializes the chosen
//! buffers back into the netlist.

#![warn(missing_docs)]

mod formulate;
mod place;

use rheo_common::InternalError;
use rheo_milp::{MilpError, Status};
use rheo_netlist::NetlistError;
use rheo_solver::SolverError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use formulate::{formulate, ChannelVars, Formulation, PlacementGoal};
pub use place::{instantiate_buffers, place_buffers, PlacementReport, RegionThroughput};

/// Parameters of a buffer-placement run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlacementConfig {
    /// Target clock period; no combinational path may exceed it.
    pub period: f64,
    /// Combinational delay a transparent buffer adds to a channel.
    pub buffer_delay: f64,
    /// Maximize region throughput first, then minimize buffering subject to
    /// the achieved throughput. When false, only timing and elasticity bind
    /// and buffering is minimized outright.
    pub max_throughput: bool,
    /// Fraction of the region weight throughput constraints must cover
    /// (only meaningful with `max_throughput`).
    pub coverage: f64,
    /// Wall-clock budget handed to the solver, per solve.
    pub time_limit: Option<Duration>,
    /// Tie-break weight of total slots against buffer count in the objective.
    pub slot_weight: f64,
}

impl PlacementConfig {
    /// A configuration with the given clock period and conventional defaults.
    pub fn new(period: f64) -> Self {
        Self {
            period,
            buffer_delay: 0.0,
            max_throughput: false,
            coverage: 1.0,
            time_limit: None,
            slot_weight: 1e-5,
        }
    }
}

/// Errors produced by formulation or placement.
#[derive(Debug, Error)]
pub enum PlaceError {
    /// A single block's combinational delay already exceeds the period; no
    /// buffering can fix it.
    #[error("block `{block}` needs {needed} ns but the period is {period} ns")]
    PeriodUnsatisfiable {
        /// The offending block.
        block: String,
        /// Its unavoidable delay, including the buffer delay.
        needed: f64,
        /// The requested period.
        period: f64,
    },

    /// The solver proved there is no feasible placement (or failed to find
    /// one); no values were read.
    #[error("no feasible buffer placement (solver reported {0:?})")]
    Infeasible(Status),

    /// A netlist mutation failed while applying the solution.
    #[error(transparent)]
    Netlist(#[from] NetlistError),

    /// Model construction or value readback failed.
    #[error(transparent)]
    Milp(#[from] MilpError),

    /// The external solver failed.
    #[error(transparent)]
    Solver(#[from] SolverError),

    /// A bookkeeping invariant was violated.
    #[error(transparent)]
    Internal(#[from] InternalError),
}
