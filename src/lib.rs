//! Multi-species water quality engine for EPANET-style pipe networks.
//!
//! Given a hydraulic trace and a user-authored reaction system, the engine
//! computes the concentrations of any number of interacting chemical species
//! at every node and along every pipe over a simulated period. Hydraulics are
//! supplied, never solved: inject them with [`MSX::set_hydraulics`] or read a
//! solver's trace file with [`MSX::use_hyd_file`].

pub mod chemistry;
pub mod hydraulics;
pub mod mathexpr;
pub mod msx_error;
pub mod output;
pub mod project;
pub mod quality;
pub mod segment;
pub mod solvers;
pub mod tank;
pub mod types;

mod impls;

pub use msx_error::{MsxError, Result};

use hydraulics::Hydraulics;
use output::OutWriter;
use project::{Project, StateMachine};
use quality::QualityEngine;

/// An MSX project: the network, its chemistry, and the running simulation.
pub struct MSX {
    pub(crate) project: Project,
    pub(crate) sm: StateMachine,
    pub(crate) hydraulics: Hydraulics,
    pub(crate) engine: Option<QualityEngine>,
    pub(crate) out: OutWriter,
}

impl MSX {
    /// Creates an empty open project ready for configuration.
    pub fn new() -> MSX {
        MSX {
            project: Project::new(),
            sm: StateMachine::new(),
            hydraulics: Hydraulics::default(),
            engine: None,
            out: OutWriter::new(),
        }
    }
}

impl Default for MSX {
    fn default() -> MSX {
        MSX::new()
    }
}

impl Drop for MSX {
    fn drop(&mut self) {
        self.close().ok();
    }
}
