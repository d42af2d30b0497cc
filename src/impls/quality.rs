//! Water Quality Simulation API methods.
//!
//! This module contains methods for opening, initializing, stepping, solving,
//! polling and closing the water quality simulation.

use std::path::Path;

use crate::msx_error::*;
use crate::quality::QualityEngine;
use crate::types::{ObjectScope, ObjectType, ProjectState};
use crate::MSX;

/// ## Water Quality Simulation APIs
impl MSX {
    /// Opens the quality solver: allocates the segment pool, integrator
    /// workspaces and node accumulators for the configured network.
    ///
    /// # Errors
    /// - [`MsxError::NotOpened`] when the project has not been initialized
    ///   with [`MSX::init`].
    /// - [`MsxError::AlreadyOpened`] when the solver is already open.
    pub fn open_q(&mut self) -> Result<()> {
        if self.sm.state == ProjectState::Closed {
            return Err(MsxError::NotOpened);
        }
        if self.sm.state != ProjectState::Open {
            return Err(MsxError::AlreadyOpened);
        }
        if !self.sm.init_done {
            return Err(MsxError::NotOpened);
        }
        self.engine = Some(QualityEngine::open(&self.project));
        self.sm.state = ProjectState::QualityOpen;
        Ok(())
    }

    /// Seeds segments from initial concentrations, zeroes reacted totals and
    /// rewinds every clock. May be called again to restart a run; the result
    /// is identical to the first initialization.
    pub fn init_q(&mut self) -> Result<()> {
        self.sm.check_at_least(ProjectState::QualityOpen)?;
        let engine = self.engine.as_mut().ok_or(MsxError::NotOpened)?;
        engine.init(&mut self.project);
        self.hydraulics.rewind();
        self.out.remove_scratch();
        self.sm.state = ProjectState::Initialized;
        Ok(())
    }

    /// Advances the simulation by one quality step.
    ///
    /// Returns the new quality time and the time remaining until the
    /// duration is reached; the run is over when the remainder is zero.
    ///
    /// # Errors
    /// - [`MsxError::NotOpened`] before [`MSX::init_q`].
    /// - [`MsxError::HydraulicsUnavailable`] when no hydraulics were supplied.
    /// - [`MsxError::IntegrationFailure`] / [`MsxError::EquilibriumFailure`]
    ///   on numeric non-convergence; the state up to the failed step stays
    ///   intact for inspection.
    pub fn step_q(&mut self) -> Result<(u64, u64)> {
        self.sm.check_at_least(ProjectState::Initialized)?;
        let engine = self.engine.as_mut().ok_or(MsxError::NotOpened)?;
        let result = engine.step(&mut self.project, &mut self.hydraulics, &mut self.out)?;
        self.sm.state = ProjectState::Stepping;
        Ok(result)
    }

    /// Runs the remaining quality steps to the duration and finalizes the
    /// results stream.
    pub fn solve_q(&mut self) -> Result<()> {
        loop {
            let (_, tleft) = self.step_q()?;
            if tleft == 0 {
                break;
            }
        }
        self.out.finalize()
    }

    /// Closes the quality solver, releasing segments and workspaces. The
    /// project remains configurable and the solver may be reopened.
    pub fn close_q(&mut self) -> Result<()> {
        if let Some(mut engine) = self.engine.take() {
            engine.close(&mut self.project);
        }
        if self.sm.state != ProjectState::Closed {
            self.sm.state = ProjectState::Open;
        }
        Ok(())
    }

    /// Concentration of one species at a node or link, by object index.
    pub fn get_quality_by_index(
        &self,
        scope: ObjectScope,
        index: usize,
        species: usize,
    ) -> Result<f64> {
        let engine = self.engine.as_ref().ok_or(MsxError::NotOpened)?;
        engine.quality(&self.project, scope, index, species)
    }

    /// Concentration of one species at a node or link, by ID.
    pub fn get_quality_by_id(&self, scope: ObjectScope, id: &str, species: &str) -> Result<f64> {
        let object_type = match scope {
            ObjectScope::Node => ObjectType::Node,
            ObjectScope::Link => ObjectType::Link,
        };
        let index = self.project.require(object_type, id)?;
        let m = self.project.require(ObjectType::Species, species)?;
        self.get_quality_by_index(scope, index, m)
    }

    /// Copies the finished binary results stream to `path`.
    pub fn save_out_file(&mut self, path: &Path) -> Result<()> {
        self.out.save_to(path)
    }
}

#[cfg(test)]
mod tests {
    use crate::impls::test_utils::fixtures::*;
    use crate::msx_error::MsxError;
    use crate::types::{ObjectScope, ProjectState};
    use crate::MSX;
    use rstest::rstest;

    #[rstest]
    fn lifecycle_order_is_enforced(mut single_pipe: MSX) {
        // stepping before anything is a lifecycle error
        assert_eq!(single_pipe.step_q().unwrap_err(), MsxError::NotOpened);
        assert_eq!(single_pipe.open_q().unwrap_err(), MsxError::NotOpened);

        single_pipe.init().unwrap();
        single_pipe.open_q().unwrap();
        assert_eq!(single_pipe.open_q().unwrap_err(), MsxError::AlreadyOpened);
        assert_eq!(single_pipe.step_q().unwrap_err(), MsxError::NotOpened);

        single_pipe.init_q().unwrap();
        assert_eq!(single_pipe.sm.state, ProjectState::Initialized);
    }

    #[rstest]
    fn configuration_is_rejected_while_stepping(mut flowing_pipe: MSX) {
        flowing_pipe.step_q().unwrap();
        assert_eq!(
            flowing_pipe.add_node("LATE").unwrap_err(),
            MsxError::AlreadyOpened
        );
        assert_eq!(
            flowing_pipe.set_rtol(0.1).unwrap_err(),
            MsxError::AlreadyOpened
        );
    }

    #[rstest]
    fn step_walks_the_clock_to_the_duration(mut flowing_pipe: MSX) {
        let mut t = 0;
        let mut tleft;
        loop {
            let result = flowing_pipe.step_q().unwrap();
            assert!(result.0 > t || result.1 == 0);
            t = result.0;
            tleft = result.1;
            if tleft == 0 {
                break;
            }
        }
        assert_eq!(t, flowing_pipe.get_time_parameter(crate::types::TimeParameter::Duration));
        // stepping past the end stays terminal
        let (t_again, tleft_again) = flowing_pipe.step_q().unwrap();
        assert_eq!((t_again, tleft_again), (t, 0));
    }

    #[rstest]
    fn reinit_restores_the_initial_state(mut flowing_pipe: MSX) {
        let c0 = flowing_pipe
            .get_quality_by_id(ObjectScope::Node, "B", "CL2")
            .unwrap();
        flowing_pipe.solve_q().unwrap();
        let c_end = flowing_pipe
            .get_quality_by_id(ObjectScope::Node, "B", "CL2")
            .unwrap();
        assert!(c_end > c0);

        flowing_pipe.init_q().unwrap();
        let c_reset = flowing_pipe
            .get_quality_by_id(ObjectScope::Node, "B", "CL2")
            .unwrap();
        assert!(approx_eq(c_reset, c0, 0.0));
    }

    #[rstest]
    fn segment_volumes_stay_consistent_through_a_run(mut flowing_pipe: MSX) {
        loop {
            let (_, tleft) = flowing_pipe.step_q().unwrap();
            let engine = flowing_pipe.engine.as_ref().unwrap();
            assert!(engine.segment_volumes_consistent(&flowing_pipe.project));
            if tleft == 0 {
                break;
            }
        }
    }

    #[rstest]
    fn close_q_allows_reconfiguration(mut flowing_pipe: MSX) {
        flowing_pipe.step_q().unwrap();
        flowing_pipe.close_q().unwrap();
        flowing_pipe.add_node("NEW").unwrap();
    }
}
