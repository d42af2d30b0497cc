//! Hydraulic supply API methods.
//!
//! This module contains methods for injecting hydraulic state directly or
//! attaching a solver's binary trace file.

use std::path::Path;

use crate::hydraulics::{HydRecord, Hydraulics};
use crate::msx_error::*;
use crate::types::ProjectState;
use crate::MSX;

/// ## Hydraulic supply APIs
impl MSX {
    /// Injects demands, heads and flows for the period beginning now.
    ///
    /// Arrays are in declaration order (`demands`/`heads` per node, `flows`
    /// per link, user flow units) and stay in effect until replaced. May be
    /// called between steps to follow an external hydraulic solver.
    pub fn set_hydraulics(&mut self, demands: &[f64], heads: &[f64], flows: &[f64]) -> Result<()> {
        if self.sm.state == ProjectState::Closed {
            return Err(MsxError::NotOpened);
        }
        let n_nodes = self.project.nodes.len() - 1;
        let n_links = self.project.links.len() - 1;
        if demands.len() != n_nodes || heads.len() != n_nodes || flows.len() != n_links {
            return Err(MsxError::InvalidObjectParams);
        }
        // derive the factor from the options directly so an injection before
        // init still lands in internal units
        let ucf = crate::project::Units::compute(&self.project.options).flow;
        let widen = |values: &[f64], scale: f64| -> Vec<f64> {
            std::iter::once(0.0)
                .chain(values.iter().map(|v| v * scale))
                .collect()
        };
        let record = HydRecord {
            time: self.project.times.qtime,
            demands: widen(demands, ucf),
            heads: widen(heads, 1.0),
            flows: widen(flows, ucf),
        };
        self.hydraulics = Hydraulics::Injected(record);
        // flows changed: the engine must re-derive residence times and order
        if let Some(engine) = self.engine.as_mut() {
            engine.invalidate_hydraulics();
        }
        Ok(())
    }

    /// Attaches a hydraulic trace file covering the declared duration.
    pub fn use_hyd_file(&mut self, path: &Path) -> Result<()> {
        if self.sm.state == ProjectState::Closed {
            return Err(MsxError::NotOpened);
        }
        let flow_ucf = crate::project::Units::compute(&self.project.options).flow;
        let hydraulics = Hydraulics::read_trace(
            path,
            self.project.nodes.len() - 1,
            self.project.links.len() - 1,
            self.project.times.dur,
            flow_ucf,
        )?;
        self.hydraulics = hydraulics;
        if let Some(engine) = self.engine.as_mut() {
            engine.invalidate_hydraulics();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::impls::test_utils::fixtures::*;
    use crate::msx_error::MsxError;
    use crate::MSX;
    use rstest::rstest;

    #[rstest]
    fn array_lengths_are_validated(mut single_pipe: MSX) {
        assert_eq!(
            single_pipe
                .set_hydraulics(&[0.0], &[0.0, 0.0], &[1.0])
                .unwrap_err(),
            MsxError::InvalidObjectParams
        );
        single_pipe
            .set_hydraulics(&[-0.05, 0.05], &[100.0, 90.0], &[0.05])
            .unwrap();
    }

    #[rstest]
    fn stepping_without_hydraulics_fails(mut single_pipe: MSX) {
        single_pipe
            .set_time_parameter(crate::types::TimeParameter::Duration, 3600)
            .unwrap();
        single_pipe.init().unwrap();
        single_pipe.open_q().unwrap();
        single_pipe.init_q().unwrap();
        assert_eq!(single_pipe.step_q().unwrap_err(), MsxError::HydraulicsUnavailable);
    }
}
