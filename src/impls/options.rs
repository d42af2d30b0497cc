//! Simulation option API methods.
//!
//! This module contains methods for selecting units, the kinetic solver, the
//! transport/reaction coupling, tolerances and the simulation time cadences.

use tracing::warn;

use crate::msx_error::*;
use crate::types::{
    AreaUnits, Compiler, CouplingKind, FlowUnits, ObjectScope, ObjectType, RateUnits, SolverKind,
    TimeParameter,
};
use crate::MSX;

/// ## Simulation option APIs
impl MSX {
    pub fn set_area_units(&mut self, units: AreaUnits) -> Result<()> {
        self.sm.check_configurable()?;
        self.project.options.area_units = units;
        Ok(())
    }

    pub fn set_rate_units(&mut self, units: RateUnits) -> Result<()> {
        self.sm.check_configurable()?;
        self.project.options.rate_units = units;
        Ok(())
    }

    /// Selects the units hydraulic flows arrive in; lengths and volumes
    /// follow the same US/SI convention.
    pub fn set_flow_units(&mut self, units: FlowUnits) -> Result<()> {
        self.sm.check_configurable()?;
        self.project.options.flow_units = units;
        Ok(())
    }

    pub fn set_solver(&mut self, solver: SolverKind) -> Result<()> {
        self.sm.check_configurable()?;
        self.project.options.solver = solver;
        Ok(())
    }

    pub fn set_coupling(&mut self, coupling: CouplingKind) -> Result<()> {
        self.sm.check_configurable()?;
        self.project.options.coupling = coupling;
        Ok(())
    }

    /// Accepted for legacy compatibility; expressions are always interpreted.
    pub fn set_compiler(&mut self, compiler: Compiler) -> Result<()> {
        self.sm.check_configurable()?;
        if compiler != Compiler::None {
            warn!(?compiler, "compiled chemistry is not supported, option ignored");
        }
        self.project.options.compiler = compiler;
        Ok(())
    }

    /// Sets the quality time step, in seconds.
    pub fn set_timestep(&mut self, qstep: u64) -> Result<()> {
        self.set_time_parameter(TimeParameter::QualStep, qstep)
    }

    pub fn set_rtol(&mut self, rtol: f64) -> Result<()> {
        self.sm.check_configurable()?;
        if rtol < 0.0 {
            return Err(MsxError::InvalidObjectParams);
        }
        self.project.options.rtol = rtol;
        Ok(())
    }

    pub fn set_atol(&mut self, atol: f64) -> Result<()> {
        self.sm.check_configurable()?;
        if atol < 0.0 {
            return Err(MsxError::InvalidObjectParams);
        }
        self.project.options.atol = atol;
        Ok(())
    }

    /// Sets one of the simulation clocks or cadences, in seconds.
    pub fn set_time_parameter(&mut self, parameter: TimeParameter, seconds: u64) -> Result<()> {
        self.sm.check_configurable()?;
        let times = &mut self.project.times;
        match parameter {
            TimeParameter::Duration => times.dur = seconds,
            TimeParameter::QualStep => {
                if seconds == 0 {
                    return Err(MsxError::InvalidObjectParams);
                }
                times.qstep = seconds;
            }
            TimeParameter::ReportStep => times.rstep = seconds,
            TimeParameter::ReportStart => times.rstart = seconds,
            TimeParameter::PatternStep => {
                if seconds == 0 {
                    return Err(MsxError::InvalidObjectParams);
                }
                times.pstep = seconds;
            }
            TimeParameter::PatternStart => times.pstart = seconds,
        }
        Ok(())
    }

    pub fn get_time_parameter(&self, parameter: TimeParameter) -> u64 {
        let times = &self.project.times;
        match parameter {
            TimeParameter::Duration => times.dur,
            TimeParameter::QualStep => times.qstep,
            TimeParameter::ReportStep => times.rstep,
            TimeParameter::ReportStart => times.rstart,
            TimeParameter::PatternStep => times.pstep,
            TimeParameter::PatternStart => times.pstart,
        }
    }

    /// Marks a node or link for inclusion in the binary results stream.
    /// `precision` sets the decimal places recorded for every species
    /// reported at that object's scope.
    pub fn set_report(&mut self, scope: ObjectScope, id: &str, precision: i32) -> Result<()> {
        self.sm.check_configurable()?;
        match scope {
            ObjectScope::Node => {
                let j = self.project.require(ObjectType::Node, id)?;
                self.project.nodes[j].report = true;
            }
            ObjectScope::Link => {
                let k = self.project.require(ObjectType::Link, id)?;
                self.project.links[k].report = true;
            }
        }
        if precision > 0 {
            for species in self.project.species.iter_mut().skip(1) {
                species.precision = precision;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::impls::test_utils::fixtures::*;
    use crate::msx_error::MsxError;
    use crate::types::TimeParameter;
    use crate::MSX;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[rstest]
    fn time_parameters_round_trip(mut single_pipe: MSX) {
        for (i, parameter) in TimeParameter::iter().enumerate() {
            let value = 600 + 60 * i as u64;
            single_pipe.set_time_parameter(parameter, value).unwrap();
            assert_eq!(single_pipe.get_time_parameter(parameter), value);
        }
    }

    #[rstest]
    fn zero_quality_step_is_rejected(mut single_pipe: MSX) {
        assert_eq!(
            single_pipe
                .set_time_parameter(TimeParameter::QualStep, 0)
                .unwrap_err(),
            MsxError::InvalidObjectParams
        );
    }

    #[rstest]
    fn report_flags_stick(mut single_pipe: MSX) {
        single_pipe
            .set_report(crate::types::ObjectScope::Node, "B", 5)
            .unwrap();
        let b = single_pipe
            .get_index(crate::types::ObjectType::Node, "B")
            .unwrap();
        assert!(single_pipe.project.nodes[b].report);
        assert_eq!(single_pipe.project.species[1].precision, 5);
    }
}
