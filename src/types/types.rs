use num_derive::FromPrimitive;
#[cfg(test)]
use strum_macros::EnumIter;

/// Default absolute concentration tolerance.
pub const DEFAULT_ATOL: f64 = 0.01;
/// Default relative concentration tolerance.
pub const DEFAULT_RTOL: f64 = 0.001;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive)]
#[cfg_attr(test, derive(EnumIter))]
#[repr(i32)]
pub enum ObjectType {
    Node = 0,      // Network junctions and tank nodes
    Link = 1,      // Pipes
    Tank = 2,      // Storage tanks and reservoirs
    Species = 3,   // Chemical species
    Term = 4,      // Named intermediate expression terms
    Parameter = 5, // Reaction parameters with per-pipe/per-tank overrides
    Constant = 6,  // Reaction constants
    Pattern = 7,   // Time patterns
}

/// Number of distinct object families kept in the name registry.
pub const MAX_OBJECTS: usize = 8;

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[cfg_attr(test, derive(EnumIter))]
#[repr(i32)]
pub enum SpeciesKind {
    Bulk = 0, // Dissolved in the water volume
    Wall = 1, // Attached to the pipe wall
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[cfg_attr(test, derive(EnumIter))]
#[repr(i32)]
pub enum SourceKind {
    NoSource = -1, // Placeholder for an inactive source
    Concen = 0,    // Sets the concentration of external inflow entering a node
    Mass = 1,      // Injects a given mass rate into a node
    Setpoint = 2,  // Sets the concentration leaving a node to at least a given value
    FlowPaced = 3, // Adds a given value to the concentration leaving a node
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[cfg_attr(test, derive(EnumIter))]
#[repr(i32)]
pub enum MixingModel {
    Mix1 = 0, // Complete mix model
    Mix2 = 1, // 2-compartment model
    Fifo = 2, // First in, first out model
    Lifo = 3, // Last in, first out model
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[cfg_attr(test, derive(EnumIter))]
#[repr(i32)]
pub enum SolverKind {
    Euler = 0, // Explicit forward Euler
    Rk5 = 1,   // Adaptive Runge-Kutta-Fehlberg 4/5
    Ros2 = 2,  // Two-stage Rosenbrock for stiff systems
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[cfg_attr(test, derive(EnumIter))]
#[repr(i32)]
pub enum CouplingKind {
    None = 0, // Transport first, then reaction over the full sub-step
    Full = 1, // Reaction error feeds back into the sub-step size
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
#[cfg_attr(test, derive(EnumIter))]
#[repr(i32)]
pub enum ObjectScope {
    Node = 0, // Applies to a node
    Link = 1, // Applies to a link
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
#[repr(i32)]
pub enum ExprClass {
    Pipe = 0, // Reaction occurring within pipes
    Tank = 1, // Reaction occurring within tanks
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
#[repr(i32)]
pub enum ExprKind {
    Rate = 0,    // dC/dt = f(...)
    Formula = 1, // C = f(...)
    Equil = 2,   // 0 = f(...)
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[cfg_attr(test, derive(EnumIter))]
#[repr(i32)]
pub enum FlowUnits {
    Cfs = 0,  // Cubic feet per second
    Gpm = 1,  // Gallons per minute
    Mgd = 2,  // Million gallons per day
    Imgd = 3, // Imperial million gallons per day
    Afd = 4,  // Acre-feet per day
    Lps = 5,  // Liters per second
    Lpm = 6,  // Liters per minute
    Mld = 7,  // Million liters per day
    Cmh = 8,  // Cubic meters per hour
    Cmd = 9,  // Cubic meters per day
    Cms = 10, // Cubic meters per second
}

impl FlowUnits {
    /// Whether lengths arrive in feet/inches rather than meters/millimeters.
    pub fn is_us(&self) -> bool {
        matches!(
            self,
            FlowUnits::Cfs | FlowUnits::Gpm | FlowUnits::Mgd | FlowUnits::Imgd | FlowUnits::Afd
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[cfg_attr(test, derive(EnumIter))]
#[repr(i32)]
pub enum AreaUnits {
    Ft2 = 0, // Square feet
    M2 = 1,  // Square meters
    Cm2 = 2, // Square centimeters
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[cfg_attr(test, derive(EnumIter))]
#[repr(i32)]
pub enum RateUnits {
    Seconds = 0, // Reaction rates per second
    Minutes = 1, // Reaction rates per minute
    Hours = 2,   // Reaction rates per hour
    Days = 3,    // Reaction rates per day
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[cfg_attr(test, derive(EnumIter))]
#[repr(i32)]
pub enum Compiler {
    None = 0, // Interpret expression trees directly
    Vc = 1,   // Legacy compiled-chemistry flag, accepted but inert
    Gc = 2,   // Legacy compiled-chemistry flag, accepted but inert
}

#[derive(Debug, Copy, Clone, PartialEq, FromPrimitive)]
#[cfg_attr(test, derive(EnumIter))]
#[repr(i32)]
pub enum TimeParameter {
    Duration = 0,     // Total simulation duration
    QualStep = 1,     // Water quality time step
    ReportStep = 2,   // Reporting time step
    ReportStart = 3,  // Time when reporting starts
    PatternStep = 4,  // Time pattern period
    PatternStart = 5, // Time when time patterns begin
}

/// Lifecycle states of an MSX project, ordered by progression.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProjectState {
    Open,
    QualityOpen,
    Initialized,
    Stepping,
    Closed,
}
