//! In-memory project model.
//!
//! The project owns every network and chemistry object, the per-project name
//! registry, simulation options and clocks, and the unit conversions computed
//! once at initialization. All object indices are 1-based; slot 0 of every
//! vector is a reserved placeholder.

use std::collections::HashMap;

use crate::msx_error::{MsxError, Result};
use crate::types::{
    AreaUnits, Compiler, Constant, CouplingKind, FlowUnits, Link, MixingModel, Node, ObjectType,
    Parameter, Pattern, ProjectState, RateUnits, SolverKind, Species, Tank, Term, DEFAULT_ATOL,
    DEFAULT_RTOL,
};

/// Feet per meter.
const M2FT: f64 = 3.28084;
/// Liters per cubic foot. Every liter-based flow factor derives from this so
/// mass-rate dilution cancels it exactly.
pub const LPERFT3: f64 = 28.3168466;
/// Kinematic viscosity of water at 20 degC, ft^2/s.
pub const VISCOSITY: f64 = 1.1e-5;

/// One incident link at a node.
#[derive(Debug, Clone, Copy)]
pub struct AdjEntry {
    pub node: usize,
    pub link: usize,
}

/// Simulation options settable through the API.
#[derive(Debug, Clone)]
pub struct Options {
    pub area_units: AreaUnits,
    pub rate_units: RateUnits,
    pub flow_units: FlowUnits,
    pub solver: SolverKind,
    pub coupling: CouplingKind,
    pub compiler: Compiler,
    /// Default relative tolerance applied to species created afterwards.
    pub rtol: f64,
    /// Default absolute tolerance applied to species created afterwards.
    pub atol: f64,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            area_units: AreaUnits::Ft2,
            rate_units: RateUnits::Hours,
            flow_units: FlowUnits::Cfs,
            solver: SolverKind::Euler,
            coupling: CouplingKind::None,
            compiler: Compiler::None,
            rtol: DEFAULT_RTOL,
            atol: DEFAULT_ATOL,
        }
    }
}

/// Simulation clocks and cadences, all in seconds.
#[derive(Debug, Clone)]
pub struct Times {
    pub dur: u64,
    pub qstep: u64,
    pub rstep: u64,
    pub rstart: u64,
    pub pstep: u64,
    pub pstart: u64,
    /// Quality clock.
    pub qtime: u64,
    /// Hydraulic clock: start of the hydraulic period currently in effect.
    pub htime: u64,
    /// Next reporting instant.
    pub rtime: u64,
}

impl Default for Times {
    fn default() -> Times {
        Times {
            dur: 0,
            qstep: 300,
            rstep: 3600,
            rstart: 0,
            pstep: 3600,
            pstart: 0,
            qtime: 0,
            htime: 0,
            rtime: 0,
        }
    }
}

/// Conversion factors from user units into internal units (feet, cfs,
/// seconds), fixed at initialization.
#[derive(Debug, Clone)]
pub struct Units {
    /// Multiply a user length to get feet.
    pub length: f64,
    /// Multiply a user diameter to get feet.
    pub diam: f64,
    /// Multiply a user volume to get cubic feet.
    pub volume: f64,
    /// Multiply a user flow to get cfs.
    pub flow: f64,
    /// Multiply internal pipe area density (1/ft) to get the declared
    /// wall-area units.
    pub area: f64,
    /// Seconds per rate unit.
    pub rate_sec: f64,
}

impl Default for Units {
    fn default() -> Units {
        Units {
            length: 1.0,
            diam: 1.0,
            volume: 1.0,
            flow: 1.0,
            area: 1.0,
            rate_sec: 3600.0,
        }
    }
}

impl Units {
    pub fn compute(options: &Options) -> Units {
        let flow = match options.flow_units {
            FlowUnits::Cfs => 1.0,
            FlowUnits::Gpm => 1.0 / 448.831,
            FlowUnits::Mgd => 1.5472,
            FlowUnits::Imgd => 1.8581,
            FlowUnits::Afd => 43560.0 / 86400.0,
            FlowUnits::Lps => 1.0 / LPERFT3,
            FlowUnits::Lpm => 1.0 / (LPERFT3 * 60.0),
            FlowUnits::Mld => 1.0e6 / (LPERFT3 * 86400.0),
            FlowUnits::Cmh => 1000.0 / (LPERFT3 * 3600.0),
            FlowUnits::Cmd => 1000.0 / (LPERFT3 * 86400.0),
            FlowUnits::Cms => 1000.0 / LPERFT3,
        };
        let (length, diam, volume) = if options.flow_units.is_us() {
            // lengths in feet, diameters in inches, volumes in cubic feet
            (1.0, 1.0 / 12.0, 1.0)
        } else {
            // lengths in meters, diameters in millimeters, volumes in cubic meters
            (M2FT, M2FT / 1000.0, M2FT.powi(3))
        };
        let area = match options.area_units {
            AreaUnits::Ft2 => 1.0,
            AreaUnits::M2 => 1.0 / (M2FT * M2FT),
            AreaUnits::Cm2 => 1.0e4 / (M2FT * M2FT),
        };
        let rate_sec = match options.rate_units {
            RateUnits::Seconds => 1.0,
            RateUnits::Minutes => 60.0,
            RateUnits::Hours => 3600.0,
            RateUnits::Days => 86400.0,
        };
        Units {
            length,
            diam,
            volume,
            flow,
            area,
            rate_sec,
        }
    }
}

/// The complete in-memory project.
#[derive(Debug, Default)]
pub struct Project {
    pub title: String,
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
    pub tanks: Vec<Tank>,
    pub species: Vec<Species>,
    pub terms: Vec<Term>,
    pub params: Vec<Parameter>,
    pub consts: Vec<Constant>,
    pub patterns: Vec<Pattern>,
    /// Incident links per node, rebuilt at initialization.
    pub adj: Vec<Vec<AdjEntry>>,
    registry: HashMap<(ObjectType, String), usize>,
    pub options: Options,
    pub times: Times,
    pub units: Units,
    /// Factors currently applied to the stored quantities, reverted before a
    /// re-initialization applies fresh ones.
    applied_units: Option<Units>,
}

impl Project {
    pub fn new() -> Project {
        let mut project = Project::default();
        // slot 0 of every object family is reserved
        project.nodes.push(Node::new(""));
        project.links.push(Link::new("", 0, 0, 0.0, 0.0, 0.0));
        project
            .tanks
            .push(Tank::new(0, 0.0, 0.0, MixingModel::Mix1, 0.0));
        project
            .species
            .push(Species::new("", crate::types::SpeciesKind::Bulk, "", 0.0, 0.0));
        project.terms.push(Term {
            id: String::new(),
            equation: String::new(),
            expr: None,
        });
        project.params.push(Parameter {
            id: String::new(),
            value: 0.0,
        });
        project.consts.push(Constant {
            id: String::new(),
            value: 0.0,
        });
        project.patterns.push(Pattern::new(""));
        project
    }

    pub fn count(&self, object_type: ObjectType) -> usize {
        match object_type {
            ObjectType::Node => self.nodes.len() - 1,
            ObjectType::Link => self.links.len() - 1,
            ObjectType::Tank => self.tanks.len() - 1,
            ObjectType::Species => self.species.len() - 1,
            ObjectType::Term => self.terms.len() - 1,
            ObjectType::Parameter => self.params.len() - 1,
            ObjectType::Constant => self.consts.len() - 1,
            ObjectType::Pattern => self.patterns.len() - 1,
        }
    }

    /// Registers an object ID, rejecting duplicates within its family.
    pub fn register(&mut self, object_type: ObjectType, id: &str, index: usize) -> Result<()> {
        if id.is_empty() || id.contains(char::is_whitespace) {
            return Err(MsxError::Name(id.to_string()));
        }
        let key = (object_type, id.to_string());
        if self.registry.contains_key(&key) {
            return Err(MsxError::DuplicateId(id.to_string()));
        }
        self.registry.insert(key, index);
        Ok(())
    }

    pub fn find(&self, object_type: ObjectType, id: &str) -> Option<usize> {
        self.registry.get(&(object_type, id.to_string())).copied()
    }

    pub fn require(&self, object_type: ObjectType, id: &str) -> Result<usize> {
        self.find(object_type, id)
            .ok_or_else(|| MsxError::UndefinedObjectId)
    }

    pub fn n_species(&self) -> usize {
        self.species.len() - 1
    }

    /// Maps a name used in a reaction expression to its variable code.
    ///
    /// Codes are laid out in declaration-family blocks: species first, then
    /// terms, parameters and constants, then the reserved hydraulic names and
    /// simulation time.
    pub fn variable_code(&self, name: &str) -> Option<i32> {
        if let Some(m) = self.find(ObjectType::Species, name) {
            return Some(m as i32);
        }
        let ns = self.n_species() as i32;
        if let Some(i) = self.find(ObjectType::Term, name) {
            return Some(ns + i as i32);
        }
        let nt = (self.terms.len() - 1) as i32;
        if let Some(i) = self.find(ObjectType::Parameter, name) {
            return Some(ns + nt + i as i32);
        }
        let np = (self.params.len() - 1) as i32;
        if let Some(i) = self.find(ObjectType::Constant, name) {
            return Some(ns + nt + np + i as i32);
        }
        let nc = (self.consts.len() - 1) as i32;
        let hyd = match name {
            "Q" => 1,
            "L" => 2,
            "D" => 3,
            "Re" => 4,
            "Us" => 5,
            "Ff" => 6,
            "Av" => 7,
            "t" => 8,
            _ => return None,
        };
        Some(ns + nt + np + nc + hyd)
    }

    /// First code of the reserved hydraulic-variable block.
    pub fn hyd_var_base(&self) -> i32 {
        (self.n_species() + (self.terms.len() - 1) + (self.params.len() - 1)
            + (self.consts.len() - 1)) as i32
    }

    /// Extends every link's and tank's parameter-override vector to the
    /// current parameter count, filling fresh slots with the defaults.
    pub fn sync_param_defaults(&mut self) {
        let defaults: Vec<f64> = self.params.iter().map(|p| p.value).collect();
        for link in self.links.iter_mut().skip(1) {
            for i in link.param.len()..defaults.len() {
                link.param.push(defaults[i]);
            }
        }
        for tank in self.tanks.iter_mut().skip(1) {
            for i in tank.param.len()..defaults.len() {
                tank.param.push(defaults[i]);
            }
        }
    }

    /// Builds the nodal adjacency list from the link set.
    pub fn build_adjacency(&mut self) {
        self.adj = vec![Vec::new(); self.nodes.len()];
        for (k, link) in self.links.iter().enumerate().skip(1) {
            self.adj[link.n1].push(AdjEntry {
                node: link.n2,
                link: k,
            });
            self.adj[link.n2].push(AdjEntry {
                node: link.n1,
                link: k,
            });
        }
    }

    /// Converts every stored quantity into internal units. A second
    /// initialization reverts the previous factors first, so lengths and
    /// volumes are never scaled twice.
    pub fn convert_units(&mut self) {
        if let Some(old) = self.applied_units.take() {
            for link in self.links.iter_mut().skip(1) {
                link.len /= old.length;
                link.diam /= old.diam;
            }
            for tank in self.tanks.iter_mut().skip(1) {
                tank.v0 /= old.volume;
                tank.v_mix /= old.volume;
            }
        }
        self.units = Units::compute(&self.options);
        for link in self.links.iter_mut().skip(1) {
            link.len *= self.units.length;
            link.diam *= self.units.diam;
        }
        for tank in self.tanks.iter_mut().skip(1) {
            tank.v0 *= self.units.volume;
            tank.v_mix *= self.units.volume;
            tank.v = tank.v0;
        }
        self.applied_units = Some(self.units.clone());
    }

    /// Checks the structural invariants the simulation relies on.
    pub fn validate(&self) -> Result<()> {
        for link in self.links.iter().skip(1) {
            if link.n1 == 0
                || link.n2 == 0
                || link.n1 >= self.nodes.len()
                || link.n2 >= self.nodes.len()
            {
                return Err(MsxError::InvalidObjectIndex);
            }
            if link.len <= 0.0 || link.diam <= 0.0 {
                return Err(MsxError::InvalidObjectParams);
            }
        }
        for tank in self.tanks.iter().skip(1) {
            if tank.node == 0 || tank.node >= self.nodes.len() {
                return Err(MsxError::InvalidObjectIndex);
            }
            if tank.v0 < 0.0 || tank.v_mix < 0.0 {
                return Err(MsxError::InvalidObjectParams);
            }
            if tank.mix_model == MixingModel::Mix2 && !tank.is_reservoir() && tank.v_mix <= 0.0 {
                return Err(MsxError::InvalidObjectParams);
            }
        }
        for species in self.species.iter().skip(1) {
            if species.atol < 0.0 || species.rtol < 0.0 {
                return Err(MsxError::InvalidObjectParams);
            }
        }
        Ok(())
    }

    /// Compiles every term and reaction expression against the registry.
    pub fn compile_expressions(&mut self) -> Result<()> {
        // Terms first, then species expressions; both bind through the same
        // name resolver.
        let snapshot = self.clone_registry_view();
        for i in 1..self.terms.len() {
            let equation = self.terms[i].equation.clone();
            let expr = crate::mathexpr::MathExpr::parse(&equation, &|name| snapshot.code(name))?;
            self.terms[i].expr = Some(expr);
        }
        for m in 1..self.species.len() {
            if let Some(rx) = self.species[m].pipe_rx.as_mut() {
                let expr =
                    crate::mathexpr::MathExpr::parse(&rx.equation, &|name| snapshot.code(name))?;
                rx.expr = Some(expr);
            }
            if let crate::types::TankReaction::Own(rx) = &mut self.species[m].tank_rx {
                let expr =
                    crate::mathexpr::MathExpr::parse(&rx.equation, &|name| snapshot.code(name))?;
                rx.expr = Some(expr);
            }
        }
        Ok(())
    }

    fn clone_registry_view(&self) -> RegistryView {
        let mut codes = HashMap::new();
        for ((object_type, id), _) in self.registry.iter() {
            if matches!(
                object_type,
                ObjectType::Species
                    | ObjectType::Term
                    | ObjectType::Parameter
                    | ObjectType::Constant
            ) {
                if let Some(code) = self.variable_code(id) {
                    codes.insert(id.clone(), code);
                }
            }
        }
        for name in ["Q", "L", "D", "Re", "Us", "Ff", "Av", "t"] {
            if let Some(code) = self.variable_code(name) {
                codes.entry(name.to_string()).or_insert(code);
            }
        }
        RegistryView { codes }
    }
}

/// A frozen name-to-code view used while compiling expressions, so the
/// borrow on the project's object vectors stays free.
struct RegistryView {
    codes: HashMap<String, i32>,
}

impl RegistryView {
    fn code(&self, name: &str) -> Option<i32> {
        self.codes.get(name).copied()
    }
}

/// Tracks where the project is in its lifecycle and polices transitions.
///
/// `finishInit` does not change the lifecycle state; it flips `init_done`,
/// which the quality solver requires before opening. Structural additions
/// clear the flag so a stale initialization cannot be stepped.
#[derive(Debug)]
pub struct StateMachine {
    pub state: ProjectState,
    pub init_done: bool,
}

impl StateMachine {
    pub fn new() -> StateMachine {
        StateMachine {
            state: ProjectState::Open,
            init_done: false,
        }
    }

    /// Topology and chemistry objects may only be added while fully open.
    pub fn check_structural(&mut self) -> Result<()> {
        match self.state {
            ProjectState::Open => {
                self.init_done = false;
                Ok(())
            }
            ProjectState::Closed => Err(MsxError::NotOpened),
            _ => Err(MsxError::AlreadyOpened),
        }
    }

    /// Value configuration is admitted until the quality run is initialized.
    pub fn check_configurable(&self) -> Result<()> {
        match self.state {
            ProjectState::Open | ProjectState::QualityOpen => Ok(()),
            ProjectState::Closed => Err(MsxError::NotOpened),
            _ => Err(MsxError::AlreadyOpened),
        }
    }

    pub fn check_at_least(&self, state: ProjectState) -> Result<()> {
        if self.state == ProjectState::Closed {
            return Err(MsxError::NotOpened);
        }
        if self.state >= state {
            Ok(())
        } else {
            Err(MsxError::NotOpened)
        }
    }
}

impl Default for StateMachine {
    fn default() -> StateMachine {
        StateMachine::new()
    }
}
