use crate::segment::SegList;
use crate::types::{MixingModel, SourceKind};

/// An external quality source attached to a node.
#[derive(Debug, Clone)]
pub struct Source {
    pub kind: SourceKind,
    /// Species index the source injects.
    pub species: usize,
    /// Baseline strength in the species' declared units.
    pub strength: f64,
    /// Time pattern index, 0 for none.
    pub pattern: usize,
}

/// A network node: a junction, or the connection point of a tank.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    /// Backing tank index, 0 for a plain junction.
    pub tank: usize,
    /// Initial concentrations, 1-based per species.
    pub c0: Vec<f64>,
    /// Current outflow concentrations, 1-based per species.
    pub c: Vec<f64>,
    pub sources: Vec<Source>,
    pub report: bool,
}

impl Node {
    pub fn new(id: &str) -> Node {
        Node {
            id: id.to_string(),
            tank: 0,
            c0: Vec::new(),
            c: Vec::new(),
            sources: Vec::new(),
            report: false,
        }
    }
}

/// A storage tank or reservoir behind a node.
#[derive(Debug, Clone)]
pub struct Tank {
    /// Backing node index.
    pub node: usize,
    /// Surface area factor; 0 marks a reservoir, which holds its initial
    /// quality forever.
    pub area: f64,
    /// Initial volume.
    pub v0: f64,
    /// Mixing-compartment volume used by the two-compartment model.
    pub v_mix: f64,
    pub mix_model: MixingModel,
    /// Current total volume.
    pub v: f64,
    /// Mixing-zone concentrations, 1-based per species.
    pub c: Vec<f64>,
    /// Per-tank parameter overrides, 1-based per parameter.
    pub param: Vec<f64>,
    /// Cumulative reacted mass, 1-based per species.
    pub reacted: Vec<f64>,
    /// Segment chain used by the MIX2, FIFO and LIFO models.
    pub segs: SegList,
}

impl Tank {
    pub fn new(node: usize, area: f64, v0: f64, mix_model: MixingModel, v_mix: f64) -> Tank {
        Tank {
            node,
            area,
            v0,
            v_mix,
            mix_model,
            v: v0,
            c: Vec::new(),
            param: Vec::new(),
            reacted: Vec::new(),
            segs: SegList::default(),
        }
    }

    pub fn is_reservoir(&self) -> bool {
        self.area == 0.0
    }
}
