use crate::segment::SegList;

/// A pipe connecting two nodes.
///
/// Flow is signed: positive means from `n1` toward `n2`. The segment chain is
/// kept oriented along the current flow direction and is reversed when the
/// sign flips.
#[derive(Debug, Clone)]
pub struct Link {
    pub id: String,
    pub n1: usize,
    pub n2: usize,
    /// Length in internal units (feet).
    pub len: f64,
    /// Diameter in internal units (feet).
    pub diam: f64,
    pub roughness: f64,
    /// Initial concentrations, 1-based per species.
    pub c0: Vec<f64>,
    /// Per-pipe parameter overrides, 1-based per parameter.
    pub param: Vec<f64>,
    /// Cumulative reacted mass, 1-based per species.
    pub reacted: Vec<f64>,
    /// Current flow in internal units (cfs), signed.
    pub flow: f64,
    pub report: bool,
    pub segs: SegList,
    /// Sign of the flow the segment chain is currently oriented for.
    pub flow_reversed: bool,
}

impl Link {
    pub fn new(id: &str, n1: usize, n2: usize, len: f64, diam: f64, roughness: f64) -> Link {
        Link {
            id: id.to_string(),
            n1,
            n2,
            len,
            diam,
            roughness,
            c0: Vec::new(),
            param: Vec::new(),
            reacted: Vec::new(),
            flow: 0.0,
            report: false,
            segs: SegList::default(),
            flow_reversed: false,
        }
    }

    /// Volume of the segment phase: the full pipe volume.
    pub fn volume(&self) -> f64 {
        std::f64::consts::PI * (self.diam / 2.0).powi(2) * self.len
    }

    /// Upstream node for the current flow direction.
    pub fn up_node(&self) -> usize {
        if self.flow >= 0.0 {
            self.n1
        } else {
            self.n2
        }
    }

    /// Downstream node for the current flow direction.
    pub fn down_node(&self) -> usize {
        if self.flow >= 0.0 {
            self.n2
        } else {
            self.n1
        }
    }
}
