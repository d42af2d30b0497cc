//! Network topology API methods.
//!
//! This module contains methods for adding nodes, tanks, reservoirs and
//! links while the project is open.

use crate::msx_error::*;
use crate::types::{Link, MixingModel, Node, ObjectType, Tank};
use crate::MSX;

/// ## Network construction APIs
impl MSX {
    /// Add a junction node to the project with a given name.
    /// Returns the index of the node or an error.
    pub fn add_node(&mut self, id: &str) -> Result<usize> {
        self.sm.check_structural()?;
        let index = self.project.nodes.len();
        self.project.register(ObjectType::Node, id, index)?;
        let mut node = Node::new(id);
        let ns = self.project.n_species();
        node.c0 = vec![0.0; ns + 1];
        node.c = vec![0.0; ns + 1];
        self.project.nodes.push(node);
        Ok(index)
    }

    /// Add a storage tank behind a new node. `v0` is the initial volume and
    /// `v_mix` the mixing-compartment volume used by the two-compartment
    /// model, both in user volume units.
    pub fn add_tank(
        &mut self,
        id: &str,
        v0: f64,
        mix_model: MixingModel,
        v_mix: f64,
    ) -> Result<usize> {
        if v0 < 0.0 || v_mix < 0.0 {
            return Err(MsxError::InvalidObjectParams);
        }
        let node = self.add_node(id)?;
        let index = self.project.tanks.len();
        self.project.register(ObjectType::Tank, id, index)?;
        let tank = Tank::new(node, 1.0, v0, mix_model, v_mix);
        self.project.tanks.push(tank);
        self.project.nodes[node].tank = index;
        Ok(index)
    }

    /// Add a reservoir: a tank with zero area that releases water at its
    /// initial quality forever.
    pub fn add_reservoir(
        &mut self,
        id: &str,
        v0: f64,
        mix_model: MixingModel,
        v_mix: f64,
    ) -> Result<usize> {
        let index = self.add_tank(id, v0, mix_model, v_mix)?;
        self.project.tanks[index].area = 0.0;
        Ok(index)
    }

    /// Add a pipe between two existing nodes. Length and diameter are in
    /// user units and must be positive.
    pub fn add_link(
        &mut self,
        id: &str,
        n1: &str,
        n2: &str,
        length: f64,
        diameter: f64,
        roughness: f64,
    ) -> Result<usize> {
        self.sm.check_structural()?;
        if length <= 0.0 || diameter <= 0.0 || roughness < 0.0 {
            return Err(MsxError::InvalidObjectParams);
        }
        let n1 = self.project.require(ObjectType::Node, n1)?;
        let n2 = self.project.require(ObjectType::Node, n2)?;
        let index = self.project.links.len();
        self.project.register(ObjectType::Link, id, index)?;
        let mut link = Link::new(id, n1, n2, length, diameter, roughness);
        link.c0 = vec![0.0; self.project.n_species() + 1];
        self.project.links.push(link);
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use crate::msx_error::MsxError;
    use crate::types::MixingModel;
    use crate::MSX;
    use rstest::rstest;

    #[rstest]
    fn duplicate_node_ids_are_rejected() {
        let mut msx = MSX::new();
        msx.add_node("A").unwrap();
        assert_eq!(
            msx.add_node("A").unwrap_err(),
            MsxError::DuplicateId("A".to_string())
        );
    }

    #[rstest]
    fn link_endpoints_must_exist() {
        let mut msx = MSX::new();
        msx.add_node("A").unwrap();
        assert_eq!(
            msx.add_link("P1", "A", "B", 100.0, 12.0, 100.0).unwrap_err(),
            MsxError::UndefinedObjectId
        );
        // the failed add left nothing behind
        assert_eq!(msx.get_count(crate::types::ObjectType::Link), 0);
    }

    #[rstest]
    fn tanks_share_the_node_namespace() {
        let mut msx = MSX::new();
        msx.add_tank("T1", 1000.0, MixingModel::Mix1, 0.0).unwrap();
        assert_eq!(
            msx.add_node("T1").unwrap_err(),
            MsxError::DuplicateId("T1".to_string())
        );
        let t = msx.get_index(crate::types::ObjectType::Node, "T1").unwrap();
        assert_eq!(msx.project.nodes[t].tank, 1);
    }

    #[rstest]
    fn reservoirs_have_zero_area() {
        let mut msx = MSX::new();
        let r = msx.add_reservoir("R1", 0.0, MixingModel::Mix1, 0.0).unwrap();
        assert!(msx.project.tanks[r].is_reservoir());
    }
}
