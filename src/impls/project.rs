//! Project lifecycle API methods.
//!
//! This module contains methods for initializing and closing a project and
//! for looking objects up by ID or index.

use tracing::info;

use crate::msx_error::*;
use crate::types::{ObjectType, ProjectState};
use crate::MSX;

/// ## Project APIs
impl MSX {
    /// Finishes configuration: validates the network, computes internal-unit
    /// conversions, builds the adjacency list and compiles every reaction
    /// expression. Must run before the quality solver is opened.
    ///
    /// # Errors
    /// - [`MsxError::InvalidObjectParams`] / [`MsxError::InvalidObjectIndex`]
    ///   when the topology fails validation.
    /// - [`MsxError::MathExpr`] when a reaction expression does not parse or
    ///   references an unknown name.
    pub fn init(&mut self) -> Result<()> {
        match self.sm.state {
            ProjectState::Open => {}
            ProjectState::Closed => return Err(MsxError::NotOpened),
            _ => return Err(MsxError::AlreadyOpened),
        }
        self.project.validate()?;
        self.project.convert_units();
        self.project.build_adjacency();
        self.project.sync_param_defaults();
        let ns = self.project.n_species();
        for node in self.project.nodes.iter_mut().skip(1) {
            node.c0.resize(ns + 1, 0.0);
            node.c = node.c0.clone();
        }
        for link in self.project.links.iter_mut().skip(1) {
            link.c0.resize(ns + 1, 0.0);
        }
        self.project.compile_expressions()?;
        self.sm.init_done = true;
        info!(
            nodes = self.project.count(ObjectType::Node),
            links = self.project.count(ObjectType::Link),
            species = ns,
            "project initialized"
        );
        Ok(())
    }

    /// Closes the project, releasing segment pools, solver workspaces and the
    /// scratch results file. Runs on drop as well; safe to call twice.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut engine) = self.engine.take() {
            engine.close(&mut self.project);
        }
        self.out.remove_scratch();
        self.sm.state = ProjectState::Closed;
        Ok(())
    }

    /// Returns the number of objects of the given type.
    pub fn get_count(&self, object_type: ObjectType) -> usize {
        self.project.count(object_type)
    }

    /// Get the index of the object with the given id.
    pub fn get_index(&self, object_type: ObjectType, id: &str) -> Result<usize> {
        self.project.require(object_type, id)
    }

    /// Get an object id given its index.
    pub fn get_id(&self, object_type: ObjectType, index: usize) -> Result<String> {
        let id = match object_type {
            ObjectType::Node => self.project.nodes.get(index).map(|o| o.id.clone()),
            ObjectType::Link => self.project.links.get(index).map(|o| o.id.clone()),
            ObjectType::Tank => self
                .project
                .tanks
                .get(index)
                .and_then(|t| self.project.nodes.get(t.node))
                .map(|n| n.id.clone()),
            ObjectType::Species => self.project.species.get(index).map(|o| o.id.clone()),
            ObjectType::Term => self.project.terms.get(index).map(|o| o.id.clone()),
            ObjectType::Parameter => self.project.params.get(index).map(|o| o.id.clone()),
            ObjectType::Constant => self.project.consts.get(index).map(|o| o.id.clone()),
            ObjectType::Pattern => self.project.patterns.get(index).map(|o| o.id.clone()),
        };
        match id {
            Some(id) if index > 0 => Ok(id),
            _ => Err(MsxError::InvalidObjectIndex),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::impls::test_utils::fixtures::*;
    use crate::msx_error::MsxError;
    use crate::types::ObjectType;
    use crate::MSX;
    use rstest::rstest;

    #[rstest]
    fn init_validates_topology(mut single_pipe: MSX) {
        assert!(single_pipe.init().is_ok());
    }

    #[rstest]
    fn init_rejects_zero_diameter() {
        let mut msx = MSX::new();
        msx.add_node("A").unwrap();
        msx.add_node("B").unwrap();
        msx.add_link("P1", "A", "B", 100.0, 0.0, 100.0).unwrap();
        assert_eq!(msx.init().unwrap_err(), MsxError::InvalidObjectParams);
    }

    #[rstest]
    fn lookup_round_trips(single_pipe: MSX) {
        let k = single_pipe.get_index(ObjectType::Link, "P1").unwrap();
        assert_eq!(single_pipe.get_id(ObjectType::Link, k).unwrap(), "P1");
        assert_eq!(
            single_pipe.get_index(ObjectType::Link, "NOPE").unwrap_err(),
            MsxError::UndefinedObjectId
        );
        assert_eq!(
            single_pipe.get_id(ObjectType::Link, 99).unwrap_err(),
            MsxError::InvalidObjectIndex
        );
    }

    #[rstest]
    fn close_is_idempotent(mut single_pipe: MSX) {
        single_pipe.close().unwrap();
        single_pipe.close().unwrap();
        assert_eq!(single_pipe.add_node("LATE").unwrap_err(), MsxError::NotOpened);
    }
}
