//! Chemistry construction API methods.
//!
//! This module contains methods for declaring species, coefficients, terms,
//! reaction expressions, initial qualities and sources.

use crate::msx_error::*;
use crate::types::{
    Constant, ExprClass, ExprKind, ObjectScope, ObjectType, Parameter, Reaction, Source,
    SourceKind, Species, SpeciesKind, TankReaction, Term,
};
use crate::MSX;

/// ## Chemistry construction APIs
impl MSX {
    /// Add a chemical species with its units and integration tolerances.
    /// Returns the index of the species or an error.
    pub fn add_species(
        &mut self,
        id: &str,
        kind: SpeciesKind,
        units: &str,
        atol: f64,
        rtol: f64,
    ) -> Result<usize> {
        self.sm.check_structural()?;
        if atol < 0.0 || rtol < 0.0 {
            return Err(MsxError::InvalidObjectParams);
        }
        let index = self.project.species.len();
        self.project.register(ObjectType::Species, id, index)?;
        self.project.species.push(Species::new(id, kind, units, atol, rtol));
        // widen every concentration vector for the new species
        let ns = self.project.n_species();
        for node in self.project.nodes.iter_mut().skip(1) {
            node.c0.resize(ns + 1, 0.0);
            node.c.resize(ns + 1, 0.0);
        }
        for link in self.project.links.iter_mut().skip(1) {
            link.c0.resize(ns + 1, 0.0);
        }
        Ok(index)
    }

    /// Add a named coefficient: a [`ObjectType::Constant`] or a
    /// [`ObjectType::Parameter`] that pipes and tanks may override.
    pub fn add_coefficient(&mut self, kind: ObjectType, id: &str, value: f64) -> Result<usize> {
        self.sm.check_structural()?;
        match kind {
            ObjectType::Constant => {
                let index = self.project.consts.len();
                self.project.register(ObjectType::Constant, id, index)?;
                self.project.consts.push(Constant {
                    id: id.to_string(),
                    value,
                });
                Ok(index)
            }
            ObjectType::Parameter => {
                let index = self.project.params.len();
                self.project.register(ObjectType::Parameter, id, index)?;
                self.project.params.push(Parameter {
                    id: id.to_string(),
                    value,
                });
                Ok(index)
            }
            _ => Err(MsxError::InvalidObjectType),
        }
    }

    /// Add a named intermediate term usable in any reaction expression.
    pub fn add_term(&mut self, id: &str, equation: &str) -> Result<usize> {
        self.sm.check_structural()?;
        let index = self.project.terms.len();
        self.project.register(ObjectType::Term, id, index)?;
        self.project.terms.push(Term {
            id: id.to_string(),
            equation: equation.to_string(),
            expr: None,
        });
        Ok(index)
    }

    /// Assign a reaction expression to a species for pipes or tanks.
    ///
    /// A species may carry at most one expression per class; when no tank
    /// expression is assigned the pipe expression governs tanks too.
    pub fn add_expression(
        &mut self,
        class: ExprClass,
        kind: ExprKind,
        species: &str,
        equation: &str,
    ) -> Result<()> {
        self.sm.check_structural()?;
        let m = self.project.require(ObjectType::Species, species)?;
        let rx = Reaction::new(kind, equation);
        match class {
            ExprClass::Pipe => {
                if self.project.species[m].pipe_rx.is_some() {
                    return Err(MsxError::DuplicateExpression);
                }
                self.project.species[m].pipe_rx = Some(rx);
            }
            ExprClass::Tank => {
                if matches!(self.project.species[m].tank_rx, TankReaction::Own(_)) {
                    return Err(MsxError::DuplicateExpression);
                }
                self.project.species[m].tank_rx = TankReaction::Own(rx);
            }
        }
        Ok(())
    }

    /// Attach an external quality source to a node. `pattern` optionally
    /// names a time pattern scaling the strength.
    pub fn add_source(
        &mut self,
        kind: SourceKind,
        node: &str,
        species: &str,
        strength: f64,
        pattern: Option<&str>,
    ) -> Result<()> {
        self.sm.check_configurable()?;
        let j = self.project.require(ObjectType::Node, node)?;
        let m = self.project.require(ObjectType::Species, species)?;
        if self.project.species[m].kind != SpeciesKind::Bulk {
            return Err(MsxError::InvalidObjectParams);
        }
        let pattern = match pattern {
            Some(id) => self.project.require(ObjectType::Pattern, id)?,
            None => 0,
        };
        self.project.nodes[j].sources.push(Source {
            kind,
            species: m,
            strength,
            pattern,
        });
        Ok(())
    }

    /// Set the initial quality of one species at a node or link.
    pub fn add_quality(
        &mut self,
        scope: ObjectScope,
        species: &str,
        value: f64,
        id: &str,
    ) -> Result<()> {
        self.sm.check_configurable()?;
        if value < 0.0 {
            return Err(MsxError::InvalidObjectParams);
        }
        let m = self.project.require(ObjectType::Species, species)?;
        match scope {
            ObjectScope::Node => {
                let j = self.project.require(ObjectType::Node, id)?;
                self.project.nodes[j].c0[m] = value;
            }
            ObjectScope::Link => {
                let k = self.project.require(ObjectType::Link, id)?;
                self.project.links[k].c0[m] = value;
            }
        }
        Ok(())
    }

    /// Override a reaction parameter for one pipe (link scope) or one tank
    /// (node scope).
    pub fn add_parameter(
        &mut self,
        scope: ObjectScope,
        param: &str,
        value: f64,
        id: &str,
    ) -> Result<()> {
        self.sm.check_configurable()?;
        let i = self.project.require(ObjectType::Parameter, param)?;
        self.project.sync_param_defaults();
        match scope {
            ObjectScope::Link => {
                let k = self.project.require(ObjectType::Link, id)?;
                self.project.links[k].param[i] = value;
            }
            ObjectScope::Node => {
                let j = self.project.require(ObjectType::Node, id)?;
                let t = self.project.nodes[j].tank;
                if t == 0 {
                    return Err(MsxError::InvalidObjectParams);
                }
                self.project.tanks[t].param[i] = value;
            }
        }
        Ok(())
    }

    /// Set the value of an existing constant.
    pub fn set_constant(&mut self, id: &str, value: f64) -> Result<()> {
        self.sm.check_configurable()?;
        let i = self.project.require(ObjectType::Constant, id)?;
        self.project.consts[i].value = value;
        Ok(())
    }

    /// Get the value of a constant.
    pub fn get_constant(&self, id: &str) -> Result<f64> {
        let i = self.project.require(ObjectType::Constant, id)?;
        Ok(self.project.consts[i].value)
    }
}
