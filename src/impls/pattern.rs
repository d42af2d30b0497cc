//! Pattern APIs
//!
//! This module contains APIs for adding and fetching source time patterns.
use crate::msx_error::*;
use crate::types::{ObjectType, Pattern};
use crate::MSX;

/// ## Pattern APIs
impl MSX {
    pub fn add_pattern(&mut self, id: &str) -> Result<usize> {
        self.sm.check_structural()?;
        let index = self.project.patterns.len();
        self.project.register(ObjectType::Pattern, id, index)?;
        self.project.patterns.push(Pattern::new(id));
        Ok(index)
    }

    /// Replaces the full multiplier sequence of a pattern.
    pub fn set_pattern(&mut self, index: usize, values: &[f64]) -> Result<()> {
        self.sm.check_configurable()?;
        let pattern = self
            .project
            .patterns
            .get_mut(index)
            .filter(|_| index > 0)
            .ok_or(MsxError::InvalidObjectIndex)?;
        pattern.multipliers = values.to_vec();
        Ok(())
    }

    /// Sets one multiplier; `period` is 1-based and must already exist.
    pub fn set_pattern_value(&mut self, index: usize, period: usize, value: f64) -> Result<()> {
        self.sm.check_configurable()?;
        let pattern = self
            .project
            .patterns
            .get_mut(index)
            .filter(|_| index > 0)
            .ok_or(MsxError::InvalidObjectIndex)?;
        if period == 0 || period > pattern.multipliers.len() {
            return Err(MsxError::InvalidObjectIndex);
        }
        pattern.multipliers[period - 1] = value;
        Ok(())
    }

    pub fn get_pattern_length(&self, index: usize) -> Result<usize> {
        self.project
            .patterns
            .get(index)
            .filter(|_| index > 0)
            .map(|p| p.multipliers.len())
            .ok_or(MsxError::InvalidObjectIndex)
    }

    /// Gets one multiplier; `period` is 1-based.
    pub fn get_pattern_value(&self, index: usize, period: usize) -> Result<f64> {
        let pattern = self
            .project
            .patterns
            .get(index)
            .filter(|_| index > 0)
            .ok_or(MsxError::InvalidObjectIndex)?;
        if period == 0 || period > pattern.multipliers.len() {
            return Err(MsxError::InvalidObjectIndex);
        }
        Ok(pattern.multipliers[period - 1])
    }
}

#[cfg(test)]
mod tests {
    use crate::msx_error::MsxError;
    use crate::MSX;
    use rstest::rstest;

    #[rstest]
    fn set_get_round_trips_exactly() {
        let mut msx = MSX::new();
        let p = msx.add_pattern("P1").unwrap();
        let values = [1.0, 0.0, 2.5, 0.75];
        msx.set_pattern(p, &values).unwrap();
        assert_eq!(msx.get_pattern_length(p).unwrap(), 4);
        for (i, v) in values.iter().enumerate() {
            assert_eq!(msx.get_pattern_value(p, i + 1).unwrap(), *v);
        }
    }

    #[rstest]
    fn single_value_updates_in_place() {
        let mut msx = MSX::new();
        let p = msx.add_pattern("P1").unwrap();
        msx.set_pattern(p, &[1.0, 1.0]).unwrap();
        msx.set_pattern_value(p, 2, 0.5).unwrap();
        assert_eq!(msx.get_pattern_value(p, 2).unwrap(), 0.5);
        assert_eq!(
            msx.set_pattern_value(p, 3, 0.5).unwrap_err(),
            MsxError::InvalidObjectIndex
        );
    }

    #[rstest]
    fn index_zero_is_reserved() {
        let msx = MSX::new();
        assert_eq!(
            msx.get_pattern_length(0).unwrap_err(),
            MsxError::InvalidObjectIndex
        );
    }
}
