use serde::{Deserialize, Serialize};

use crewplan_core::{DomainError, DomainResult};

/// Fraction of one person's working capacity committed by a single
/// assignment, in whole percent (0–100).
///
/// Validated at construction; arithmetic over multiple assignments widens to
/// `u32` so summed totals can exceed 100 without wrapping (that excess is
/// exactly what overallocation detection looks for).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkingPercentage(u8);

impl WorkingPercentage {
    pub const ZERO: WorkingPercentage = WorkingPercentage(0);
    pub const FULL: WorkingPercentage = WorkingPercentage(100);

    pub fn new(value: u8) -> DomainResult<Self> {
        if value > 100 {
            return Err(DomainError::validation(format!(
                "working percentage must be between 0 and 100, got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn as_u32(self) -> u32 {
        u32::from(self.0)
    }
}

impl core::fmt::Display for WorkingPercentage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl TryFrom<u8> for WorkingPercentage {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_values_over_one_hundred() {
        assert!(WorkingPercentage::new(101).is_err());
        assert!(WorkingPercentage::new(255).is_err());
    }

    #[test]
    fn accepts_boundaries() {
        assert_eq!(WorkingPercentage::new(0).unwrap(), WorkingPercentage::ZERO);
        assert_eq!(WorkingPercentage::new(100).unwrap(), WorkingPercentage::FULL);
    }
}
