use thiserror::Error;

/// MSX toolkit errors.
///
/// Every error carries the numeric code the legacy toolkit reported through
/// `MSXgeterror`, so callers keyed to those codes keep working.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MsxError {
    #[error("Error 501 - insufficient memory available.")]
    OutOfMemory,
    #[error("Error 504 - could not open hydraulic results.")]
    HydraulicsUnavailable,
    #[error("Error 505 - could not read hydraulic results.")]
    HydraulicsRead,
    #[error("Error 511 - could not open binary results file.")]
    OutputOpen,
    #[error("Error 512 - read/write error on binary results file.")]
    OutputWrite,
    #[error("Error 513 - could not integrate reaction rate expressions.")]
    IntegrationFailure,
    #[error("Error 514 - could not solve reaction equilibrium expressions.")]
    EquilibriumFailure,
    #[error("Error 515 - reference made to an unknown type of object.")]
    InvalidObjectType,
    #[error("Error 516 - reference made to an illegal object index.")]
    InvalidObjectIndex,
    #[error("Error 517 - reference made to an undefined object ID.")]
    UndefinedObjectId,
    #[error("Error 518 - invalid property values were specified.")]
    InvalidObjectParams,
    #[error("Error 519 - an MSX project was not opened.")]
    NotOpened,
    #[error("Error 520 - an MSX project is already opened.")]
    AlreadyOpened,
    #[error("Error 524 - illegal math operation.")]
    MathDomain,
    #[error("Error 525 - could not parse reaction expression \"{0}\".")]
    MathExpr(String),
    #[error("Error 526 - object ID \"{0}\" is already in use.")]
    DuplicateId(String),
    #[error("Error 527 - a reaction expression was already assigned to this species.")]
    DuplicateExpression,
    #[error("Error 528 - invalid keyword \"{0}\".")]
    Keyword(String),
    #[error("Error 529 - invalid numeric value \"{0}\".")]
    Number(String),
    #[error("Error 530 - invalid object name \"{0}\".")]
    Name(String),
}

impl MsxError {
    /// Legacy toolkit error code.
    pub fn code(&self) -> i32 {
        match self {
            MsxError::OutOfMemory => 501,
            MsxError::HydraulicsUnavailable => 504,
            MsxError::HydraulicsRead => 505,
            MsxError::OutputOpen => 511,
            MsxError::OutputWrite => 512,
            MsxError::IntegrationFailure => 513,
            MsxError::EquilibriumFailure => 514,
            MsxError::InvalidObjectType => 515,
            MsxError::InvalidObjectIndex => 516,
            MsxError::UndefinedObjectId => 517,
            MsxError::InvalidObjectParams => 518,
            MsxError::NotOpened => 519,
            MsxError::AlreadyOpened => 520,
            MsxError::MathDomain => 524,
            MsxError::MathExpr(_) => 525,
            MsxError::DuplicateId(_) => 526,
            MsxError::DuplicateExpression => 527,
            MsxError::Keyword(_) => 528,
            MsxError::Number(_) => 529,
            MsxError::Name(_) => 530,
        }
    }
}

/// MSX Result type with MSX specific errors
pub type Result<T> = std::result::Result<T, MsxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_messages() {
        let err = MsxError::IntegrationFailure;
        assert_eq!(err.code(), 513);
        assert!(err.to_string().starts_with("Error 513"));

        let err = MsxError::DuplicateId("CL2".to_string());
        assert_eq!(err.code(), 526);
        assert!(err.to_string().contains("CL2"));
    }
}
