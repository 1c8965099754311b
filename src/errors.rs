use thiserror::Error;

/// Wire-level error taxonomy.
///
/// The `Display` output of every variant is the exact tag sent to clients after `ERR;`,
/// so the strings below are part of the protocol and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("(IllegalCommand) Unknown request type")]
    IllegalCommand,

    #[error("(NotEnoughArguments) Invalid message format")]
    NotEnoughArguments,

    #[error("(InvalidExpression) {0}")]
    InvalidExpression(String),

    #[error("(InvalidStep) Invalid Step")]
    InvalidStep,

    #[error("(InvalidRange) Invalid Range")]
    InvalidRange,

    #[error("(IllegalArgument) {0}")]
    IllegalArgument(String),

    #[error("(Exception) {0}")]
    Exception(String),
}

impl ProtocolError {
    pub fn invalid_domain() -> Self {
        Self::InvalidExpression("Invalid Variable Value Function".to_string())
    }

    pub fn invalid_expression() -> Self {
        Self::InvalidExpression("Invalid Expression".to_string())
    }

    pub fn malformed_expression() -> Self {
        Self::InvalidExpression("The expression is not in a valid format".to_string())
    }

    pub fn empty_expression() -> Self {
        Self::InvalidExpression("The expression is empty".to_string())
    }

    pub fn not_initialized() -> Self {
        Self::InvalidExpression("The expression has not been initialized".to_string())
    }

    pub fn unknown_variable(name: &str) -> Self {
        Self::InvalidExpression(format!("Unknown variable {}", name))
    }

    pub fn size_mismatch() -> Self {
        Self::IllegalArgument("The range of the variables must have the same size".to_string())
    }

    pub fn space_too_large() -> Self {
        Self::IllegalArgument("The value space is too large".to_string())
    }

    pub fn invalid_stat_kind() -> Self {
        Self::IllegalArgument("Invalid stat kind".to_string())
    }

    pub fn unknown_computation_kind() -> Self {
        Self::IllegalArgument("Unknown computation kind".to_string())
    }

    /// Short parenthesized code of the tag, without the detail text.
    pub fn code(&self) -> &'static str {
        match self {
            Self::IllegalCommand => "IllegalCommand",
            Self::NotEnoughArguments => "NotEnoughArguments",
            Self::InvalidExpression(_) => "InvalidExpression",
            Self::InvalidStep => "InvalidStep",
            Self::InvalidRange => "InvalidRange",
            Self::IllegalArgument(_) => "IllegalArgument",
            Self::Exception(_) => "Exception",
        }
    }
}

// Server-side faults. These never reach the wire.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Line codec error: {0}")]
    CodecError(#[from] tokio_util::codec::LinesCodecError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Worker pool is shut down")]
    PoolClosed,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_render_with_code_prefix() {
        assert_eq!(
            ProtocolError::IllegalCommand.to_string(),
            "(IllegalCommand) Unknown request type"
        );
        assert_eq!(ProtocolError::InvalidStep.to_string(), "(InvalidStep) Invalid Step");
        assert_eq!(
            ProtocolError::size_mismatch().to_string(),
            "(IllegalArgument) The range of the variables must have the same size"
        );
        assert_eq!(
            ProtocolError::Exception("boom".into()).to_string(),
            "(Exception) boom"
        );
    }

    #[test]
    fn code_matches_display_prefix() {
        let errors = [
            ProtocolError::IllegalCommand,
            ProtocolError::NotEnoughArguments,
            ProtocolError::invalid_domain(),
            ProtocolError::InvalidStep,
            ProtocolError::InvalidRange,
            ProtocolError::invalid_stat_kind(),
            ProtocolError::Exception("x".into()),
        ];
        for err in errors {
            assert!(err.to_string().starts_with(&format!("({})", err.code())));
        }
    }
}
