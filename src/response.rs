use std::fmt;
use std::time::Duration;

use crate::errors::ProtocolError;

const OK_CODE: &str = "OK";
const ERROR_CODE: &str = "ERR";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResultValue {
    /// Rendered as a plain integer (COUNT, STAT_REQS).
    Integer(u64),
    /// Rendered with six decimals.
    Decimal(f64),
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultValue::Integer(value) => write!(f, "{}", value),
            ResultValue::Decimal(value) => write!(f, "{:.6}", value),
        }
    }
}

// One reply line. A success carries exactly one result, a failure one or more tags.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Ack,
    Success { elapsed: Duration, value: ResultValue },
    Failure { tags: Vec<String> },
}

impl Response {
    pub fn ack() -> Self {
        Self::Ack
    }

    pub fn integer(elapsed: Duration, value: u64) -> Self {
        Self::Success {
            elapsed,
            value: ResultValue::Integer(value),
        }
    }

    pub fn decimal(elapsed: Duration, value: f64) -> Self {
        Self::Success {
            elapsed,
            value: ResultValue::Decimal(value),
        }
    }

    pub fn error(error: ProtocolError) -> Self {
        Self::Failure {
            tags: vec![error.to_string()],
        }
    }

    pub fn errors<I>(errors: I) -> Self
    where
        I: IntoIterator<Item = ProtocolError>,
    {
        Self::Failure {
            tags: errors.into_iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Failure { .. })
    }

    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            Self::Success { elapsed, .. } => Some(*elapsed),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<ResultValue> {
        match self {
            Self::Success { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn tags(&self) -> &[String] {
        match self {
            Self::Failure { tags } => tags,
            _ => &[],
        }
    }
}

impl From<ProtocolError> for Response {
    fn from(error: ProtocolError) -> Self {
        Self::error(error)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack => write!(f, "{}", OK_CODE),
            Self::Success { elapsed, value } => {
                // whole milliseconds, shown as seconds
                let seconds = elapsed.as_millis() as f64 / 1000.0;
                write!(f, "{};{:.3};{}", OK_CODE, seconds, value)
            }
            Self::Failure { tags } => {
                write!(f, "{}", ERROR_CODE)?;
                for tag in tags {
                    write!(f, ";{}", tag)?;
                }
                Ok(())
            }
        }
    }
}
