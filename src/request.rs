//! Inbound side of the wire protocol.
//!
//! A message is one line of `;`-separated fields. The first field selects the request
//! kind from a fixed table; the remaining fields are validated field by field, and the
//! first failure decides the error tag.

use std::fmt;

use crate::errors::ProtocolError;
use crate::expression::lexer::{is_identifier, is_number_literal};

pub const FIELD_SEPARATOR: char = ';';
pub const DOMAIN_SEPARATOR: char = ',';
pub const DOMAIN_PART_SEPARATOR: char = ':';

const QUIT_COMMANDS: &[&str] = &["BYE"];
const STAT_COMMANDS: &[&str] = &["STAT_REQS", "STAT_AVG_TIME", "STAT_MAX_TIME"];
const COMPUTATION_COMMANDS: &[&str] = &[
    "MIN_GRID",
    "MAX_GRID",
    "AVG_GRID",
    "COUNT_GRID",
    "MIN_LIST",
    "MAX_LIST",
    "AVG_LIST",
    "COUNT_LIST",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Quit,
    Stat,
    Computation,
    Unknown,
}

impl RequestKind {
    pub fn resolve(command: &str) -> Self {
        if QUIT_COMMANDS.contains(&command) {
            Self::Quit
        } else if STAT_COMMANDS.contains(&command) {
            Self::Stat
        } else if COMPUTATION_COMMANDS.contains(&command) {
            Self::Computation
        } else {
            Self::Unknown
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    message: String,
    command: String,
    kind: RequestKind,
}

impl Request {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let command = message
            .split(FIELD_SEPARATOR)
            .next()
            .unwrap_or_default()
            .to_string();
        let kind = RequestKind::resolve(&command);
        Self {
            message,
            command,
            kind,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn computation_request(&self) -> Result<ComputationRequest, ProtocolError> {
        match self.kind {
            RequestKind::Computation => ComputationRequest::parse(&self.message),
            _ => Err(ProtocolError::IllegalCommand),
        }
    }

    pub fn stat_request(&self) -> Result<StatRequest, ProtocolError> {
        match self.kind {
            RequestKind::Stat => StatRequest::parse(&self.command),
            _ => Err(ProtocolError::IllegalCommand),
        }
    }
}

/// Splits on `separator` and drops trailing empty fields.
fn split_fields(text: &str, separator: char) -> Vec<&str> {
    let mut fields: Vec<&str> = text.split(separator).collect();
    while fields.last().is_some_and(|field| field.is_empty()) {
        fields.pop();
    }
    fields
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Min,
    Max,
    Avg,
    Count,
}

impl AggregateKind {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "MIN" => Some(Self::Min),
            "MAX" => Some(Self::Max),
            "AVG" => Some(Self::Avg),
            "COUNT" => Some(Self::Count),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Avg => "AVG",
            Self::Count => "COUNT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceKind {
    Grid,
    List,
}

impl SpaceKind {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "GRID" => Some(Self::Grid),
            "LIST" => Some(Self::List),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grid => "GRID",
            Self::List => "LIST",
        }
    }
}

/// A named range `lower, lower+step, ...` of `size` values.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDomain {
    name: String,
    lower: f64,
    step: f64,
    upper: f64,
    size: u64,
}

impl VariableDomain {
    pub fn new(
        name: impl Into<String>,
        lower: f64,
        step: f64,
        upper: f64,
    ) -> Result<Self, ProtocolError> {
        if step <= 0.0 {
            return Err(ProtocolError::InvalidStep);
        }
        if lower > upper {
            return Err(ProtocolError::InvalidRange);
        }
        let steps = ((upper - lower) / step).ceil();
        if !steps.is_finite() || steps >= u64::MAX as f64 {
            return Err(ProtocolError::space_too_large());
        }
        let size = (steps as u64)
            .checked_add(1)
            .ok_or_else(ProtocolError::space_too_large)?;
        Ok(Self {
            name: name.into(),
            lower,
            step,
            upper,
            size,
        })
    }

    /// Parses `name:lower:step:upper`.
    pub fn parse(spec: &str) -> Result<Self, ProtocolError> {
        let parts: Vec<&str> = spec.split(DOMAIN_PART_SEPARATOR).collect();
        let &[name, lower, step, upper] = parts.as_slice() else {
            return Err(ProtocolError::invalid_domain());
        };
        if !is_identifier(name) {
            return Err(ProtocolError::invalid_domain());
        }
        Self::new(
            name,
            parse_signed(lower)?,
            parse_signed(step)?,
            parse_signed(upper)?,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// `ceil((upper - lower) / step) + 1`
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn value_at(&self, index: u64) -> f64 {
        self.lower + index as f64 * self.step
    }
}

impl fmt::Display for VariableDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.name, self.lower, self.step, self.upper)
    }
}

/// `-?[0-9]+(\.[0-9]+)?`
fn parse_signed(text: &str) -> Result<f64, ProtocolError> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if !is_number_literal(digits) {
        return Err(ProtocolError::invalid_domain());
    }
    text.parse::<f64>()
        .map_err(|_| ProtocolError::invalid_domain())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputationRequest {
    aggregate: AggregateKind,
    space: SpaceKind,
    domains: Vec<VariableDomain>,
    expressions: Vec<String>,
}

impl ComputationRequest {
    pub fn new(
        aggregate: AggregateKind,
        space: SpaceKind,
        domains: Vec<VariableDomain>,
        expressions: Vec<String>,
    ) -> Self {
        Self {
            aggregate,
            space,
            domains,
            expressions,
        }
    }

    /// Parses and validates a full computation message.
    pub fn parse(message: &str) -> Result<Self, ProtocolError> {
        let fields = split_fields(message, FIELD_SEPARATOR);
        let (aggregate, space) = parse_command(fields.first().copied().unwrap_or_default())?;

        if fields.len() < 2 {
            return Err(ProtocolError::NotEnoughArguments);
        }
        let domains = split_fields(fields[1], DOMAIN_SEPARATOR)
            .into_iter()
            .map(VariableDomain::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if domains.is_empty() {
            return Err(ProtocolError::invalid_domain());
        }

        let mut expressions = Vec::new();
        if aggregate != AggregateKind::Count {
            if fields.len() < 3 {
                return Err(ProtocolError::NotEnoughArguments);
            }
            for field in &fields[2..] {
                if !is_expression_text(field, &domains) {
                    return Err(ProtocolError::invalid_expression());
                }
                expressions.push(field.to_string());
            }
        }

        Ok(Self::new(aggregate, space, domains, expressions))
    }

    pub fn aggregate(&self) -> AggregateKind {
        self.aggregate
    }

    pub fn space(&self) -> SpaceKind {
        self.space
    }

    pub fn domains(&self) -> &[VariableDomain] {
        &self.domains
    }

    pub fn expressions(&self) -> &[String] {
        &self.expressions
    }
}

fn parse_command(command: &str) -> Result<(AggregateKind, SpaceKind), ProtocolError> {
    let (aggregate, space) = command
        .split_once('_')
        .ok_or_else(ProtocolError::unknown_computation_kind)?;
    match (AggregateKind::parse(aggregate), SpaceKind::parse(space)) {
        (Some(aggregate), Some(space)) => Ok((aggregate, space)),
        _ => Err(ProtocolError::unknown_computation_kind()),
    }
}

/// True when `text` is a concatenation of declared variable names and the characters
/// `0-9 . + - * / ^ ( )`.
fn is_expression_text(text: &str, domains: &[VariableDomain]) -> bool {
    let bytes = text.as_bytes();
    // reachable[i]: the prefix of length i can be split into allowed pieces
    let mut reachable = vec![false; bytes.len() + 1];
    reachable[0] = true;

    for i in 0..bytes.len() {
        if !reachable[i] {
            continue;
        }
        if matches!(bytes[i], b'0'..=b'9' | b'.' | b'+' | b'-' | b'*' | b'/' | b'^' | b'(' | b')')
        {
            reachable[i + 1] = true;
        }
        for domain in domains {
            if bytes[i..].starts_with(domain.name().as_bytes()) {
                reachable[i + domain.name().len()] = true;
            }
        }
    }

    reachable[bytes.len()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Reqs,
    AvgTime,
    MaxTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatRequest {
    kind: StatKind,
}

impl StatRequest {
    pub fn new(kind: StatKind) -> Self {
        Self { kind }
    }

    pub fn parse(command: &str) -> Result<Self, ProtocolError> {
        let kind = match command.strip_prefix("STAT_") {
            Some("REQS") => StatKind::Reqs,
            Some("AVG_TIME") => StatKind::AvgTime,
            Some("MAX_TIME") => StatKind::MaxTime,
            _ => return Err(ProtocolError::invalid_stat_kind()),
        };
        Ok(Self::new(kind))
    }

    pub fn kind(&self) -> StatKind {
        self.kind
    }
}
