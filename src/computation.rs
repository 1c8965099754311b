//! Value-space generation and aggregation.
//!
//! A [`ValueSpace`] enumerates variable assignments lazily, either as the cartesian
//! product of all domains (GRID) or by zipping equally sized domains (LIST). A
//! [`Computation`] evaluates every expression over every assignment and folds the finite
//! results into a single aggregate.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::errors::ProtocolError;
use crate::expression::{Bindings, Expression};
use crate::request::{AggregateKind, ComputationRequest, SpaceKind, VariableDomain};
use crate::response::Response;
use crate::stats::StatsStore;

/// One point of the value space: the `i`-th value belongs to the `i`-th domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment<'a> {
    domains: &'a [VariableDomain],
    values: Vec<f64>,
}

impl<'a> Assignment<'a> {
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

impl Bindings for Assignment<'_> {
    fn value_of(&self, name: &str) -> Option<f64> {
        // a repeated name binds to its last declaration
        self.domains
            .iter()
            .rposition(|domain| domain.name() == name)
            .map(|index| self.values[index])
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ValueSpace<'a> {
    domains: &'a [VariableDomain],
    kind: SpaceKind,
    len: u64,
}

impl<'a> ValueSpace<'a> {
    pub fn new(domains: &'a [VariableDomain], kind: SpaceKind) -> Result<Self, ProtocolError> {
        let len = match kind {
            SpaceKind::Grid => domains
                .iter()
                .try_fold(1u64, |acc, domain| acc.checked_mul(domain.size()))
                .ok_or_else(ProtocolError::space_too_large)?,
            SpaceKind::List => {
                let size = domains.first().map_or(0, VariableDomain::size);
                if domains.iter().any(|domain| domain.size() != size) {
                    return Err(ProtocolError::size_mismatch());
                }
                size
            }
        };
        Ok(Self { domains, kind, len })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn kind(&self) -> SpaceKind {
        self.kind
    }

    pub fn iter(&self) -> Assignments<'a> {
        Assignments {
            domains: self.domains,
            kind: self.kind,
            indexes: vec![0; self.domains.len()],
            emitted: 0,
            len: self.len,
        }
    }
}

impl<'a> IntoIterator for &ValueSpace<'a> {
    type Item = Assignment<'a>;
    type IntoIter = Assignments<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct Assignments<'a> {
    domains: &'a [VariableDomain],
    kind: SpaceKind,
    indexes: Vec<u64>,
    emitted: u64,
    len: u64,
}

impl<'a> Assignments<'a> {
    /// Mixed-radix increment; the last domain is the least significant digit.
    fn advance_grid(&mut self) {
        for (index, domain) in self.indexes.iter_mut().zip(self.domains).rev() {
            *index += 1;
            if *index < domain.size() {
                return;
            }
            *index = 0;
        }
    }
}

impl<'a> Iterator for Assignments<'a> {
    type Item = Assignment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.emitted >= self.len {
            return None;
        }

        let values = match self.kind {
            SpaceKind::Grid => {
                let values = self
                    .domains
                    .iter()
                    .zip(&self.indexes)
                    .map(|(domain, &index)| domain.value_at(index))
                    .collect();
                self.advance_grid();
                values
            }
            SpaceKind::List => self
                .domains
                .iter()
                .map(|domain| domain.value_at(self.emitted))
                .collect(),
        };
        self.emitted += 1;

        Some(Assignment {
            domains: self.domains,
            values,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.len - self.emitted).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

/// Running MIN/MAX/AVG over finite samples; NaN and infinities are skipped.
///
/// The average comes from a compensated sum while that sum stays finite, and from a
/// running mean once the sum overflows.
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    count: u64,
    sum: f64,
    // Neumaier compensation term for `sum`
    compensation: f64,
    mean: f64,
    min: f64,
    max: f64,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            compensation: 0.0,
            mean: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let total = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - total) + value;
        } else {
            self.compensation += (value - total) + self.sum;
        }
        self.sum = total;

        // both quotients are at most |value| and |mean|, so this step cannot overflow
        let n = self.count as f64;
        self.mean += value / n - self.mean / n;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// The requested aggregate, or `0` when no finite value was pushed.
    pub fn finish(&self, kind: AggregateKind) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        match kind {
            AggregateKind::Min => self.min,
            AggregateKind::Max => self.max,
            AggregateKind::Avg => {
                let total = self.sum + self.compensation;
                if total.is_finite() {
                    total / self.count as f64
                } else {
                    self.mean
                }
            }
            AggregateKind::Count => self.count as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComputationOutcome {
    Count(u64),
    Value(f64),
}

#[derive(Debug, Clone)]
pub struct Computation {
    request: ComputationRequest,
}

impl Computation {
    pub fn new(request: ComputationRequest) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &ComputationRequest {
        &self.request
    }

    pub fn run(&self) -> Result<ComputationOutcome, ProtocolError> {
        let space = ValueSpace::new(self.request.domains(), self.request.space())?;
        let aggregate = self.request.aggregate();
        if aggregate == AggregateKind::Count {
            return Ok(ComputationOutcome::Count(space.len()));
        }

        let mut aggregator = Aggregator::new();
        for source in self.request.expressions() {
            let mut expression = Expression::new(source.as_str());
            expression.initialize()?;
            for assignment in &space {
                aggregator.push(expression.evaluate(&assignment)?);
            }
        }
        debug!(
            assignments = space.len(),
            finite = aggregator.count(),
            "aggregated {}_{}",
            aggregate.as_str(),
            space.kind().as_str()
        );

        Ok(ComputationOutcome::Value(aggregator.finish(aggregate)))
    }

    /// Runs the computation and turns it into a reply. Successful runs are recorded in
    /// `stats`; failures are not.
    pub fn respond(&self, stats: &StatsStore) -> Response {
        let started = Instant::now();
        let outcome = self.run();
        let elapsed: Duration = started.elapsed();

        match outcome {
            Ok(outcome) => {
                stats.record(elapsed);
                match outcome {
                    ComputationOutcome::Count(count) => Response::integer(elapsed, count),
                    ComputationOutcome::Value(value) => Response::decimal(elapsed, value),
                }
            }
            Err(error) => Response::error(error),
        }
    }
}
