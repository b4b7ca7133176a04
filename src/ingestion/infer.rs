//! Per-column type inference and coercion.
//!
//! Inference walks an ordered ladder of [`Candidate`]s, narrowest first. For every column the
//! engine records which candidates accept *every* non-missing value seen so far
//! ([`ColumnEvidence`]); the first surviving candidate wins. Evidence from separate chunks can be
//! merged by intersection, so chunked reads decide the same type as a single pass.
//!
//! Temporal types expand to one candidate per pattern, so the winning candidate also fixes the
//! pattern used for the rest of the column.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{IngestionError, IngestionResult};
use crate::types::{ColumnType, Value};

use super::parser_options::ParserOptions;

/// What to do when values after the inference sample do not fit the committed type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WideningPolicy {
    /// Re-infer from every value in the column and coerce again.
    #[default]
    Widen,
    /// Keep the column as strings.
    FallbackToString,
}

/// Options controlling type inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceOptions {
    /// Types tried in order before falling back to [`ColumnType::String`].
    pub ladder: Vec<ColumnType>,
    /// Infer from the first `n` rows only. `None` inspects every row.
    pub sample_rows: Option<usize>,
    /// Applies when rows after the sample contradict it.
    pub widening: WideningPolicy,
    /// Prefer [`ColumnType::BigDecimal`] when `f64` cannot hold a value within
    /// `decimal_tolerance`.
    pub exact_decimals: bool,
    /// Largest accepted relative error of the `f64` form when `exact_decimals` is on.
    pub decimal_tolerance: f64,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            ladder: Self::default_ladder(),
            sample_rows: None,
            widening: WideningPolicy::Widen,
            exact_decimals: false,
            decimal_tolerance: 0.0,
        }
    }
}

impl InferenceOptions {
    /// Boolean, the numeric types narrowest first, then the temporal types.
    pub fn default_ladder() -> Vec<ColumnType> {
        vec![
            ColumnType::Boolean,
            ColumnType::Integer,
            ColumnType::Long,
            ColumnType::BigInteger,
            ColumnType::Double,
            ColumnType::BigDecimal,
            ColumnType::LocalDate,
            ColumnType::LocalDateTime,
            ColumnType::LocalTime,
        ]
    }

    /// Reject a ladder containing `Nothing`, a zero sample or a bad tolerance.
    pub fn validate(&self) -> IngestionResult<()> {
        if self.ladder.contains(&ColumnType::Nothing) {
            return Err(IngestionError::configuration(
                "Nothing cannot be part of the inference ladder",
            ));
        }
        if self.sample_rows == Some(0) {
            return Err(IngestionError::configuration("sample_rows must be > 0"));
        }
        if !self.decimal_tolerance.is_finite() || self.decimal_tolerance < 0.0 {
            return Err(IngestionError::configuration(
                "decimal_tolerance must be a finite, non-negative number",
            ));
        }
        Ok(())
    }
}

/// A concrete parse target: a type and, for temporal types, the pattern to parse with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub ty: ColumnType,
    /// `chrono` format pattern for temporal types.
    pub pattern: Option<String>,
}

impl Candidate {
    /// A candidate without a pattern.
    pub fn plain(ty: ColumnType) -> Self {
        Self { ty, pattern: None }
    }

    fn describe(&self) -> String {
        match &self.pattern {
            Some(p) => format!("{} ('{p}')", self.ty),
            None => self.ty.to_string(),
        }
    }
}

fn expand(ty: ColumnType, parser: &ParserOptions) -> Vec<Candidate> {
    let patterns = match ty {
        ColumnType::LocalDate => parser.date_patterns(),
        ColumnType::LocalDateTime => parser.date_time_patterns(),
        ColumnType::LocalTime => parser.time_patterns(),
        _ => return vec![Candidate::plain(ty)],
    };
    patterns
        .into_iter()
        .map(|p| Candidate {
            ty,
            pattern: Some(p),
        })
        .collect()
}

/// Everything needed to test and coerce the values of one column.
#[derive(Debug, Clone)]
pub struct ColumnPlan {
    pub name: String,
    pub parser: ParserOptions,
    /// Ordered candidates. For an explicit override these are the override's own variants.
    pub candidates: Vec<Candidate>,
    pub type_override: Option<ColumnType>,
    exact_tolerance: Option<f64>,
}

impl ColumnPlan {
    pub fn new(
        name: impl Into<String>,
        type_override: Option<ColumnType>,
        parser: ParserOptions,
        inference: &InferenceOptions,
    ) -> Self {
        let candidates = match type_override {
            Some(ty) => expand(ty, &parser),
            None => inference
                .ladder
                .iter()
                .filter(|ty| **ty != ColumnType::BigDecimal || inference.exact_decimals)
                .flat_map(|ty| expand(*ty, &parser))
                .collect(),
        };
        let exact_tolerance = (type_override.is_none() && inference.exact_decimals)
            .then_some(inference.decimal_tolerance);
        Self {
            name: name.into(),
            parser,
            candidates,
            type_override,
            exact_tolerance,
        }
    }

    /// Parse `raw` under `candidate`, or `None` if it does not fit.
    pub fn parse(&self, candidate: &Candidate, raw: &str) -> Option<Value> {
        parse_value(candidate, raw, &self.parser, self.exact_tolerance)
    }

    /// Evidence with every candidate still accepted.
    pub fn empty_evidence(&self) -> ColumnEvidence {
        ColumnEvidence {
            accepts: vec![true; self.candidates.len()],
            has_values: false,
        }
    }

    /// Pick the column type from sampled and full evidence.
    pub fn resolve(
        &self,
        sample: &ColumnEvidence,
        full: &ColumnEvidence,
        widening: WideningPolicy,
    ) -> Candidate {
        if let Some(ty) = self.type_override {
            return self.resolve_override(ty, full);
        }

        let committed = self.narrowest(sample);
        if self.holds(&committed, full) {
            return committed;
        }
        match widening {
            WideningPolicy::Widen => {
                let widened = self.narrowest(full);
                warn!(
                    column = %self.name,
                    from = %committed.ty,
                    to = %widened.ty,
                    "values beyond the inference sample do not fit; widening column"
                );
                widened
            }
            WideningPolicy::FallbackToString => {
                warn!(
                    column = %self.name,
                    from = %committed.ty,
                    "values beyond the inference sample do not fit; falling back to String"
                );
                Candidate::plain(ColumnType::String)
            }
        }
    }

    fn resolve_override(&self, ty: ColumnType, full: &ColumnEvidence) -> Candidate {
        self.candidates
            .iter()
            .zip(&full.accepts)
            .find(|(_, ok)| **ok)
            .map(|(c, _)| c.clone())
            .or_else(|| self.candidates.first().cloned())
            .unwrap_or_else(|| Candidate::plain(ty))
    }

    fn narrowest(&self, evidence: &ColumnEvidence) -> Candidate {
        if !evidence.has_values {
            return Candidate::plain(ColumnType::Nothing);
        }
        self.candidates
            .iter()
            .zip(&evidence.accepts)
            .find(|(_, ok)| **ok)
            .map(|(c, _)| c.clone())
            .unwrap_or_else(|| Candidate::plain(ColumnType::String))
    }

    fn holds(&self, candidate: &Candidate, evidence: &ColumnEvidence) -> bool {
        match candidate.ty {
            ColumnType::Nothing => !evidence.has_values,
            ColumnType::String => true,
            _ => self
                .candidates
                .iter()
                .position(|c| c == candidate)
                .is_some_and(|i| evidence.accepts[i]),
        }
    }

    /// Convert raw values into `target`.
    ///
    /// `lines` gives the source line of each value, for error reporting.
    pub fn coerce(
        &self,
        target: &Candidate,
        raws: &[Option<String>],
        lines: &[usize],
    ) -> IngestionResult<Vec<Value>> {
        let mut out = Vec::with_capacity(raws.len());
        for (raw, line) in raws.iter().zip(lines) {
            let raw = match raw.as_deref() {
                Some(r) if !self.parser.is_null(r) => r,
                _ => {
                    out.push(Value::Null);
                    continue;
                }
            };
            match self.parse(target, raw) {
                Some(v) => out.push(v),
                None => {
                    return Err(IngestionError::TypeCoercion {
                        line: *line,
                        column: self.name.clone(),
                        raw: raw.to_string(),
                        target: target.describe(),
                    });
                }
            }
        }
        Ok(out)
    }
}

/// Which candidates accept every non-missing value seen so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnEvidence {
    accepts: Vec<bool>,
    has_values: bool,
}

impl ColumnEvidence {
    /// Record one raw value. Missing values and null literals leave the evidence unchanged.
    pub fn observe(&mut self, plan: &ColumnPlan, raw: Option<&str>) {
        let raw = match raw {
            Some(r) if !plan.parser.is_null(r) => r,
            _ => return,
        };
        self.has_values = true;
        for (candidate, ok) in plan.candidates.iter().zip(self.accepts.iter_mut()) {
            if *ok && plan.parse(candidate, raw).is_none() {
                *ok = false;
            }
        }
    }

    /// Intersect with evidence gathered over other rows of the same column.
    pub fn merge(&mut self, other: &ColumnEvidence) {
        for (a, b) in self.accepts.iter_mut().zip(&other.accepts) {
            *a &= *b;
        }
        self.has_values |= other.has_values;
    }

    /// True once a non-missing value has been observed.
    pub fn has_values(&self) -> bool {
        self.has_values
    }
}

fn is_integer_literal(s: &str) -> bool {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn is_decimal_literal(s: &str) -> bool {
    s.bytes()
        .any(|b| b.is_ascii_digit())
        && s
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
}

fn parse_bool(raw: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// True if `f64` represents the decimal literal `text` within `tolerance` (relative).
fn double_is_exact(text: &str, value: f64, tolerance: f64) -> bool {
    let (Ok(exact), Ok(approx)) = (
        BigDecimal::from_str(text),
        BigDecimal::from_str(&value.to_string()),
    ) else {
        return true;
    };
    if exact == approx {
        return true;
    }
    if exact.is_zero() {
        return false;
    }
    let relative = ((exact.clone() - approx).abs() / exact.abs())
        .to_f64()
        .unwrap_or(f64::INFINITY);
    relative <= tolerance
}

fn parse_value(
    candidate: &Candidate,
    raw: &str,
    parser: &ParserOptions,
    exact_tolerance: Option<f64>,
) -> Option<Value> {
    let pattern = candidate.pattern.as_deref();
    match candidate.ty {
        ColumnType::Boolean => parse_bool(raw).map(Value::Boolean),
        ColumnType::Integer => {
            let n = parser.locale.normalize(raw)?;
            if !is_integer_literal(&n) {
                return None;
            }
            n.parse::<i32>().ok().map(Value::Integer)
        }
        ColumnType::Long => {
            let n = parser.locale.normalize(raw)?;
            if !is_integer_literal(&n) {
                return None;
            }
            n.parse::<i64>().ok().map(Value::Long)
        }
        ColumnType::BigInteger => {
            let n = parser.locale.normalize(raw)?;
            if !is_integer_literal(&n) {
                return None;
            }
            BigInt::from_str(&n).ok().map(Value::BigInteger)
        }
        ColumnType::Double => {
            let n = parser.locale.normalize(raw)?;
            if !is_decimal_literal(&n) {
                return None;
            }
            // Out-of-range literals overflow to infinity; leave them to BigDecimal.
            let v = n.parse::<f64>().ok().filter(|v| v.is_finite())?;
            if let Some(tolerance) = exact_tolerance {
                if !double_is_exact(&n, v, tolerance) {
                    return None;
                }
            }
            Some(Value::Double(v))
        }
        ColumnType::BigDecimal => {
            let n = parser.locale.normalize(raw)?;
            if !is_decimal_literal(&n) {
                return None;
            }
            BigDecimal::from_str(&n).ok().map(Value::BigDecimal)
        }
        ColumnType::LocalDate => NaiveDate::parse_from_str(raw, pattern?)
            .ok()
            .map(Value::Date),
        ColumnType::LocalDateTime => NaiveDateTime::parse_from_str(raw, pattern?)
            .ok()
            .map(Value::DateTime),
        ColumnType::LocalTime => NaiveTime::parse_from_str(raw, pattern?)
            .ok()
            .map(Value::Time),
        ColumnType::String => Some(Value::String(raw.to_string())),
        ColumnType::Nothing => None,
    }
}

/// Infer the type of a single column of raw values and coerce it in one pass.
///
/// Convenience wrapper over [`ColumnPlan`] for callers that already hold a whole column.
pub fn infer_column(
    plan: &ColumnPlan,
    raws: &[Option<String>],
    inference: &InferenceOptions,
) -> IngestionResult<(ColumnType, Vec<Value>)> {
    let mut full = plan.empty_evidence();
    let mut sample = plan.empty_evidence();
    let sample_len = inference.sample_rows.unwrap_or(usize::MAX);
    for (i, raw) in raws.iter().enumerate() {
        full.observe(plan, raw.as_deref());
        if i < sample_len {
            sample.observe(plan, raw.as_deref());
        }
    }
    let target = plan.resolve(&sample, &full, inference.widening);
    let lines: Vec<usize> = (1..=raws.len()).collect();
    let values = plan.coerce(&target, raws, &lines)?;
    Ok((target.ty, values))
}
