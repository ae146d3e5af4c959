//! Boolean filters written with a MongoDB-like syntax
//!
//! ```yaml
//! condition: {num_cores: {$divisible: 4}}
//! vars_condition: {$and: [{npfft: {$lte: 4}}, {bandpp: 2}]}
//! ```
//!
//! Keys are either field names or operators. `field: value` tests equality,
//! `field: {$op: operand}` compares, and several keys in the same mapping
//! must all hold. A string operand that names a field of the record is
//! replaced by the value of that field.

use crate::error::{AbiQueueError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::{Mapping, Value};
use std::cmp::Ordering;
use std::fmt;

/// Scalar value extracted from a record
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl FieldValue {
    /// Convert a YAML scalar; sequences and mappings have no scalar value
    pub fn from_yaml(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(FieldValue::Number),
            Value::Bool(b) => Some(FieldValue::Bool(*b)),
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            Value::Tagged(tagged) => FieldValue::from_yaml(&tagged.value),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Anything a condition can be evaluated against
pub trait FieldSource {
    /// Value of the named field, `None` if the record has no such field
    fn field(&self, name: &str) -> Option<FieldValue>;
}

impl FieldSource for Mapping {
    fn field(&self, name: &str) -> Option<FieldValue> {
        self.get(name).and_then(FieldValue::from_yaml)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Divisible,
}

impl CmpOp {
    fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "$eq" => CmpOp::Eq,
            "$ne" => CmpOp::Ne,
            "$gt" => CmpOp::Gt,
            "$ge" | "$gte" => CmpOp::Ge,
            "$lt" => CmpOp::Lt,
            "$le" | "$lte" => CmpOp::Le,
            "$divisible" => CmpOp::Divisible,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Compare {
        field: String,
        op: CmpOp,
        operand: FieldValue,
    },
}

/// Parsed condition; the empty condition accepts every record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    expr: Option<Expr>,
    raw: Mapping,
}

impl Condition {
    /// Condition that is always true
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a condition from a YAML mapping
    pub fn from_mapping(raw: Mapping) -> Result<Self> {
        let expr = if raw.is_empty() {
            None
        } else {
            Some(parse_mapping(&raw)?)
        };
        Ok(Self { expr, raw })
    }

    /// Parse a condition written as a YAML (or JSON) string
    pub fn parse(s: &str) -> Result<Self> {
        let value: Value =
            serde_yaml::from_str(s).map_err(|e| AbiQueueError::yaml("condition", e))?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::empty()),
            Value::Mapping(map) => Self::from_mapping(map),
            other => Err(AbiQueueError::ConditionError(format!(
                "expected a mapping, got {:?}",
                other
            ))),
        }
    }

    /// True if no constraint is set
    pub fn is_empty(&self) -> bool {
        self.expr.is_none()
    }

    /// Evaluate the condition.
    ///
    /// Missing fields and type mismatches make the condition false.
    pub fn matches<S: FieldSource + ?Sized>(&self, obj: &S) -> bool {
        let Some(expr) = &self.expr else {
            return true;
        };

        match eval(expr, obj) {
            Ok(result) => result,
            Err(msg) => {
                tracing::warn!("Condition {} raised: {}", self, msg);
                false
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.raw) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{:?}", self.raw),
        }
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Condition::from_value(value).map_err(serde::de::Error::custom)
    }
}

fn key_str(key: &Value) -> Result<String> {
    match key {
        Value::String(s) => Ok(s.clone()),
        other => Err(AbiQueueError::ConditionError(format!(
            "keys must be strings, got {:?}",
            other
        ))),
    }
}

fn combine_and(mut exprs: Vec<Expr>) -> Expr {
    if exprs.len() == 1 {
        exprs.remove(0)
    } else {
        Expr::And(exprs)
    }
}

fn parse_mapping(map: &Mapping) -> Result<Expr> {
    let mut exprs = Vec::with_capacity(map.len());

    for (key, value) in map {
        let key = key_str(key)?;
        match key.as_str() {
            "$and" | "$or" => {
                let Value::Sequence(items) = value else {
                    return Err(AbiQueueError::ConditionError(format!(
                        "{} expects a list of conditions",
                        key
                    )));
                };
                let mut subs = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Mapping(m) => subs.push(parse_mapping(m)?),
                        other => {
                            return Err(AbiQueueError::ConditionError(format!(
                                "{} items must be mappings, got {:?}",
                                key, other
                            )))
                        }
                    }
                }
                if subs.is_empty() {
                    return Err(AbiQueueError::ConditionError(format!("empty {} list", key)));
                }
                exprs.push(if key == "$and" {
                    Expr::And(subs)
                } else {
                    Expr::Or(subs)
                });
            }
            "$not" => match value {
                Value::Mapping(m) => exprs.push(Expr::Not(Box::new(parse_mapping(m)?))),
                _ => {
                    return Err(AbiQueueError::ConditionError(
                        "$not expects a mapping".to_string(),
                    ))
                }
            },
            op if op.starts_with('$') => {
                return Err(AbiQueueError::ConditionError(format!(
                    "operator {} must be applied to a field",
                    op
                )));
            }
            field => exprs.push(parse_field(field, value)?),
        }
    }

    if exprs.is_empty() {
        return Err(AbiQueueError::ConditionError("empty sub-condition".to_string()));
    }
    Ok(combine_and(exprs))
}

fn parse_field(field: &str, value: &Value) -> Result<Expr> {
    let scalar = |v: &Value| {
        FieldValue::from_yaml(v).ok_or_else(|| {
            AbiQueueError::ConditionError(format!("operand of '{}' must be a scalar", field))
        })
    };

    let Value::Mapping(ops) = value else {
        return Ok(Expr::Compare {
            field: field.to_string(),
            op: CmpOp::Eq,
            operand: scalar(value)?,
        });
    };

    let mut exprs = Vec::with_capacity(ops.len());
    for (op_key, operand) in ops {
        let op_key = key_str(op_key)?;
        let op = CmpOp::from_key(&op_key).ok_or_else(|| {
            AbiQueueError::ConditionError(format!("unknown operator {} for '{}'", op_key, field))
        })?;
        exprs.push(Expr::Compare {
            field: field.to_string(),
            op,
            operand: scalar(operand)?,
        });
    }

    if exprs.is_empty() {
        return Err(AbiQueueError::ConditionError(format!(
            "no operator given for '{}'",
            field
        )));
    }
    Ok(combine_and(exprs))
}

fn eval<S: FieldSource + ?Sized>(expr: &Expr, obj: &S) -> std::result::Result<bool, String> {
    match expr {
        Expr::And(subs) => {
            for sub in subs {
                if !eval(sub, obj)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Expr::Or(subs) => {
            for sub in subs {
                if eval(sub, obj)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Expr::Not(sub) => Ok(!eval(sub, obj)?),
        Expr::Compare { field, op, operand } => {
            let lhs = obj
                .field(field)
                .ok_or_else(|| format!("record has no field '{}'", field))?;
            let rhs = match operand {
                FieldValue::Text(name) => obj.field(name).unwrap_or_else(|| operand.clone()),
                _ => operand.clone(),
            };
            compare(&lhs, *op, &rhs)
        }
    }
}

fn compare(lhs: &FieldValue, op: CmpOp, rhs: &FieldValue) -> std::result::Result<bool, String> {
    if op == CmpOp::Divisible {
        return match (lhs, rhs) {
            (FieldValue::Number(a), FieldValue::Number(b)) if *b != 0.0 => Ok(a % b == 0.0),
            _ => Err(format!("cannot test divisibility of {} by {}", lhs, rhs)),
        };
    }

    let ordering = match (lhs, rhs) {
        (FieldValue::Number(a), FieldValue::Number(b)) => a.partial_cmp(b),
        (FieldValue::Text(a), FieldValue::Text(b)) => Some(a.cmp(b)),
        (FieldValue::Bool(a), FieldValue::Bool(b)) => {
            if matches!(op, CmpOp::Eq | CmpOp::Ne) {
                Some(a.cmp(b))
            } else {
                None
            }
        }
        _ => None,
    }
    .ok_or_else(|| format!("cannot compare {} with {}", lhs, rhs))?;

    Ok(match op {
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Ge => ordering != Ordering::Less,
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Divisible => unreachable!("handled above"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_empty_condition_accepts_everything() {
        let cond = Condition::parse("{}").unwrap();
        assert!(cond.is_empty());
        assert!(cond.matches(&record("a: 1")));
    }

    #[test]
    fn test_comparisons() {
        let rec = record("num_cores: 8\nefficiency: 0.9\nsolver: cg");

        assert!(Condition::parse("{num_cores: 8}").unwrap().matches(&rec));
        assert!(Condition::parse("{num_cores: {$gt: 4}}").unwrap().matches(&rec));
        assert!(!Condition::parse("{num_cores: {$lt: 4}}").unwrap().matches(&rec));
        assert!(Condition::parse("{num_cores: {$divisible: 4}}").unwrap().matches(&rec));
        assert!(Condition::parse("{efficiency: {$gte: 0.9}}").unwrap().matches(&rec));
        assert!(Condition::parse("{solver: {$ne: lobpcg}}").unwrap().matches(&rec));
    }

    #[test]
    fn test_logical_operators() {
        let rec = record("npfft: 4\nbandpp: 2");

        let cond = Condition::parse("{$and: [{npfft: {$lte: 4}}, {bandpp: 2}]}").unwrap();
        assert!(cond.matches(&rec));

        let cond = Condition::parse("{$or: [{npfft: 1}, {bandpp: 3}]}").unwrap();
        assert!(!cond.matches(&rec));

        let cond = Condition::parse("{$not: {npfft: 1}}").unwrap();
        assert!(cond.matches(&rec));

        // Sibling keys are combined with AND.
        let cond = Condition::parse("{npfft: 4, bandpp: {$gt: 2}}").unwrap();
        assert!(!cond.matches(&rec));
    }

    #[test]
    fn test_field_name_operand() {
        let rec = record("mpi_ncpus: 4\nnpband: 4");
        let cond = Condition::parse("{mpi_ncpus: {$eq: npband}}").unwrap();
        assert!(cond.matches(&rec));
    }

    #[test]
    fn test_missing_field_is_false() {
        let cond = Condition::parse("{missing: {$gt: 1}}").unwrap();
        assert!(!cond.matches(&record("present: 1")));

        let cond = Condition::parse("{present: {$gt: text}}").unwrap();
        assert!(!cond.matches(&record("present: 1")));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(Condition::parse("{$gt: 3}").is_err());
        assert!(Condition::parse("{a: {$between: [1, 2]}}").is_err());
        assert!(Condition::parse("{$and: {a: 1}}").is_err());
        assert!(Condition::parse("[1, 2]").is_err());
    }
}
