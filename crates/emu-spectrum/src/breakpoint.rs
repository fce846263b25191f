//! Conditional breakpoints.
//!
//! A breakpoint carries a hit counter and an optional condition over it.
//! Every time execution reaches the breakpoint's address the counter goes up
//! by one, then the condition decides whether the machine stops.
//!
//! Conditions use the debugger's text form: `<n`, `<=n`, `=n`, `>n`, `>=n`
//! and `*n` (every n-th hit).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Relation between the hit counter and the condition value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HitType {
    /// Stop on every hit.
    #[default]
    None,
    Less,
    LessOrEqual,
    Equal,
    Greater,
    GreaterOrEqual,
    /// Stop when the counter is a multiple of the value.
    Multiple,
}

impl HitType {
    const fn operator(self) -> &'static str {
        match self {
            HitType::None => "",
            HitType::Less => "<",
            HitType::LessOrEqual => "<=",
            HitType::Equal => "=",
            HitType::Greater => ">",
            HitType::GreaterOrEqual => ">=",
            HitType::Multiple => "*",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BreakpointError {
    #[error("unknown hit condition operator in {0:?}")]
    UnknownOperator(String),
    #[error("hit condition value {0:?} is not a number between 0 and 65535")]
    InvalidValue(String),
    #[error("hit condition has an operator but no value")]
    Empty,
}

/// A parsed hit condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HitCondition {
    pub hit_type: HitType,
    pub value: u16,
}

impl HitCondition {
    /// Parse optional condition text. Absent text means "always stop".
    pub fn parse_optional(text: Option<&str>) -> Result<Self, BreakpointError> {
        text.map_or(Ok(Self::default()), str::parse)
    }
}

impl FromStr for HitCondition {
    type Err = BreakpointError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Self::default());
        }

        // Two-character operators first so "<=" is not read as "<".
        const OPERATORS: [(&str, HitType); 6] = [
            ("<=", HitType::LessOrEqual),
            (">=", HitType::GreaterOrEqual),
            ("<", HitType::Less),
            (">", HitType::Greater),
            ("=", HitType::Equal),
            ("*", HitType::Multiple),
        ];
        let (hit_type, rest) = OPERATORS
            .iter()
            .find_map(|&(op, hit_type)| text.strip_prefix(op).map(|rest| (hit_type, rest)))
            .ok_or_else(|| BreakpointError::UnknownOperator(text.to_string()))?;

        let rest = rest.trim();
        if rest.is_empty() {
            return Err(BreakpointError::Empty);
        }
        let value = rest
            .parse::<u16>()
            .map_err(|_| BreakpointError::InvalidValue(rest.to_string()))?;
        Ok(Self { hit_type, value })
    }
}

impl fmt::Display for HitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hit_type {
            HitType::None => Ok(()),
            other => write!(f, "{}{}", other.operator(), self.value),
        }
    }
}

/// A breakpoint as seen by the execution cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointInfo {
    /// Set for breakpoints on CPU addresses (as opposed to source lines).
    pub is_cpu_breakpoint: bool,
    pub hit_type: HitType,
    pub hit_condition_value: u16,
    pub current_hit_count: u32,
}

impl BreakpointInfo {
    /// A CPU breakpoint that stops on every hit.
    #[must_use]
    pub const fn minimum() -> Self {
        Self {
            is_cpu_breakpoint: true,
            hit_type: HitType::None,
            hit_condition_value: 0,
            current_hit_count: 0,
        }
    }

    #[must_use]
    pub const fn with_condition(condition: HitCondition) -> Self {
        Self {
            is_cpu_breakpoint: true,
            hit_type: condition.hit_type,
            hit_condition_value: condition.value,
            current_hit_count: 0,
        }
    }

    /// Build a CPU breakpoint from optional condition text.
    pub fn parse(condition: Option<&str>) -> Result<Self, BreakpointError> {
        HitCondition::parse_optional(condition).map(Self::with_condition)
    }

    #[must_use]
    pub fn condition(&self) -> HitCondition {
        HitCondition {
            hit_type: self.hit_type,
            value: self.hit_condition_value,
        }
    }

    /// Count a hit and decide whether execution stops here.
    pub fn hit(&mut self) -> bool {
        self.current_hit_count = self.current_hit_count.saturating_add(1);
        let count = self.current_hit_count;
        let value = u32::from(self.hit_condition_value);
        match self.hit_type {
            HitType::None => true,
            HitType::Less => count < value,
            HitType::LessOrEqual => count <= value,
            HitType::Equal => count == value,
            HitType::Greater => count > value,
            HitType::GreaterOrEqual => count >= value,
            HitType::Multiple => value != 0 && count % value == 0,
        }
    }

    pub fn reset_hit_count(&mut self) {
        self.current_hit_count = 0;
    }
}

impl Default for BreakpointInfo {
    fn default() -> Self {
        Self::minimum()
    }
}
