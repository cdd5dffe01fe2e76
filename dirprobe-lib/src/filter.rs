//! Status filtering for finished outcomes.
//!
//! The prober itself never filters; this is for callers deciding which
//! outcomes to display. Filters are written as comma-separated terms:
//! exact codes (`200`), inclusive ranges (`301-308`), classes (`4xx`) and
//! the literal `unknown`.

use crate::error::ProbeError;
use crate::types::{Outcome, ProbeStatus};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusMatcher {
    Exact(u16),
    Range(u16, u16),
    Class(u16),
}

impl StatusMatcher {
    fn matches(&self, code: u16) -> bool {
        match *self {
            StatusMatcher::Exact(expected) => code == expected,
            StatusMatcher::Range(low, high) => (low..=high).contains(&code),
            StatusMatcher::Class(class) => code / 100 == class,
        }
    }
}

impl fmt::Display for StatusMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusMatcher::Exact(code) => write!(f, "{}", code),
            StatusMatcher::Range(low, high) => write!(f, "{}-{}", low, high),
            StatusMatcher::Class(class) => write!(f, "{}xx", class),
        }
    }
}

/// Set of statuses an outcome must match to be kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFilter {
    matchers: Vec<StatusMatcher>,
    include_unknown: bool,
}

impl StatusFilter {
    /// Filter that keeps every outcome.
    pub fn all() -> Self {
        Self {
            matchers: vec![StatusMatcher::Range(0, u16::MAX)],
            include_unknown: true,
        }
    }

    pub fn matches(&self, outcome: &Outcome) -> bool {
        match outcome.status {
            ProbeStatus::Code(code) => self.matchers.iter().any(|m| m.matches(code)),
            ProbeStatus::Unknown => self.include_unknown,
        }
    }

    /// Keep only the outcomes that match.
    pub fn apply<'a>(&self, outcomes: &'a [Outcome]) -> Vec<&'a Outcome> {
        outcomes.iter().filter(|o| self.matches(o)).collect()
    }
}

impl Default for StatusFilter {
    /// Keep `200` only.
    fn default() -> Self {
        Self {
            matchers: vec![StatusMatcher::Exact(200)],
            include_unknown: false,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut matchers = Vec::new();
        let mut include_unknown = false;

        for term in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let lower = term.to_ascii_lowercase();
            if lower == "unknown" {
                include_unknown = true;
            } else if let Some(class) = lower.strip_suffix("xx") {
                let class = parse_code(term, class)?;
                if !(1..=5).contains(&class) {
                    return Err(invalid(term, "status class must be 1xx to 5xx"));
                }
                matchers.push(StatusMatcher::Class(class));
            } else if let Some((low, high)) = lower.split_once('-') {
                let low = parse_code(term, low)?;
                let high = parse_code(term, high)?;
                if low > high {
                    return Err(invalid(term, "range start is after range end"));
                }
                matchers.push(StatusMatcher::Range(low, high));
            } else {
                matchers.push(StatusMatcher::Exact(parse_code(term, &lower)?));
            }
        }

        if matchers.is_empty() && !include_unknown {
            return Err(ProbeError::config("status filter cannot be empty"));
        }

        Ok(Self {
            matchers,
            include_unknown,
        })
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut terms: Vec<String> = self.matchers.iter().map(|m| m.to_string()).collect();
        if self.include_unknown {
            terms.push("unknown".to_string());
        }
        f.write_str(&terms.join(","))
    }
}

fn parse_code(term: &str, digits: &str) -> Result<u16, ProbeError> {
    digits
        .trim()
        .parse::<u16>()
        .map_err(|_| invalid(term, "expected a status code"))
}

fn invalid(term: &str, reason: &str) -> ProbeError {
    ProbeError::config(format!("invalid status filter term '{}': {}", term, reason))
}
