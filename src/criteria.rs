//! Run parameters for one search
//!
//! [`SearchCriteria`] is built once from operator input plus the fixed lists in
//! the `[criteria]` config section, and is read-only afterwards. Stage
//! description templates are rendered from it with `{placeholder}` fields.

use crate::config::CriteriaSection;
use serde::Serialize;
use std::num::NonZeroU32;
use thiserror::Error;

/// Typed search filters for a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchCriteria {
    positions: Vec<String>,
    industries: Vec<String>,
    qualifications: Vec<String>,
    skills: Vec<String>,
    excluded_positions: Vec<String>,
    conditions: Vec<String>,
    location: String,
    num_leads: NonZeroU32,
}

/// Input collection errors
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Lead count must be a positive integer, got '{0}'")]
    InvalidLeadCount(String),
    #[error("Location must not be empty")]
    EmptyLocation,
    #[error("No value supplied for {0} and interactive input is disabled")]
    MissingValue(&'static str),
    #[error("Input stream closed while reading {0}")]
    EndOfInput(&'static str),
    #[error("Terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse a lead count; anything other than an integer greater than zero is rejected
pub fn parse_lead_count(raw: &str) -> Result<NonZeroU32, InputError> {
    raw.trim()
        .parse::<NonZeroU32>()
        .map_err(|_| InputError::InvalidLeadCount(raw.trim().to_string()))
}

/// Split a comma-separated list, trimming entries and dropping empty ones
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

impl SearchCriteria {
    pub fn new(
        fixed: &CriteriaSection,
        location: impl Into<String>,
        num_leads: NonZeroU32,
        industries: Vec<String>,
    ) -> Result<Self, InputError> {
        let location = location.into().trim().to_string();
        if location.is_empty() {
            return Err(InputError::EmptyLocation);
        }

        Ok(Self {
            positions: fixed.positions.clone(),
            industries,
            qualifications: fixed.qualifications.clone(),
            skills: fixed.skills.clone(),
            excluded_positions: fixed.excluded_positions.clone(),
            conditions: fixed.conditions.clone(),
            location,
            num_leads,
        })
    }

    pub fn positions(&self) -> &[String] {
        &self.positions
    }

    pub fn industries(&self) -> &[String] {
        &self.industries
    }

    pub fn qualifications(&self) -> &[String] {
        &self.qualifications
    }

    pub fn skills(&self) -> &[String] {
        &self.skills
    }

    pub fn excluded_positions(&self) -> &[String] {
        &self.excluded_positions
    }

    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn num_leads(&self) -> u32 {
        self.num_leads.get()
    }

    /// Value substituted for a template placeholder, if the name is known
    fn placeholder(&self, name: &str) -> Option<String> {
        let list = |values: &[String]| {
            if values.is_empty() {
                "any".to_string()
            } else {
                values.join(", ")
            }
        };

        Some(match name {
            "positions" => list(&self.positions),
            "industries" => list(&self.industries),
            "qualifications" => list(&self.qualifications),
            "skills" => list(&self.skills),
            "excluded_positions" => list(&self.excluded_positions),
            "conditions" => list(&self.conditions),
            "location" => self.location.clone(),
            "num_leads" => self.num_leads.to_string(),
            _ => return None,
        })
    }

    /// Replace every `{name}` placeholder; unknown names are left untouched
    pub fn render(&self, template: &str) -> String {
        let mut rendered = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            rendered.push_str(&rest[..open]);
            let after_open = &rest[open + 1..];
            match after_open.find('}') {
                Some(close) => {
                    let name = &after_open[..close];
                    match self.placeholder(name) {
                        Some(value) => rendered.push_str(&value),
                        None => {
                            rendered.push('{');
                            rendered.push_str(name);
                            rendered.push('}');
                        }
                    }
                    rest = &after_open[close + 1..];
                }
                None => {
                    rendered.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        rendered.push_str(rest);
        rendered
    }
}
