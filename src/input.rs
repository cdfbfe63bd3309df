//! Input collector
//!
//! Gathers location, lead count and industries. Values given on the command line
//! are used as-is; the rest are prompted for on the terminal unless interactive
//! input is disabled. A bad lead count is fatal, there is no reprompt.

use crate::config::CriteriaSection;
use crate::criteria::{parse_lead_count, parse_list, InputError, SearchCriteria};
use std::io::{BufRead, Write};
use std::num::NonZeroU32;

/// Values already supplied by flags
#[derive(Debug, Clone, Default)]
pub struct InputOverrides {
    pub location: Option<String>,
    pub num_leads: Option<NonZeroU32>,
    pub industries: Option<String>,
}

/// Prompts the operator for whatever the overrides leave open
pub struct InputCollector<R, W> {
    reader: R,
    writer: W,
    interactive: bool,
}

impl InputCollector<std::io::StdinLock<'static>, std::io::Stdout> {
    /// Collector bound to the process terminal
    pub fn terminal(interactive: bool) -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout(), interactive)
    }
}

impl<R: BufRead, W: Write> InputCollector<R, W> {
    pub fn new(reader: R, writer: W, interactive: bool) -> Self {
        Self {
            reader,
            writer,
            interactive,
        }
    }

    /// Build the run's criteria
    pub fn collect(
        &mut self,
        fixed: &CriteriaSection,
        overrides: InputOverrides,
    ) -> Result<SearchCriteria, InputError> {
        let location = match overrides.location {
            Some(location) => location,
            None => self.prompt("location", "Enter the location (e.g., New York City): ")?,
        };

        let num_leads = match overrides.num_leads {
            Some(n) => n,
            None => {
                let raw = self.prompt("lead count", "Enter the number of leads to generate: ")?;
                parse_lead_count(&raw)?
            }
        };

        let industries = match overrides.industries {
            Some(raw) => raw,
            None => self.prompt(
                "industries",
                "Enter the industries (e.g., Insurance, Hedge Funds, Banks): ",
            )?,
        };

        SearchCriteria::new(fixed, location, num_leads, parse_list(&industries))
    }

    fn prompt(&mut self, field: &'static str, text: &str) -> Result<String, InputError> {
        if !self.interactive {
            return Err(InputError::MissingValue(field));
        }

        write!(self.writer, "{text}")?;
        self.writer.flush()?;

        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(InputError::EndOfInput(field));
        }
        Ok(line.trim().to_string())
    }
}
