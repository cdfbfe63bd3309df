//! Stage definitions
//!
//! The three stages are fixed and ordered. Descriptions and goals are templates
//! rendered against [`SearchCriteria`](crate::criteria::SearchCriteria).

use serde::Serialize;
use std::fmt;

/// Which of the three stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Discovery,
    Extraction,
    Validation,
}

impl StageKind {
    pub const ALL: [StageKind; 3] = [Self::Discovery, Self::Extraction, Self::Validation];

    pub fn next(self) -> Option<StageKind> {
        match self {
            Self::Discovery => Some(Self::Extraction),
            Self::Extraction => Some(Self::Validation),
            Self::Validation => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Extraction => "extraction",
            Self::Validation => "validation",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persona the stage's agent is prompted with
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRole {
    pub role: String,
    pub goal: String,
    pub backstory: String,
}

/// One pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStage {
    pub kind: StageKind,
    pub agent: AgentRole,
    pub description: String,
    pub expected_output: String,
    /// Artifact file name, relative to the output directory
    pub output_file: String,
    pub human_input: bool,
    pub tools: Vec<String>,
    /// Stages whose artifacts this stage reads
    pub upstream: Vec<StageKind>,
}

impl PipelineStage {
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(String::as_str).collect()
    }
}

pub const OPPORTUNITIES_FILE: &str = "opportunities.json";
pub const EXTRACTED_FILE: &str = "extracted_info.json";
pub const VALIDATED_FILE: &str = "validated_info.json";

/// The discovery, extraction and validation stages, in run order
pub fn standard_stages() -> Vec<PipelineStage> {
    vec![discovery_stage(), extraction_stage(), validation_stage()]
}

fn discovery_stage() -> PipelineStage {
    PipelineStage {
        kind: StageKind::Discovery,
        agent: AgentRole {
            role: "Internship Opportunity Finder".to_string(),
            goal: "Identify {num_leads} {conditions} opportunities in positions {positions} \
                   within industries {industries} with qualifications {qualifications} and \
                   skills {skills}, located in {location}. Exclude positions related to \
                   {excluded_positions}."
                .to_string(),
            backstory: "Specializes in researching and identifying internship or associate \
                        opportunities for master's level candidates in specified fields, \
                        industries, and locations. Focuses on finding relevant job postings \
                        and company websites."
                .to_string(),
        },
        description: "Search for {num_leads} {conditions} opportunities in positions {positions} \
                      within industries {industries} with qualifications {qualifications} and \
                      skills {skills}, located in {location}. Exclude positions related to \
                      {excluded_positions}."
            .to_string(),
        expected_output: "A list of internship or associate job postings or company websites \
                          relevant to the specified criteria, as a JSON object of the form \
                          {\"candidates\": [{\"title\", \"company\", \"url\", \"location\", \
                          \"snippet\"}]}."
            .to_string(),
        output_file: OPPORTUNITIES_FILE.to_string(),
        human_input: true,
        tools: vec!["web_search".to_string(), "scrape_website".to_string()],
        upstream: vec![],
    }
}

fn extraction_stage() -> PipelineStage {
    PipelineStage {
        kind: StageKind::Extraction,
        agent: AgentRole {
            role: "Information Extractor".to_string(),
            goal: "Extract company websites, roles, positions, and deadlines (if available) \
                   from job postings and company websites."
                .to_string(),
            backstory: "Expert in analyzing job postings and company websites to locate and \
                        extract key information needed for applications."
                .to_string(),
        },
        description: "Extract company websites, roles, positions, and deadlines (if available) \
                      from the job postings and company websites identified. Produce one \
                      entry per candidate."
            .to_string(),
        expected_output: "Details including company website, role, position, and application \
                          deadline, as a JSON array of objects with keys 'Company Website', \
                          'Role', 'Position Title', and 'Deadline' (null when unknown)."
            .to_string(),
        output_file: EXTRACTED_FILE.to_string(),
        human_input: false,
        tools: vec!["scrape_website".to_string()],
        upstream: vec![StageKind::Discovery],
    }
}

fn validation_stage() -> PipelineStage {
    PipelineStage {
        kind: StageKind::Validation,
        agent: AgentRole {
            role: "Data Validation Specialist".to_string(),
            goal: "Validate and organize extracted information. Ensure all data is accurate, \
                   complete, and outputted as a JSON array of objects with keys: \
                   'Company Website', 'Role', 'Position Title', and 'Deadline'."
                .to_string(),
            backstory: "With an analytical mindset and a focus on accuracy, you specialize in \
                        validating and structuring data."
                .to_string(),
        },
        description: "Validate the extracted information. Ensure all data is accurate, \
                      complete, and formatted as a JSON array with keys: 'Company Website', \
                      'Role', 'Position Title', and 'Deadline'."
            .to_string(),
        expected_output: "A JSON array of validated and organized information ready for output."
            .to_string(),
        output_file: VALIDATED_FILE.to_string(),
        human_input: false,
        tools: vec![],
        upstream: vec![StageKind::Extraction],
    }
}
