//! Builtin tools: Serper web search and website scraping.
//!
//! Pure request/response shaping lives in associated functions so it can be
//! tested without the network.

pub mod scrape_website;
pub mod web_search;

pub use scrape_website::ScrapeWebsiteTool;
pub use web_search::WebSearchTool;
