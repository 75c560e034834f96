//! The stock set of page tools, all executed on the page side of the bridge.

use ai_agent::{RegistryError, ToolDescription, ToolRegistry};

pub const EXTRACT_PRICES: &str = "extract_prices";
pub const SEARCH_DOM: &str = "search_dom";
pub const CLICK_BUTTON: &str = "click_button";
pub const SCRAPE_TABLE: &str = "scrape_table";
pub const NAVIGATE_TO: &str = "navigate_to";

pub fn browser_tool_descriptions() -> Vec<ToolDescription> {
    vec![
        ToolDescription::new(EXTRACT_PRICES, "Extract all prices from the current page"),
        ToolDescription::new(SEARCH_DOM, "Find text matching a pattern and return context")
            .with_argument("keyword"),
        ToolDescription::new(CLICK_BUTTON, "Click the first visible button on the page")
            .with_argument("selector"),
        ToolDescription::new(SCRAPE_TABLE, "Extract and return table data"),
        ToolDescription::new(NAVIGATE_TO, "Open a different page in the browser")
            .with_argument("url"),
    ]
}

pub fn default_browser_registry() -> Result<ToolRegistry, RegistryError> {
    browser_tool_descriptions()
        .into_iter()
        .fold(ToolRegistry::builder(), |builder, description| {
            builder.remote(description)
        })
        .build()
}
