//! Page-side executor for the stock browser tools.
//!
//! [`PageExecutor`] holds a snapshot of the loaded page and answers every
//! request arriving on a [`RemoteEndpoint`] exactly once, so the agent never
//! has to fall back on its timeout while a page is being served.

pub mod extract;

use agent_core::browser_tools::{
    CLICK_BUTTON, EXTRACT_PRICES, NAVIGATE_TO, SCRAPE_TABLE, SEARCH_DOM,
};
use agent_core::{RemoteEndpoint, ToolResponse, ToolResult};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_CLICK_SELECTOR: &str = r#"button, input[type="button"], input[type="submit"], a"#;
pub const DEFAULT_SEARCH_KEYWORD: &str = "content";
const NO_PAGE: &str = "No page content available";

static DEFAULT_CLICKABLE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(DEFAULT_CLICK_SELECTOR).expect("default click selector is valid")
});

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PageToolError {
    #[error("No URL provided")]
    MissingUrl,
    #[error("invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSnapshot {
    pub url: String,
    pub html: Option<String>,
}

impl PageSnapshot {
    pub fn loaded(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: Some(html.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickRecord {
    pub selector: String,
    pub element: String,
}

#[derive(Debug, Default)]
pub struct PageExecutor {
    page: PageSnapshot,
    clicks: Vec<ClickRecord>,
}

impl PageExecutor {
    pub fn new(page: PageSnapshot) -> Self {
        Self {
            page,
            clicks: Vec::new(),
        }
    }

    pub fn page(&self) -> &PageSnapshot {
        &self.page
    }

    pub fn clicks(&self) -> &[ClickRecord] {
        &self.clicks
    }

    /// Answer requests until the bridge goes away, then hand the executor back.
    pub async fn serve(mut self, mut endpoint: RemoteEndpoint) -> Self {
        while let Some(request) = endpoint.next_request().await {
            let result = self.execute(&request.tool, request.argument.as_deref());
            let response = ToolResponse {
                correlation_id: request.correlation_id,
                result,
            };
            if endpoint.respond(response).await.is_err() {
                debug!(target: "page_tools", "bridge closed while responding");
                break;
            }
        }
        self
    }

    pub fn execute(&mut self, tool: &str, argument: Option<&str>) -> ToolResult {
        info!(target: "page_tools", tool, argument = ?argument, url = %self.page.url, "executing tool");
        let outcome = match tool {
            EXTRACT_PRICES => Ok(self.read_page(|document| {
                extract::extract_prices(&extract::page_lines(document))
            })),
            SEARCH_DOM => {
                let keyword = argument
                    .map(str::trim)
                    .filter(|keyword| !keyword.is_empty())
                    .unwrap_or(DEFAULT_SEARCH_KEYWORD);
                Ok(self.read_page(|document| {
                    extract::search_lines(&extract::page_lines(document), keyword)
                }))
            }
            SCRAPE_TABLE => Ok(self.read_page(extract::scrape_first_table)),
            CLICK_BUTTON => self.click(argument),
            NAVIGATE_TO => self.navigate(argument),
            _ => {
                warn!(target: "page_tools", tool, "unknown tool requested");
                return ToolResult::UnknownTool;
            }
        };
        match outcome {
            Ok(text) => ToolResult::Output(text),
            Err(err) => {
                warn!(target: "page_tools", tool, error = %err, "tool failed");
                ToolResult::Error(err.to_string())
            }
        }
    }

    fn read_page<F>(&self, read: F) -> String
    where
        F: FnOnce(&Html) -> String,
    {
        match self.page.html.as_deref() {
            Some(html) => read(&Html::parse_document(html)),
            None => NO_PAGE.to_string(),
        }
    }

    fn click(&mut self, selector: Option<&str>) -> Result<String, PageToolError> {
        let Some(html) = self.page.html.as_deref() else {
            return Ok(NO_PAGE.to_string());
        };
        let document = Html::parse_document(html);

        let requested = selector.map(str::trim).filter(|s| !s.is_empty());
        let custom;
        let (selector_text, parsed) = match requested {
            Some(text) => {
                custom =
                    Selector::parse(text).map_err(|err| PageToolError::InvalidSelector {
                        selector: text.to_string(),
                        reason: err.to_string(),
                    })?;
                (text, &custom)
            }
            None => (DEFAULT_CLICK_SELECTOR, &*DEFAULT_CLICKABLE),
        };

        let Some(element) = document.select(parsed).next() else {
            return Ok(format!(
                "No clickable elements found matching selector: {selector_text}"
            ));
        };
        let label = extract::describe_element(element);
        self.clicks.push(ClickRecord {
            selector: selector_text.to_string(),
            element: label.clone(),
        });
        Ok(format!("Successfully clicked element: {label}"))
    }

    fn navigate(&mut self, url: Option<&str>) -> Result<String, PageToolError> {
        let url = url.map(str::trim).unwrap_or_default();
        if url.is_empty() {
            return Err(PageToolError::MissingUrl);
        }
        let target = if url.starts_with("http") {
            url.to_string()
        } else {
            format!("https://{url}")
        };
        self.page = PageSnapshot {
            url: target.clone(),
            html: None,
        };
        Ok(format!("Successfully navigated to: {target}"))
    }
}
