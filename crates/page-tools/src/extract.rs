use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

const MAX_PRICES: usize = 10;
const MAX_MATCHES: usize = 5;

static PRICE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\$\d+(?:\.\d{2})?",
        r"(?i)\d+(?:\.\d{2})?\s*(?:USD|dollars?)",
        r"\d+(?:\.\d{2})?\s*€",
        r"£\d+(?:\.\d{2})?",
        r"(?i)\d+(?:\.\d{2})?\s*(?:EUR|GBP)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("price pattern is valid"))
    .collect()
});

static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("body selector is valid"));
static TABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("table selector is valid"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("row selector is valid"));
static CELL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td, th").expect("cell selector is valid"));

const SKIPPED: &[&str] = &["head", "noscript", "script", "style", "template"];
const BLOCKS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "tfoot", "thead", "tr",
    "ul",
];

/// Visible text of the page, one entry per non-empty rendered line.
pub fn page_lines(document: &Html) -> Vec<String> {
    let root = document
        .select(&BODY)
        .next()
        .unwrap_or_else(|| document.root_element());
    let mut text = String::new();
    collect_text(root, &mut text);
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

// Approximates rendered text: whitespace collapses, block elements break lines.
fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            push_collapsed(out, text);
        } else if let Some(child) = ElementRef::wrap(child) {
            let name = child.value().name();
            if SKIPPED.contains(&name) {
                continue;
            }
            let block = BLOCKS.contains(&name);
            if block {
                out.push('\n');
            } else if name == "td" || name == "th" {
                push_collapsed(out, " ");
            }
            collect_text(child, out);
            if block {
                out.push('\n');
            }
        }
    }
}

fn push_collapsed(out: &mut String, text: &str) {
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !out.is_empty() && !out.ends_with(' ') && !out.ends_with('\n') {
                out.push(' ');
            }
        } else {
            out.push(ch);
        }
    }
}

pub fn extract_prices(lines: &[String]) -> String {
    let text = lines.join("\n");
    let mut found = IndexSet::new();
    for pattern in PRICE_PATTERNS.iter() {
        for hit in pattern.find_iter(&text) {
            found.insert(hit.as_str().trim().to_string());
        }
    }
    if found.is_empty() {
        return "No prices found on this page".to_string();
    }
    let listed: Vec<&str> = found.iter().take(MAX_PRICES).map(String::as_str).collect();
    format!("Found {} prices:\n{}", found.len(), listed.join(", "))
}

pub fn search_lines(lines: &[String], keyword: &str) -> String {
    let needle = keyword.to_lowercase();
    let matches: Vec<&str> = lines
        .iter()
        .filter(|line| line.to_lowercase().contains(&needle))
        .map(String::as_str)
        .collect();
    if matches.is_empty() {
        return format!(
            "No matches found for \"{keyword}\". Page contains {} lines of text.",
            lines.len()
        );
    }
    let shown = &matches[..matches.len().min(MAX_MATCHES)];
    format!(
        "Found {} matches for \"{keyword}\":\n\n{}",
        matches.len(),
        shown.join("\n")
    )
}

pub fn scrape_first_table(document: &Html) -> String {
    let Some(table) = document.select(&TABLE).next() else {
        return "No tables found on this page".to_string();
    };
    let rows: Vec<ElementRef<'_>> = table.select(&ROW).collect();
    if rows.is_empty() {
        return "Table found but no rows detected".to_string();
    }
    let data: Vec<String> = rows
        .into_iter()
        .map(|row| {
            row.select(&CELL)
                .map(|cell| cell.text().collect::<String>().trim().to_string())
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .filter(|row| !row.is_empty())
        .collect();
    format!(
        "Table data extracted ({} rows):\n\n{}",
        data.len(),
        data.join("\n")
    )
}

/// `tag#id.class.names`, the way the element would be written as a selector.
pub fn describe_element(element: ElementRef<'_>) -> String {
    let value = element.value();
    let mut label = value.name().to_ascii_lowercase();
    if let Some(id) = value.id().filter(|id| !id.is_empty()) {
        label.push('#');
        label.push_str(id);
    }
    let classes: Vec<&str> = value
        .attr("class")
        .map(|class| class.split_whitespace().collect())
        .unwrap_or_default();
    if !classes.is_empty() {
        label.push('.');
        label.push_str(&classes.join("."));
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(html: &str) -> Vec<String> {
        page_lines(&Html::parse_document(html))
    }

    #[test]
    fn inline_markup_stays_on_one_line() {
        let text = lines(
            "<body><h1>Sale</h1><p>Pro plan: <b>$29.99</b> per\n   month</p><script>x()</script></body>",
        );
        assert_eq!(text, vec!["Sale", "Pro plan: $29.99 per month"]);
    }

    #[test]
    fn prices_deduplicate_in_pattern_order() {
        let text = vec![
            "Only £5 today, was £7.50".to_string(),
            "$10 or 10 dollars, £7.50 again, 12.00 EUR".to_string(),
            "8.99€".to_string(),
        ];
        assert_eq!(
            extract_prices(&text),
            "Found 6 prices:\n$10, 10 dollars, 8.99€, £5, £7.50, 12.00 EUR"
        );
    }

    #[test]
    fn price_list_is_capped() {
        let text: Vec<String> = (1..=12).map(|n| format!("${n}")).collect();
        let result = extract_prices(&text);
        assert!(result.starts_with("Found 12 prices:\n$1, $2"));
        assert!(result.ends_with("$10"));
    }

    #[test]
    fn no_prices() {
        assert_eq!(
            extract_prices(&["nothing to buy".to_string()]),
            "No prices found on this page"
        );
    }

    #[test]
    fn search_limits_shown_matches() {
        let text: Vec<String> = (1..=7).map(|n| format!("Item {n}")).collect();
        let result = search_lines(&text, "item");
        assert!(result.starts_with("Found 7 matches for \"item\":\n\nItem 1\n"));
        assert!(result.ends_with("Item 5"));
    }

    #[test]
    fn describes_elements_like_selectors() {
        let document =
            Html::parse_document(r#"<body><a id="next" class="nav link">Next</a><p>x</p></body>"#);
        let anchor = document
            .select(&Selector::parse("a").unwrap())
            .next()
            .unwrap();
        assert_eq!(describe_element(anchor), "a#next.nav.link");
        let para = document
            .select(&Selector::parse("p").unwrap())
            .next()
            .unwrap();
        assert_eq!(describe_element(para), "p");
    }

    #[test]
    fn irregular_class_whitespace_collapses() {
        let document = Html::parse_document(
            "<body><a id=\"next\" class=\" nav  link\tactive \">Next</a><b class=\"  \">x</b></body>",
        );
        let anchor = document
            .select(&Selector::parse("a").unwrap())
            .next()
            .unwrap();
        assert_eq!(describe_element(anchor), "a#next.nav.link.active");
        let bold = document
            .select(&Selector::parse("b").unwrap())
            .next()
            .unwrap();
        assert_eq!(describe_element(bold), "b");
    }

    #[test]
    fn table_without_rows() {
        let document = Html::parse_document("<body><table></table></body>");
        assert_eq!(scrape_first_table(&document), "Table found but no rows detected");
    }
}
