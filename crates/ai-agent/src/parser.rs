//! Turns free-form assistant replies into a [`ReasoningStep`].
//!
//! The model is asked to answer in a `Thought:` / `Action:` / `Final Answer:`
//! format. Markers are matched byte-exact.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const THOUGHT_MARKER: &str = "Thought:";
pub const ACTION_MARKER: &str = "Action:";
pub const FINAL_ANSWER_MARKER: &str = "Final Answer:";

static ACTION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Action: ([A-Za-z_][A-Za-z0-9_]*)").expect("action pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReasoningStep {
    Thought {
        text: String,
    },
    Action {
        tool_name: String,
        argument: Option<String>,
    },
    FinalAnswer {
        text: String,
    },
    Unparseable {
        raw_text: String,
    },
}

impl ReasoningStep {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinalAnswer { .. })
    }

    /// Canonical text form, understood by [`parse`].
    pub fn render(&self) -> String {
        match self {
            Self::Thought { text } => format!("{THOUGHT_MARKER} {text}"),
            Self::Action {
                tool_name,
                argument: Some(argument),
            } => format!("{ACTION_MARKER} {tool_name}({argument})"),
            Self::Action {
                tool_name,
                argument: None,
            } => format!("{ACTION_MARKER} {tool_name}"),
            Self::FinalAnswer { text } => format!("{FINAL_ANSWER_MARKER} {text}"),
            Self::Unparseable { raw_text } => raw_text.clone(),
        }
    }
}

impl fmt::Display for ReasoningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Parse one assistant reply.
///
/// A final answer wins over any action in the same reply. Otherwise the last
/// action in the reply is the one acted upon.
pub fn parse(text: &str) -> ReasoningStep {
    if let Some(idx) = text.find(FINAL_ANSWER_MARKER) {
        let answer = &text[idx + FINAL_ANSWER_MARKER.len()..];
        return ReasoningStep::FinalAnswer {
            text: answer.trim().to_string(),
        };
    }

    if let Some(captures) = ACTION_PATTERN.captures_iter(text).last() {
        if let Some(name) = captures.get(1) {
            let argument = parenthesized_argument(&text[name.end()..]);
            return ReasoningStep::Action {
                tool_name: name.as_str().to_string(),
                argument,
            };
        }
    }

    if let Some(thought) = last_thought(text) {
        return ReasoningStep::Thought { text: thought };
    }

    ReasoningStep::Unparseable {
        raw_text: text.to_string(),
    }
}

/// The most recent `Thought:` line of a reply, if any.
pub fn last_thought(text: &str) -> Option<String> {
    let idx = text.rfind(THOUGHT_MARKER)?;
    let rest = &text[idx + THOUGHT_MARKER.len()..];
    let line = rest.lines().next().unwrap_or_default().trim();
    Some(line.to_string())
}

// Reads a balanced `( ... )` group that starts right after the tool name and
// closes on the same line. Empty parentheses count as no argument.
fn parenthesized_argument(rest: &str) -> Option<String> {
    let body = rest.strip_prefix('(')?;
    let mut depth = 1usize;
    for (idx, ch) in body.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let argument = body[..idx].trim();
                    return (!argument.is_empty()).then(|| argument.to_string());
                }
            }
            '\n' => return None,
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(name: &str, argument: Option<&str>) -> ReasoningStep {
        ReasoningStep::Action {
            tool_name: name.to_string(),
            argument: argument.map(str::to_string),
        }
    }

    #[test]
    fn final_answer_takes_everything_after_marker() {
        let step = parse("Thought: I know it.\nFinal Answer:   $19.99 and $29.99 \n");
        assert_eq!(
            step,
            ReasoningStep::FinalAnswer {
                text: "$19.99 and $29.99".into()
            }
        );
        assert!(step.is_terminal());
    }

    #[test]
    fn final_answer_wins_over_action() {
        let reply = "Thought: look\nAction: extract_prices\nObservation: Found 3 prices\nFinal Answer: three prices";
        assert_eq!(
            parse(reply),
            ReasoningStep::FinalAnswer {
                text: "three prices".into()
            }
        );
    }

    #[test]
    fn action_without_argument() {
        let reply = "Thought: I need to look for prices.\nAction: extract_prices";
        assert_eq!(parse(reply), action("extract_prices", None));
    }

    #[test]
    fn action_with_argument_is_trimmed_and_unescaped() {
        assert_eq!(
            parse("Action: search_dom(  contact \\n info )"),
            action("search_dom", Some("contact \\n info"))
        );
    }

    #[test]
    fn nested_parentheses_are_kept() {
        assert_eq!(
            parse("Action: search_dom(price (USD)) now"),
            action("search_dom", Some("price (USD)"))
        );
    }

    #[test]
    fn empty_or_unclosed_parentheses_mean_no_argument() {
        assert_eq!(parse("Action: scrape_table()"), action("scrape_table", None));
        assert_eq!(
            parse("Action: search_dom(open\nended)"),
            action("search_dom", None)
        );
    }

    #[test]
    fn last_action_is_used() {
        let reply = "Action: scrape_table\nThought: actually\nAction: click_button(#buy)";
        assert_eq!(parse(reply), action("click_button", Some("#buy")));
    }

    #[test]
    fn tool_name_must_be_an_identifier() {
        assert!(matches!(
            parse("Action: 9lives"),
            ReasoningStep::Unparseable { .. }
        ));
        assert_eq!(parse("Action: _private1"), action("_private1", None));
    }

    #[test]
    fn markers_are_case_sensitive() {
        assert!(matches!(
            parse("final answer: nope\naction: extract_prices"),
            ReasoningStep::Unparseable { .. }
        ));
    }

    #[test]
    fn action_marker_needs_exactly_one_space() {
        for reply in ["Action:extract_prices", "Action:\textract_prices", "Action:\t\textract_prices"] {
            assert!(
                matches!(parse(reply), ReasoningStep::Unparseable { .. }),
                "{reply:?}"
            );
        }
        assert_eq!(parse("Action: extract_prices"), action("extract_prices", None));
    }

    #[test]
    fn thought_only_reply() {
        assert_eq!(
            parse("Thought: I should think harder.\nmore text"),
            ReasoningStep::Thought {
                text: "I should think harder.".into()
            }
        );
    }

    #[test]
    fn unparseable_keeps_raw_text() {
        assert_eq!(
            parse("Sure! Let me help."),
            ReasoningStep::Unparseable {
                raw_text: "Sure! Let me help.".into()
            }
        );
    }

    #[test]
    fn rendered_steps_parse_back() {
        let answer = ReasoningStep::FinalAnswer { text: "X".into() };
        assert_eq!(parse(&answer.render()), answer);

        let call = action("navigate_to", Some("example.com"));
        assert_eq!(parse(&call.render()), call);
    }
}
