//! Multi-strategy locator generation.
//!
//! Every strategy that matches contributes a locator; order encodes priority,
//! most stable first. The positional XPath is always appended last, so the
//! result is never empty.

use std::collections::HashSet;

use crate::models::{ElementSnapshot, Locator, LocatorStrategy, TEST_DATA_ATTRIBUTES};

/// Longest trimmed text (in chars) used for text-based locators
pub const DEFAULT_TEXT_MAX_CHARS: usize = 59;

#[derive(Debug, Clone)]
pub struct LocatorOptions {
    pub text_max_chars: usize,
}

impl Default for LocatorOptions {
    fn default() -> Self {
        Self {
            text_max_chars: DEFAULT_TEXT_MAX_CHARS,
        }
    }
}

/// Build the ranked, de-duplicated locator list for one element
pub fn generate_locators(element: &ElementSnapshot, options: &LocatorOptions) -> Vec<Locator> {
    if !element.connected {
        tracing::debug!("Generating locators for a detached <{}>", element.tag);
    }

    let tag = tag_or_wildcard(&element.tag);
    let mut candidates: Vec<Locator> = Vec::new();

    if let Some(id) = element.attr(&element.id) {
        candidates.push(Locator::id(id));
    }

    if let Some(name) = element.attr(&element.name) {
        candidates.push(Locator::name(name));
    }

    for attr in TEST_DATA_ATTRIBUTES {
        let value = element
            .data_attributes
            .get(attr)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty());
        if let Some(value) = value {
            candidates.push(Locator::css(format!("[{}=\"{}\"]", attr, css_string(value))));
        }
    }

    if let Some(role) = element.attr(&element.role) {
        candidates.push(Locator::css(format!("[role=\"{}\"]", css_string(&role))));
    }

    if let Some(label) = element.attr(&element.aria_label) {
        candidates.push(Locator::xpath(format!(
            "//{}[@aria-label={}]",
            tag,
            xpath_literal(&label, '"')
        )));
    }

    if let Some(selector) = class_selector(tag, element.class_name.as_deref()) {
        candidates.push(Locator::css(selector));
    }

    let text = normalize_space(element.trimmed_text());
    if !text.is_empty() {
        if tag == "a" {
            candidates.push(Locator::new(LocatorStrategy::LinkText, text.clone()));
            candidates.push(Locator::new(LocatorStrategy::PartialLinkText, text.clone()));
        }
        if text.chars().count() <= options.text_max_chars {
            candidates.push(Locator::xpath(format!(
                "//{}[normalize-space()={}]",
                tag,
                xpath_literal(&text, '"')
            )));
        }
    }

    candidates.push(Locator::xpath(full_xpath(element)));

    dedupe(candidates)
}

/// Positional XPath from the nearest ancestor with an id (or the root) down to the element.
///
/// Index suffixes are only written when siblings share the tag.
pub fn full_xpath(element: &ElementSnapshot) -> String {
    let mut segments: Vec<String> = Vec::with_capacity(element.ancestry.len());

    for node in &element.ancestry {
        let tag = tag_or_wildcard(&node.tag);
        let id = node.id.as_deref().map(str::trim).filter(|id| !id.is_empty());

        if let Some(id) = id {
            let head = format!("//{}[@id={}]", tag, xpath_literal(id, '\''));
            segments.reverse();
            return if segments.is_empty() {
                head
            } else {
                format!("{}/{}", head, segments.join("/"))
            };
        }

        if node.same_tag_siblings > 1 {
            segments.push(format!("{}[{}]", tag, node.index));
        } else {
            segments.push(tag.to_string());
        }
    }

    if segments.is_empty() {
        return format!("//{}", tag_or_wildcard(&element.tag));
    }

    segments.reverse();
    format!("/{}", segments.join("/"))
}

/// Collapse `strategy|value` collisions, keeping the first occurrence
fn dedupe(candidates: Vec<Locator>) -> Vec<Locator> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|locator| seen.insert(locator.key()))
        .collect()
}

fn tag_or_wildcard(tag: &str) -> &str {
    if tag.is_empty() {
        "*"
    } else {
        tag
    }
}

fn class_selector(tag: &str, class_name: Option<&str>) -> Option<String> {
    let classes: Vec<String> = class_name?
        .split_ascii_whitespace()
        .map(css_ident)
        .collect();

    if classes.is_empty() {
        return None;
    }

    Some(format!("{}.{}", tag, classes.join(".")))
}

fn normalize_space(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Escape a value for use inside a double-quoted CSS attribute selector
fn css_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Escape a class name as a CSS identifier (`md:flex` -> `md\:flex`)
fn css_ident(class: &str) -> String {
    let mut out = String::with_capacity(class.len());
    for (i, c) in class.chars().enumerate() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() {
            if i == 0 && c.is_ascii_digit() {
                out.push_str(&format!("\\3{} ", c));
            } else {
                out.push(c);
            }
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// Quote a string as an XPath literal, preferring `quote`.
///
/// XPath 1.0 has no escapes, so values holding both quote kinds become `concat()`.
pub fn xpath_literal(value: &str, quote: char) -> String {
    let other = if quote == '"' { '\'' } else { '"' };
    if !value.contains(quote) {
        return format!("{}{}{}", quote, value, quote);
    }
    if !value.contains(other) {
        return format!("{}{}{}", other, value, other);
    }

    let parts: Vec<String> = value
        .split('"')
        .map(|part| format!("\"{}\"", part))
        .collect();
    format!("concat({})", parts.join(", '\"', "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PathSegment;

    fn opts() -> LocatorOptions {
        LocatorOptions::default()
    }

    fn login_email() -> ElementSnapshot {
        ElementSnapshot::new("input")
            .with_id("email")
            .with_name("email")
            .with_type("email")
            .with_data("data-testid", "login-email")
            .within(PathSegment::new("form"))
            .within(PathSegment::new("body"))
            .within(PathSegment::new("html"))
    }

    #[test]
    fn test_id_comes_first() {
        let locators = generate_locators(&login_email(), &opts());
        assert_eq!(locators[0], Locator::id("email"));
        assert_eq!(locators[1], Locator::name("email"));
        assert!(locators.contains(&Locator::css("[data-testid=\"login-email\"]")));
    }

    #[test]
    fn test_full_ranking_order() {
        let element = ElementSnapshot::new("a")
            .with_name("nav")
            .with_data("data-cy", "docs")
            .with_role("link")
            .with_aria_label("Docs")
            .with_class("nav-link  active")
            .with_text("  Read the docs ")
            .nth(2, 3)
            .within(PathSegment::new("li"))
            .within(PathSegment::new("ul").with_id("menu"));

        let locators = generate_locators(&element, &opts());
        let strategies: Vec<String> = locators.iter().map(|l| l.to_string()).collect();
        assert_eq!(
            strategies,
            vec![
                "name=nav",
                "css=[data-cy=\"docs\"]",
                "css=[role=\"link\"]",
                "xpath=//a[@aria-label=\"Docs\"]",
                "css=a.nav-link.active",
                "link_text=Read the docs",
                "partial_link_text=Read the docs",
                "xpath=//a[normalize-space()=\"Read the docs\"]",
                "xpath=//ul[@id='menu']/li/a[2]",
            ]
        );
    }

    #[test]
    fn test_fallback_always_present() {
        let bare = ElementSnapshot::new("div");
        let locators = generate_locators(&bare, &opts());
        assert_eq!(locators, vec![Locator::xpath("/div")]);

        let mut detached = ElementSnapshot::new("span");
        detached.ancestry.clear();
        detached.connected = false;
        assert_eq!(generate_locators(&detached, &opts()), vec![Locator::xpath("//span")]);
    }

    #[test]
    fn test_positional_path_omits_single_indices() {
        let element = ElementSnapshot::new("td")
            .nth(3, 4)
            .within(PathSegment::new("tr").nth(2, 2))
            .within(PathSegment::new("tbody"))
            .within(PathSegment::new("table"))
            .within(PathSegment::new("div").nth(1, 2))
            .within(PathSegment::new("body"))
            .within(PathSegment::new("html"));
        assert_eq!(full_xpath(&element), "/html/body/div[1]/table/tbody/tr[2]/td[3]");
    }

    #[test]
    fn test_own_id_short_circuits_path() {
        let element = ElementSnapshot::new("button")
            .with_id("submit-btn")
            .within(PathSegment::new("form").with_id("login"));
        assert_eq!(full_xpath(&element), "//button[@id='submit-btn']");
    }

    #[test]
    fn test_long_text_excluded() {
        let long = "x".repeat(60);
        let element = ElementSnapshot::new("p").with_text(&long);
        let locators = generate_locators(&element, &opts());
        assert!(locators.iter().all(|l| !l.value.contains("normalize-space")));

        let fits = "y".repeat(59);
        let element = ElementSnapshot::new("p").with_text(&fits);
        let locators = generate_locators(&element, &opts());
        assert!(locators.iter().any(|l| l.value.contains("normalize-space")));
    }

    #[test]
    fn test_long_link_text_still_gives_link_locators() {
        let text = "a".repeat(80);
        let element = ElementSnapshot::new("a").with_text(&text);
        let locators = generate_locators(&element, &opts());
        assert_eq!(locators[0].strategy, LocatorStrategy::LinkText);
        assert_eq!(locators[1].strategy, LocatorStrategy::PartialLinkText);
        assert_eq!(locators.len(), 3);
    }

    #[test]
    fn test_duplicates_collapse() {
        // id and name equal but different strategies: both stay
        let element = ElementSnapshot::new("input").with_id("q").with_name("q");
        let locators = generate_locators(&element, &opts());
        let mut keys: Vec<String> = locators.iter().map(|l| l.key()).collect();
        let before = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), before);
        assert_eq!(&locators[..2], &[Locator::id("q"), Locator::name("q")]);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let element = login_email();
        assert_eq!(generate_locators(&element, &opts()), generate_locators(&element, &opts()));
    }

    #[test]
    fn test_missing_class_name_skips_class_strategy() {
        let svg: ElementSnapshot =
            serde_json::from_str(r#"{"tag":"svg","className":{"baseVal":"icon"}}"#).unwrap();
        let locators = generate_locators(&svg, &opts());
        assert!(locators.iter().all(|l| !l.value.starts_with("svg.")));
    }

    #[test]
    fn test_quoting() {
        assert_eq!(xpath_literal("plain", '"'), "\"plain\"");
        assert_eq!(xpath_literal("say \"hi\"", '"'), "'say \"hi\"'");
        assert_eq!(xpath_literal("it's", '\''), "\"it's\"");
        assert_eq!(
            xpath_literal("it's \"x\"", '"'),
            "concat(\"it's \", '\"', \"x\", '\"', \"\")"
        );
        assert_eq!(css_ident("md:flex"), "md\\:flex");
        assert_eq!(css_ident("2col"), "\\32 col");
    }
}
