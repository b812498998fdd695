use archivist_core::ForumTarget;
use chrono::DateTime;
use engine_logging::engine_warn;

use crate::fragment::{Element, Fragment, Node};

/// Deepest quote nesting that is still rebuilt. Depth 0 is a quote that is not
/// inside another quote.
pub const MAX_QUOTE_DEPTH: usize = 20;

const TIMESTAMP_ATTR: &str = "data-ipsquote-timestamp";
const USERNAME_ATTR: &str = "data-ipsquote-username";
const USERID_ATTR: &str = "data-ipsquote-userid";
const QUOTE_ATTR_PREFIX: &str = "data-ipsquote-";
const CITATION_DATE_FORMAT: &str = "On %-m/%-d/%Y at %-I:%M %p";

/// Normalizes scraped post bodies: rebuilds quote blocks into one canonical
/// shape and makes protocol-relative resource references absolute.
#[derive(Debug, Clone)]
pub struct ContentRewriter {
    target: ForumTarget,
    max_depth: usize,
}

impl ContentRewriter {
    pub fn new(target: ForumTarget) -> Self {
        Self {
            target,
            max_depth: MAX_QUOTE_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn rewrite_html(&self, html: &str) -> String {
        let mut fragment = Fragment::parse(html);
        self.rewrite(&mut fragment);
        fragment.to_html()
    }

    pub fn rewrite(&self, fragment: &mut Fragment) {
        self.rewrite_quotes(&mut fragment.nodes, 0);
        resolve_protocol_relative(&mut fragment.nodes);
    }

    /// Rebuilds every quote in `nodes` that is not inside another quote of
    /// `nodes`, at nesting level `depth`.
    fn rewrite_quotes(&self, nodes: &mut [Node], depth: usize) {
        let mut pending: Vec<&mut Node> = nodes.iter_mut().collect();
        while let Some(node) = pending.pop() {
            let Node::Element(element) = node else {
                continue;
            };
            if !is_quote(element) {
                pending.extend(element.children.iter_mut());
                continue;
            }
            if depth > self.max_depth {
                engine_warn!(
                    "quote nesting deeper than {} levels left unrewritten",
                    self.max_depth
                );
                continue;
            }
            let source = std::mem::take(element);
            *element = self.rebuild_quote(source, depth);
        }
    }

    fn rebuild_quote(&self, source: Element, depth: usize) -> Element {
        let username = source.attr(USERNAME_ATTR).unwrap_or_default().trim().to_string();
        let user_id = source.attr(USERID_ATTR).unwrap_or_default().trim().to_string();
        let date = source.attr(TIMESTAMP_ATTR).map_or_else(unknown_time, format_timestamp);

        let mut quote_attrs: Vec<(String, String)> = source
            .attrs
            .iter()
            .filter(|(key, _)| key.starts_with(QUOTE_ATTR_PREFIX))
            .cloned()
            .collect();
        quote_attrs.sort();

        let mut citation = Element::new("div").with_attr("class", "ipsQuote_citation");
        if username.is_empty() {
            citation = citation.with_text("Quote");
        } else {
            let old_citation = source
                .child_elements()
                .find(|e| e.is("div") && e.has_class("ipsQuote_citation"));
            if let Some(old) = old_citation {
                if let Some(toggle) = old.find_descendant(is_toggle_anchor) {
                    let mut toggle = toggle.clone();
                    toggle.remove_attr("href");
                    citation = citation.with_child(toggle);
                }
                if let Some(follow) = old.find_descendant(is_follow_anchor) {
                    let mut follow = follow.clone();
                    if let Some(href) = follow.attr("href").map(absolutize) {
                        follow.set_attr("href", href);
                    }
                    citation = citation.with_child(follow);
                }
            }
            citation = citation.with_text(format!("{date}, "));
            let mut author = Element::new("a");
            if !user_id.is_empty() {
                author.set_attr("href", self.target.profile_url(&user_id, &username));
            }
            citation = citation.with_child(author.with_text(username)).with_text(" said:");
        }

        let mut body = quote_body(source.children);
        self.rewrite_quotes(&mut body, depth + 1);

        let mut rebuilt = Element::new("blockquote")
            .with_attr("class", "ipsQuote")
            .with_attr("data-expanded", "false");
        rebuilt.attrs.extend(quote_attrs);

        let mut contents = Element::new("div").with_attr("class", "ipsQuote_contents");
        contents.children = body;

        rebuilt
            .with_child(citation)
            .with_child(contents)
            .with_child(
                Element::new("div")
                    .with_attr("class", "expand-label")
                    .with_text("Expand ▼"),
            )
    }
}

/// Children of the `ipsQuote_contents` wrapper. Without one, everything but
/// the old citation and expand label is the body.
fn quote_body(children: Vec<Node>) -> Vec<Node> {
    let wrapper = children.iter().position(|node| {
        node.as_element()
            .is_some_and(|e| e.is("div") && e.has_class("ipsQuote_contents"))
    });
    match wrapper {
        Some(index) => match children.into_iter().nth(index) {
            Some(Node::Element(contents)) => contents.children,
            _ => Vec::new(),
        },
        None => children
            .into_iter()
            .filter(|node| {
                !node.as_element().is_some_and(|e| {
                    e.is("div")
                        && (e.has_class("ipsQuote_citation") || e.has_class("expand-label"))
                })
            })
            .collect(),
    }
}

fn is_quote(element: &Element) -> bool {
    element.is("blockquote") && element.has_class("ipsQuote")
}

fn is_toggle_anchor(element: &Element) -> bool {
    element.is("a") && element.attr("data-action") == Some("toggleQuote")
}

fn is_follow_anchor(element: &Element) -> bool {
    element.is("a") && element.has_class("ipsPos_right")
}

fn unknown_time() -> String {
    "Unknown time".to_string()
}

fn format_timestamp(raw: &str) -> String {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map_or_else(unknown_time, |at| at.format(CITATION_DATE_FORMAT).to_string())
}

fn absolutize(value: &str) -> String {
    if value.starts_with("//") {
        format!("https:{value}")
    } else {
        value.to_string()
    }
}

fn resolve_protocol_relative(nodes: &mut [Node]) {
    let mut pending: Vec<&mut Node> = nodes.iter_mut().collect();
    while let Some(node) = pending.pop() {
        let Node::Element(element) = node else {
            continue;
        };
        for (key, value) in element.attrs.iter_mut() {
            if (key == "src" || key == "href") && value.starts_with("//") {
                *value = absolutize(value);
            }
        }
        pending.extend(element.children.iter_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_render_in_forum_style() {
        assert_eq!(format_timestamp("1700000000"), "On 11/14/2023 at 10:13 PM");
        assert_eq!(format_timestamp("0"), "On 1/1/1970 at 12:00 AM");
        assert_eq!(format_timestamp("soon"), "Unknown time");
    }

    #[test]
    fn only_protocol_relative_values_change() {
        assert_eq!(absolutize("//cdn.example/a.png"), "https://cdn.example/a.png");
        assert_eq!(absolutize("/local.png"), "/local.png");
        assert_eq!(absolutize("http://x/a"), "http://x/a");
    }
}
