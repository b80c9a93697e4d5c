//! Title and visible-text extraction from HTML documents.

use scraper::{ElementRef, Html, Node};

/// Elements whose text never renders.
const HIDDEN: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Page title and rendered body text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedPage {
    pub title: String,
    pub text: String,
}

impl FetchedPage {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self { title: title.into(), text: text.into() }
    }

    /// Cache representation: `"{title}.\n\n{text}"`.
    pub fn content(&self) -> String {
        format!("{}.\n\n{}", self.title, self.text)
    }
}

/// Extract the `<title>` and the visible text of `<body>`.
///
/// Text nodes are trimmed and joined with newlines, approximating what a
/// browser reports as `innerText`. Content of script, style and similar
/// elements is skipped.
pub fn extract_page(html: &str) -> FetchedPage {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let title = find_element(root, "title")
        .map(|t| t.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();

    let body = find_element(root, "body").unwrap_or(root);
    let mut lines = Vec::new();
    for node in body.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| a.value().as_element().is_some_and(|e| HIDDEN.contains(&e.name())));
        if hidden {
            continue;
        }
        let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !line.is_empty() {
            lines.push(line);
        }
    }

    FetchedPage { title, text: lines.join("\n") }
}

fn find_element<'a>(root: ElementRef<'a>, name: &str) -> Option<ElementRef<'a>> {
    root.descendants().filter_map(ElementRef::wrap).find(|e| e.value().name() == name)
}
