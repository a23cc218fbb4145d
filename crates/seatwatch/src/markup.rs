//! Minimal markup-query capability used by the extractors.
//!
//! Extraction code is written against [`MarkupNode`] so it never touches the
//! HTML parser directly. [`HtmlDocument`] implements it over `scraper`.

use scraper::{ElementRef, Html, Selector};

/// Read-only access to an element of a parsed document.
pub trait MarkupNode: Sized {
    /// First descendant matching a CSS selector.
    fn find_first(&self, selector: &str) -> Option<Self>;

    /// All descendants matching a CSS selector, in document order.
    fn find_all(&self, selector: &str) -> Vec<Self>;

    /// Value of an attribute on this element.
    fn attr(&self, name: &str) -> Option<&str>;

    /// Concatenated text of this element and its descendants.
    fn text(&self) -> String;

    /// Lower-case tag name.
    fn tag_name(&self) -> &str;

    fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|c| c.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    /// Whether any descendant matches the selector.
    fn contains(&self, selector: &str) -> bool {
        self.find_first(selector).is_some()
    }
}

/// An owned, parsed HTML document.
pub struct HtmlDocument {
    html: Html,
}

impl HtmlDocument {
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }

    /// The document's root element.
    pub fn root(&self) -> HtmlNode<'_> {
        HtmlNode(self.html.root_element())
    }
}

/// A `scraper` element exposed through [`MarkupNode`].
#[derive(Clone, Copy)]
pub struct HtmlNode<'a>(ElementRef<'a>);

fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(sel) => Some(sel),
        Err(e) => {
            tracing::debug!("invalid selector '{selector}': {e:?}");
            None
        }
    }
}

impl<'a> MarkupNode for HtmlNode<'a> {
    fn find_first(&self, selector: &str) -> Option<Self> {
        let sel = parse_selector(selector)?;
        self.0.select(&sel).next().map(HtmlNode)
    }

    fn find_all(&self, selector: &str) -> Vec<Self> {
        match parse_selector(selector) {
            Some(sel) => self.0.select(&sel).map(HtmlNode).collect(),
            None => Vec::new(),
        }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.0.value().attr(name)
    }

    fn text(&self) -> String {
        self.0.text().collect()
    }

    fn tag_name(&self) -> &str {
        self.0.value().name()
    }
}
