use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::error::BrowserResult;

/// Typed page primitives the checker flows are written against. Nothing at
/// this layer retries; retry is decided by the caller.
#[async_trait]
pub trait PageStepExecutor: Send + Sync {
    /// Loads `url` and waits for the page to settle, failing with
    /// `BrowserError::Navigation` when it does not within `timeout`.
    async fn navigate(&self, url: &str, timeout: Duration) -> BrowserResult<()>;

    async fn current_url(&self) -> BrowserResult<String>;

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> BrowserResult<()>;

    async fn wait_for_predicate(
        &self,
        predicate: &DomPredicate,
        timeout: Duration,
    ) -> BrowserResult<()>;

    /// Identifies the document currently loaded. Take it before the action
    /// that should navigate away.
    async fn navigation_marker(&self) -> BrowserResult<NavigationMarker>;

    /// Waits until the page has moved off the document `from` was taken on,
    /// then lets it settle. Times out when the page never moves.
    async fn wait_for_navigation(
        &self,
        from: &NavigationMarker,
        timeout: Duration,
    ) -> BrowserResult<()>;

    /// Clicks the target if it is present right now. Whatever the click
    /// triggers is not awaited here.
    async fn click(&self, target: &ClickTarget) -> BrowserResult<()>;

    async fn type_text(&self, selector: &str, text: &str) -> BrowserResult<()>;

    /// Reads the rendered text of every `item` inside every `container`.
    /// Returns an empty list when nothing matches.
    async fn extract_text(
        &self,
        container: &str,
        item: &str,
        fields: &[FieldSelector],
    ) -> Vec<ExtractedRecord>;

    async fn screenshot(&self, path: &Path) -> BrowserResult<()>;

    async fn close(&mut self) -> BrowserResult<()>;
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> BrowserResult<Box<dyn PageStepExecutor>>;
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationMarker {
    pub href: String,
    /// `performance.timeOrigin`; changes with every new document.
    pub time_origin: f64,
}

impl NavigationMarker {
    pub const SCRIPT: &'static str =
        "({ href: window.location.href, timeOrigin: performance.timeOrigin })";

    pub fn new(href: impl Into<String>, time_origin: f64) -> Self {
        Self {
            href: href.into(),
            time_origin,
        }
    }

    /// True after a full document load or a client-side route change.
    pub fn moved_from(&self, earlier: &NavigationMarker) -> bool {
        self.href != earlier.href || self.time_origin != earlier.time_origin
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomPredicate {
    CountAtLeast { selector: String, min: usize },
    /// The page host is neither `domain` nor one of its subdomains.
    HostOutside(String),
}

impl DomPredicate {
    pub fn count_at_least(selector: impl Into<String>, min: usize) -> Self {
        DomPredicate::CountAtLeast {
            selector: selector.into(),
            min,
        }
    }

    pub fn script(&self) -> String {
        match self {
            DomPredicate::CountAtLeast { selector, min } => format!(
                "document.querySelectorAll({}).length >= {min}",
                js_string(selector)
            ),
            DomPredicate::HostOutside(domain) => format!(
                "(() => {{ const host = window.location.hostname; const domain = {}; return host !== domain && !host.endsWith(\".\" + domain); }})()",
                js_string(domain)
            ),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            DomPredicate::CountAtLeast { selector, min } => format!("{min}+ x {selector}"),
            DomPredicate::HostOutside(domain) => format!("departure from {domain}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickTarget {
    Selector(String),
    Nth { selector: String, index: usize },
    WithText { selector: String, text: String },
}

impl ClickTarget {
    pub fn selector(selector: impl Into<String>) -> Self {
        ClickTarget::Selector(selector.into())
    }

    pub fn nth(selector: impl Into<String>, index: usize) -> Self {
        ClickTarget::Nth {
            selector: selector.into(),
            index,
        }
    }

    pub fn with_text(selector: impl Into<String>, text: impl Into<String>) -> Self {
        ClickTarget::WithText {
            selector: selector.into(),
            text: text.into(),
        }
    }

    /// Script evaluating to `true` when the element was found and clicked.
    pub fn script(&self) -> String {
        let lookup = match self {
            ClickTarget::Selector(selector) => {
                format!("document.querySelector({})", js_string(selector))
            }
            ClickTarget::Nth { selector, index } => format!(
                "document.querySelectorAll({})[{index}]",
                js_string(selector)
            ),
            ClickTarget::WithText { selector, text } => format!(
                "Array.from(document.querySelectorAll({})).find((el) => el.textContent.trim() === {})",
                js_string(selector),
                js_string(text)
            ),
        };
        format!("(() => {{ const el = {lookup}; if (!el) {{ return false; }} el.click(); return true; }})()")
    }

    pub fn describe(&self) -> String {
        match self {
            ClickTarget::Selector(selector) => selector.clone(),
            ClickTarget::Nth { selector, index } => format!("{selector}[{index}]"),
            ClickTarget::WithText { selector, text } => format!("{selector} ({text:?})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelector {
    pub name: String,
    pub selector: String,
}

impl FieldSelector {
    pub fn new(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ExtractedRecord(BTreeMap<String, Option<String>>);

impl ExtractedRecord {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.map(Into::into)))
                .collect(),
        )
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|value| value.as_deref())
    }
}

pub fn extraction_script(container: &str, item: &str, fields: &[FieldSelector]) -> String {
    let field_map = fields
        .iter()
        .map(|field| (field.name.clone(), Value::String(field.selector.clone())))
        .collect::<Map<_, _>>();
    format!(
        r#"(() => {{
    const fields = {fields};
    const records = [];
    document.querySelectorAll({container}).forEach((container) => {{
        container.querySelectorAll({item}).forEach((node) => {{
            const record = {{}};
            for (const [name, selector] of Object.entries(fields)) {{
                const hit = node.querySelector(selector);
                record[name] = hit ? hit.textContent.trim() : null;
            }}
            records.push(record);
        }});
    }});
    return records;
}})()"#,
        fields = Value::Object(field_map),
        container = js_string(container),
        item = js_string(item),
    )
}

fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}
