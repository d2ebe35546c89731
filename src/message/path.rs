//! Path queries over an [`XmlDocument`].
//!
//! Supported grammar (a deliberately small XPath subset):
//!
//! ```text
//! expr  := path ( '|' path )*
//! path  := ( '/' | '//' ) step ( ( '/' | '//' ) step )*
//! step  := name | prefix ':' name | '*' | '@' name | 'text()'
//! ```
//!
//! Unprefixed names match on local name, so `//Query` finds both `<Query>` and
//! `<wfs:Query>`. Prefixed names match the qualified name as written.
//! `@attr` and `text()` are only valid as the last step.

use super::xml::{XmlDocument, XmlElement, XmlNode};
use super::{MessageError, MessageResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    Element { qualified: bool, name: String },
    AnyElement,
    Attribute(String),
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NodeTest,
}

/// A compiled path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    branches: Vec<Vec<Step>>,
}

/// One query hit.
#[derive(Debug, Clone, Copy)]
pub enum PathValue<'a> {
    Element(&'a XmlElement),
    Attribute {
        element: &'a XmlElement,
        name: &'a str,
        value: &'a str,
    },
    Text {
        element: &'a XmlElement,
        text: &'a str,
    },
}

impl<'a> PathValue<'a> {
    /// The element the value was found on (or is).
    pub fn element(&self) -> &'a XmlElement {
        match self {
            PathValue::Element(e) => e,
            PathValue::Attribute { element, .. } | PathValue::Text { element, .. } => element,
        }
    }

    pub fn string_value(&self) -> String {
        match self {
            PathValue::Element(e) => e.text(),
            PathValue::Attribute { value, .. } => value.to_string(),
            PathValue::Text { text, .. } => text.to_string(),
        }
    }
}

fn invalid(path: &str, reason: impl Into<String>) -> MessageError {
    MessageError::Path {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn parse_step(expr: &str, raw: &str, axis: Axis) -> MessageResult<Step> {
    let test = if raw == "*" {
        NodeTest::AnyElement
    } else if raw == "text()" {
        NodeTest::Text
    } else if let Some(attr) = raw.strip_prefix('@') {
        let local = attr.rsplit_once(':').map(|(_, l)| l).unwrap_or(attr);
        if !valid_name(local) {
            return Err(invalid(expr, format!("bad attribute name '{attr}'")));
        }
        NodeTest::Attribute(attr.to_string())
    } else {
        let (qualified, local) = match raw.split_once(':') {
            Some((prefix, local)) => {
                if !valid_name(prefix) {
                    return Err(invalid(expr, format!("bad prefix in '{raw}'")));
                }
                (true, local)
            }
            None => (false, raw),
        };
        if !valid_name(local) {
            return Err(invalid(expr, format!("bad step '{raw}'")));
        }
        NodeTest::Element {
            qualified,
            name: raw.to_string(),
        }
    };
    Ok(Step { axis, test })
}

fn parse_branch(expr: &str, branch: &str) -> MessageResult<Vec<Step>> {
    let mut rest = branch.trim();
    if !rest.starts_with('/') {
        return Err(invalid(expr, "paths must start with '/' or '//'"));
    }
    let mut steps = Vec::new();
    while !rest.is_empty() {
        let axis = if let Some(r) = rest.strip_prefix("//") {
            rest = r;
            Axis::Descendant
        } else if let Some(r) = rest.strip_prefix('/') {
            rest = r;
            Axis::Child
        } else {
            return Err(invalid(expr, "expected '/'"));
        };
        let end = rest.find('/').unwrap_or(rest.len());
        let raw = &rest[..end];
        if raw.is_empty() {
            return Err(invalid(expr, "empty step"));
        }
        if let Some(last) = steps.last() {
            if matches!(last, Step { test: NodeTest::Attribute(_) | NodeTest::Text, .. }) {
                return Err(invalid(expr, "attribute and text() must be the last step"));
            }
        }
        steps.push(parse_step(expr, raw, axis)?);
        rest = &rest[end..];
    }
    Ok(steps)
}

impl PathExpr {
    pub fn parse(expr: &str) -> MessageResult<Self> {
        let branches = expr
            .split('|')
            .map(|branch| parse_branch(expr, branch))
            .collect::<MessageResult<Vec<_>>>()?;
        Ok(Self { branches })
    }

    /// Evaluates every branch in turn; hits are returned branch by branch.
    pub fn select<'a>(&self, doc: &'a XmlDocument) -> Vec<PathValue<'a>> {
        self.branches
            .iter()
            .flat_map(|steps| evaluate(doc, steps))
            .collect()
    }
}

#[derive(Clone, Copy)]
enum Context<'a> {
    Document,
    Element(&'a XmlElement),
}

fn self_or_descendants<'a>(doc: &'a XmlDocument, ctx: Context<'a>) -> Vec<&'a XmlElement> {
    let base = match ctx {
        Context::Document => doc.root(),
        Context::Element(e) => e,
    };
    let mut out = vec![base];
    out.extend(base.descendants());
    out
}

fn element_matches(element: &XmlElement, test: &NodeTest) -> bool {
    match test {
        NodeTest::AnyElement => true,
        NodeTest::Element { qualified: true, name } => element.name == *name,
        NodeTest::Element { qualified: false, name } => element.local_name() == name,
        _ => false,
    }
}

fn evaluate<'a>(doc: &'a XmlDocument, steps: &[Step]) -> Vec<PathValue<'a>> {
    let mut contexts = vec![Context::Document];
    let mut hits = Vec::new();

    for (i, step) in steps.iter().enumerate() {
        let last = i + 1 == steps.len();
        let mut next: Vec<&'a XmlElement> = Vec::new();

        for ctx in &contexts {
            match &step.test {
                NodeTest::Attribute(name) => {
                    let owners = match (step.axis, ctx) {
                        (Axis::Descendant, _) => self_or_descendants(doc, *ctx),
                        (Axis::Child, Context::Element(e)) => vec![*e],
                        (Axis::Child, Context::Document) => Vec::new(),
                    };
                    for element in owners {
                        let found = element
                            .attributes
                            .iter()
                            .filter(|(k, _)| k != "xmlns" && !k.starts_with("xmlns:"))
                            .find(|(k, _)| {
                                k == name || (!name.contains(':') && k.rsplit(':').next() == Some(name.as_str()))
                            });
                        if let Some((k, v)) = found {
                            hits.push(PathValue::Attribute {
                                element,
                                name: k.as_str(),
                                value: v.as_str(),
                            });
                        }
                    }
                }
                NodeTest::Text => {
                    let owners = match (step.axis, ctx) {
                        (Axis::Descendant, _) => self_or_descendants(doc, *ctx),
                        (Axis::Child, Context::Element(e)) => vec![*e],
                        (Axis::Child, Context::Document) => Vec::new(),
                    };
                    for element in owners {
                        for child in &element.children {
                            if let XmlNode::Text(t) | XmlNode::CData(t) = child {
                                hits.push(PathValue::Text { element, text: t.as_str() });
                            }
                        }
                    }
                }
                test => {
                    let candidates: Vec<&'a XmlElement> = match (step.axis, ctx) {
                        (Axis::Child, Context::Document) => vec![doc.root()],
                        (Axis::Child, Context::Element(e)) => e.elements().collect(),
                        (Axis::Descendant, Context::Document) => self_or_descendants(doc, *ctx),
                        (Axis::Descendant, Context::Element(e)) => e.descendants(),
                    };
                    for candidate in candidates {
                        if element_matches(candidate, test) && !next.iter().any(|n| std::ptr::eq(*n, candidate)) {
                            next.push(candidate);
                        }
                    }
                }
            }
        }

        if matches!(step.test, NodeTest::Attribute(_) | NodeTest::Text) {
            return hits;
        }
        if last {
            return next.into_iter().map(PathValue::Element).collect();
        }
        contexts = next.into_iter().map(Context::Element).collect();
    }
    hits
}

/// Runs `path` against `doc`.
pub fn select<'a>(doc: &'a XmlDocument, path: &str) -> MessageResult<Vec<PathValue<'a>>> {
    Ok(PathExpr::parse(path)?.select(doc))
}

/// String value of the first non-blank hit, trimmed.
pub fn select_string(doc: &XmlDocument, path: &str) -> MessageResult<Option<String>> {
    Ok(select(doc, path)?
        .iter()
        .map(|hit| hit.string_value().trim().to_string())
        .find(|s| !s.is_empty()))
}
