//! Extraction of typed content blocks from assistant text.
//!
//! Blocks are fenced as ```` ```artifact:<type> ```` or
//! ```` ```artifact:<type>:<Title> ````. Unknown types are left as plain text.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Document,
    Chart,
    Table,
    Diagram,
    Code,
    Calendar,
    Form,
}

impl ArtifactKind {
    /// Fence tag written when an artifact is rendered back into text.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Document => "html",
            Self::Chart => "chart",
            Self::Table => "table",
            Self::Diagram => "mermaid",
            Self::Code => "code",
            Self::Calendar => "calendar",
            Self::Form => "form",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "html" | "document" => Some(Self::Document),
            "chart" => Some(Self::Chart),
            "table" => Some(Self::Table),
            "mermaid" | "diagram" => Some(Self::Diagram),
            "code" => Some(Self::Code),
            "calendar" => Some(Self::Calendar),
            "form" => Some(Self::Form),
            _ => None,
        }
    }

    pub fn fallback_title(&self) -> &'static str {
        match self {
            Self::Document => "Document",
            Self::Chart => "Chart",
            Self::Table => "Table",
            Self::Diagram => "Diagram",
            Self::Code => "Code",
            Self::Calendar => "Calendar",
            Self::Form => "Form",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub kind: ArtifactKind,
    pub title: String,
    pub content: String,
}

impl Artifact {
    /// Renders the artifact in fence form with its resolved title made explicit.
    pub fn to_fenced(&self) -> String {
        format!("```artifact:{}:{}\n{}\n```", self.kind.tag(), self.title, self.content)
    }
}

#[derive(Debug)]
pub struct ArtifactParser {
    block: Regex,
    heading: Regex,
    html_title: Regex,
    tags: Regex,
}

impl ArtifactParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            block: Regex::new(r"(?s)```artifact:([\w-]+)(?::([^\r\n]*))?\r?\n(.*?)```")?,
            heading: Regex::new(r"(?is)<h[1-6][^>]*>(.*?)</h[1-6]>")?,
            html_title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>")?,
            tags: Regex::new(r"<[^>]+>")?,
        })
    }

    /// Returns every recognised block in source order.
    pub fn parse(&self, text: &str) -> Vec<Artifact> {
        self.block
            .captures_iter(text)
            .filter_map(|captures| {
                let kind = ArtifactKind::parse(captures.get(1)?.as_str())?;
                let content = captures.get(3).map(|m| m.as_str().trim()).unwrap_or_default();
                let explicit = captures
                    .get(2)
                    .map(|m| m.as_str().trim())
                    .filter(|title| !title.is_empty());
                Some((kind, explicit.map(str::to_string), content.to_string()))
            })
            .enumerate()
            .map(|(index, (kind, explicit, content))| {
                let title = explicit
                    .or_else(|| self.derive_title(kind, &content))
                    .unwrap_or_else(|| kind.fallback_title().to_string());
                Artifact { id: format!("artifact-{}", index + 1), kind, title, content }
            })
            .collect()
    }

    fn derive_title(&self, kind: ArtifactKind, content: &str) -> Option<String> {
        match kind {
            ArtifactKind::Document => self
                .html_title
                .captures(content)
                .or_else(|| self.heading.captures(content))
                .and_then(|captures| captures.get(1))
                .map(|inner| self.tags.replace_all(inner.as_str(), "").trim().to_string())
                .filter(|title| !title.is_empty()),
            ArtifactKind::Chart
            | ArtifactKind::Table
            | ArtifactKind::Calendar
            | ArtifactKind::Form => json_title(content),
            ArtifactKind::Diagram | ArtifactKind::Code => None,
        }
    }
}

fn json_title(content: &str) -> Option<String> {
    let value: Value = serde_json::from_str(content).ok()?;
    value
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(str::to_string)
}
