//! Declarative component metadata.
//!
//! A [`FormSpec`] describes a component tree to construct: named fields, each
//! with a widget kind and kind-specific details (options for selects, child
//! fields for groups). Specs are authored in JSON or YAML and validated
//! structurally before construction begins.
//!
//! ```yaml
//! name: login
//! title: Sign in
//! fields:
//!   - name: username
//!     kind: text
//!     required: true
//!   - name: remember
//!     kind: checkbox
//!     default: true
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Maximum group nesting depth accepted by validation.
pub const MAX_NESTING_DEPTH: usize = 8;

/// Widget kinds the metadata model knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKind {
    /// Single-line text input.
    Text,
    /// Numeric input.
    Number,
    /// Boolean toggle.
    Checkbox,
    /// Date input.
    Date,
    /// Single choice from a list of options.
    Select,
    /// Container of child fields.
    Group,
}

impl WidgetKind {
    /// Wire name, e.g. `"text"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Checkbox => "checkbox",
            Self::Date => "date",
            Self::Select => "select",
            Self::Group => "group",
        }
    }

    /// All known kinds.
    pub fn all() -> &'static [WidgetKind] {
        &[
            Self::Text,
            Self::Number,
            Self::Checkbox,
            Self::Date,
            Self::Select,
            Self::Group,
        ]
    }

    /// Whether the kind carries options.
    pub fn is_choice(&self) -> bool {
        matches!(self, Self::Select)
    }

    /// Whether the kind carries child fields.
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Group)
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WidgetKind {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WidgetKind::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| MetadataError::UnknownKind {
                kind: s.to_string(),
            })
    }
}

/// One selectable option of a choice field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceSpec {
    /// Stored value.
    pub value: JsonValue,
    /// Display label; falls back to the value's string form when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// One field of a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Unique name within its nesting level.
    pub name: String,
    /// Widget kind to construct.
    pub kind: WidgetKind,
    /// Display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Whether a value is required.
    #[serde(default)]
    pub required: bool,
    /// Initial value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    /// Inline options for choice kinds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ChoiceSpec>,
    /// Path to a JSON file holding an options array, loaded at construction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options_src: Option<String>,
    /// Child fields for container kinds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FieldSpec>,
}

impl FieldSpec {
    /// Minimal field of a kind.
    pub fn new(name: impl Into<String>, kind: WidgetKind) -> Self {
        Self {
            name: name.into(),
            kind,
            label: None,
            required: false,
            default: None,
            options: Vec::new(),
            options_src: None,
            children: Vec::new(),
        }
    }

    /// Display label, falling back to the field name.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// A declarative form: the root of a component tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSpec {
    /// Form identifier.
    pub name: String,
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Top-level fields.
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

/// One structural problem found by validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    /// Dotted path to the offending field, or the form name for form-level
    /// issues.
    pub path: String,
    /// What is wrong.
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Errors surfaced by metadata loading and validation.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// File could not be read.
    #[error("failed to read metadata file '{path}'")]
    Io {
        /// The offending path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Input was not valid JSON.
    #[error("invalid JSON metadata: {0}")]
    Json(#[from] serde_json::Error),

    /// Input was not valid YAML.
    #[error("invalid YAML metadata: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// File extension is not a supported metadata format.
    #[error("unsupported metadata format '{extension}' (expected json, yaml or yml)")]
    UnsupportedFormat {
        /// The rejected extension.
        extension: String,
    },

    /// Unknown widget kind name.
    #[error("unknown widget kind '{kind}'")]
    UnknownKind {
        /// The rejected kind name.
        kind: String,
    },

    /// Validation found structural problems.
    #[error("invalid form metadata: {}", issues.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Invalid {
        /// Every problem found.
        issues: Vec<ValidationIssue>,
    },
}

impl FormSpec {
    /// Parse from a JSON document.
    pub fn from_json_str(input: &str) -> Result<Self, MetadataError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Parse from a YAML document.
    pub fn from_yaml_str(input: &str) -> Result<Self, MetadataError> {
        Ok(serde_yaml::from_str(input)?)
    }

    /// Load from a file, dispatching on extension.
    pub fn from_file(path: &Path) -> Result<Self, MetadataError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let content = std::fs::read_to_string(path).map_err(|source| MetadataError::Io {
            path: path.display().to_string(),
            source,
        })?;

        match extension.as_str() {
            "json" => Self::from_json_str(&content),
            "yaml" | "yml" => Self::from_yaml_str(&content),
            other => Err(MetadataError::UnsupportedFormat {
                extension: other.to_string(),
            }),
        }
    }

    /// Structural validation. Returns every problem found; an empty result
    /// means the spec is buildable.
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.name.trim().is_empty() {
            issues.push(ValidationIssue {
                path: "<form>".to_string(),
                message: "form name must not be empty".to_string(),
            });
        }
        if self.fields.is_empty() {
            issues.push(ValidationIssue {
                path: self.name.clone(),
                message: "form has no fields".to_string(),
            });
        }

        validate_level(&self.fields, &self.name, 0, &mut issues);
        issues
    }

    /// Validation that fails with [`MetadataError::Invalid`] on any issue.
    pub fn ensure_valid(&self) -> Result<(), MetadataError> {
        let issues = self.validate();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(MetadataError::Invalid { issues })
        }
    }

    /// Every widget kind used anywhere in the tree, deduplicated.
    pub fn used_kinds(&self) -> Vec<WidgetKind> {
        let mut kinds = Vec::new();
        collect_kinds(&self.fields, &mut kinds);
        kinds
    }

    /// Total number of fields in the tree, containers included.
    pub fn field_count(&self) -> usize {
        count_fields(&self.fields)
    }
}

fn validate_level(fields: &[FieldSpec], parent: &str, depth: usize, issues: &mut Vec<ValidationIssue>) {
    if depth > MAX_NESTING_DEPTH {
        issues.push(ValidationIssue {
            path: parent.to_string(),
            message: format!("nesting exceeds maximum depth of {MAX_NESTING_DEPTH}"),
        });
        return;
    }

    let mut seen = std::collections::HashSet::new();
    for field in fields {
        let path = format!("{parent}.{}", field.name);

        if field.name.trim().is_empty() {
            issues.push(ValidationIssue {
                path: parent.to_string(),
                message: "field name must not be empty".to_string(),
            });
        } else if !seen.insert(field.name.as_str()) {
            issues.push(ValidationIssue {
                path: path.clone(),
                message: "duplicate field name at this level".to_string(),
            });
        }

        if field.kind.is_choice() {
            if field.options.is_empty() && field.options_src.is_none() {
                issues.push(ValidationIssue {
                    path: path.clone(),
                    message: "choice field needs inline options or an options source".to_string(),
                });
            }
        } else if !field.options.is_empty() || field.options_src.is_some() {
            issues.push(ValidationIssue {
                path: path.clone(),
                message: format!("kind '{}' does not take options", field.kind),
            });
        }

        if field.kind.is_container() {
            if field.children.is_empty() {
                issues.push(ValidationIssue {
                    path: path.clone(),
                    message: "group has no children".to_string(),
                });
            } else {
                validate_level(&field.children, &path, depth + 1, issues);
            }
        } else if !field.children.is_empty() {
            issues.push(ValidationIssue {
                path,
                message: format!("kind '{}' does not take children", field.kind),
            });
        }
    }
}

fn collect_kinds(fields: &[FieldSpec], kinds: &mut Vec<WidgetKind>) {
    for field in fields {
        if !kinds.contains(&field.kind) {
            kinds.push(field.kind);
        }
        collect_kinds(&field.children, kinds);
    }
}

fn count_fields(fields: &[FieldSpec]) -> usize {
    fields.len() + fields.iter().map(|f| count_fields(&f.children)).sum::<usize>()
}
