//! Endpoint metadata: input/output shape names, sample shapes and
//! descriptions, for documentation and authorization tooling.
//!
//! Built at registration or introspection time, never on the request path.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use serde_json::{json, Value};

use crate::traits::EntityMetadata;

/// Produces a sample shape from the bound entity, e.g. `{"list": ["User"]}`.
pub type SampleFn = fn(&EntityMetadata) -> Value;

/// Names an input or output shape, optionally with a sample generator.
///
/// Samples are only rendered for an operation's default descriptor; custom
/// descriptors are reported by name.
#[derive(Clone, Copy)]
pub struct ShapeDescriptor {
    pub name: &'static str,
    pub sample: Option<SampleFn>,
}

impl ShapeDescriptor {
    #[must_use]
    pub const fn named(name: &'static str) -> Self {
        Self { name, sample: None }
    }

    #[must_use]
    pub const fn with_sample(name: &'static str, sample: SampleFn) -> Self {
        Self {
            name,
            sample: Some(sample),
        }
    }
}

impl fmt::Debug for ShapeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShapeDescriptor")
            .field("name", &self.name)
            .field("sample", &self.sample.is_some())
            .finish()
    }
}

/// Endpoint description: fixed text or a template over the entity name.
#[derive(Clone)]
pub enum Description {
    Text(String),
    Template(fn(&str) -> String),
}

impl Description {
    #[must_use]
    pub fn render(&self, entity_name: &str) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Template(template) => template(entity_name),
        }
    }
}

impl fmt::Debug for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Template(_) => f.write_str("Template(..)"),
        }
    }
}

impl From<&str> for Description {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Documentation overrides attached to one endpoint.
#[derive(Debug, Clone, Default)]
pub struct Documentation {
    pub input: Option<ShapeDescriptor>,
    pub output: Option<ShapeDescriptor>,
    pub description: Option<Description>,
}

/// `(shape name, sample)` pair.
pub type ShapeMeta = (Option<String>, Option<Value>);

/// Exported metadata of one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointMeta {
    pub input: ShapeMeta,
    pub output: ShapeMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Operation table
// ---------------------------------------------------------------------------

/// The seven standard operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    Count,
    List,
    View,
    Create,
    Update,
    Remove,
    Restore,
}

impl OperationKind {
    pub const ALL: [Self; 7] = [
        Self::Count,
        Self::List,
        Self::View,
        Self::Create,
        Self::Update,
        Self::Remove,
        Self::Restore,
    ];

    /// Default endpoint path, e.g. `"list"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::List => "list",
            Self::View => "view",
            Self::Create => "create",
            Self::Update => "update",
            Self::Remove => "remove",
            Self::Restore => "restore",
        }
    }
}

/// Sample of a shape whose fields carry no entity reference.
fn empty_sample(_: &EntityMetadata) -> Value {
    json!({})
}

/// Default shapes and description of one operation.
#[derive(Debug, Clone)]
pub struct OperationDefaults {
    pub input: ShapeDescriptor,
    pub output: ShapeDescriptor,
    pub description: Description,
}

/// Per-operation defaults, handed to the engine at construction.
#[derive(Debug, Clone, Default)]
pub struct OperationTable {
    entries: HashMap<OperationKind, OperationDefaults>,
}

impl OperationTable {
    /// Empty table: endpoints get no default shapes or descriptions.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The stock request/response shapes and description templates.
    #[must_use]
    pub fn standard() -> Self {
        Self::empty()
            .with(
                OperationKind::Count,
                OperationDefaults {
                    input: ShapeDescriptor::with_sample("CountRequestParams", empty_sample),
                    output: ShapeDescriptor::with_sample("CountOutputParams", empty_sample),
                    description: Description::Template(|name| {
                        format!("Returns count of {name} by given condition")
                    }),
                },
            )
            .with(
                OperationKind::List,
                OperationDefaults {
                    input: ShapeDescriptor::with_sample("ListRequestParams", empty_sample),
                    output: ShapeDescriptor::with_sample("ListOutputParams", |m| json!({ "list": [m.name] })),
                    description: Description::Template(|name| {
                        format!("Returns list of {name} by given condition")
                    }),
                },
            )
            .with(
                OperationKind::View,
                OperationDefaults {
                    input: ShapeDescriptor::with_sample("ViewRequestParams", empty_sample),
                    output: ShapeDescriptor::with_sample("ViewOutputParams", |m| json!({ "entity": m.name })),
                    description: Description::Template(|name| format!("Returns {name} by given condition")),
                },
            )
            .with(
                OperationKind::Create,
                OperationDefaults {
                    input: ShapeDescriptor::with_sample("CreateRequestParams", |m| json!({ "fields": m.name })),
                    output: ShapeDescriptor::with_sample("CreateOutputParams", |m| json!({ "entity": m.name })),
                    description: Description::Template(|name| format!("Create a new {name}")),
                },
            )
            .with(
                OperationKind::Update,
                OperationDefaults {
                    input: ShapeDescriptor::with_sample("UpdateRequestParams", |m| json!({ "fields": m.name })),
                    output: ShapeDescriptor::with_sample("UpdateOutputParams", |m| json!({ "entity": m.name })),
                    description: Description::Template(|name| format!("Update {name} by given condition")),
                },
            )
            .with(
                OperationKind::Remove,
                OperationDefaults {
                    input: ShapeDescriptor::with_sample("RemoveRequestParams", empty_sample),
                    output: ShapeDescriptor::with_sample("RemoveOutputParams", |m| {
                        json!({ "deleted": [m.name], "entities": [m.name] })
                    }),
                    description: Description::Template(|name| format!("Remove {name} by given condition")),
                },
            )
            .with(
                OperationKind::Restore,
                OperationDefaults {
                    input: ShapeDescriptor::with_sample("RestoreRequestParams", empty_sample),
                    output: ShapeDescriptor::with_sample("RestoreOutputParams", |m| json!({ "restored": [m.name] })),
                    description: Description::Template(|name| format!("Restore {name} by given condition")),
                },
            )
    }

    #[must_use]
    pub fn with(mut self, kind: OperationKind, defaults: OperationDefaults) -> Self {
        self.entries.insert(kind, defaults);
        self
    }

    #[must_use]
    pub fn get(&self, kind: OperationKind) -> Option<&OperationDefaults> {
        self.entries.get(&kind)
    }
}

// ---------------------------------------------------------------------------
// describe
// ---------------------------------------------------------------------------

fn shape(
    custom: Option<ShapeDescriptor>,
    default: Option<ShapeDescriptor>,
    metadata: Option<&EntityMetadata>,
) -> ShapeMeta {
    match (custom, default) {
        (Some(custom), _) => (Some(custom.name.to_string()), None),
        (None, Some(default)) => {
            let sample = default.sample.zip(metadata).map(|(sample, m)| sample(m));
            (Some(default.name.to_string()), sample)
        }
        (None, None) => (None, None),
    }
}

/// Exports the metadata of one endpoint.
///
/// Shapes set in `docs` win over `defaults` and are reported by name only.
/// A missing output name falls back to the entity name.
#[must_use]
pub fn describe(
    docs: &Documentation,
    metadata: Option<&EntityMetadata>,
    defaults: Option<&OperationDefaults>,
) -> EndpointMeta {
    let input = shape(docs.input, defaults.map(|d| d.input), metadata);
    let (output_name, output_sample) = shape(docs.output, defaults.map(|d| d.output), metadata);
    let output_name = output_name.or_else(|| metadata.map(|m| m.name.clone()));

    let entity_name = metadata.map_or("entity", |m| m.name.as_str());
    let description = docs
        .description
        .as_ref()
        .or(defaults.map(|d| &d.description))
        .map(|description| description.render(entity_name));

    EndpointMeta {
        input,
        output: (output_name, output_sample),
        description,
    }
}
