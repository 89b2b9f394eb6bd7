//! Field model for generic iDevices.
//!
//! # Responsibility
//! - Define the closed set of field kinds and their payloads.
//! - Expose the capability surface the node relies on: identity, kind,
//!   owner binding, the per-field upgrade hook and embedded images.
//!
//! # Invariants
//! - `owner` is a non-owning handle to the node id; fields never hold nodes.
//! - `id` is stable across kind rewrites.
//! - Only rich-text kinds (`TextArea`, `Feedback`) embed images.

use crate::model::field_id::{parse_field_sequence, FieldId, FieldIdAllocator};
use crate::model::idevice::NodeId;
use crate::model::resource::ResourceRef;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Current per-field persistence version.
pub const CURRENT_FIELD_VERSION: u32 = 2;

/// Stored kind tag for single-line text fields.
pub const FIELD_KIND_TEXT: &str = "Text";
/// Stored kind tag for rich text area fields.
pub const FIELD_KIND_TEXT_AREA: &str = "TextArea";
/// Stored kind tag for feedback fields.
pub const FIELD_KIND_FEEDBACK: &str = "Feedback";
/// Stored kind tag for image fields.
pub const FIELD_KIND_IMAGE: &str = "Image";
/// Stored kind tag for attachment fields.
pub const FIELD_KIND_ATTACHMENT: &str = "Attachment";

/// Discriminant of a field payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    TextArea,
    Feedback,
    Image,
    Attachment,
}

impl FieldKind {
    /// Stored kind tag used by legacy field records.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => FIELD_KIND_TEXT,
            Self::TextArea => FIELD_KIND_TEXT_AREA,
            Self::Feedback => FIELD_KIND_FEEDBACK,
            Self::Image => FIELD_KIND_IMAGE,
            Self::Attachment => FIELD_KIND_ATTACHMENT,
        }
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses one stored kind tag.
pub fn parse_field_kind(value: &str) -> Result<FieldKind, FieldKindError> {
    let normalized = value.trim();
    if normalized.is_empty() {
        return Err(FieldKindError::EmptyKind);
    }

    match normalized {
        FIELD_KIND_TEXT => Ok(FieldKind::Text),
        FIELD_KIND_TEXT_AREA => Ok(FieldKind::TextArea),
        FIELD_KIND_FEEDBACK => Ok(FieldKind::Feedback),
        FIELD_KIND_IMAGE => Ok(FieldKind::Image),
        FIELD_KIND_ATTACHMENT => Ok(FieldKind::Attachment),
        other => Err(FieldKindError::UnsupportedKind(other.to_string())),
    }
}

/// Field kind parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKindError {
    EmptyKind,
    UnsupportedKind(String),
}

impl Display for FieldKindError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyKind => write!(f, "field kind tag must not be empty"),
            Self::UnsupportedKind(value) => write!(f, "field kind is unsupported: {value}"),
        }
    }
}

impl Error for FieldKindError {}

/// Stable, locale-independent marker for built-in field roles.
///
/// Set when a field is created so later upgrades can recognise it without
/// comparing against translated display names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    /// Feedback area of a reading activity.
    ReadingFeedback,
}

/// The three stored renderings of one rich-text body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichContent {
    /// Text as authored.
    pub raw: String,
    /// Text with package resource paths expanded.
    pub with_resource_paths: String,
    /// Text with package resource paths stripped.
    pub without_resource_paths: String,
}

impl RichContent {
    /// Builds all three renderings from a single legacy string.
    pub fn from_legacy(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            raw: text.clone(),
            with_resource_paths: text.clone(),
            without_resource_paths: text,
        }
    }
}

/// One image embedded inside a rich-text field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedImage {
    /// Missing when the package resource was lost or never registered.
    #[serde(default)]
    pub resource: Option<ResourceRef>,
    /// Package-relative path used by rendered content.
    #[serde(default)]
    pub path: String,
}

impl EmbeddedImage {
    pub fn new(resource: ResourceRef, path: impl Into<String>) -> Self {
        Self {
            resource: Some(resource),
            path: path.into(),
        }
    }
}

/// Kind-specific payload of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldBody {
    Text {
        #[serde(default)]
        content: String,
    },
    TextArea {
        #[serde(default)]
        content: RichContent,
        #[serde(default)]
        images: Vec<EmbeddedImage>,
    },
    Feedback {
        /// Pre-rich-text feedback string kept for old documents.
        #[serde(default)]
        feedback: String,
        /// `None` until the feedback string has been migrated.
        #[serde(default)]
        content: Option<RichContent>,
        #[serde(default)]
        images: Vec<EmbeddedImage>,
    },
    Image {
        #[serde(default)]
        resource: Option<ResourceRef>,
        #[serde(default)]
        width: Option<u32>,
        #[serde(default)]
        height: Option<u32>,
        /// `None` on documents older than the flag itself.
        #[serde(default)]
        is_feedback: Option<bool>,
    },
    Attachment {
        #[serde(default)]
        resource: Option<ResourceRef>,
        #[serde(default)]
        description: String,
    },
}

impl FieldBody {
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Text { .. } => FieldKind::Text,
            Self::TextArea { .. } => FieldKind::TextArea,
            Self::Feedback { .. } => FieldKind::Feedback,
            Self::Image { .. } => FieldKind::Image,
            Self::Attachment { .. } => FieldKind::Attachment,
        }
    }
}

/// Untyped field record from documents stored before typed fields existed.
///
/// Only read by the version 2 upgrade, which converts it by `field_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyField {
    /// Old documents may lack ids; the upgrade allocates one.
    #[serde(default)]
    pub id: Option<FieldId>,
    pub field_type: String,
    pub name: String,
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub content: String,
}

impl LegacyField {
    pub fn new(
        field_type: impl Into<String>,
        name: impl Into<String>,
        instruction: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            field_type: field_type.into(),
            name: name.into(),
            instruction: instruction.into(),
            content: content.into(),
        }
    }
}

/// One atomic content unit owned by a generic iDevice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: FieldId,
    /// Display name shown to authors.
    pub name: String,
    #[serde(default)]
    pub instruction: String,
    /// Id of the node currently holding this field.
    #[serde(default)]
    pub owner: Option<NodeId>,
    #[serde(default)]
    pub role: Option<FieldRole>,
    /// Per-field persistence version; absent means the oldest layout.
    #[serde(default)]
    pub version: u32,
    #[serde(flatten)]
    pub body: FieldBody,
}

impl Field {
    /// Creates an unowned field at the current field version.
    pub fn new(
        id: impl Into<FieldId>,
        name: impl Into<String>,
        instruction: impl Into<String>,
        body: FieldBody,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            instruction: instruction.into(),
            owner: None,
            role: None,
            version: CURRENT_FIELD_VERSION,
            body,
        }
    }

    pub fn text(
        id: impl Into<FieldId>,
        name: impl Into<String>,
        instruction: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            name,
            instruction,
            FieldBody::Text {
                content: content.into(),
            },
        )
    }

    pub fn text_area(
        id: impl Into<FieldId>,
        name: impl Into<String>,
        instruction: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            name,
            instruction,
            FieldBody::TextArea {
                content: RichContent::from_legacy(content),
                images: Vec::new(),
            },
        )
    }

    /// Creates a feedback field with empty, already migrated content.
    pub fn feedback(
        id: impl Into<FieldId>,
        name: impl Into<String>,
        instruction: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            name,
            instruction,
            FieldBody::Feedback {
                feedback: String::new(),
                content: Some(RichContent::default()),
                images: Vec::new(),
            },
        )
    }

    pub fn image(
        id: impl Into<FieldId>,
        name: impl Into<String>,
        instruction: impl Into<String>,
        resource: Option<ResourceRef>,
    ) -> Self {
        Self::new(
            id,
            name,
            instruction,
            FieldBody::Image {
                resource,
                width: None,
                height: None,
                is_feedback: Some(false),
            },
        )
    }

    pub fn attachment(
        id: impl Into<FieldId>,
        name: impl Into<String>,
        instruction: impl Into<String>,
        resource: Option<ResourceRef>,
    ) -> Self {
        Self::new(
            id,
            name,
            instruction,
            FieldBody::Attachment {
                resource,
                description: String::new(),
            },
        )
    }

    /// Sets the stable role marker.
    pub fn with_role(mut self, role: FieldRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn kind(&self) -> FieldKind {
        self.body.kind()
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Rebinds the non-owning back-reference.
    pub fn set_owner(&mut self, node_id: impl Into<NodeId>) {
        self.owner = Some(node_id.into());
    }

    /// Images embedded in this field's rich text.
    ///
    /// Returns `None` for kinds that cannot embed resources.
    pub fn embedded_images(&self) -> Option<&[EmbeddedImage]> {
        match &self.body {
            FieldBody::TextArea { images, .. } | FieldBody::Feedback { images, .. } => {
                Some(images.as_slice())
            }
            FieldBody::Text { .. } | FieldBody::Image { .. } | FieldBody::Attachment { .. } => {
                None
            }
        }
    }

    /// Mutable access to embedded images for rich-text kinds.
    pub fn embedded_images_mut(&mut self) -> Option<&mut Vec<EmbeddedImage>> {
        match &mut self.body {
            FieldBody::TextArea { images, .. } | FieldBody::Feedback { images, .. } => {
                Some(images)
            }
            FieldBody::Text { .. } | FieldBody::Image { .. } | FieldBody::Attachment { .. } => {
                None
            }
        }
    }

    /// Whether any embedded image refers to `resource`.
    pub fn embeds_resource(&self, resource: &ResourceRef) -> bool {
        self.embedded_images().is_some_and(|images| {
            images
                .iter()
                .any(|image| image.resource.as_ref() == Some(resource))
        })
    }

    /// Per-field upgrade from field version 1 to 2.
    ///
    /// Binds the field to the allocator's node and replaces an id that is not
    /// in `<node>_<sequence>` form with a fresh one. Returns whether anything
    /// changed; a field already at version 2 is left untouched.
    pub fn upgrade_to_version2(&mut self, ids: &mut FieldIdAllocator<'_>) -> bool {
        if self.version >= 2 {
            return false;
        }

        match self.owner.as_deref() {
            Some(owner) if owner == ids.node_id() => {}
            Some(owner) => {
                warn!(
                    "event=field_upgrade module=field status=rebind field_id={} previous_owner={} owner={}",
                    self.id,
                    owner,
                    ids.node_id()
                );
                self.owner = Some(ids.node_id().to_string());
            }
            None => self.owner = Some(ids.node_id().to_string()),
        }

        if matches!(parse_field_sequence(&self.id), Err(err) if err.is_malformed()) {
            let fresh = ids.allocate();
            debug!(
                "event=field_upgrade module=field status=renumbered legacy_id={} field_id={}",
                self.id, fresh
            );
            self.id = fresh;
        }

        self.version = 2;
        true
    }
}
