//! Generic iDevice: a versioned node built from ordered fields.
//!
//! # Responsibility
//! - Own an ordered field sequence and node-level metadata.
//! - Keep field back-references consistent on add and duplicate.
//! - Allocate node-scoped field ids, recovering the counter when stale.
//! - Resolve which field embeds a given package resource.
//!
//! # Invariants
//! - Every field in `fields` has `owner == Some(self.id)` after `add_field`
//!   or `duplicate`.
//! - `next_field_id`, once nonzero, exceeds every well-formed field sequence.
//! - Field order is insertion order and defines iteration order.
//!
//! # See also
//! - `crate::upgrade` for the stored-version upgrade chain.

use crate::model::field::{Field, LegacyField};
use crate::model::field_id::{
    parse_field_sequence, recover_next_field_id, FieldId, FieldIdAllocator, FieldIdError,
    EXHAUSTED_FIELD_SEQUENCE,
};
use crate::model::resource::ResourceRef;
use crate::upgrade::latest_version;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Identity of one iDevice within its package.
pub type NodeId = String;

/// Script dependencies every generic iDevice declares.
pub const BASELINE_SYSTEM_RESOURCES: &[&str] = &["common.js", "libot_drag.js"];

/// Icon used for classifications without a dedicated icon.
pub const GENERIC_ICON: &str = "generic";

/// Pedagogical classification of an iDevice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Classification {
    Objectives,
    Activity,
    Reading,
    Preknowledge,
    Other,
}

impl Classification {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "objectives" => Self::Objectives,
            "activity" => Self::Activity,
            "reading" => Self::Reading,
            "preknowledge" => Self::Preknowledge,
            _ => Self::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Objectives => "objectives",
            Self::Activity => "activity",
            Self::Reading => "reading",
            Self::Preknowledge => "preknowledge",
            Self::Other => "other",
        }
    }

    /// Icon name for the four classifications that carry their own icon.
    pub fn privileged_icon(self) -> Option<&'static str> {
        match self {
            Self::Objectives | Self::Activity | Self::Reading | Self::Preknowledge => {
                Some(self.as_str())
            }
            Self::Other => None,
        }
    }
}

impl From<String> for Classification {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<Classification> for String {
    fn from(value: Classification) -> Self {
        value.as_str().to_string()
    }
}

/// Visual emphasis of an iDevice block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emphasis {
    Plain,
    Moderate,
    Strong,
}

/// Stable, locale-independent marker for built-in titles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleKey {
    ReadingActivity,
}

impl TitleKey {
    /// Untranslated title text; translation happens at render time.
    pub fn canonical_title(self) -> &'static str {
        match self {
            Self::ReadingActivity => "Reading Activity",
        }
    }
}

/// Non-fatal anomaly found while editing or upgrading an iDevice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdeviceIssue {
    /// A field still bound to another node was added here.
    OwnershipConflict {
        field_id: FieldId,
        previous_owner: NodeId,
        new_owner: NodeId,
    },
    /// A legacy field record carried a kind tag that cannot be converted.
    UnknownFieldKind { field_type: String, field_name: String },
    /// A field id was skipped during counter recovery.
    MalformedFieldId {
        field_id: FieldId,
        error: FieldIdError,
    },
}

impl IdeviceIssue {
    /// Whether this issue left content dropped or unconverted.
    pub fn degrades_node(&self) -> bool {
        matches!(self, Self::UnknownFieldKind { .. })
    }
}

impl Display for IdeviceIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OwnershipConflict {
                field_id,
                previous_owner,
                new_owner,
            } => write!(
                f,
                "field {field_id} already belonging to {previous_owner} added to {new_owner}"
            ),
            Self::UnknownFieldKind {
                field_type,
                field_name,
            } => write!(f, "unknown field type `{field_type}` for field `{field_name}`"),
            Self::MalformedFieldId { error, .. } => write!(f, "{error}"),
        }
    }
}

impl Error for IdeviceIssue {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MalformedFieldId { error, .. } => Some(error),
            Self::OwnershipConflict { .. } | Self::UnknownFieldKind { .. } => None,
        }
    }
}

/// An iDevice built up from simple fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericIdevice {
    pub id: NodeId,
    pub title: String,
    /// Set when `title` is a built-in title that renders localized.
    #[serde(default)]
    pub title_key: Option<TitleKey>,
    #[serde(rename = "class")]
    pub classification: Classification,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub tip: String,
    /// Schema version this node was stored at; absent means version 0.
    #[serde(default, rename = "persistence_version")]
    pub stored_version: u32,
    /// Introduced at version 3.
    #[serde(default)]
    pub emphasis: Option<Emphasis>,
    /// Introduced at version 4.
    #[serde(default)]
    pub last_idevice: Option<bool>,
    #[serde(default)]
    pub user_resources: Vec<ResourceRef>,
    #[serde(default)]
    pub(crate) system_resources: Vec<String>,
    #[serde(default)]
    pub(crate) fields: Vec<Field>,
    /// `0` means the counter must be recovered from existing ids.
    #[serde(default)]
    pub(crate) next_field_id: u64,
    /// Untyped field records of version < 2 documents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) legacy_fields: Vec<LegacyField>,
    /// Resource list of version < 5 documents.
    #[serde(default, rename = "resources", skip_serializing_if = "Vec::is_empty")]
    pub(crate) legacy_resources: Vec<ResourceRef>,
}

impl GenericIdevice {
    /// Creates an empty iDevice at the current version with a generated id.
    pub fn new(
        title: impl Into<String>,
        classification: Classification,
        author: impl Into<String>,
        purpose: impl Into<String>,
        tip: impl Into<String>,
    ) -> Self {
        Self::with_id(new_node_id(), title, classification, author, purpose, tip)
    }

    /// Creates an empty iDevice with a caller-provided id.
    ///
    /// Used by import paths and tests where node identity already exists.
    pub fn with_id(
        id: impl Into<NodeId>,
        title: impl Into<String>,
        classification: Classification,
        author: impl Into<String>,
        purpose: impl Into<String>,
        tip: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            title_key: None,
            classification,
            icon: classification.privileged_icon().map(str::to_string),
            author: author.into(),
            purpose: purpose.into(),
            tip: tip.into(),
            stored_version: latest_version(),
            emphasis: Some(Emphasis::Plain),
            last_idevice: Some(false),
            user_resources: Vec::new(),
            system_resources: BASELINE_SYSTEM_RESOURCES
                .iter()
                .map(|name| (*name).to_string())
                .collect(),
            fields: Vec::new(),
            next_field_id: 0,
            legacy_fields: Vec::new(),
            legacy_resources: Vec::new(),
        }
    }

    /// Appends `field`, binding it to this node.
    ///
    /// A field still owned by another node is logged and reassigned anyway;
    /// the conflict is returned so the caller can surface it.
    pub fn add_field(&mut self, mut field: Field) -> Option<IdeviceIssue> {
        let conflict = match field.owner() {
            Some(previous) if previous != self.id => {
                error!(
                    "event=field_add module=idevice status=conflict field_id={} previous_owner={} node_id={}",
                    field.id, previous, self.id
                );
                Some(IdeviceIssue::OwnershipConflict {
                    field_id: field.id.clone(),
                    previous_owner: previous.to_string(),
                    new_owner: self.id.clone(),
                })
            }
            _ => None,
        };

        field.set_owner(self.id.clone());
        self.fields.push(field);
        conflict
    }

    /// Returns a unique id (within this node) for a new field.
    ///
    /// Call at most once per field. Once the counter is exhausted ids come
    /// from gaps among the current fields, so add each field before
    /// allocating the next id.
    pub fn allocate_field_id(&mut self) -> FieldId {
        self.calc_next_field_id();
        let (_, mut ids) = self.fields_with_allocator();
        ids.allocate()
    }

    /// Recovers `next_field_id` from existing field ids when it is `0`.
    ///
    /// Returns the ids skipped during recovery; empty when nothing ran.
    pub fn calc_next_field_id(&mut self) -> Vec<IdeviceIssue> {
        self.recover_field_counter(std::iter::empty())
    }

    /// Like `calc_next_field_id`, but also keeps the counter above `pending`,
    /// ids of records that will join the node later.
    pub(crate) fn recover_field_counter<'a, I>(&mut self, pending: I) -> Vec<IdeviceIssue>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut issues = Vec::new();
        if self.next_field_id == 0 {
            let node_id = self.id.as_str();
            let next = recover_next_field_id(
                self.fields.iter().map(|field| field.id.as_str()),
                |field_id, err| issues.push(malformed_field_id(node_id, field_id, err)),
            );
            debug!(
                "event=field_id_recover module=idevice status=ok node_id={} class={} next_field_id={}",
                self.id,
                self.classification.as_str(),
                next
            );
            self.next_field_id = next;
        }

        let node_id = self.id.as_str();
        let floor = recover_next_field_id(pending, |field_id, err| {
            issues.push(malformed_field_id(node_id, field_id, err))
        });
        if floor > self.next_field_id {
            debug!(
                "event=field_id_recover module=idevice status=raised node_id={} next_field_id={}",
                self.id, floor
            );
            self.next_field_id = floor;
        }
        issues
    }

    pub fn next_field_id(&self) -> u64 {
        self.next_field_id
    }

    /// Field slice and an allocator over this node's counter, borrowed together.
    ///
    /// The counter must already be recovered (see `calc_next_field_id`).
    pub(crate) fn fields_with_allocator(&mut self) -> (&mut [Field], FieldIdAllocator<'_>) {
        let taken: Vec<u64> = if self.next_field_id == EXHAUSTED_FIELD_SEQUENCE {
            self.fields
                .iter()
                .filter_map(|field| parse_field_sequence(&field.id).ok())
                .collect()
        } else {
            Vec::new()
        };
        let allocator = FieldIdAllocator::new(self.id.as_str(), &mut self.next_field_id)
            .with_taken_sequences(taken);
        (self.fields.as_mut_slice(), allocator)
    }

    /// Structurally independent copy under a fresh node id.
    pub fn duplicate(&self) -> Self {
        self.duplicate_with_id(new_node_id())
    }

    /// Structurally independent copy under `id`; every copied field is
    /// rebound to the copy.
    pub fn duplicate_with_id(&self, id: impl Into<NodeId>) -> Self {
        let mut copy = self.clone();
        copy.id = id.into();
        for field in &mut copy.fields {
            field.set_owner(copy.id.clone());
        }
        debug!(
            "event=idevice_duplicate module=idevice status=ok source_id={} node_id={} fields={}",
            self.id,
            copy.id,
            copy.fields.len()
        );
        copy
    }

    /// Fields in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Field> {
        self.fields.iter()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Mutable access to one field; ownership cannot change through it.
    pub fn field_mut(&mut self, index: usize) -> Option<&mut Field> {
        self.fields.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Untyped records still waiting for the version 2 conversion.
    pub fn legacy_fields(&self) -> &[LegacyField] {
        &self.legacy_fields
    }

    /// Script dependencies the renderer must emit for this node.
    pub fn system_resources(&self) -> &[String] {
        &self.system_resources
    }

    /// Adds one script dependency unless already declared.
    ///
    /// Returns whether the list changed.
    pub fn add_system_resource(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.system_resources.contains(&name) {
            return false;
        }
        self.system_resources.push(name);
        true
    }

    /// Finds the first field whose embedded images reference `resource`.
    ///
    /// Fields that cannot embed images are skipped.
    pub fn resolve_field_for_resource(&self, resource: &ResourceRef) -> Option<&Field> {
        self.fields
            .iter()
            .find(|field| field.embeds_resource(resource))
    }
}

impl<'a> IntoIterator for &'a GenericIdevice {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn malformed_field_id(node_id: &str, field_id: &str, err: FieldIdError) -> IdeviceIssue {
    error!(
        "event=field_id_recover module=idevice status=error node_id={} field_id={} error={}",
        node_id, field_id, err
    );
    IdeviceIssue::MalformedFieldId {
        field_id: field_id.to_string(),
        error: err,
    }
}

fn new_node_id() -> NodeId {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::{Classification, Emphasis, GenericIdevice, IdeviceIssue, BASELINE_SYSTEM_RESOURCES};
    use crate::model::field::Field;
    use crate::upgrade::latest_version;

    fn reading(id: &str) -> GenericIdevice {
        GenericIdevice::with_id(id, "Reading", Classification::Reading, "", "", "")
    }

    #[test]
    fn new_sets_icon_only_for_privileged_classifications() {
        let node = reading("n");
        assert_eq!(node.icon.as_deref(), Some("reading"));
        let other = GenericIdevice::new("Free", Classification::Other, "", "", "");
        assert_eq!(other.icon, None);
        assert!(!other.id.is_empty());
    }

    #[test]
    fn new_starts_at_current_version_with_baselines() {
        let node = reading("n");
        assert_eq!(node.stored_version, latest_version());
        assert_eq!(node.emphasis, Some(Emphasis::Plain));
        assert_eq!(node.last_idevice, Some(false));
        assert_eq!(node.next_field_id(), 0);
        assert!(node.is_empty());
        assert_eq!(node.system_resources(), BASELINE_SYSTEM_RESOURCES);
    }

    #[test]
    fn add_system_resource_has_set_semantics() {
        let mut node = reading("n");
        assert!(!node.add_system_resource("common.js"));
        assert!(node.add_system_resource("extra.js"));
        assert_eq!(node.system_resources().len(), 3);
    }

    #[test]
    fn add_field_reports_conflict_but_reassigns() {
        let mut first = reading("a");
        let mut second = reading("b");
        first.add_field(Field::text("a_1", "Title", "", "x"));

        let moved = first.fields()[0].clone();
        let issue = second.add_field(moved).expect("conflict should be reported");
        assert!(matches!(issue, IdeviceIssue::OwnershipConflict { .. }));
        assert_eq!(second.fields()[0].owner(), Some("b"));
    }

    #[test]
    fn readding_own_field_is_not_a_conflict() {
        let mut node = reading("n");
        let mut field = Field::text("n_1", "Title", "", "x");
        field.set_owner("n");
        assert!(node.add_field(field).is_none());
    }

    #[test]
    fn classification_serializes_as_plain_string() {
        let json = serde_json::to_value(Classification::Preknowledge).expect("serialize");
        assert_eq!(json, "preknowledge");
        let parsed: Classification =
            serde_json::from_value(serde_json::json!("custom")).expect("deserialize");
        assert_eq!(parsed, Classification::Other);
    }

    #[test]
    fn allocation_past_top_sequence_never_repeats_or_overflows() {
        let mut node = reading("n");
        node.add_field(Field::text("n_1", "Title", "", ""));
        node.add_field(Field::text("n_18446744073709551615", "Last", "", ""));

        let id = node.allocate_field_id();
        assert_eq!(id, "n_2");
        node.add_field(Field::text(id, "Next", "", ""));
        assert_eq!(node.allocate_field_id(), "n_3");
    }

    #[test]
    fn recovery_counts_sequences_above_u32() {
        let mut node = reading("n");
        node.add_field(Field::text("n_4294967295", "Title", "", ""));

        assert!(node.calc_next_field_id().is_empty());
        assert_eq!(node.allocate_field_id(), "n_4294967296");
        assert_eq!(node.allocate_field_id(), "n_4294967297");
    }

    #[test]
    fn pending_ids_raise_the_recovered_counter() {
        let mut node = reading("n");
        node.add_field(Field::text("n_1", "Title", "", ""));

        let issues = node.recover_field_counter(["n_7", "12"]);

        assert_eq!(node.next_field_id(), 8);
        assert!(matches!(
            issues.as_slice(),
            [IdeviceIssue::MalformedFieldId { field_id, .. }] if field_id == "12"
        ));
    }
}
