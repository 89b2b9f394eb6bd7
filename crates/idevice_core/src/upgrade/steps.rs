//! Individual upgrade steps, one per stored version.
//!
//! Each step takes the node shape of version `n - 1` to version `n`. Steps
//! re-check before mutating so a step applied to an already migrated shape
//! leaves it unchanged.

use super::UpgradeContext;
use crate::config::UpgradeConfig;
use crate::model::field::{
    parse_field_kind, Field, FieldBody, FieldKind, FieldRole, LegacyField, RichContent,
};
use crate::model::idevice::{
    Classification, Emphasis, GenericIdevice, IdeviceIssue, TitleKey, BASELINE_SYSTEM_RESOURCES,
    GENERIC_ICON,
};
use log::{debug, error};
use std::collections::HashSet;

/// v1: icon derived from classification.
pub(super) fn icon_from_classification(node: &mut GenericIdevice, _ctx: &mut UpgradeContext<'_>) {
    let icon = node
        .classification
        .privileged_icon()
        .unwrap_or(GENERIC_ICON);
    node.icon = Some(icon.to_string());
}

/// v2: untyped legacy records become typed text fields.
///
/// Records of any kind other than `Text`/`TextArea` are dropped and reported.
pub(super) fn typed_fields(node: &mut GenericIdevice, ctx: &mut UpgradeContext<'_>) {
    let legacy = std::mem::take(&mut node.legacy_fields);
    if legacy.is_empty() {
        return;
    }
    if legacy.iter().any(|record| record.id.is_none()) {
        let stored_ids = legacy.iter().filter_map(|record| record.id.as_deref());
        ctx.issues.extend(node.recover_field_counter(stored_ids));
    }

    for record in legacy {
        let LegacyField {
            id,
            field_type,
            name,
            instruction,
            content,
        } = record;

        let body = match parse_field_kind(&field_type) {
            Ok(FieldKind::Text) => FieldBody::Text { content },
            Ok(FieldKind::TextArea) => FieldBody::TextArea {
                content: RichContent::from_legacy(content),
                images: Vec::new(),
            },
            Ok(FieldKind::Feedback | FieldKind::Image | FieldKind::Attachment) | Err(_) => {
                error!(
                    "event=idevice_upgrade_step module=upgrade status=error node_id={} version=2 error_code=unknown_field_type field_type={} field_name={}",
                    node.id, field_type, name
                );
                ctx.issues.push(IdeviceIssue::UnknownFieldKind {
                    field_type,
                    field_name: name,
                });
                continue;
            }
        };

        let id = match id {
            Some(id) => id,
            None => node.allocate_field_id(),
        };
        let mut field = Field::new(id, name, instruction, body);
        field.version = 1;
        if let Some(issue) = node.add_field(field) {
            ctx.issues.push(issue);
        }
    }
}

/// v3: emphasis introduced.
pub(super) fn default_emphasis(node: &mut GenericIdevice, _ctx: &mut UpgradeContext<'_>) {
    node.emphasis.get_or_insert(Emphasis::Moderate);
}

/// v4: last-iDevice flag introduced.
pub(super) fn last_idevice_flag(node: &mut GenericIdevice, _ctx: &mut UpgradeContext<'_>) {
    node.last_idevice.get_or_insert(false);
}

/// v5: node-level resource list moves to `user_resources`.
pub(super) fn node_resources(node: &mut GenericIdevice, _ctx: &mut UpgradeContext<'_>) {
    for resource in std::mem::take(&mut node.legacy_resources) {
        if !node.user_resources.contains(&resource) {
            node.user_resources.push(resource);
        }
    }
}

/// v6: script list normalized, every field taken to field version 2, and
/// baseline scripts declared.
pub(super) fn field_version2_and_scripts(
    node: &mut GenericIdevice,
    ctx: &mut UpgradeContext<'_>,
) {
    let mut seen = HashSet::new();
    node.system_resources
        .retain(|name| seen.insert(name.clone()));

    ctx.issues.extend(node.calc_next_field_id());
    let upgraded = {
        let (fields, mut ids) = node.fields_with_allocator();
        fields
            .iter_mut()
            .filter_map(|field| field.upgrade_to_version2(&mut ids).then_some(()))
            .count()
    };
    debug!(
        "event=idevice_upgrade_step module=upgrade status=ok node_id={} version=6 fields_upgraded={}",
        node.id, upgraded
    );

    for name in BASELINE_SYSTEM_RESOURCES {
        node.add_system_resource(*name);
    }
}

/// v7: reading activities get a real feedback field and an unversioned title.
///
/// The matching text area is replaced at the same position; id, name and
/// instruction carry over.
pub(super) fn reading_feedback(node: &mut GenericIdevice, ctx: &mut UpgradeContext<'_>) {
    if node.classification != Classification::Reading {
        return;
    }

    let node_id = node.id.clone();
    for slot in node.fields.iter_mut() {
        if !is_reading_feedback_area(slot, ctx.config) {
            continue;
        }
        let FieldBody::TextArea { content, images } = &mut slot.body else {
            continue;
        };

        let body = FieldBody::Feedback {
            feedback: std::mem::take(&mut content.raw),
            content: None,
            images: std::mem::take(images),
        };
        let mut replacement = Field::new(
            slot.id.clone(),
            slot.name.clone(),
            slot.instruction.clone(),
            body,
        )
        .with_role(FieldRole::ReadingFeedback);
        replacement.set_owner(node_id.clone());

        debug!(
            "event=idevice_upgrade_step module=upgrade status=rewrite node_id={} version=7 field_id={} from=text_area to=feedback",
            node_id, replacement.id
        );
        *slot = replacement;
    }

    if node.title_key.is_none() && ctx.config.is_legacy_reading_title(&node.title) {
        let key = TitleKey::ReadingActivity;
        node.title = key.canonical_title().to_string();
        node.title_key = Some(key);
    }
}

fn is_reading_feedback_area(field: &Field, config: &UpgradeConfig) -> bool {
    if field.kind() != FieldKind::TextArea {
        return false;
    }
    match field.role {
        Some(FieldRole::ReadingFeedback) => true,
        None => config.is_feedback_label(&field.name),
    }
}

/// v8: field id counter invalidated so the next allocation rescans.
pub(super) fn reset_field_counter(node: &mut GenericIdevice, _ctx: &mut UpgradeContext<'_>) {
    node.next_field_id = 0;
}

/// v9: image feedback flag reset to `false` and legacy feedback text migrated
/// to rich content.
///
/// Feedback fields usually migrate themselves on load; only those still
/// lacking rich content are touched here.
pub(super) fn feedback_content(node: &mut GenericIdevice, _ctx: &mut UpgradeContext<'_>) {
    for field in node.fields.iter_mut() {
        match &mut field.body {
            FieldBody::Image { is_feedback, .. } => *is_feedback = Some(false),
            FieldBody::Feedback {
                feedback, content, ..
            } => {
                if content.is_none() {
                    *content = Some(RichContent::from_legacy(feedback.as_str()));
                }
            }
            FieldBody::Text { .. } | FieldBody::TextArea { .. } | FieldBody::Attachment { .. } => {}
        }
    }
}
