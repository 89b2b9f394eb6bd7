use idevice_core::{
    parse_field_sequence, Classification, EmbeddedImage, Field, FieldBody, GenericIdevice,
    IdeviceIssue, ResourceRef,
};

fn reading_node(id: &str) -> GenericIdevice {
    GenericIdevice::with_id(
        id,
        "Reading Activity",
        Classification::Reading,
        "eXe Project",
        "Guide learners through a text",
        "Pick short passages",
    )
}

#[test]
fn allocated_ids_strictly_increase() {
    let mut node = reading_node("n");
    let mut previous = None;
    for _ in 0..25 {
        let id = node.allocate_field_id();
        assert!(id.starts_with("n_"));
        let sequence = parse_field_sequence(&id).unwrap();
        if let Some(previous) = previous {
            assert!(sequence > previous, "{sequence} after {previous}");
        }
        previous = Some(sequence);
    }
}

#[test]
fn allocation_continues_after_existing_fields() {
    let mut node = reading_node("n");
    node.add_field(Field::text("n_0", "Title", "", "a"));
    node.add_field(Field::text("n_2", "Subtitle", "", "b"));
    node.add_field(Field::text_area("n_5", "Body", "", "c"));

    node.calc_next_field_id();
    assert_eq!(node.next_field_id(), 6);
    assert_eq!(node.allocate_field_id(), "n_6");
    assert_eq!(node.allocate_field_id(), "n_7");
}

#[test]
fn recovery_skips_malformed_ids() {
    let mut node = reading_node("n");
    node.add_field(Field::text("n_3", "Title", "", "a"));
    node.add_field(Field::text("legacy", "Old", "", "b"));
    node.add_field(Field::text("n_tail", "Odd", "", "c"));

    let issues = node.calc_next_field_id();

    assert_eq!(node.next_field_id(), 4);
    let skipped: Vec<_> = issues
        .iter()
        .map(|issue| match issue {
            IdeviceIssue::MalformedFieldId { field_id, .. } => field_id.as_str(),
            other => panic!("unexpected issue: {other}"),
        })
        .collect();
    assert_eq!(skipped, vec!["legacy", "n_tail"]);

    assert!(node.calc_next_field_id().is_empty(), "recovery runs once");
}

#[test]
fn empty_node_starts_numbering_at_one() {
    let mut node = reading_node("n");
    assert_eq!(node.allocate_field_id(), "n_1");
}

#[test]
fn resolves_only_the_field_embedding_the_resource() {
    let embedded = ResourceRef::new();
    let unrelated = ResourceRef::new();
    let mut node = reading_node("n");
    node.add_field(Field::text_area("n_0", "Intro", "", "<p>intro</p>"));
    node.add_field(Field::text_area("n_1", "Body", "", "<p><img/></p>"));
    node.field_mut(1)
        .and_then(Field::embedded_images_mut)
        .unwrap()
        .push(EmbeddedImage::new(embedded, "resources/photo.png"));

    let found = node.resolve_field_for_resource(&embedded).unwrap();
    assert_eq!(found.id, "n_1");
    assert!(node.resolve_field_for_resource(&unrelated).is_none());
}

#[test]
fn resolution_skips_fields_without_image_capability() {
    let resource = ResourceRef::new();
    let mut node = reading_node("n");
    node.add_field(Field::image("n_0", "Picture", "", Some(resource)));
    node.add_field(Field::attachment("n_1", "Handout", "", Some(resource)));

    assert!(node.resolve_field_for_resource(&resource).is_none());

    node.add_field(Field::feedback("n_2", "Feedback", ""));
    node.field_mut(2)
        .and_then(Field::embedded_images_mut)
        .unwrap()
        .push(EmbeddedImage::new(resource, "resources/photo.png"));
    assert_eq!(node.resolve_field_for_resource(&resource).unwrap().id, "n_2");
}

#[test]
fn first_matching_field_wins() {
    let resource = ResourceRef::new();
    let mut node = reading_node("n");
    for index in 0..2 {
        let id = node.allocate_field_id();
        node.add_field(Field::text_area(id, "Body", "", ""));
        node.field_mut(index)
            .and_then(Field::embedded_images_mut)
            .unwrap()
            .push(EmbeddedImage::new(resource, "resources/shared.png"));
    }

    assert_eq!(node.resolve_field_for_resource(&resource).unwrap().id, "n_1");
}

#[test]
fn duplicate_is_independent_and_rebinds_owners() {
    let mut original = reading_node("orig");
    for name in ["Title", "Body", "Feedback"] {
        let id = original.allocate_field_id();
        original.add_field(Field::text_area(id, name, "", "original"));
    }

    let mut copy = original.duplicate_with_id("copy");
    if let Some(FieldBody::TextArea { content, .. }) = copy.field_mut(1).map(|field| &mut field.body)
    {
        content.raw = "changed".to_string();
    }

    assert_eq!(copy.len(), 3);
    assert!(copy.iter().all(|field| field.owner() == Some("copy")));
    assert!(original.iter().all(|field| field.owner() == Some("orig")));
    match &original.fields()[1].body {
        FieldBody::TextArea { content, .. } => assert_eq!(content.raw, "original"),
        other => panic!("unexpected body: {other:?}"),
    }
}

#[test]
fn duplicate_generates_fresh_node_id() {
    let original = GenericIdevice::new("Objectives", Classification::Objectives, "", "", "");
    let copy = original.duplicate();
    assert_ne!(copy.id, original.id);
    assert_eq!(copy.title, original.title);
}

#[test]
fn iteration_follows_insertion_order_and_is_restartable() {
    let mut node = reading_node("n");
    for name in ["c", "a", "b"] {
        let id = node.allocate_field_id();
        node.add_field(Field::text(id, name, "", ""));
    }

    let first: Vec<_> = node.iter().map(|field| field.name.as_str()).collect();
    let second: Vec<_> = (&node).into_iter().map(|field| field.name.as_str()).collect();
    assert_eq!(first, vec!["c", "a", "b"]);
    assert_eq!(first, second);

    let mut names = Vec::new();
    for field in &node {
        names.push(field.name.clone());
    }
    assert_eq!(names, vec!["c", "a", "b"]);
}

#[test]
fn moving_a_field_between_nodes_is_reported_not_fatal() {
    let mut source = reading_node("a");
    let mut target = reading_node("b");
    let id = source.allocate_field_id();
    source.add_field(Field::text(id, "Title", "", "x"));

    let stolen = source.fields()[0].clone();
    let issue = target.add_field(stolen).unwrap();

    assert_eq!(
        issue,
        IdeviceIssue::OwnershipConflict {
            field_id: "a_1".to_string(),
            previous_owner: "a".to_string(),
            new_owner: "b".to_string(),
        }
    );
    assert_eq!(target.fields()[0].owner(), Some("b"));
    assert_eq!(target.len(), 1);
}
