//! Reference Primitive Tests
//!
//! Tests for:
//! - ArrayRef padding, element access and out-of-range errors
//! - Stable callback slots across removal
//! - Use counting and destruction
//! - BlockRef layout, typed fields and dynamic sources

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::{Mat4, Vec3, Vec4};
use parking_lot::Mutex;

use tessera::resources::CallbackSlot;
use tessera::{ArrayRef, BlockLayout, BlockRef, Error, FieldSource, UniformType, UniformValue};

fn floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

// ============================================================================
// ArrayRef: padding
// ============================================================================

#[test]
fn byte_length_is_padded_to_four() {
    for len in 0..=17usize {
        let data: Vec<u8> = (1..=len as u8).collect();
        let reference = ArrayRef::from_bytes("bytes", &data, 1).unwrap();
        let value = reference.value().unwrap();

        assert_eq!(value.len() % 4, 0, "length {len} not padded");
        assert_eq!(&value[..len], &data[..], "payload changed for length {len}");
        assert!(value[len..].iter().all(|&b| b == 0), "padding not zero for length {len}");
        assert_eq!(reference.logical_len(), len);
    }
}

#[test]
fn typed_constructor_uses_element_size() {
    let reference = ArrayRef::new("indices", &[1u16, 2, 3]).unwrap();
    assert_eq!(reference.element_size(), 2);
    assert_eq!(reference.len(), 3);
    assert_eq!(reference.byte_len(), 8);
    assert_eq!(reference.element_as::<u16>(2).unwrap(), 3);
}

#[test]
fn zero_sized_element_is_rejected() {
    assert!(matches!(
        ArrayRef::from_bytes("bad", &[1, 2, 3, 4], 0),
        Err(Error::UnsupportedElementType(_))
    ));
}

// ============================================================================
// ArrayRef: element access
// ============================================================================

#[test]
fn element_index_out_of_range() {
    let reference = ArrayRef::new("floats", &[1.0f32, 2.0]).unwrap();
    assert_eq!(reference.element(2), Err(Error::OutOfRange { index: 2, len: 2 }));
    assert_eq!(
        reference.set_element(5, &[0; 4]),
        Err(Error::OutOfRange { index: 5, len: 2 })
    );
}

#[test]
fn set_element_rejects_wrong_size() {
    let reference = ArrayRef::new("floats", &[1.0f32, 2.0]).unwrap();
    assert!(matches!(
        reference.set_element(0, &[0; 2]),
        Err(Error::ElementSize { expected: 4, actual: 2 })
    ));
}

#[test]
fn fill_overwrites_every_element() {
    let reference = ArrayRef::new("values", &[1u32, 2, 3]).unwrap();
    reference.fill(bytemuck::bytes_of(&7u32)).unwrap();
    for i in 0..3 {
        assert_eq!(reference.element_as::<u32>(i).unwrap(), 7);
    }
}

// ============================================================================
// ArrayRef: callbacks
// ============================================================================

#[test]
fn mutation_fires_callbacks_in_insertion_order() {
    let reference = ArrayRef::new("values", &[0u32; 4]).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    for tag in ["a", "b", "c"] {
        let log = Arc::clone(&log);
        reference.register_callback(Arc::new(move |_| log.lock().push(tag)));
    }
    reference.set_element_as(1, &9u32).unwrap();

    assert_eq!(*log.lock(), vec!["a", "b", "c"]);
}

#[test]
fn removing_a_callback_keeps_other_slots_stable() {
    let reference = ArrayRef::new("values", &[0u32; 2]).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    let slots: Vec<CallbackSlot> = (0..4)
        .map(|_| {
            let hits = Arc::clone(&hits);
            reference.register_callback(Arc::new(move |_| {
                hits.fetch_add(1, Ordering::Relaxed);
            }))
        })
        .collect();

    assert!(reference.remove_callback(slots[1]));
    assert!(!reference.remove_callback(slots[1]));
    let later = reference.register_callback(Arc::new(|_| {}));

    assert_eq!(slots[2].index(), 2);
    assert_eq!(slots[3].index(), 3);
    assert_eq!(later.index(), 4);
    assert!(reference.remove_callback(slots[3]));

    reference.set_data(&[1u32, 2]).unwrap();
    // slots 0 and 2 remain, plus the no-op callback
    assert_eq!(hits.load(Ordering::Relaxed), 2);
    assert_eq!(reference.callback_count(), 3);
}

// ============================================================================
// ArrayRef: use counting
// ============================================================================

#[test]
fn last_release_destroys_bytes() {
    let reference = ArrayRef::new("shared", &[1u8, 2, 3, 4]).unwrap();
    assert_eq!(reference.retain().unwrap(), 1);
    assert_eq!(reference.retain().unwrap(), 2);

    assert_eq!(reference.release(), 1);
    assert!(!reference.is_destroyed());
    assert_eq!(reference.release(), 0);

    assert!(reference.is_destroyed());
    assert_eq!(reference.value(), Err(Error::Destroyed("shared".to_string())));
    assert!(reference.retain().is_err());
}

// ============================================================================
// BlockRef
// ============================================================================

#[test]
fn block_layout_follows_uniform_alignment() {
    let layout = BlockLayout::compute([
        ("time", UniformType::F32),
        ("color", UniformType::Vec3),
        ("model", UniformType::Mat4),
        ("scale", UniformType::F32),
    ])
    .unwrap();

    assert_eq!(layout.field("time").unwrap().offset, 0);
    assert_eq!(layout.field("color").unwrap().offset, 16);
    assert_eq!(layout.field("model").unwrap().offset, 32);
    assert_eq!(layout.field("scale").unwrap().offset, 96);
    assert_eq!(layout.size(), 112);

    let wgsl = layout.wgsl_struct("Globals");
    assert!(wgsl.starts_with("struct Globals {"));
    assert!(wgsl.contains("color: vec3<f32>,"));
}

#[test]
fn block_update_serializes_fields() {
    let block = BlockRef::new(
        "material",
        vec![
            ("tint", Vec4::new(1.0, 0.5, 0.25, 1.0).into()),
            ("roughness", 0.75f32.into()),
        ],
    )
    .unwrap();
    block.update().unwrap();

    let bytes = block.array().value().unwrap();
    assert_eq!(bytes.len(), 32);
    assert_eq!(&floats(&bytes)[..5], &[1.0, 0.5, 0.25, 1.0, 0.75]);
}

#[test]
fn set_field_is_type_checked() {
    let block = BlockRef::new("globals", vec![("time", 0.0f32.into())]).unwrap();
    assert!(matches!(
        block.set_field("time", Vec3::ONE),
        Err(Error::FieldType { .. })
    ));
    assert!(block.set_field("missing", 1.0f32).is_err());

    block.set_field("time", 2.5f32).unwrap();
    assert_eq!(block.field_value("time"), Some(UniformValue::F32(2.5)));
}

#[test]
fn dynamic_fields_are_evaluated_on_update() {
    let frame = Arc::new(AtomicUsize::new(0));
    let source = {
        let frame = Arc::clone(&frame);
        FieldSource::dynamic(move || UniformValue::U32(frame.load(Ordering::Relaxed) as u32))
    };
    let block = BlockRef::new(
        "frame",
        vec![("index", source), ("model", Mat4::IDENTITY.into())],
    )
    .unwrap();
    assert!(block.has_dynamic_fields());

    frame.store(41, Ordering::Relaxed);
    block.update().unwrap();
    let bytes = block.array().value().unwrap();
    assert_eq!(bytes.len(), 80);
    assert_eq!(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 41);
}

#[test]
fn empty_block_is_a_configuration_error() {
    assert!(matches!(
        BlockRef::new("empty", Vec::new()),
        Err(Error::MissingField { .. })
    ));
}
