//! Buffer Family Tests
//!
//! Tests for:
//! - Region placement (alignment, explicit offsets, declared sizes)
//! - Device realization on tick and per-region writes
//! - Late region registration growing the device buffer
//! - Shared references across buffers and destruction
//! - Memory accounting

use tessera::device::DeviceCall;
use tessera::{
    ArrayRef, BufferDescriptor, BufferKind, Director, DirectorSettings, Error, HeadlessDevice,
    RegionDescriptor,
};

fn director() -> (Director<HeadlessDevice>, HeadlessDevice) {
    let device = HeadlessDevice::new();
    let probe = device.clone();
    (Director::new(device, DirectorSettings::default()), probe)
}

fn bytes(name: &str, len: usize) -> ArrayRef {
    ArrayRef::from_bytes(name, &vec![0xAB; len], 1).unwrap()
}

fn writes(probe: &HeadlessDevice) -> Vec<(u64, u64)> {
    probe
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            DeviceCall::WriteBuffer { offset, len, .. } => Some((offset, len)),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Region placement
// ============================================================================

#[test]
fn declared_twelve_bytes_from_ten_byte_reference() {
    let (mut director, _) = director();
    let handle = director
        .create_buffer(
            BufferDescriptor::new("padded", BufferKind::Uniform)
                .with_size(12)
                .with_region(RegionDescriptor::new(bytes("data", 10)).with_alignment(4)),
        )
        .unwrap();

    let buffer = director.buffer(handle).unwrap();
    assert_eq!(buffer.size(), 12);
    assert_eq!(buffer.regions().len(), 1);
    assert_eq!(buffer.regions()[0].offset, 0);
    assert_eq!(buffer.regions()[0].size, 12);
}

#[test]
fn second_region_starts_at_aligned_end_of_first() {
    let (mut director, _) = director();
    for alignment in [1u64, 4, 16, 256] {
        let handle = director
            .create_buffer(
                BufferDescriptor::new(&format!("aligned-{alignment}"), BufferKind::Storage { read_only: true })
                    .with_region(RegionDescriptor::new(bytes("first", 20)))
                    .with_region(RegionDescriptor::new(bytes("second", 8)).with_alignment(alignment)),
            )
            .unwrap();
        let regions = director.buffer(handle).unwrap().regions();
        let first = &regions[0];
        assert_eq!(
            regions[1].offset,
            (first.offset + first.size).next_multiple_of(alignment),
            "alignment {alignment}"
        );
    }
}

#[test]
fn region_past_declared_size_is_rejected() {
    let (mut director, _) = director();
    let result = director.create_buffer(
        BufferDescriptor::new("small", BufferKind::Uniform)
            .with_size(16)
            .with_region(RegionDescriptor::new(bytes("a", 12)))
            .with_region(RegionDescriptor::new(bytes("b", 8))),
    );
    assert!(matches!(result, Err(Error::RegionOverflow { .. })));
    assert_eq!(director.monitor().buffer_count(), 0);
}

#[test]
fn declared_size_must_match_regions() {
    let (mut director, _) = director();
    let result = director.create_buffer(
        BufferDescriptor::new("loose", BufferKind::Uniform)
            .with_size(64)
            .with_region(RegionDescriptor::new(bytes("a", 16))),
    );
    assert_eq!(
        result.unwrap_err(),
        Error::SizeMismatch {
            label: "loose".to_string(),
            declared: 64,
            computed: 16,
        }
    );
}

#[test]
fn duplicate_region_names_are_rejected() {
    let (mut director, _) = director();
    let result = director.create_buffer(
        BufferDescriptor::new("dup", BufferKind::Uniform)
            .with_region(RegionDescriptor::new(bytes("a", 4)))
            .with_region(RegionDescriptor::new(bytes("a", 4))),
    );
    assert!(matches!(result, Err(Error::DuplicateRegion { .. })));
}

#[test]
fn vertex_buffer_requires_stride() {
    let (mut director, _) = director();
    let result = director.create_buffer(
        BufferDescriptor::new("verts", BufferKind::vertex(0, Vec::new()))
            .with_region(RegionDescriptor::new(bytes("a", 12))),
    );
    assert!(matches!(result, Err(Error::MissingField { field: "stride", .. })));
}

// ============================================================================
// Device realization
// ============================================================================

#[test]
fn tick_creates_buffer_and_writes_each_region() {
    let (mut director, probe) = director();
    let handle = director
        .create_buffer(
            BufferDescriptor::new("two-regions", BufferKind::Uniform)
                .with_region(RegionDescriptor::new(bytes("a", 16)))
                .with_region(RegionDescriptor::new(bytes("b", 6)).with_alignment(16)),
        )
        .unwrap();
    assert!(!director.buffer(handle).unwrap().is_realized());

    director.tick();

    assert!(director.buffer(handle).unwrap().is_realized());
    assert_eq!(probe.count(|c| matches!(c, DeviceCall::CreateBuffer { .. })), 1);
    assert_eq!(writes(&probe), vec![(0, 16), (16, 8)]);
    assert_eq!(director.last_frame_stats().buffer_writes, 2);
    assert!(probe.validation_errors().is_empty());
}

#[test]
fn mutating_one_reference_rewrites_only_its_region() {
    let (mut director, probe) = director();
    let a = ArrayRef::new("a", &[0u32; 4]).unwrap();
    let b = ArrayRef::new("b", &[0u32; 4]).unwrap();
    director
        .create_buffer(
            BufferDescriptor::new("pair", BufferKind::Storage { read_only: false })
                .with_region(RegionDescriptor::new(a))
                .with_region(RegionDescriptor::new(b.clone())),
        )
        .unwrap();
    director.tick();
    probe.clear_calls();

    b.set_element_as(2, &5u32).unwrap();
    b.set_element_as(3, &6u32).unwrap();
    director.tick();

    assert_eq!(writes(&probe), vec![(16, 16)]);
}

#[test]
fn second_tick_without_mutation_writes_nothing() {
    let (mut director, probe) = director();
    director
        .create_buffer(BufferDescriptor::new("idle", BufferKind::Uniform).with_region(RegionDescriptor::new(bytes("a", 32))))
        .unwrap();

    director.tick();
    let after_first = probe.buffer_writes();
    director.tick();

    assert_eq!(probe.buffer_writes(), after_first);
    assert_eq!(director.last_frame_stats().buffer_writes, 0);
    assert_eq!(director.pending_updates(), 0);
}

#[test]
fn reference_outgrowing_its_region_is_not_written() {
    let (mut director, probe) = director();
    let a = bytes("a", 8);
    let handle = director
        .create_buffer(
            BufferDescriptor::new("fixed", BufferKind::Uniform)
                .with_region(RegionDescriptor::new(a.clone()))
                .with_region(RegionDescriptor::new(bytes("b", 8))),
        )
        .unwrap();
    director.tick();
    probe.clear_calls();

    a.set_value(&[2u8; 16]).unwrap();
    director.tick();
    director.tick();

    assert!(writes(&probe).is_empty());
    let buffer = director.buffer(handle).unwrap();
    assert_eq!(buffer.region("a").unwrap().size, 8);
    assert_eq!(probe.buffer_desc(buffer.gpu_id().unwrap()).unwrap().size, 16);

    a.set_value(&[3u8; 8]).unwrap();
    director.tick();

    assert_eq!(writes(&probe), vec![(0, 8)]);
}

#[test]
fn late_region_grows_device_buffer() {
    let (mut director, probe) = director();
    let handle = director
        .create_buffer(BufferDescriptor::new("growing", BufferKind::Uniform).with_region(RegionDescriptor::new(bytes("a", 16))))
        .unwrap();
    director.tick();
    let first_id = director.buffer(handle).unwrap().gpu_id().unwrap();

    director
        .register_region(handle, RegionDescriptor::new(bytes("b", 16)).with_alignment(16))
        .unwrap();
    director.tick();

    let buffer = director.buffer(handle).unwrap();
    let second_id = buffer.gpu_id().unwrap();
    assert_ne!(first_id, second_id);
    assert_eq!(probe.buffer_desc(second_id).unwrap().size, 32);
    assert_eq!(probe.count(|c| matches!(c, DeviceCall::DestroyBuffer(_))), 1);
    assert_eq!(director.monitor().buffer_bytes(), 32);
}

// ============================================================================
// Shared references & destruction
// ============================================================================

#[test]
fn shared_reference_survives_until_last_buffer_is_destroyed() {
    let (mut director, probe) = director();
    let shared = ArrayRef::new("shared", &[1.0f32, 2.0, 3.0]).unwrap();

    let first = director
        .create_buffer(BufferDescriptor::new("first", BufferKind::Uniform).with_region(RegionDescriptor::new(shared.clone())))
        .unwrap();
    let second = director
        .create_buffer(
            BufferDescriptor::new("second", BufferKind::Storage { read_only: true })
                .with_region(RegionDescriptor::new(shared.clone())),
        )
        .unwrap();
    assert_eq!(shared.use_count(), 2);
    director.tick();

    director.destroy_buffer(first).unwrap();
    assert_eq!(shared.use_count(), 1);
    assert!(shared.value().is_ok());

    director.destroy_buffer(second).unwrap();
    assert_eq!(shared.use_count(), 0);
    assert_eq!(shared.value(), Err(Error::Destroyed("shared".to_string())));

    assert!(director.buffer(first).is_none());
    assert_eq!(director.destroy_buffer(first), Err(Error::UnknownHandle("buffer")));
    assert_eq!(probe.live_buffers(), 0);
}

#[test]
fn destroyed_buffer_ignores_reference_mutations() {
    let (mut director, probe) = director();
    let shared = ArrayRef::new("shared", &[0u32; 4]).unwrap();
    shared.retain().unwrap();

    let handle = director
        .create_buffer(BufferDescriptor::new("gone", BufferKind::Uniform).with_region(RegionDescriptor::new(shared.clone())))
        .unwrap();
    director.tick();
    director.destroy_buffer(handle).unwrap();
    probe.clear_calls();

    shared.set_element_as(0, &1u32).unwrap();
    director.tick();

    assert_eq!(probe.buffer_writes(), 0);
    assert_eq!(shared.callback_count(), 0);
}

#[test]
fn destroyed_reference_cannot_back_a_new_buffer() {
    let (mut director, _) = director();
    let gone = bytes("gone", 8);
    gone.retain().unwrap();
    gone.release();

    let result = director.create_buffer(BufferDescriptor::new("late", BufferKind::Uniform).with_region(RegionDescriptor::new(gone)));
    assert_eq!(result.unwrap_err(), Error::Destroyed("gone".to_string()));
}

// ============================================================================
// Memory accounting
// ============================================================================

#[test]
fn monitor_tracks_construction_and_destruction() {
    let (mut director, _) = director();
    let a = director
        .create_buffer(BufferDescriptor::new("a", BufferKind::Uniform).with_region(RegionDescriptor::new(bytes("a", 64))))
        .unwrap();
    let _b = director
        .create_buffer(BufferDescriptor::new("b", BufferKind::Indirect).with_size(16))
        .unwrap();

    assert_eq!(director.monitor().buffer_count(), 2);
    assert_eq!(director.monitor().buffer_bytes(), 80);

    director.destroy_buffer(a).unwrap();
    assert_eq!(director.monitor().buffer_count(), 1);
    assert_eq!(director.monitor().buffer_bytes(), 16);
    assert_eq!(director.monitor().peak_bytes(), 80);
}
