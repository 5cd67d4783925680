//! Manifest integration tests
//!
//! Manifests are written to disk, loaded, built and resolved end to end.

use std::path::PathBuf;

use tempfile::TempDir;
use topoload_core::device_manager::DeliveryState;
use topoload_core::{DxvaMode, Error, Manifest, TopologyLoader};

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn classes(report: &topoload_core::ResolutionReport) -> Vec<&str> {
    report.inserted_nodes.iter().map(|n| n.class.as_str()).collect()
}

const MP3_PLAYBACK: &str = r#"
version: v1
metadata:
  name: mp3 playback
nodes:
  - id: file
    kind: source
    types:
      - { major: audio, subtype: mp3, sample_rate: 44100, channels: 2 }
    current: 0
  - id: speaker
    kind: output
    types:
      - { major: audio, subtype: pcm, sample_rate: 44100, channels: 2, bits_per_sample: 16, complete: true }
    current: 0
connections:
  - { from: file, to: speaker }
"#;

// ============================================================================
// Audio
// ============================================================================

#[test]
fn test_mp3_manifest_resolves_with_decoder() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "playback.yaml", MP3_PLAYBACK);

    let manifest = Manifest::from_file(&path).unwrap();
    assert_eq!(manifest.metadata.name, "mp3 playback");
    let (topology, nodes) = manifest.build().unwrap();

    let (resolved, report) = TopologyLoader::new().load_with_report(&topology).unwrap();
    assert_eq!(resolved.node_count(), 3);
    assert_eq!(classes(&report), vec!["mp3_decoder"]);

    let decoder = report.inserted_nodes[0].id;
    assert_eq!(report.inserted_nodes[0].between, (nodes["file"].id(), nodes["speaker"].id()));
    let delivered = report.connection_type(decoder, nodes["speaker"].id()).unwrap();
    assert_eq!(delivered.subtype.as_deref(), Some("pcm"));
    assert_eq!(delivered.attributes["bits_per_sample"], serde_json::json!(16));
}

#[test]
fn test_class_transform_is_bound_and_negotiated() {
    let yaml = r#"
version: v1
nodes:
  - id: mic
    kind: source
    types:
      - { major: audio, subtype: pcm, sample_rate: 44100, channels: 2, bits_per_sample: 16, complete: true }
    current: 0
  - id: resample
    kind: transform
    class: resampler
  - id: speaker
    kind: output
    types:
      - { major: audio, subtype: pcm, sample_rate: 48000, channels: 2, bits_per_sample: 16, complete: true }
    current: 0
connections:
  - { from: mic, to: resample }
  - { from: resample, to: speaker }
"#;
    let (topology, nodes) = Manifest::from_yaml(yaml).unwrap().build().unwrap();
    let (resolved, report) = TopologyLoader::new().load_with_report(&topology).unwrap();

    assert_eq!(resolved.node_count(), 3);
    assert!(!report.has_conversions());
    assert_eq!(
        report.node(nodes["resample"].id()).unwrap().class.as_deref(),
        Some("resampler")
    );
    let delivered = report
        .connection_type(nodes["resample"].id(), nodes["speaker"].id())
        .unwrap();
    assert_eq!(delivered.attributes["sample_rate"], serde_json::json!(48000));
}

#[test]
fn test_json_manifest_with_tee() {
    let json = r#"{
        "version": "v1",
        "nodes": [
            {"id": "mic", "kind": "source", "current": 0, "types": [
                {"major": "audio", "subtype": "pcm", "sample_rate": 44100, "channels": 2, "bits_per_sample": 16, "complete": true}
            ]},
            {"id": "split", "kind": "tee"},
            {"id": "monitor", "kind": "output", "types": [
                {"major": "audio", "subtype": "pcm", "sample_rate": 44100, "channels": 2, "bits_per_sample": 16, "complete": true}
            ]},
            {"id": "recorder", "kind": "output", "connect_method": "allow_converter", "current": 0, "types": [
                {"major": "audio", "subtype": "pcm", "sample_rate": 48000, "channels": 2, "bits_per_sample": 16, "complete": true}
            ]}
        ],
        "connections": [
            {"from": "mic", "to": "split"},
            {"from": "split", "output": 0, "to": "monitor"},
            {"from": "split", "output": 1, "to": "recorder"}
        ]
    }"#;
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "split.json", json);

    let (topology, nodes) = Manifest::from_file(&path).unwrap().build().unwrap();
    let (resolved, report) = TopologyLoader::new().load_with_report(&topology).unwrap();
    assert_eq!(resolved.node_count(), 5);
    assert_eq!(classes(&report), vec!["resampler"]);
    assert_eq!(
        report.inserted_nodes[0].between,
        (nodes["split"].id(), nodes["recorder"].id())
    );
}

// ============================================================================
// DXVA
// ============================================================================

const VIDEO: &str = r#"
version: v1
topology:
  dxva_mode: full
nodes:
  - id: camera
    kind: source
    types:
      - { major: video, subtype: nv12, frame_size: [640, 480] }
    current: 0
  - id: effect
    kind: transform
    aware: d3d11
    inputs: [{ major: video, subtype: nv12 }]
    outputs: [{ major: video, subtype: nv12, frame_size: [640, 480] }]
  - id: screen
    kind: output
    d3d11_aware: true
    device_manager: d3d11
    types:
      - { major: video, subtype: nv12, frame_size: [640, 480] }
connections:
  - { from: camera, to: effect }
  - { from: effect, to: screen }
"#;

#[test]
fn test_full_mode_manifest_delivers_device_manager() {
    let (topology, nodes) = Manifest::from_yaml(VIDEO).unwrap().build().unwrap();
    let (_, report) = TopologyLoader::new().load_with_report(&topology).unwrap();

    assert_eq!(report.dxva_mode, DxvaMode::Full);
    let states: Vec<_> = report.device_managers.iter().map(|d| (d.node, d.state)).collect();
    assert_eq!(
        states,
        vec![
            (nodes["effect"].id(), DeliveryState::Delivered),
            (nodes["camera"].id(), DeliveryState::NotAware),
        ]
    );
}

#[test]
fn test_default_mode_manifest_inserts_copier() {
    let yaml = VIDEO
        .replace("dxva_mode: full", "dxva_mode: default")
        .replace("aware: d3d11", "provides_samples: true");
    let (topology, nodes) = Manifest::from_yaml(&yaml).unwrap().build().unwrap();
    let (resolved, report) = TopologyLoader::new().load_with_report(&topology).unwrap();

    assert_eq!(resolved.node_count(), 4);
    assert_eq!(classes(&report), vec!["sample_copier"]);
    assert_eq!(
        report.inserted_nodes[0].between,
        (nodes["effect"].id(), nodes["screen"].id())
    );
}

#[test]
fn test_refused_device_manager_from_manifest() {
    let yaml = VIDEO.replace("aware: d3d11", "aware: d3d11\n    refuse_device_manager: true");
    let (topology, _) = Manifest::from_yaml(&yaml).unwrap().build().unwrap();
    let err = TopologyLoader::new().load(&topology).unwrap_err();
    assert!(matches!(err, Error::DeviceManagerDelivery { .. }), "got {:?}", err);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_deferred_sink_is_refused() {
    let yaml = MP3_PLAYBACK.replace("kind: output", "kind: output\n    deferred: true");
    let (topology, nodes) = Manifest::from_yaml(&yaml).unwrap().build().unwrap();
    let err = TopologyLoader::new().load(&topology).unwrap_err();
    assert!(
        matches!(err, Error::SinkActivatesUnsupported(id) if id == nodes["speaker"].id()),
        "got {:?}",
        err
    );
}

#[test]
fn test_invalid_manifest_files() {
    let dir = tempfile::tempdir().unwrap();

    let garbage = write(&dir, "garbage.yaml", "nodes: [unterminated");
    let err = Manifest::from_file(&garbage).unwrap_err();
    assert!(matches!(err, Error::InvalidManifest(_)), "got {:?}", err);

    let dangling = write(&dir, "dangling.yaml", &MP3_PLAYBACK.replace("to: speaker", "to: headphones"));
    let manifest = Manifest::from_file(&dangling).unwrap();
    assert!(manifest.build().is_err());

    assert!(Manifest::from_file(dir.path().join("missing.yaml")).is_err());
}
