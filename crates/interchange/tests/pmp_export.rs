use charsnap_common::{GamePath, NullSink};
use charsnap_interchange::manip::manipulations_to_payload;
use charsnap_interchange::mtrl::{DX11_FLAG, MaterialSet, MaterialTexture};
use charsnap_interchange::{ExportCodec, ExportRequest, MaterialFile};
use charsnap_store::{BlobStore, FileMap, SnapshotState};
use serde_json::{Value, json};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const MATERIAL: &str = "chara/equipment/e0100/material/v0001/mt_c0101e0100_top_a.mtrl";
const NORMAL: &str = "chara/equipment/e0100/texture/v01_c0101e0100_top_n.tex";
const MASK_DX11: &str = "chara/equipment/e0100/texture/--v01_c0101e0100_top_m.tex";
const MODEL: &str = "chara/equipment/e0100/model/c0101e0100_top.mdl";

fn gp(s: &str) -> GamePath {
    GamePath::new(s).unwrap()
}

fn material_bytes() -> Vec<u8> {
    MaterialFile {
        version: 0x0103_0000,
        shader_package: "character.shpk".into(),
        textures: vec![
            MaterialTexture {
                path: NORMAL.into(),
                flags: 0,
            },
            MaterialTexture {
                path: "chara/equipment/e0100/texture/v01_c0101e0100_top_m.tex".into(),
                flags: DX11_FLAG,
            },
        ],
        uv_sets: vec![MaterialSet {
            name: "UVSet0".into(),
            index: 0,
        }],
        color_sets: Vec::new(),
        trailing: Vec::new(),
    }
    .to_bytes()
    .unwrap()
}

/// Snapshot with a material, its two textures and an unrelated model.
fn seed_snapshot(dir: &Path, manipulation: &str) {
    let blobs = BlobStore::new(dir);
    let mut mapping = FileMap::new();
    for (path, bytes) in [
        (MATERIAL, material_bytes()),
        (NORMAL, b"normal map".to_vec()),
        (MASK_DX11, b"mask map".to_vec()),
        (MODEL, b"model".to_vec()),
    ] {
        let path = gp(path);
        let put = blobs.put(&bytes, Some(&path)).unwrap();
        mapping.insert(path, put.hash);
    }
    let mut state = SnapshotState::new("Hero", None);
    state.capture_update(mapping, manipulation).unwrap();
    state.save(dir).unwrap();
}

fn read_entry(archive: &mut zip::ZipArchive<File>, name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    archive.by_name(name).unwrap().read_to_end(&mut out).unwrap();
    out
}

fn blob_entries(archive: &zip::ZipArchive<File>) -> Vec<String> {
    archive
        .file_names()
        .filter(|n| n.starts_with("files/"))
        .map(str::to_string)
        .collect()
}

#[test]
fn selected_material_brings_its_textures() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("hero");
    seed_snapshot(&dir, "");

    let sink = NullSink;
    let codec = ExportCodec::new("tester", &sink);
    let report = codec
        .export(&ExportRequest::new(&dir, tmp.path().join("out")).with_selection([gp(MATERIAL)]))
        .unwrap();
    assert_eq!(report.blobs, 3);
    assert_eq!(report.paths, 3);
    assert!(report.missing.is_empty());

    let mut archive = zip::ZipArchive::new(File::open(&report.archive).unwrap()).unwrap();
    assert_eq!(blob_entries(&archive).len(), 3);
    let manifest: Value = serde_json::from_slice(&read_entry(&mut archive, "default_mod.json")).unwrap();
    let files = manifest["Files"].as_object().unwrap();
    assert_eq!(files.len(), 3);
    assert!(files.contains_key(NORMAL));
    assert!(files.contains_key(MASK_DX11));
    assert!(!files.contains_key(MODEL));
    assert!(files.values().all(|v| v.as_str().unwrap().starts_with("files\\")));
    assert_eq!(manifest["Manipulations"], json!([]));
}

#[test]
fn full_export_writes_metadata_and_manipulations() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("hero");
    let manipulations = vec![json!({"Type": "Eqp", "Manipulation": {"Entry": 3}})];
    seed_snapshot(&dir, &manipulations_to_payload(&manipulations).unwrap());

    let sink = NullSink;
    let report = ExportCodec::new("tester", &sink)
        .export(&ExportRequest::new(&dir, tmp.path().join("out")).named("My Pack"))
        .unwrap();
    assert_eq!(report.archive, tmp.path().join("out").join("My Pack.pmp"));
    assert_eq!(report.blobs, 4);

    let mut archive = zip::ZipArchive::new(File::open(&report.archive).unwrap()).unwrap();
    let meta: Value = serde_json::from_slice(&read_entry(&mut archive, "meta.json")).unwrap();
    assert_eq!(meta["Name"], "My Pack");
    assert_eq!(meta["Author"], "tester");
    assert_eq!(meta["FileVersion"], 3);
    let manifest: Value = serde_json::from_slice(&read_entry(&mut archive, "default_mod.json")).unwrap();
    assert_eq!(manifest["Manipulations"], json!(manipulations));
    assert_eq!(manifest["Files"].as_object().unwrap().len(), 4);
}

#[test]
fn shared_blob_is_written_once() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("hero");
    let blobs = BlobStore::new(&dir);
    let mut mapping = FileMap::new();
    for path in ["chara/a.tex", "chara/b.tex"] {
        let path = gp(path);
        let put = blobs.put(b"same bytes", Some(&path)).unwrap();
        mapping.insert(path, put.hash);
    }
    let mut state = SnapshotState::new("Twins", None);
    state.capture_update(mapping, "").unwrap();
    state.save(&dir).unwrap();

    let sink = NullSink;
    let report = ExportCodec::new("tester", &sink)
        .export(&ExportRequest::new(&dir, tmp.path().join("out")))
        .unwrap();
    assert_eq!(report.blobs, 1);
    assert_eq!(report.paths, 2);
}

#[test]
fn unknown_node_exports_empty_mapping() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("hero");
    seed_snapshot(&dir, "");

    let sink = NullSink;
    let report = ExportCodec::new("tester", &sink)
        .export(&ExportRequest::new(&dir, tmp.path().join("out")).at_node("no-such-node"))
        .unwrap();
    assert_eq!(report.blobs, 0);
    assert_eq!(report.paths, 0);
    let archive = zip::ZipArchive::new(File::open(&report.archive).unwrap()).unwrap();
    assert!(blob_entries(&archive).is_empty());
}
