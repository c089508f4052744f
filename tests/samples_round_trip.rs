use std::fs;
use std::path::Path;

use dataviewer_samples::codec::pickle::Value;
use dataviewer_samples::codec::{hdf5, npy, npz, pickle};
use dataviewer_samples::samples::{self, SAMPLE_FILES};
use dataviewer_samples::{ArrayData, DType, GeneratorConfig, SampleGenerator};

fn generate(dir: &Path) -> dataviewer_samples::ManifestReport {
    SampleGenerator::new(GeneratorConfig::with_output_dir(dir))
        .run()
        .expect("sample generation failed")
}

fn floats(data: &ArrayData) -> Vec<f64> {
    match data {
        ArrayData::Float32(values) => values.iter().map(|v| f64::from(*v)).collect(),
        ArrayData::Float64(values) => values.clone(),
        other => panic!("expected float data, got {:?}", other.dtype()),
    }
}

#[test]
fn empty_directory_gets_exactly_the_sample_set() {
    let dir = tempfile::tempdir().unwrap();
    let report = generate(dir.path());

    let mut expected: Vec<&str> = SAMPLE_FILES.to_vec();
    expected.sort();
    assert_eq!(report.names(), expected);
    assert!(report.entries.iter().all(|entry| entry.size_bytes > 0));
    for entry in &report.entries {
        let on_disk = fs::metadata(dir.path().join(&entry.name)).unwrap().len();
        assert_eq!(entry.size_bytes, on_disk, "{}", entry.name);
    }
}

#[test]
fn dense_arrays_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    generate(dir.path());

    let array = npy::load(&dir.path().join(samples::ARRAY_1D_FLOAT64)).unwrap();
    assert_eq!(array, samples::array_1d_float64().unwrap());
    assert_eq!(floats(array.data())[19], 9.5);

    let matrix = npy::load(&dir.path().join(samples::MATRIX_3X3_INT32)).unwrap();
    assert_eq!(matrix.shape(), &[3, 3]);
    assert_eq!(
        matrix.data(),
        &ArrayData::Int32(vec![1, 2, 3, 4, 5, 6, 7, 8, 9])
    );

    let tensor = npy::load(&dir.path().join(samples::TENSOR_2X4X3_FLOAT32)).unwrap();
    assert_eq!(tensor.shape(), &[2, 4, 3]);
    assert_eq!(tensor.dtype(), DType::Float32);
    assert!(floats(tensor.data()).iter().all(|v| (0.0..1.0).contains(v)));
}

#[test]
fn archive_holds_every_member() {
    let dir = tempfile::tempdir().unwrap();
    generate(dir.path());

    let path = dir.path().join(samples::MULTI_ARRAYS);
    let arrays = npz::load(&path).unwrap();
    assert_eq!(arrays.names(), vec!["x", "y", "labels"]);

    let x = floats(arrays.get("x").unwrap().data());
    assert_eq!(x.len(), 50);
    assert_eq!((x[0], x[49]), (0.0, 1.0));

    let y = arrays.get("y").unwrap();
    assert_eq!(y.shape(), &[5, 5]);
    match y.data() {
        ArrayData::Int32(values) => assert!(values.iter().all(|v| (0..100).contains(v))),
        other => panic!("unexpected y dtype {:?}", other.dtype()),
    }

    assert_eq!(
        arrays.get("labels").unwrap().data(),
        &ArrayData::Int64(vec![0, 1, 1, 0, 2])
    );

    // members are ordinary deflated .npy files
    let mut zip = zip::ZipArchive::new(fs::File::open(&path).unwrap()).unwrap();
    let member = zip.by_name("labels.npy").unwrap();
    assert_eq!(member.compression(), zip::CompressionMethod::Deflated);
}

#[test]
fn object_graphs_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    generate(dir.path());

    let config = pickle::load(&dir.path().join(samples::CONFIG_DICT)).unwrap();
    assert_eq!(config, samples::config_dict());
    let Value::Mapping(entries) = &config else {
        panic!("config_dict is not a mapping");
    };
    let keys: Vec<&str> = entries.iter().map(|(key, _)| key.as_str()).collect();
    assert_eq!(keys, vec!["name", "version", "scores", "config", "tags"]);

    let nested = pickle::load(&dir.path().join(samples::NESTED_LIST)).unwrap();
    assert_eq!(nested, samples::nested_list());
    assert_eq!(nested.depth(), 3);
}

#[test]
fn hierarchy_keeps_its_layout() {
    let dir = tempfile::tempdir().unwrap();
    generate(dir.path());

    let root = hdf5::load(&dir.path().join(samples::EXPERIMENT)).unwrap();
    assert_eq!(root.dataset_names(), vec!["timestamps"]);
    assert_eq!(root.group_names(), vec!["eval", "train"]);

    let timestamps = floats(root.dataset("timestamps").unwrap().data());
    assert_eq!(timestamps.len(), 100);
    assert_eq!(timestamps[99], 99.0);

    for (split, rows) in [("train", 10), ("eval", 5)] {
        let group = root.group(split).unwrap();
        assert_eq!(group.dataset_names(), vec!["features", "labels"]);
        assert!(group.group_names().is_empty());

        let features = group.dataset("features").unwrap();
        assert_eq!(features.shape(), &[rows, 4]);
        assert!(floats(features.data()).iter().all(|v| (0.0..1.0).contains(v)));

        let labels = group.dataset("labels").unwrap();
        assert_eq!(labels.shape(), &[rows]);
        assert_eq!(labels.dtype(), DType::Int32);
    }
}

#[test]
fn rerun_is_byte_identical() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    generate(first.path());
    generate(second.path());
    // a rerun in place overwrites with the same bytes
    generate(second.path());

    for name in SAMPLE_FILES {
        let a = fs::read(first.path().join(name)).unwrap();
        let b = fs::read(second.path().join(name)).unwrap();
        assert_eq!(a, b, "{name} differs between runs");
    }
}
