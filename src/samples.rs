//! The fixed sample set and the four emission steps that write it.
//!
//! Each step owns its files, draws randomness from its own salted RNG and
//! depends on nothing but the [`GeneratorConfig`] it is handed.

use std::path::PathBuf;

use rand::Rng;

use crate::array::DenseArray;
use crate::codec::hdf5::{self, Group};
use crate::codec::npz::{self, NamedArrays};
use crate::codec::npy;
use crate::codec::pickle::{self, Value};
use crate::config::GeneratorConfig;
use crate::error::SampleError;
use crate::fill;

pub const ARRAY_1D_FLOAT64: &str = "array_1d_float64.npy";
pub const MATRIX_3X3_INT32: &str = "matrix_3x3_int32.npy";
pub const TENSOR_2X4X3_FLOAT32: &str = "tensor_2x4x3_float32.npy";
pub const MULTI_ARRAYS: &str = "multi_arrays.npz";
pub const CONFIG_DICT: &str = "config_dict.pkl";
pub const NESTED_LIST: &str = "nested_list.pkl";
pub const EXPERIMENT: &str = "experiment.hdf5";

/// Every file a complete run leaves behind, in emission order.
pub const SAMPLE_FILES: [&str; 7] = [
    ARRAY_1D_FLOAT64,
    MATRIX_3X3_INT32,
    TENSOR_2X4X3_FLOAT32,
    MULTI_ARRAYS,
    CONFIG_DICT,
    NESTED_LIST,
    EXPERIMENT,
];

// Per-step RNG salts.
const DENSE_SALT: u64 = 0x4E50_5900;
const ARCHIVE_SALT: u64 = 0x4E50_5A00;
const HIERARCHY_SALT: u64 = 0x4844_4635;

/// Number of feature columns in the hierarchical sample.
pub const FEATURE_COLUMNS: usize = 4;

pub fn array_1d_float64() -> Result<DenseArray, SampleError> {
    DenseArray::new([20], fill::arange(0.0, 10.0, 0.5))
}

pub fn matrix_3x3_int32() -> Result<DenseArray, SampleError> {
    DenseArray::new([3, 3], (1..=9).collect::<Vec<i32>>())
}

pub fn tensor_2x4x3_float32<R: Rng + ?Sized>(rng: &mut R) -> Result<DenseArray, SampleError> {
    DenseArray::new([2, 4, 3], fill::uniform_f32(rng, 2 * 4 * 3))
}

/// `x`, `y` and `labels`: three shapes, three element types.
pub fn multi_arrays<R: Rng + ?Sized>(rng: &mut R) -> Result<NamedArrays, SampleError> {
    NamedArrays::new()
        .with("x", DenseArray::new([50], fill::linspace(0.0, 1.0, 50))?)?
        .with(
            "y",
            DenseArray::new([5, 5], fill::uniform_i32(rng, 0, 100, 25))?,
        )?
        .with("labels", DenseArray::new([5], vec![0i64, 1, 1, 0, 2])?)
}

/// Experiment settings: scalars, a float list, a nested mapping and tags.
pub fn config_dict() -> Value {
    Value::mapping([
        ("name", Value::from("test_experiment")),
        ("version", Value::Int(2)),
        ("scores", Value::sequence([95.5, 88.3, 76.1, 92.0])),
        (
            "config",
            Value::mapping([
                ("learning_rate", Value::Float(0.001)),
                ("batch_size", Value::Int(32)),
                ("epochs", Value::Int(100)),
            ]),
        ),
        ("tags", Value::sequence(["train", "v2", "final"])),
    ])
}

/// `[[1, 2, 3], [4, [5, 6]], {"a": 7, "b": [8, 9]}]`
pub fn nested_list() -> Value {
    Value::sequence([
        Value::sequence([1, 2, 3]),
        Value::sequence([Value::Int(4), Value::sequence([5, 6])]),
        Value::mapping([("a", Value::Int(7)), ("b", Value::sequence([8, 9]))]),
    ])
}

fn split<R: Rng + ?Sized>(
    rng: &mut R,
    rows: usize,
    labels: Vec<i32>,
) -> Result<Group, SampleError> {
    let features = DenseArray::new(
        [rows, FEATURE_COLUMNS],
        fill::uniform_f32(rng, rows * FEATURE_COLUMNS),
    )?;
    Group::new()
        .with_dataset("features", features)?
        .with_dataset("labels", DenseArray::new([labels.len()], labels)?)
}

/// Root `timestamps` plus `train` (10 rows) and `eval` (5 rows) groups.
pub fn experiment<R: Rng + ?Sized>(rng: &mut R) -> Result<Group, SampleError> {
    let timestamps = DenseArray::new([100], fill::arange(0.0, 100.0, 1.0))?;
    let train = split(rng, 10, vec![0, 1, 1, 0, 2, 1, 0, 2, 1, 0])?;
    let eval = split(rng, 5, vec![1, 0, 2, 1, 0])?;
    Group::new()
        .with_dataset("timestamps", timestamps)?
        .with_group("train", train)?
        .with_group("eval", eval)
}

/// The three single-array `.npy` files.
pub fn emit_dense_arrays(config: &GeneratorConfig) -> Result<Vec<PathBuf>, SampleError> {
    let mut rng = config.rng_for(DENSE_SALT);
    let arrays = [
        (ARRAY_1D_FLOAT64, array_1d_float64()?),
        (MATRIX_3X3_INT32, matrix_3x3_int32()?),
        (TENSOR_2X4X3_FLOAT32, tensor_2x4x3_float32(&mut rng)?),
    ];

    let mut written = Vec::with_capacity(arrays.len());
    for (name, array) in &arrays {
        let path = config.path_for(name);
        npy::save(&path, array)?;
        written.push(path);
    }
    Ok(written)
}

pub fn emit_archive(config: &GeneratorConfig) -> Result<Vec<PathBuf>, SampleError> {
    let mut rng = config.rng_for(ARCHIVE_SALT);
    let path = config.path_for(MULTI_ARRAYS);
    npz::save(&path, &multi_arrays(&mut rng)?)?;
    Ok(vec![path])
}

pub fn emit_object_graphs(config: &GeneratorConfig) -> Result<Vec<PathBuf>, SampleError> {
    let mut written = Vec::with_capacity(2);
    for (name, value) in [(CONFIG_DICT, config_dict()), (NESTED_LIST, nested_list())] {
        let path = config.path_for(name);
        pickle::save(&path, &value)?;
        written.push(path);
    }
    Ok(written)
}

pub fn emit_hierarchy(config: &GeneratorConfig) -> Result<Vec<PathBuf>, SampleError> {
    let mut rng = config.rng_for(HIERARCHY_SALT);
    let path = config.path_for(EXPERIMENT);
    hdf5::save(&path, &experiment(&mut rng)?)?;
    Ok(vec![path])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{ArrayData, DType};
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_fixed_arrays() {
        let array = array_1d_float64().unwrap();
        assert_eq!(array.shape(), &[20]);
        assert_eq!(array.dtype(), DType::Float64);

        let matrix = matrix_3x3_int32().unwrap();
        assert_eq!(
            matrix.data(),
            &ArrayData::Int32(vec![1, 2, 3, 4, 5, 6, 7, 8, 9])
        );
    }

    #[test]
    fn test_multi_arrays_contract() {
        let arrays = multi_arrays(&mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(arrays.names(), vec!["x", "y", "labels"]);
        assert_eq!(arrays.get("x").unwrap().dtype(), DType::Float64);
        assert_eq!(arrays.get("y").unwrap().shape(), &[5, 5]);
        assert_eq!(arrays.get("labels").unwrap().dtype(), DType::Int64);
    }

    #[test]
    fn test_object_graph_shapes() {
        assert_eq!(nested_list().depth(), 3);
        assert_eq!(
            config_dict().get("tags"),
            Some(&Value::sequence(["train", "v2", "final"]))
        );
    }

    #[test]
    fn test_experiment_layout() {
        let root = experiment(&mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(root.dataset_names(), vec!["timestamps"]);
        assert_eq!(root.group_names(), vec!["eval", "train"]);
        assert_eq!(root.dataset_at("train/features").unwrap().shape(), &[10, 4]);
        assert_eq!(root.dataset_at("eval/features").unwrap().shape(), &[5, 4]);
        assert_eq!(root.dataset_at("eval/labels").unwrap().dtype(), DType::Int32);
    }

    #[test]
    fn test_emit_steps_write_their_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = GeneratorConfig::with_output_dir(dir.path());
        let mut written = Vec::new();
        written.extend(emit_dense_arrays(&config).unwrap());
        written.extend(emit_archive(&config).unwrap());
        written.extend(emit_object_graphs(&config).unwrap());
        written.extend(emit_hierarchy(&config).unwrap());

        let expected: Vec<PathBuf> = SAMPLE_FILES.iter().map(|n| dir.path().join(n)).collect();
        assert_eq!(written, expected);
        assert!(written.iter().all(|path| path.is_file()));
    }
}
