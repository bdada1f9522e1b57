use anyhow::{Context, Result};
use std::io::{Cursor, Read, Write};
use tracing::{debug, warn};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

use super::npy::{read_npy, write_npy_f32, NpyArray};
use crate::error::PipelineError;
use crate::tensor::SampleTensor;

/// Array names tried in order before falling back to the first array.
pub const PRIORITY_KEYS: [&str; 5] = ["data", "X", "sequences", "encoded_sequences", "features"];

const NPY_SUFFIX: &str = ".npy";

/// Largest decompressed `.npy` entry accepted by [`load_array`].
pub const DEFAULT_MAX_ARRAY_BYTES: usize = 64 * 1024 * 1024;

/// A preprocessed array normalised to a single-sample `(1, n)` tensor.
#[derive(Debug, Clone)]
pub struct PreprocessedArray {
    /// Name of the array that was selected.
    pub name: String,
    /// Shape of the array as stored in the container.
    pub source_shape: Vec<usize>,
    /// Samples beyond the first that were dropped.
    pub discarded_rows: usize,
    pub tensor: SampleTensor,
}

/// Parse an NPZ container, pick one array and normalise it to one row.
pub fn load_array(container: &[u8]) -> Result<PreprocessedArray, PipelineError> {
    load_array_with_limit(container, DEFAULT_MAX_ARRAY_BYTES)
}

/// [`load_array`] with an explicit cap on the selected entry's
/// decompressed size.
pub fn load_array_with_limit(
    container: &[u8],
    max_entry_bytes: usize,
) -> Result<PreprocessedArray, PipelineError> {
    let mut archive = ZipArchive::new(Cursor::new(container))
        .map_err(|e| PipelineError::malformed(e.to_string()))?;

    let mut names = Vec::with_capacity(archive.len());
    for idx in 0..archive.len() {
        let entry = archive
            .by_index(idx)
            .map_err(|e| PipelineError::malformed(e.to_string()))?;
        if let Some(name) = entry.name().strip_suffix(NPY_SUFFIX) {
            names.push((idx, name.to_string()));
        }
    }

    let (idx, name) = select_array(&names)
        .ok_or_else(|| PipelineError::malformed("No data found in NPZ file"))?;
    debug!("Selected array '{}' from {} candidates", name, names.len());

    let mut entry = archive
        .by_index(idx)
        .map_err(|e| PipelineError::malformed(e.to_string()))?;
    let too_large = || {
        PipelineError::malformed(format!(
            "array '{}' decompresses to more than {} bytes",
            name, max_entry_bytes
        ))
    };
    // Declared sizes are untrusted; the bounded read enforces the cap.
    let declared = entry.size();
    if declared > max_entry_bytes as u64 {
        return Err(too_large());
    }
    let mut raw = Vec::with_capacity(declared as usize);
    (&mut entry)
        .take((max_entry_bytes as u64).saturating_add(1))
        .read_to_end(&mut raw)
        .map_err(|e| PipelineError::malformed(format!("failed to read '{}': {}", name, e)))?;
    if raw.len() > max_entry_bytes {
        return Err(too_large());
    }

    let array = read_npy(&raw)?;
    let source_shape = array.shape.clone();
    let (values, discarded_rows) = first_sample(array)?;

    if discarded_rows > 0 {
        warn!(
            "Array '{}' has shape {:?}; using the first sample and discarding {} more",
            name, source_shape, discarded_rows
        );
    }

    Ok(PreprocessedArray {
        name,
        source_shape,
        discarded_rows,
        tensor: SampleTensor::row(values),
    })
}

fn select_array(names: &[(usize, String)]) -> Option<(usize, String)> {
    PRIORITY_KEYS
        .iter()
        .find_map(|key| names.iter().find(|(_, name)| name == key))
        .or_else(|| names.first())
        .cloned()
}

/// Keep sample 0 along the leading axis, flattened in C order.
/// 0-d and 1-d arrays are a single sample already.
fn first_sample(array: NpyArray) -> Result<(Vec<f32>, usize), PipelineError> {
    let NpyArray {
        shape,
        fortran_order,
        values,
    } = array;

    if values.is_empty() {
        return Err(PipelineError::malformed(format!(
            "array of shape {:?} has no elements",
            shape
        )));
    }
    if shape.len() <= 1 {
        return Ok((values, 0));
    }

    let samples = shape[0];
    let width: usize = shape[1..].iter().product();

    if !fortran_order {
        let mut values = values;
        values.truncate(width);
        return Ok((values, samples - 1));
    }

    // Column-major: element (0, i1, .., ik) lives at sum(i_k * prod(shape[..k])).
    let strides: Vec<usize> = (0..shape.len())
        .map(|k| shape[..k].iter().product())
        .collect();
    let mut out = Vec::with_capacity(width);
    for flat in 0..width {
        let mut rem = flat;
        let mut offset = 0;
        for k in (1..shape.len()).rev() {
            offset += (rem % shape[k]) * strides[k];
            rem /= shape[k];
        }
        out.push(values[offset]);
    }
    Ok((out, samples - 1))
}

/// Builds a deflate-compressed NPZ container of `f32` arrays.
pub struct NpzWriter {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
}

impl Default for NpzWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl NpzWriter {
    pub fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
        }
    }

    pub fn add(&mut self, name: &str, shape: &[usize], values: &[f32]) -> Result<()> {
        self.zip
            .start_file(format!("{}{}", name, NPY_SUFFIX), self.options)
            .with_context(|| format!("Failed to start npz entry {}", name))?;
        self.zip
            .write_all(&write_npy_f32(shape, values))
            .with_context(|| format!("Failed to write npz entry {}", name))?;
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        let cursor = self.zip.finish().context("Failed to finish npz archive")?;
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::npy::npy_bytes;

    fn single(name: &str, shape: &[usize], values: &[f32]) -> Vec<u8> {
        let mut writer = NpzWriter::new();
        writer.add(name, shape, values).unwrap();
        writer.finish().unwrap()
    }

    fn npz_with_raw(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, bytes) in entries {
            zip.start_file(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_priority_key_wins_over_order() {
        let mut writer = NpzWriter::new();
        writer.add("foo", &[3], &[9.0, 9.0, 9.0]).unwrap();
        writer.add("data", &[1, 2], &[1.0, 2.0]).unwrap();
        let container = writer.finish().unwrap();

        let loaded = load_array(&container).unwrap();
        assert_eq!(loaded.name, "data");
        assert_eq!(loaded.tensor.shape(), [1, 2]);
        assert_eq!(loaded.tensor.values(), &[1.0, 2.0]);
    }

    #[test]
    fn test_priority_order_between_known_keys() {
        let mut writer = NpzWriter::new();
        writer.add("features", &[1], &[3.0]).unwrap();
        writer.add("X", &[1], &[2.0]).unwrap();
        let container = writer.finish().unwrap();
        assert_eq!(load_array(&container).unwrap().name, "X");
    }

    #[test]
    fn test_unrecognised_single_array_used() {
        let container = single("arr_0", &[4], &[0.5, 0.25, 0.0, 1.0]);
        let loaded = load_array(&container).unwrap();
        assert_eq!(loaded.name, "arr_0");
        assert_eq!(loaded.tensor.shape(), [1, 4]);
        assert_eq!(loaded.discarded_rows, 0);
    }

    #[test]
    fn test_multiple_rows_keep_first() {
        let values: Vec<f32> = (0..15).map(|v| v as f32).collect();
        let container = single("data", &[5, 3], &values);

        let loaded = load_array(&container).unwrap();
        assert_eq!(loaded.source_shape, vec![5, 3]);
        assert_eq!(loaded.discarded_rows, 4);
        assert_eq!(loaded.tensor.shape(), [1, 3]);
        assert_eq!(loaded.tensor.values(), &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_three_dimensional_first_sample() {
        let values: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let container = single("data", &[2, 3, 2], &values);
        let loaded = load_array(&container).unwrap();
        assert_eq!(loaded.tensor.values(), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(loaded.discarded_rows, 1);
    }

    #[test]
    fn test_fortran_order_first_row() {
        // Logical [[1, 2, 3], [4, 5, 6]] stored column-major.
        let payload: Vec<u8> = [1.0f32, 4.0, 2.0, 5.0, 3.0, 6.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let container = npz_with_raw(&[("data.npy", npy_bytes("<f4", true, &[2, 3], &payload))]);
        let loaded = load_array(&container).unwrap();
        assert_eq!(loaded.tensor.values(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_float64_cast_to_f32() {
        let payload: Vec<u8> = [0.5f64, 0.75].iter().flat_map(|v| v.to_le_bytes()).collect();
        let container = npz_with_raw(&[("X.npy", npy_bytes("<f8", false, &[2], &payload))]);
        let loaded = load_array(&container).unwrap();
        assert_eq!(loaded.tensor.values(), &[0.5f32, 0.75f32]);
    }

    #[test]
    fn test_decompressed_size_capped() {
        // 400 KB of zeros deflates to well under 1 KB.
        let container = single("data", &[1, 100_000], &vec![0.0; 100_000]);
        assert!(container.len() < 4096);
        assert!(matches!(
            load_array_with_limit(&container, 64 * 1024),
            Err(PipelineError::MalformedContainer(_))
        ));
        assert_eq!(
            load_array_with_limit(&container, 1024 * 1024).unwrap().tensor.shape(),
            [1, 100_000]
        );
    }

    #[test]
    fn test_inflated_declared_size_rejected() {
        let mut container = single("data", &[4], &[1.0, 2.0, 3.0, 4.0]);
        // Uncompressed size field of the central directory record.
        let central = container
            .windows(4)
            .position(|w| w == b"PK\x01\x02")
            .unwrap();
        container[central + 24..central + 28].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());

        assert!(matches!(
            load_array_with_limit(&container, 1024 * 1024),
            Err(PipelineError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_malformed_containers() {
        assert!(matches!(
            load_array(b"not a zip archive"),
            Err(PipelineError::MalformedContainer(_))
        ));

        let empty = npz_with_raw(&[]);
        assert!(matches!(load_array(&empty), Err(PipelineError::MalformedContainer(_))));

        let no_arrays = npz_with_raw(&[("notes.txt", b"hello".to_vec())]);
        assert!(matches!(load_array(&no_arrays), Err(PipelineError::MalformedContainer(_))));

        let zero_rows = single("data", &[0, 4], &[]);
        assert!(matches!(load_array(&zero_rows), Err(PipelineError::MalformedContainer(_))));
    }
}
