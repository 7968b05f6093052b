//! Feature-vector data pipeline.
//!
//! Samples are flat `Vec<f32>` feature vectors (e.g. flattened image
//! patches). They are read from JSONL files or generated synthetically and
//! stacked into `(batch, dim)` tensors by [`FeatureBatcher`], which plugs into
//! burn's `DataLoaderBuilder`.

use std::io::BufRead;
use std::path::Path;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::InMemDataset;
use burn::prelude::*;
use burn::tensor::TensorData;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};


/// One training or validation sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureSample {
    pub features: Vec<f32>,
}

/// A batch of samples stacked into a `(batch, dim)` tensor.
#[derive(Clone, Debug)]
pub struct FeatureBatch<B: Backend> {
    pub features: Tensor<B, 2>,
}

impl<B: Backend> FeatureBatch<B> {
    /// Number of samples in the batch.
    pub fn len(&self) -> usize {
        self.features.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stacks `FeatureSample`s into a [`FeatureBatch`] on a fixed device.
///
/// The device is chosen once when the batcher is built, so every batch the
/// loader yields already lives where the model does.
#[derive(Clone, Debug)]
pub struct FeatureBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> FeatureBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<FeatureSample, FeatureBatch<B>> for FeatureBatcher<B> {
    /// Row-major stack of the samples' features.
    ///
    /// Panics if the samples disagree on their dimension; `load_jsonl`
    /// rejects such files before they reach a loader.
    fn batch(&self, items: Vec<FeatureSample>) -> FeatureBatch<B> {
        let batch_size = items.len();
        let dim = items.first().map_or(0, |s| s.features.len());
        let mut flat = Vec::with_capacity(batch_size * dim);
        for (i, sample) in items.into_iter().enumerate() {
            assert_eq!(
                sample.features.len(),
                dim,
                "sample {i} in batch has {} features, expected {dim}",
                sample.features.len()
            );
            flat.extend(sample.features);
        }
        FeatureBatch {
            features: Tensor::from_data(TensorData::new(flat, [batch_size, dim]), &self.device),
        }
    }
}

/// Number of batches a loader yields for `len` samples (last batch may be short).
pub fn num_batches(len: usize, batch_size: usize) -> usize {
    len.div_ceil(batch_size)
}

/// Load feature samples from a JSONL file, one `{"features": [...]}` per line.
///
/// Blank lines are skipped. Fails on an empty file or when samples disagree
/// on their dimension.
pub fn load_jsonl(path: &Path) -> anyhow::Result<InMemDataset<FeatureSample>> {
    let file = std::fs::File::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to open feature file {}: {e}", path.display()))?;
    let reader = std::io::BufReader::new(file);

    let mut samples = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let sample: FeatureSample = serde_json::from_str(&line).map_err(|e| {
            anyhow::anyhow!("{}:{}: failed to parse sample: {e}", path.display(), line_no + 1)
        })?;
        samples.push(sample);
    }

    let dim = check_dimensions(&samples)
        .map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        samples = samples.len(),
        dim,
        "Loaded feature samples"
    );

    Ok(InMemDataset::new(samples))
}

/// Return the shared feature dimension, or an error if it is zero or varies.
pub fn check_dimensions(samples: &[FeatureSample]) -> anyhow::Result<usize> {
    let first = samples
        .first()
        .ok_or_else(|| anyhow::anyhow!("no samples"))?;
    let dim = first.features.len();
    if dim == 0 {
        anyhow::bail!("samples have zero features");
    }
    if let Some((i, bad)) = samples
        .iter()
        .enumerate()
        .find(|(_, s)| s.features.len() != dim)
    {
        anyhow::bail!(
            "sample {i} has {} features, expected {dim}",
            bad.features.len()
        );
    }
    Ok(dim)
}

/// Seeded clustered samples for smoke runs and tests.
///
/// Draws `n` vectors of dimension `dim` around 4 random centers in
/// `[-1, 1]^dim` with uniform noise of half-width 0.1.
pub fn synthetic_samples(n: usize, dim: usize, seed: u64) -> Vec<FeatureSample> {
    const NUM_CLUSTERS: usize = 4;
    let mut rng = StdRng::seed_from_u64(seed);
    let centers: Vec<Vec<f32>> = (0..NUM_CLUSTERS)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect();

    (0..n)
        .map(|i| {
            let center = &centers[i % NUM_CLUSTERS];
            let features = center
                .iter()
                .map(|c| c + rng.gen_range(-0.1_f32..0.1))
                .collect();
            FeatureSample { features }
        })
        .collect()
}

/// [`synthetic_samples`] wrapped in an in-memory dataset.
pub fn synthetic_dataset(n: usize, dim: usize, seed: u64) -> InMemDataset<FeatureSample> {
    InMemDataset::new(synthetic_samples(n, dim, seed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::data::dataset::Dataset;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_batcher_stacks_samples() {
        let device = Default::default();
        let batcher = FeatureBatcher::<TestBackend>::new(device);
        let batch = batcher.batch(vec![
            FeatureSample { features: vec![1.0, 2.0, 3.0] },
            FeatureSample { features: vec![4.0, 5.0, 6.0] },
        ]);
        assert_eq!(batch.features.dims(), [2, 3]);
        assert_eq!(batch.len(), 2);
        let values: Vec<f32> = batch.features.into_data().to_vec().unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    #[should_panic(expected = "sample 1 in batch has 1 features")]
    fn test_batcher_rejects_ragged_samples() {
        let batcher = FeatureBatcher::<TestBackend>::new(Default::default());
        batcher.batch(vec![
            FeatureSample { features: vec![1.0, 2.0] },
            FeatureSample { features: vec![3.0] },
        ]);
    }

    #[test]
    fn test_num_batches() {
        assert_eq!(num_batches(48, 4), 12);
        assert_eq!(num_batches(50, 4), 13);
        assert_eq!(num_batches(3, 8), 1);
        assert_eq!(num_batches(0, 8), 0);
    }

    #[test]
    fn test_load_jsonl_basic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.jsonl");
        let content = r#"{"features":[0.1,0.2,0.3]}

{"features":[0.4,0.5,0.6]}
"#;
        std::fs::write(&path, content).unwrap();

        let dataset = load_jsonl(&path).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(1).unwrap().features, vec![0.4, 0.5, 0.6]);
    }

    #[test]
    fn test_load_jsonl_rejects_mixed_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"features\":[1.0,2.0]}\n{\"features\":[1.0]}\n").unwrap();

        let err = load_jsonl(&path).err().unwrap();
        assert!(err.to_string().contains("sample 1 has 1 features"), "{err}");
    }

    #[test]
    fn test_load_jsonl_rejects_empty_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.jsonl");
        std::fs::write(&empty, "\n").unwrap();
        assert!(load_jsonl(&empty).is_err());

        let malformed = dir.path().join("malformed.jsonl");
        std::fs::write(&malformed, "{\"features\": oops}\n").unwrap();
        let err = load_jsonl(&malformed).err().unwrap();
        assert!(err.to_string().contains(":1:"), "{err}");

        assert!(load_jsonl(&dir.path().join("missing.jsonl")).is_err());
    }

    #[test]
    fn test_synthetic_is_seeded() {
        let a = synthetic_samples(10, 6, 7);
        let b = synthetic_samples(10, 6, 7);
        let c = synthetic_samples(10, 6, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(check_dimensions(&a).unwrap(), 6);
        assert!(a.iter().flat_map(|s| s.features.iter()).all(|v| v.abs() <= 1.1));
    }
}
