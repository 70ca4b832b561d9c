//! Batched iteration over forecast windows.

use burn::prelude::*;
use rand::prelude::*;

use crate::dataset::WindowDataset;
use crate::error::{DataError, Result};
use hiforecast_core::{Seed, Split, TSBatch, TSShape, TSTensor};

/// A dataloader that yields [`TSBatch`]es of windows.
///
/// Shuffling is reseeded per epoch: epoch `e` uses `seed.derive("epoch-e")`
/// so a step-based trainer cycling through the loader sees a fresh but
/// reproducible order every pass.
///
/// ```rust,ignore
/// use hiforecast_data::TSDataLoader;
/// use hiforecast_core::Seed;
///
/// let loader = TSDataLoader::builder(windows)
///     .batch_size(32)
///     .shuffle(true)
///     .seed(Seed::new(1))
///     .build()?;
///
/// for batch in loader.iter::<MyBackend>(&device, 0) {
///     let batch = batch?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TSDataLoader {
    dataset: WindowDataset,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: Seed,
    split: Split,
}

impl TSDataLoader {
    /// Start configuring a loader over `dataset`.
    #[must_use]
    pub fn builder(dataset: WindowDataset) -> TSDataLoaderBuilder {
        TSDataLoaderBuilder::new(dataset)
    }

    #[must_use]
    pub fn dataset(&self) -> &WindowDataset {
        &self.dataset
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches per epoch.
    #[must_use]
    pub fn n_batches(&self) -> usize {
        let n = self.dataset.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    /// Number of windows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    #[must_use]
    pub fn split(&self) -> Split {
        self.split
    }

    /// Iterate over one epoch of batches on `device`.
    #[must_use]
    pub fn iter<B: Backend>(&self, device: &B::Device, epoch: usize) -> TSDataLoaderIter<'_, B> {
        TSDataLoaderIter::new(self, device.clone(), epoch)
    }
}

/// Builder for [`TSDataLoader`].
#[derive(Debug)]
pub struct TSDataLoaderBuilder {
    dataset: WindowDataset,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: Seed,
    split: Split,
}

impl TSDataLoaderBuilder {
    fn new(dataset: WindowDataset) -> Self {
        Self {
            dataset,
            batch_size: 32,
            shuffle: false,
            drop_last: false,
            seed: Seed::default(),
            split: Split::Train,
        }
    }

    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Drop the final batch when it has fewer than `batch_size` windows.
    #[must_use]
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    #[must_use]
    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn split(mut self, split: Split) -> Self {
        self.split = split;
        self
    }

    /// Build the dataloader.
    ///
    /// # Errors
    ///
    /// Fails for a zero batch size, an empty dataset, or when `drop_last`
    /// would leave no batch at all.
    pub fn build(self) -> Result<TSDataLoader> {
        if self.batch_size == 0 {
            return Err(DataError::InvalidBatchSize(
                "Batch size must be greater than 0".to_string(),
            ));
        }
        if self.dataset.is_empty() {
            return Err(DataError::EmptyDataset);
        }
        if self.drop_last && self.dataset.len() < self.batch_size {
            return Err(DataError::InvalidBatchSize(format!(
                "drop_last with batch size {} leaves no batch for {} windows",
                self.batch_size,
                self.dataset.len()
            )));
        }

        Ok(TSDataLoader {
            dataset: self.dataset,
            batch_size: self.batch_size,
            shuffle: self.shuffle,
            drop_last: self.drop_last,
            seed: self.seed,
            split: self.split,
        })
    }
}

/// One epoch over a [`TSDataLoader`].
pub struct TSDataLoaderIter<'a, B: Backend> {
    loader: &'a TSDataLoader,
    device: B::Device,
    indices: Vec<usize>,
    current_batch: usize,
    n_batches: usize,
}

impl<'a, B: Backend> TSDataLoaderIter<'a, B> {
    fn new(loader: &'a TSDataLoader, device: B::Device, epoch: usize) -> Self {
        let mut indices: Vec<usize> = (0..loader.dataset.len()).collect();
        if loader.shuffle {
            let mut rng = loader.seed.derive(&format!("epoch-{epoch}")).to_rng();
            indices.shuffle(&mut rng);
        }

        Self {
            loader,
            device,
            indices,
            current_batch: 0,
            n_batches: loader.n_batches(),
        }
    }

    fn create_batch(&self, indices: &[usize]) -> Result<TSBatch<B>> {
        let subset = self.loader.dataset.subset(indices)?;
        let n = indices.len();
        let n_series = subset.n_series();

        let x_shape = TSShape::new(n, n_series, subset.input_size());
        let x_flat: Vec<f32> = subset.x().iter().copied().collect();
        let x = TSTensor::from_values(x_flat, x_shape, &self.device)?;

        let y_flat: Vec<f32> = subset.y().iter().copied().collect();
        let y = Tensor::<B, 3>::from_data(
            TensorData::new(y_flat, [n, n_series, subset.horizon()]),
            &self.device,
        );

        Ok(TSBatch::with_target(x, y)?)
    }
}

impl<B: Backend> Iterator for TSDataLoaderIter<'_, B> {
    type Item = Result<TSBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_batch >= self.n_batches {
            return None;
        }

        let start = self.current_batch * self.loader.batch_size;
        let end = (start + self.loader.batch_size).min(self.indices.len());
        self.current_batch += 1;

        let batch_indices = self.indices[start..end].to_vec();
        Some(self.create_batch(&batch_indices))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.n_batches - self.current_batch;
        (remaining, Some(remaining))
    }
}

impl<B: Backend> ExactSizeIterator for TSDataLoaderIter<'_, B> {}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use ndarray::Array3;

    type TestBackend = NdArray;

    fn windows(n: usize) -> WindowDataset {
        let x = Array3::from_shape_fn((n, 3, 8), |(i, _, _)| i as f32);
        let y = Array3::from_shape_fn((n, 3, 2), |(i, _, _)| i as f32);
        WindowDataset::from_arrays(x, y).unwrap()
    }

    #[test]
    fn test_n_batches() {
        let loader = TSDataLoader::builder(windows(100)).batch_size(32).build().unwrap();
        assert_eq!(loader.n_batches(), 4);

        let loader = TSDataLoader::builder(windows(100))
            .batch_size(32)
            .drop_last(true)
            .build()
            .unwrap();
        assert_eq!(loader.n_batches(), 3);
    }

    #[test]
    fn test_builder_errors() {
        assert!(TSDataLoader::builder(windows(4)).batch_size(0).build().is_err());
        assert!(TSDataLoader::builder(windows(4))
            .batch_size(8)
            .drop_last(true)
            .build()
            .is_err());
    }

    #[test]
    fn test_batches_keep_pairs_aligned() {
        let device = Default::default();
        let loader = TSDataLoader::builder(windows(10))
            .batch_size(4)
            .shuffle(true)
            .seed(Seed::new(3))
            .build()
            .unwrap();

        let mut seen = 0;
        for batch in loader.iter::<TestBackend>(&device, 0) {
            let batch = batch.unwrap();
            let x = batch.x.inner().clone().slice([0..batch.batch_size(), 0..1, 0..1]);
            let y = batch.y.clone().unwrap().slice([0..batch.batch_size(), 0..1, 0..1]);
            let diff: f32 = (x - y).abs().sum().into_scalar();
            assert_eq!(diff, 0.0);
            assert_eq!(batch.horizon(), Some(2));
            seen += batch.batch_size();
        }
        assert_eq!(seen, 10);
    }

    #[test]
    fn test_shuffle_is_seeded_per_epoch() {
        let device = Default::default();
        let loader = TSDataLoader::builder(windows(16))
            .batch_size(16)
            .shuffle(true)
            .seed(Seed::new(5))
            .build()
            .unwrap();

        let order = |epoch| -> Vec<f32> {
            let batch = loader.iter::<TestBackend>(&device, epoch).next().unwrap().unwrap();
            let first = batch.x.into_inner().slice([0..16, 0..1, 0..1]).reshape([16]);
            first.into_data().to_vec::<f32>().unwrap()
        };

        assert_eq!(order(0), order(0));
        assert_ne!(order(0), order(1));
    }
}
