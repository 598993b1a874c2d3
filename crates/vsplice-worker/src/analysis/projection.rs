//! Seeded sparse random projection.

use ndarray::{Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Capability, PipelineError, PipelineResult};
use crate::segmenter::Reducer;

/// Sparse random projection (Achlioptas) on L2-normalised rows.
///
/// Normalising first makes Euclidean distances in the output track cosine
/// distances in the input. Entries of the projection matrix are
/// `±sqrt(3 / dims)` with probability 1/6 each and 0 otherwise.
#[derive(Debug, Clone)]
pub struct RandomProjectionReducer {
    dims: usize,
}

impl RandomProjectionReducer {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    fn projection_matrix(&self, input_dims: usize, seed: u64) -> Array2<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        let scale = (3.0 / self.dims as f32).sqrt();

        Array2::from_shape_simple_fn((input_dims, self.dims), || {
            let u: f32 = rng.random();
            if u < 1.0 / 6.0 {
                scale
            } else if u < 2.0 / 6.0 {
                -scale
            } else {
                0.0
            }
        })
    }
}

impl Reducer for RandomProjectionReducer {
    fn reduce(&self, vectors: ArrayView2<'_, f32>, seed: u64) -> PipelineResult<Array2<f32>> {
        if self.dims == 0 {
            return Err(PipelineError::capability(
                Capability::Reduce,
                "target dimension must be positive",
            ));
        }

        let mut normalised = vectors.to_owned();
        for mut row in normalised.axis_iter_mut(Axis(0)) {
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row /= norm;
            }
        }

        let projection = self.projection_matrix(vectors.ncols(), seed);
        Ok(normalised.dot(&projection))
    }
}
