//! Software runtime for pooled-linear models stored as safetensors.
//!
//! Tensors (all `F32`):
//! - `embedding`  `[n_embed, hidden]`
//! - `projection` `[hidden, vocab]`
//! - `bias`       `[vocab]` (optional)
//!
//! Forward pass: average the embedding rows of every id in `1..n_embed` (id 0 is
//! padding, out-of-range ids are ignored), multiply by `projection`, add `bias`.
//! The result is one row of `vocab` scores. Columns are computed on a private rayon
//! pool sized by the execution strategy.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use safetensors::tensor::{Dtype, SafeTensorError, TensorView};
use safetensors::SafeTensors;

use super::delegate::ExecutionStrategy;
use super::runtime::{RuntimeFactory, TensorRuntime};
use crate::error::RuntimeError;

pub const EMBEDDING: &str = "embedding";
pub const PROJECTION: &str = "projection";
pub const BIAS: &str = "bias";

#[derive(Clone, Copy, Debug, Default)]
pub struct PooledLinearFactory;

impl RuntimeFactory for PooledLinearFactory {
    fn name(&self) -> &str {
        "pooled-linear"
    }

    fn load(
        &self,
        model: &[u8],
        strategy: &ExecutionStrategy,
    ) -> Result<Box<dyn TensorRuntime>, RuntimeError> {
        let threads = match strategy {
            ExecutionStrategy::Accelerated(opts) => {
                return Err(RuntimeError::Delegate(format!(
                    "{} delegate is not supported by the {} runtime",
                    opts.name,
                    self.name()
                )));
            }
            ExecutionStrategy::MultiThreadedSoftware { threads } => (*threads).max(1),
        };
        let weights = PooledLinearWeights::from_safetensors(model)?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("lt-infer-{i}"))
            .build()
            .map_err(|e| RuntimeError::Execution(format!("build thread pool: {e}")))?;
        Ok(Box::new(PooledLinearRuntime::new(weights, pool)))
    }
}

/// Dense weights of a pooled-linear model, row-major as stored on disk.
#[derive(Clone, Debug, PartialEq)]
pub struct PooledLinearWeights {
    pub n_embed: usize,
    pub hidden: usize,
    pub vocab: usize,
    pub embedding: Vec<f32>,
    pub projection: Vec<f32>,
    pub bias: Option<Vec<f32>>,
}

impl PooledLinearWeights {
    pub fn from_safetensors(bytes: &[u8]) -> Result<Self, RuntimeError> {
        let st = SafeTensors::deserialize(bytes)?;

        let (emb_shape, embedding) = read_f32(&st, EMBEDDING)?;
        let [n_embed, hidden] = two_dims(EMBEDDING, &emb_shape)?;
        let (proj_shape, projection) = read_f32(&st, PROJECTION)?;
        let [proj_rows, vocab] = two_dims(PROJECTION, &proj_shape)?;
        if proj_rows != hidden {
            return Err(RuntimeError::InvalidModel(format!(
                "{PROJECTION} has {proj_rows} rows, {EMBEDDING} width is {hidden}"
            )));
        }

        let bias = match st.tensor(BIAS) {
            Ok(_) => {
                let (shape, data) = read_f32(&st, BIAS)?;
                if shape != [vocab] {
                    return Err(RuntimeError::InvalidModel(format!(
                        "{BIAS} shape {shape:?}, expected [{vocab}]"
                    )));
                }
                Some(data)
            }
            Err(SafeTensorError::TensorNotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            n_embed,
            hidden,
            vocab,
            embedding,
            projection,
            bias,
        })
    }

    pub fn to_safetensors(&self) -> Result<Vec<u8>, RuntimeError> {
        let emb = le_bytes(&self.embedding);
        let proj = le_bytes(&self.projection);
        let bias = self.bias.as_deref().map(le_bytes);

        let emb_view = TensorView::new(Dtype::F32, vec![self.n_embed, self.hidden], &emb)?;
        let proj_view = TensorView::new(Dtype::F32, vec![self.hidden, self.vocab], &proj)?;
        let mut views = vec![(EMBEDDING, emb_view), (PROJECTION, proj_view)];
        if let Some(bias) = bias.as_deref() {
            views.push((BIAS, TensorView::new(Dtype::F32, vec![self.vocab], bias)?));
        }
        let refs: Vec<(&str, &TensorView<'_>)> = views.iter().map(|(n, v)| (*n, v)).collect();
        Ok(safetensors::serialize(refs, &None)?)
    }
}

pub struct PooledLinearRuntime {
    hidden: usize,
    n_embed: usize,
    vocab: usize,
    embedding: Vec<f32>,
    /// `projection` transposed to `[vocab, hidden]` so each output column is a
    /// contiguous dot product.
    projection_t: Vec<f32>,
    bias: Option<Vec<f32>>,
    pool: ThreadPool,
}

impl PooledLinearRuntime {
    pub fn new(weights: PooledLinearWeights, pool: ThreadPool) -> Self {
        let PooledLinearWeights {
            n_embed,
            hidden,
            vocab,
            embedding,
            projection,
            bias,
        } = weights;
        let mut projection_t = vec![0.0f32; projection.len()];
        for h in 0..hidden {
            for v in 0..vocab {
                projection_t[v * hidden + h] = projection[h * vocab + v];
            }
        }
        Self {
            hidden,
            n_embed,
            vocab,
            embedding,
            projection_t,
            bias,
            pool,
        }
    }

    fn pooled(&self, input: &[u8]) -> Vec<f32> {
        let mut acc = vec![0.0f32; self.hidden];
        let mut count = 0usize;
        for chunk in input.chunks_exact(4) {
            let id = i32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let Ok(idx) = usize::try_from(id) else {
                continue;
            };
            if idx == 0 || idx >= self.n_embed {
                continue;
            }
            let row = &self.embedding[idx * self.hidden..(idx + 1) * self.hidden];
            for (a, &x) in acc.iter_mut().zip(row) {
                *a += x;
            }
            count += 1;
        }
        if count > 0 {
            let inv = 1.0 / count as f32;
            acc.iter_mut().for_each(|a| *a *= inv);
        }
        acc
    }
}

impl TensorRuntime for PooledLinearRuntime {
    fn output_len(&self) -> usize {
        self.vocab
    }

    fn run(&mut self, input: &[u8], output: &mut [f32]) -> Result<(), RuntimeError> {
        if input.len() % 4 != 0 {
            return Err(RuntimeError::Execution(format!(
                "input buffer of {} bytes is not a whole number of i32 ids",
                input.len()
            )));
        }
        if output.len() != self.vocab {
            return Err(RuntimeError::Shape {
                expected: self.vocab,
                actual: output.len(),
            });
        }

        let pooled = self.pooled(input);
        let hidden = self.hidden;
        let projection_t = &self.projection_t;
        let bias = self.bias.as_deref();
        self.pool.install(|| {
            output.par_iter_mut().enumerate().for_each(|(v, out)| {
                let col = &projection_t[v * hidden..(v + 1) * hidden];
                let dot: f32 = col.iter().zip(&pooled).map(|(w, x)| w * x).sum();
                *out = dot + bias.map_or(0.0, |b| b[v]);
            });
        });
        Ok(())
    }
}

fn read_f32(st: &SafeTensors<'_>, name: &str) -> Result<(Vec<usize>, Vec<f32>), RuntimeError> {
    let view = st.tensor(name)?;
    if view.dtype() != Dtype::F32 {
        return Err(RuntimeError::InvalidModel(format!(
            "{name} has dtype {:?}, expected F32",
            view.dtype()
        )));
    }
    let data = view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok((view.shape().to_vec(), data))
}

fn two_dims(name: &str, shape: &[usize]) -> Result<[usize; 2], RuntimeError> {
    match shape {
        [a, b] => Ok([*a, *b]),
        other => Err(RuntimeError::InvalidModel(format!(
            "{name} shape {other:?}, expected two dimensions"
        ))),
    }
}

fn le_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}
