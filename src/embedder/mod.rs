//! Embedding service interface and helpers shared by the loader and query tool.

pub mod openai;

use anyhow::Result;

/// Opaque `text -> vector` capability.
pub trait Embedder {
    /// Model identity, recorded alongside stored vectors.
    fn model_id(&self) -> &str;

    /// Largest batch accepted by [`Embedder::embed_batch`].
    fn batch_size(&self) -> usize;

    /// Embeds `inputs` in order; returns exactly one vector per input.
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>>;
}

/// Embeds any number of texts, batching by the embedder's limit and optionally L2-normalizing.
pub fn embed_texts(embedder: &dyn Embedder, inputs: &[&str], normalize: bool) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(inputs.len());
    for chunk in inputs.chunks(embedder.batch_size().max(1)) {
        let batch = embedder.embed_batch(chunk)?;
        anyhow::ensure!(
            batch.len() == chunk.len(),
            "embedding service returned {} vectors for {} inputs",
            batch.len(),
            chunk.len()
        );
        vectors.extend(batch);
    }
    if normalize {
        vectors.iter_mut().for_each(|vector| l2_normalize(vector));
    }
    Ok(vectors)
}

/// Scales `vector` to unit length. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Recording {
        batches: RefCell<Vec<usize>>,
    }

    impl Embedder for Recording {
        fn model_id(&self) -> &str {
            "recording"
        }

        fn batch_size(&self) -> usize {
            2
        }

        fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.batches.borrow_mut().push(inputs.len());
            Ok(inputs.iter().map(|text| vec![text.len() as f32, 0.0]).collect())
        }
    }

    #[test]
    fn batches_and_normalizes() {
        let embedder = Recording {
            batches: RefCell::new(Vec::new()),
        };
        let vectors = embed_texts(&embedder, &["abc", "de", "f"], true).expect("embed");
        assert_eq!(*embedder.batches.borrow(), vec![2, 1]);
        assert_eq!(vectors, vec![vec![1.0, 0.0]; 3]);
    }

    #[test]
    fn normalizes_to_unit_length() {
        let mut vector = vec![3.0, 4.0];
        l2_normalize(&mut vector);
        assert_eq!(vector, vec![0.6, 0.8]);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
