use crate::domain::errors::AppError;
use std::path::Path;
use tch::nn::{self, ModuleT};
use tch::{Kind, Tensor, TrainableCModule};

/// Pretrained representation model, loaded as a TorchScript module with
/// trainable parameters registered in its own variable store.
pub struct PretrainedModel {
    module: TrainableCModule,
}

impl PretrainedModel {
    pub fn load(vs_path: nn::Path, file: &Path) -> Result<Self, AppError> {
        let module = TrainableCModule::load(file, vs_path)?;
        Ok(PretrainedModel { module })
    }

    pub fn set_train(&mut self) {
        self.module.set_train();
    }

    pub fn set_eval(&mut self) {
        self.module.set_eval();
    }

    /// Runs `[B, T]` waveforms through the backbone and mean-pools the
    /// resulting `[B, T', D]` hidden states over time.
    pub fn forward(&self, waveforms: &Tensor, train: bool) -> Tensor {
        let hidden = self.module.forward_t(waveforms, train);
        hidden.mean_dim([1_i64].as_slice(), false, Kind::Float)
    }
}

/// Two-layer head over pooled backbone features: an embedding plus binary
/// bonafide/spoof logits.
pub struct Classifier {
    fc1: nn::Linear,
    fc2: nn::Linear,
    out: nn::Linear,
}

impl Classifier {
    pub fn new(p: &nn::Path, hidden_size: i64, embedding_size: i64) -> Self {
        let fc1 = nn::linear(p / "fc1", hidden_size, 256, Default::default());
        let fc2 = nn::linear(p / "fc2", 256, embedding_size, Default::default());
        let out = nn::linear(p / "out", embedding_size, 2, Default::default());
        Classifier { fc1, fc2, out }
    }

    /// Returns `(embeddings, logits)` for pooled features `[B, hidden]`.
    pub fn forward(&self, pooled: &Tensor) -> (Tensor, Tensor) {
        let embedding = pooled.apply(&self.fc1).relu().apply(&self.fc2).relu();
        let logits = embedding.apply(&self.out);
        (embedding, logits)
    }
}

/// Learnable center of the bonafide embedding space. Trained in its own
/// phase, on the bonafide half of each batch only.
pub struct OcCenter {
    center: Tensor,
}

impl OcCenter {
    pub fn new(p: &nn::Path, embedding_size: i64) -> Self {
        let center = p.randn("center", &[embedding_size], 0.0, 0.05);
        OcCenter { center }
    }

    /// Mean squared deviation of bonafide embeddings from the center.
    pub fn loss(&self, bona_embeddings: &Tensor) -> Tensor {
        (bona_embeddings - &self.center).square().mean(Kind::Float)
    }
}

/// Per-segment bonafide probability from binary logits.
pub fn bonafide_score(logits: &Tensor) -> Tensor {
    logits.softmax(-1, Kind::Float).select(1, 1)
}
