use crate::domain::entities::Utterance;
use crate::domain::errors::AppError;
use crate::infrastructure::augmentation::Augmenter;
use crate::infrastructure::error_log::{FailureLog, FileFailureLog};
use crate::preprocessing::stream::StreamSampler;
use crate::training::classifier::{bonafide_score, Classifier, OcCenter, PretrainedModel};
use crate::training::config::Config;
use crate::training::dataset::{
    balanced_pairs, load_eval_segments, parse_protocol, BatchLoader, TrainSet,
};
use crate::training::metrics::calculate_eer;
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use tch::nn::{self, OptimizerConfig};
use tch::{no_grad, Device, Kind};
use tracing::info;

#[derive(Debug, Serialize)]
struct UtteranceScore {
    utterance: String,
    set: String,
    attack: String,
    label: i64,
    score: f64,
}

pub struct Trainer {
    config: Config,
    device: Device,
    plm: PretrainedModel,
    classifier: Classifier,
    center: OcCenter,
    opt_plm: nn::Optimizer,
    opt_classifier: nn::Optimizer,
    opt_center: nn::Optimizer,
    train_set: TrainSet,
    eval_sets: Vec<(String, Vec<Utterance>)>,
    loader: BatchLoader,
    best_eer: HashMap<String, f64>,
    evals_since_improvement: usize,
}

impl Trainer {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let device = config.device()?;

        let vs_plm = nn::VarStore::new(device);
        let plm = PretrainedModel::load(vs_plm.root(), &config.model.plm_path)?;
        let opt_plm = nn::Adam::default().build(&vs_plm, config.training.learning_rate)?;

        let vs_classifier = nn::VarStore::new(device);
        let classifier = Classifier::new(
            &vs_classifier.root(),
            config.model.hidden_size,
            config.model.embedding_size,
        );
        let opt_classifier =
            nn::Adam::default().build(&vs_classifier, config.training.learning_rate)?;

        let vs_center = nn::VarStore::new(device);
        let center = OcCenter::new(&vs_center.root(), config.model.embedding_size);
        let opt_center = nn::Adam::default().build(&vs_center, config.training.learning_rate)?;

        let train_set =
            TrainSet::from_protocol(&config.data.train_protocol, &config.data.train_audio_dir)?;
        info!(
            bonafide = train_set.bonafide.len(),
            spoof = train_set.spoof.len(),
            "loaded training protocol"
        );
        let mut eval_sets = Vec::new();
        for set in &config.data.eval_sets {
            let utterances = parse_protocol(&set.protocol, &set.audio_dir)?;
            info!(set = %set.name, utterances = utterances.len(), "loaded evaluation protocol");
            eval_sets.push((set.name.clone(), utterances));
        }

        let mut sampler = StreamSampler::new(config.sampling.max_read_retries);
        if let Some(path) = &config.data.failure_log {
            let log: Arc<dyn FailureLog> = Arc::new(FileFailureLog::create(path)?);
            sampler = sampler.with_failure_log(log);
        }
        let augmenter = (config.training.augment_probability > 0.0)
            .then(|| Augmenter::new(config.training.augment_probability));
        let loader = BatchLoader::new(
            sampler,
            augmenter,
            config.sampling.crop_size,
            config.sampling.crop_size_short,
            config.data.sample_rate,
            device,
        );

        Ok(Trainer {
            config,
            device,
            plm,
            classifier,
            center,
            opt_plm,
            opt_classifier,
            opt_center,
            train_set,
            eval_sets,
            loader,
            best_eer: HashMap::new(),
            evals_since_improvement: 0,
        })
    }

    pub fn run(&mut self) -> Result<(), AppError> {
        for epoch in 1..=self.config.training.epochs {
            self.train_epoch(epoch)?;
            self.evaluate(epoch)?;
            if self.evals_since_improvement >= self.config.training.patience {
                info!(
                    epoch,
                    patience = self.config.training.patience,
                    "no improvement, stopping early"
                );
                break;
            }
        }
        for (name, eer) in &self.best_eer {
            info!(set = %name, best_eer = *eer, "final best");
        }
        Ok(())
    }

    fn train_epoch(&mut self, epoch: usize) -> Result<(), AppError> {
        let train_plm = epoch > self.config.training.freeze_epochs;
        if train_plm {
            self.plm.set_train();
        } else {
            self.plm.set_eval();
        }

        let lr = self.config.training.learning_rate
            * self.config.training.lr_decay.powi((epoch - 1) as i32);
        self.opt_plm.set_lr(lr);
        self.opt_classifier.set_lr(lr);
        self.opt_center.set_lr(lr);
        info!(epoch, lr, train_plm, "starting epoch");

        let mut rng = rand::rng();
        let mut bona_order: Vec<usize> = (0..self.train_set.bonafide.len()).collect();
        let mut spoof_order: Vec<usize> = (0..self.train_set.spoof.len()).collect();
        bona_order.shuffle(&mut rng);
        spoof_order.shuffle(&mut rng);
        let pairs = balanced_pairs(&bona_order, &spoof_order);

        let per_side = (self.config.training.batch_size / 2).max(1);
        let pb = ProgressBar::new((pairs.len() / per_side) as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                .progress_chars("#>-"),
        );

        let mut running_loss = 0.0;
        let mut steps = 0usize;
        for chunk in pairs.chunks_exact(per_side) {
            let bonafide: Vec<&Utterance> = chunk
                .iter()
                .map(|&(b, _)| &self.train_set.bonafide[b])
                .collect();
            let spoof: Vec<&Utterance> = chunk
                .iter()
                .map(|&(_, s)| &self.train_set.spoof[s])
                .collect();
            let batch = self.loader.load_batch(&bonafide, &spoof, &mut rng)?;

            // Phase 1: cross-entropy at both crop resolutions updates the
            // classifier, and the backbone once it is unfrozen.
            let (pooled, pooled_short) = if train_plm {
                (
                    self.plm.forward(&batch.long, true),
                    self.plm.forward(&batch.short, true),
                )
            } else {
                no_grad(|| {
                    (
                        self.plm.forward(&batch.long, false),
                        self.plm.forward(&batch.short, false),
                    )
                })
            };
            let (embedding, logits) = self.classifier.forward(&pooled);
            let (_, logits_short) = self.classifier.forward(&pooled_short);
            let loss1 = logits.cross_entropy_for_logits(&batch.labels)
                + logits_short.cross_entropy_for_logits(&batch.labels);
            self.opt_classifier.zero_grad();
            if train_plm {
                self.opt_plm.zero_grad();
            }
            loss1.backward();
            self.opt_classifier.step();
            if train_plm {
                self.opt_plm.step();
            }

            // Phase 2: only the one-class center moves, pulled toward the
            // bonafide half of the batch.
            let bona_embedding = embedding.narrow(0, 0, batch.bona_size).detach();
            let loss2 = self.center.loss(&bona_embedding);
            self.opt_center.zero_grad();
            loss2.backward();
            self.opt_center.step();

            running_loss += loss1.double_value(&[]) + loss2.double_value(&[]);
            steps += 1;
            pb.set_message(format!(
                "epoch {epoch} | loss {:.3}",
                running_loss / steps as f64
            ));
            pb.inc(1);
        }
        pb.finish_and_clear();
        info!(
            epoch,
            steps,
            mean_loss = running_loss / steps.max(1) as f64,
            "epoch finished"
        );
        Ok(())
    }

    fn evaluate(&mut self, epoch: usize) -> Result<(), AppError> {
        self.plm.set_eval();
        let mut improved = false;
        let mut all_scores = Vec::new();
        for (name, utterances) in &self.eval_sets {
            let mut scores = Vec::with_capacity(utterances.len());
            let mut labels = Vec::with_capacity(utterances.len());
            let pb = ProgressBar::new(utterances.len() as u64);
            pb.set_message(format!("eval {name}"));
            for utterance in utterances {
                let segments = load_eval_segments(
                    utterance,
                    self.config.sampling.eval_segments,
                    self.config.sampling.eval_segment_size,
                    self.config.data.sample_rate,
                )?
                .to_device(self.device);
                let score = no_grad(|| {
                    let pooled = self.plm.forward(&segments, false);
                    let (_, logits) = self.classifier.forward(&pooled);
                    bonafide_score(&logits).mean(Kind::Float).double_value(&[])
                });
                scores.push(score);
                labels.push(utterance.label.class_index());
                all_scores.push(UtteranceScore {
                    utterance: utterance
                        .path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or_default()
                        .to_string(),
                    set: name.clone(),
                    attack: utterance.attack.clone(),
                    label: utterance.label.class_index(),
                    score,
                });
                pb.inc(1);
            }
            pb.finish_and_clear();

            let eer = calculate_eer(&scores, &labels)?;
            info!(epoch, set = %name, eer, "evaluation");
            let best = self.best_eer.entry(name.clone()).or_insert(f64::INFINITY);
            if eer < *best {
                *best = eer;
                improved = true;
            }
        }
        if improved {
            self.evals_since_improvement = 0;
        } else {
            self.evals_since_improvement += 1;
        }

        let json = serde_json::to_string_pretty(&all_scores)?;
        let mut file = File::create(&self.config.evaluation.scores_file)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
