// ============================================================
// Layer 5 - Training Loop (Burn Classifier)
// ============================================================
// BurnClassifier is the Burn implementation of the Classifier
// trait: compile / fit / predict plus weight persistence.
//
// Key Burn insight:
//   - Training runs on B (an AutodiffBackend) for gradients
//   - model.valid() returns the model on B::InnerBackend with
//     dropout disabled; validation and predict use it
//   - Logits are pulled back to the host once per batch so the
//     accuracy and top-3 metrics reuse the domain ranking code
//
// Epoch anatomy:
//   1. pull steps_per_epoch batches from the BatchSource,
//      one Adam step each at control.learning_rate
//   2. score the validation block in eval_batch_size chunks
//   3. print the epoch line, then run every callback in order
//      (callbacks may lower control.learning_rate)
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{activation::softmax, backend::AutodiffBackend},
};

use crate::domain::blocks::{ImageBlock, LabelBlock, ProbabilityMatrix};
use crate::domain::history::{EpochMetrics, History};
use crate::domain::ranking::top_k_hits;
use crate::domain::traits::{
    BatchSource, Classifier, CompileSettings, EpochCallback, FitPlan, LossKind, MetricKind,
    OptimizerKind, TrainingControl, Validation, WeightStore,
};
use crate::infra::checkpoint;
use crate::ml::batcher::DoodleBatcher;
use crate::ml::model::{categorical_cross_entropy, DoodleNet, DoodleNetConfig, MIN_INPUT_SIZE};

// GPU through WGPU by default; CPU when built without the `wgpu` feature.
#[cfg(feature = "wgpu")]
pub type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;
#[cfg(not(feature = "wgpu"))]
pub type TrainBackend = burn::backend::Autodiff<burn::backend::NdArray>;

// ─── Running metrics ──────────────────────────────────────────────────────────
/// Sums over one pass (training epoch or validation sweep).
/// Metrics that were not compiled in read as NaN.
#[derive(Debug)]
struct RunningMetrics {
    /// Sum of batch-mean losses weighted by batch rows
    loss_sum: f64,
    rows:     usize,
    top1:     Option<usize>,
    top3:     Option<usize>,
}

impl RunningMetrics {
    fn new(metrics: &[MetricKind]) -> Self {
        let tracked = |kind| metrics.contains(&kind).then_some(0);
        Self {
            loss_sum: 0.0,
            rows:     0,
            top1:     tracked(MetricKind::Accuracy),
            top3:     tracked(MetricKind::TopKAccuracy(3)),
        }
    }

    fn add(&mut self, batch_loss: f64, labels: &[usize], probs: &[f32], num_classes: usize) {
        self.loss_sum += batch_loss * labels.len() as f64;
        self.rows += labels.len();
        if let Some(top1) = self.top1.as_mut() {
            *top1 += top_k_hits(labels, probs.chunks(num_classes), 1);
        }
        if let Some(top3) = self.top3.as_mut() {
            *top3 += top_k_hits(labels, probs.chunks(num_classes), 3);
        }
    }

    fn fraction(&self, hits: Option<usize>) -> f64 {
        match hits {
            None => f64::NAN,
            Some(_) if self.rows == 0 => 0.0,
            Some(n) => n as f64 / self.rows as f64,
        }
    }

    fn loss(&self) -> f64 {
        if self.rows > 0 { self.loss_sum / self.rows as f64 } else { f64::NAN }
    }

    fn accuracy(&self) -> f64 {
        self.fraction(self.top1)
    }

    fn top_3_accuracy(&self) -> f64 {
        self.fraction(self.top3)
    }
}

/// Softmax of the logits, copied to the host as a flat row-major Vec.
fn host_probabilities<B: Backend>(logits: Tensor<B, 2>) -> Result<Vec<f32>> {
    softmax(logits, 1)
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("Cannot read probabilities back from the device: {e:?}"))
}

// ─── BurnClassifier ───────────────────────────────────────────────────────────
pub struct BurnClassifier<B: AutodiffBackend> {
    config:   DoodleNetConfig,
    model:    DoodleNet<B>,
    device:   B::Device,
    settings: Option<CompileSettings>,
}

impl<B: AutodiffBackend> BurnClassifier<B> {
    /// Build a freshly initialised network on `device`.
    pub fn new(config: DoodleNetConfig, device: B::Device) -> Result<Self> {
        if config.num_classes == 0 {
            bail!("num_classes must be at least 1");
        }
        if config.input_size < MIN_INPUT_SIZE {
            bail!(
                "input size {} is too small, the network needs at least {MIN_INPUT_SIZE}",
                config.input_size
            );
        }
        if config.base_channels == 0 {
            bail!("base_channels must be at least 1");
        }

        let model = config.init::<B>(&device);
        tracing::info!(
            "DoodleNet ready: {} classes, input {}x{}, base width {}",
            config.num_classes, config.input_size, config.input_size, config.base_channels,
        );
        Ok(Self { config, model, device, settings: None })
    }

    fn check_images(&self, images: &ImageBlock) -> Result<()> {
        if images.size() != self.config.input_size {
            bail!(
                "image size {} does not match the model input size {}",
                images.size(), self.config.input_size
            );
        }
        Ok(())
    }

    /// Loss and the compiled metrics of the eval-mode model.
    fn evaluate(
        &self,
        settings:   &CompileSettings,
        images:     &ImageBlock,
        labels:     &LabelBlock,
        batch_size: usize,
    ) -> Result<RunningMetrics> {
        let model = self.model.valid();
        let batcher = DoodleBatcher::<B::InnerBackend>::new(self.device.clone());
        let mut running = RunningMetrics::new(&settings.metrics);

        let mut start = 0;
        while start < images.len() {
            let end = (start + batch_size).min(images.len());
            let batch = batcher.batch(images, labels, start, end);
            let logits = model.forward(batch.images);
            let loss = match settings.loss {
                LossKind::CategoricalCrossEntropy => {
                    categorical_cross_entropy(logits.clone(), batch.targets)
                }
            };
            let loss: f64 = loss.into_scalar().elem::<f64>();
            let probs = host_probabilities(logits)?;
            running.add(loss, &labels.ids()[start..end], &probs, self.config.num_classes);
            start = end;
        }
        Ok(running)
    }
}

// ─── WeightStore ──────────────────────────────────────────────────────────────
impl<B: AutodiffBackend> WeightStore for BurnClassifier<B> {
    fn save_weights(&self, path: &Path) -> Result<()> {
        checkpoint::save_model(&self.model, path)
    }

    fn load_weights(&mut self, path: &Path) -> Result<()> {
        let fresh = self.config.init::<B>(&self.device);
        self.model = checkpoint::load_model(fresh, path, &self.device)?;
        Ok(())
    }
}

// ─── Classifier ───────────────────────────────────────────────────────────────
impl<B: AutodiffBackend> Classifier for BurnClassifier<B> {
    fn compile(&mut self, settings: CompileSettings) -> Result<()> {
        if !(settings.learning_rate > 0.0 && settings.learning_rate.is_finite()) {
            bail!("learning rate must be positive, got {}", settings.learning_rate);
        }
        // History only has columns for accuracy and top-3 accuracy
        if let Some(kind) = settings
            .metrics
            .iter()
            .find(|m| !matches!(m, MetricKind::Accuracy | MetricKind::TopKAccuracy(3)))
        {
            bail!("metric {kind:?} is not supported, use Accuracy or TopKAccuracy(3)");
        }
        tracing::info!(
            "Compiled: {:?}, lr={}, loss={:?}, metrics={:?}",
            settings.optimizer, settings.learning_rate, settings.loss, settings.metrics,
        );
        self.settings = Some(settings);
        Ok(())
    }

    fn fit(
        &mut self,
        source:     &mut dyn BatchSource,
        plan:       FitPlan,
        validation: Validation<'_>,
        callbacks:  &mut [Box<dyn EpochCallback>],
    ) -> Result<History> {
        let settings = self
            .settings
            .clone()
            .context("Classifier must be compiled before fit")?;
        if plan.steps_per_epoch == 0 || plan.eval_batch_size == 0 {
            bail!("steps_per_epoch and eval_batch_size must be at least 1");
        }
        if validation.images.len() != validation.labels.len() {
            bail!(
                "validation has {} images but {} labels",
                validation.images.len(), validation.labels.len()
            );
        }
        self.check_images(validation.images)?;

        let num_classes = self.config.num_classes;
        let batcher = DoodleBatcher::<B>::new(self.device.clone());

        // ── Adam optimiser ────────────────────────────────────────────────────
        // m = β1*m + (1-β1)*g        (mean)
        // v = β2*v + (1-β2)*g²       (variance)
        // θ = θ - lr * m / (√v + ε)  (update)
        let mut optim = match settings.optimizer {
            OptimizerKind::Adam => AdamConfig::new().with_epsilon(1e-7).init(),
        };
        let mut control = TrainingControl { learning_rate: settings.learning_rate };
        let mut history = History::default();

        for epoch in 1..=plan.epochs {
            let epoch_lr = control.learning_rate;

            // ── Training phase ────────────────────────────────────────────────
            let mut train = RunningMetrics::new(&settings.metrics);
            for step in 0..plan.steps_per_epoch {
                let batch = source
                    .next_batch()
                    .with_context(|| format!("Cannot fetch batch {step} of epoch {epoch}"))?;
                if batch.is_empty() {
                    continue;
                }
                if batch.labels.num_classes() != num_classes {
                    bail!(
                        "batch encodes {} classes but the model has {num_classes}",
                        batch.labels.num_classes()
                    );
                }
                self.check_images(&batch.images)?;

                let tensors = batcher.batch(&batch.images, &batch.labels, 0, batch.len());
                let (loss, logits) = match settings.loss {
                    LossKind::CategoricalCrossEntropy => {
                        self.model.forward_loss(tensors.images, tensors.targets)
                    }
                };

                let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
                let probs = host_probabilities(logits.detach())?;
                train.add(loss_val, batch.labels.ids(), &probs, num_classes);

                // Backward pass + Adam update
                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &self.model);
                self.model = optim.step(control.learning_rate, self.model.clone(), grads);
            }

            // ── Validation phase ──────────────────────────────────────────────
            let val = self.evaluate(&settings, validation.images, validation.labels, plan.eval_batch_size)?;

            let metrics = EpochMetrics {
                epoch,
                learning_rate:      epoch_lr,
                loss:               train.loss(),
                accuracy:           train.accuracy(),
                top_3_accuracy:     train.top_3_accuracy(),
                val_loss:           val.loss(),
                val_accuracy:       val.accuracy(),
                val_top_3_accuracy: val.top_3_accuracy(),
            };

            println!(
                "Epoch {:>3}/{} | loss={:.4} | acc={:.1}% | top3={:.1}% | val_loss={:.4} | val_acc={:.1}% | val_top3={:.1}% | lr={:.2e}",
                epoch, plan.epochs,
                metrics.loss, metrics.accuracy * 100.0, metrics.top_3_accuracy * 100.0,
                metrics.val_loss, metrics.val_accuracy * 100.0, metrics.val_top_3_accuracy * 100.0,
                epoch_lr,
            );

            for callback in callbacks.iter_mut() {
                callback.on_epoch_end(&metrics, &mut control, &*self)?;
            }
            history.push(metrics);
        }

        tracing::info!("Training complete after {} epochs", plan.epochs);
        Ok(history)
    }

    fn predict(&self, images: &ImageBlock, batch_size: usize) -> Result<ProbabilityMatrix> {
        if batch_size == 0 {
            bail!("prediction batch size must be at least 1");
        }
        self.check_images(images)?;

        let model = self.model.valid();
        let batcher = DoodleBatcher::<B::InnerBackend>::new(self.device.clone());
        let mut values = Vec::with_capacity(images.len() * self.config.num_classes);

        let mut start = 0;
        while start < images.len() {
            let end = (start + batch_size).min(images.len());
            let logits = model.forward(batcher.images(images, start, end));
            values.extend(host_probabilities(logits)?);
            start = end;
        }

        tracing::debug!("Predicted {} rows", images.len());
        ProbabilityMatrix::new(self.config.num_classes, values)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use burn::backend::{Autodiff, NdArray};

    use super::*;
    use crate::domain::blocks::Batch;

    type TestBackend = Autodiff<NdArray<f32>>;

    const SIZE: usize = 8;
    const CLASSES: usize = 3;

    /// Class c is a solid image with value c - 1 so it is learnable.
    fn block(labels: &[usize]) -> (ImageBlock, LabelBlock) {
        let data = labels
            .iter()
            .flat_map(|&c| std::iter::repeat(c as f32 - 1.0).take(SIZE * SIZE))
            .collect();
        (
            ImageBlock::new(SIZE, data).unwrap(),
            LabelBlock::new(labels.to_vec(), CLASSES).unwrap(),
        )
    }

    struct FixedSource {
        calls: usize,
    }

    impl BatchSource for FixedSource {
        fn next_batch(&mut self) -> Result<Batch> {
            self.calls += 1;
            let (images, labels) = block(&[0, 1, 2, 1]);
            Batch::new(images, labels)
        }
    }

    /// Records what each epoch looked like and halves the learning rate.
    struct LrHalver {
        seen: Rc<RefCell<Vec<(usize, f64)>>>,
    }

    impl EpochCallback for LrHalver {
        fn on_epoch_end(
            &mut self,
            metrics: &EpochMetrics,
            control: &mut TrainingControl,
            _weights: &dyn WeightStore,
        ) -> Result<()> {
            self.seen.borrow_mut().push((metrics.epoch, metrics.learning_rate));
            control.learning_rate /= 2.0;
            Ok(())
        }
    }

    fn classifier() -> BurnClassifier<TestBackend> {
        BurnClassifier::new(DoodleNetConfig::new(CLASSES, SIZE, 2, 0.0), Default::default()).unwrap()
    }

    #[test]
    fn test_fit_requires_compile() {
        let mut model = classifier();
        let (images, labels) = block(&[0, 1]);
        let plan = FitPlan { steps_per_epoch: 1, epochs: 1, eval_batch_size: 2 };
        let result = model.fit(
            &mut FixedSource { calls: 0 },
            plan,
            Validation { images: &images, labels: &labels },
            &mut [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_tiny_input() {
        let config = DoodleNetConfig::new(CLASSES, MIN_INPUT_SIZE - 1, 2, 0.0);
        assert!(BurnClassifier::<TestBackend>::new(config, Default::default()).is_err());
    }

    #[test]
    fn test_fit_runs_epochs_and_callbacks() {
        let mut model = classifier();
        model.compile(CompileSettings::adam(0.01)).unwrap();

        let (images, labels) = block(&[0, 1, 2]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut callbacks: Vec<Box<dyn EpochCallback>> =
            vec![Box::new(LrHalver { seen: Rc::clone(&seen) })];
        let mut source = FixedSource { calls: 0 };

        let history = model
            .fit(
                &mut source,
                FitPlan { steps_per_epoch: 2, epochs: 3, eval_batch_size: 2 },
                Validation { images: &images, labels: &labels },
                &mut callbacks,
            )
            .unwrap();

        assert_eq!(source.calls, 6);
        assert_eq!(history.epochs.len(), 3);
        // The callback halves the rate after each epoch
        assert_eq!(*seen.borrow(), vec![(1, 0.01), (2, 0.005), (3, 0.0025)]);
        for m in &history.epochs {
            assert!(m.loss.is_finite());
            assert!(m.val_loss.is_finite());
            assert!((0.0..=1.0).contains(&m.val_accuracy));
            assert!(m.val_top_3_accuracy >= m.val_accuracy);
        }
        // With three classes the top-3 always contains the label
        assert_eq!(history.epochs[0].val_top_3_accuracy, 1.0);
    }

    #[test]
    fn test_compile_rejects_untracked_metric() {
        let mut model = classifier();
        let mut settings = CompileSettings::adam(0.01);
        settings.metrics.push(MetricKind::TopKAccuracy(5));
        assert!(model.compile(settings).is_err());
    }

    #[test]
    fn test_fit_reports_only_compiled_metrics() {
        let mut model = classifier();
        let mut settings = CompileSettings::adam(0.01);
        settings.metrics = vec![MetricKind::Accuracy];
        model.compile(settings).unwrap();

        let (images, labels) = block(&[0, 1, 2]);
        let history = model
            .fit(
                &mut FixedSource { calls: 0 },
                FitPlan { steps_per_epoch: 1, epochs: 1, eval_batch_size: 3 },
                Validation { images: &images, labels: &labels },
                &mut [],
            )
            .unwrap();

        let m = &history.epochs[0];
        assert!((0.0..=1.0).contains(&m.accuracy));
        assert!((0.0..=1.0).contains(&m.val_accuracy));
        assert!(m.top_3_accuracy.is_nan());
        assert!(m.val_top_3_accuracy.is_nan());
    }

    #[test]
    fn test_running_metrics_count_top_k_hits() {
        let mut running = RunningMetrics::new(&CompileSettings::adam(0.1).metrics);
        // label 1 ranks second, label 0 ranks first
        running.add(2.0, &[1, 0], &[0.5, 0.3, 0.2, 0.6, 0.3, 0.1], 3);
        assert_eq!(running.loss(), 2.0);
        assert_eq!(running.accuracy(), 0.5);
        assert_eq!(running.top_3_accuracy(), 1.0);
    }

    #[test]
    fn test_predict_returns_distributions() {
        let model = classifier();
        let (images, _) = block(&[0, 1, 2, 0, 1]);
        let probs = model.predict(&images, 2).unwrap();

        assert_eq!(probs.len(), 5);
        assert_eq!(probs.num_classes(), CLASSES);
        for row in probs.rows() {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_predict_rejects_wrong_size() {
        let model = classifier();
        let images = ImageBlock::new(SIZE * 2, vec![0.0; 4 * SIZE * SIZE]).unwrap();
        assert!(model.predict(&images, 4).is_err());
    }

    #[test]
    fn test_weights_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("model.mpk");
        let (images, _) = block(&[0, 1, 2]);

        let model = classifier();
        model.save_weights(&path).unwrap();
        let before = model.predict(&images, 3).unwrap();

        let mut restored = classifier();
        restored.load_weights(&path).unwrap();
        let after = restored.predict(&images, 3).unwrap();

        // CompactRecorder stores half precision
        for (a, b) in before.rows().flatten().zip(after.rows().flatten()) {
            assert!((a - b).abs() < 1e-2);
        }
    }
}
