use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{info, instrument};

use crate::{Error, Matrix, Model, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Sample order for mini-batch training.
///
/// Stochastic training (batch size 1) always visits samples in order.
pub enum Shuffle {
    /// Keep the data order.
    None,
    /// Shuffle every epoch from a fixed seed.
    Seeded(u64),
    /// Shuffle every epoch from entropy.
    #[default]
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub shuffle: Shuffle,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 1,
            shuffle: Shuffle::Random,
        }
    }
}

impl FitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be > 0".to_owned()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    /// 1-based.
    pub epoch: usize,
    pub mean_loss: f64,
}

#[derive(Debug, Clone, Default)]
pub struct FitReport {
    pub epochs: Vec<EpochReport>,
}

impl FitReport {
    pub fn first_loss(&self) -> Option<f64> {
        self.epochs.first().map(|e| e.mean_loss)
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.epochs.last().map(|e| e.mean_loss)
    }
}

impl Model {
    /// Train on `inputs`/`targets` (column vectors) and report the mean loss of every
    /// epoch.
    ///
    /// - batch size 1: each sample is predicted, scored, then backpropagated and
    ///   applied on its own. The epoch loss uses the predictions made before each
    ///   update.
    /// - batch size > 1: samples are ordered according to `cfg.shuffle` every epoch and
    ///   split into disjoint batches; each batch gets one averaged update and its
    ///   samples are scored after that update.
    ///
    /// An optimizer must have been selected.
    #[instrument(skip_all, fields(samples = inputs.len(), epochs = cfg.epochs, batch_size = cfg.batch_size))]
    pub fn fit(
        &mut self,
        inputs: &[Matrix],
        targets: &[Matrix],
        cfg: FitConfig,
    ) -> Result<FitReport> {
        cfg.validate()?;
        self.check_samples(inputs, targets)?;

        let mut rng = match cfg.shuffle {
            Shuffle::Seeded(seed) => Some(StdRng::seed_from_u64(seed)),
            Shuffle::Random => Some(StdRng::from_entropy()),
            Shuffle::None => None,
        };
        let mut order: Vec<usize> = (0..inputs.len()).collect();
        let mut report = FitReport {
            epochs: Vec::with_capacity(cfg.epochs),
        };

        for epoch in 1..=cfg.epochs {
            let total = if cfg.batch_size == 1 {
                self.stochastic_epoch(inputs, targets)?
            } else {
                if let Some(rng) = rng.as_mut() {
                    order.shuffle(rng);
                }
                self.mini_batch_epoch(inputs, targets, &order, cfg.batch_size)?
            };

            let mean_loss = total / inputs.len() as f64;
            info!(epoch, loss = mean_loss, "epoch complete");
            report.epochs.push(EpochReport { epoch, mean_loss });
        }

        Ok(report)
    }

    /// [`Model::fit`] with shuffled mini-batches.
    pub fn train(
        &mut self,
        inputs: &[Matrix],
        targets: &[Matrix],
        epochs: usize,
        batch_size: usize,
    ) -> Result<FitReport> {
        self.fit(
            inputs,
            targets,
            FitConfig {
                epochs,
                batch_size,
                ..FitConfig::default()
            },
        )
    }

    fn stochastic_epoch(&mut self, inputs: &[Matrix], targets: &[Matrix]) -> Result<f64> {
        let mut total = 0.0;
        for (x, y) in inputs.iter().zip(targets) {
            total += self.evaluate(x, y)?;
            self.train_step(std::slice::from_ref(x), std::slice::from_ref(y))?;
        }
        Ok(total)
    }

    fn mini_batch_epoch(
        &mut self,
        inputs: &[Matrix],
        targets: &[Matrix],
        order: &[usize],
        batch_size: usize,
    ) -> Result<f64> {
        let mut total = 0.0;
        for chunk in order.chunks(batch_size) {
            let xs: Vec<Matrix> = chunk.iter().map(|&i| inputs[i].clone()).collect();
            let ys: Vec<Matrix> = chunk.iter().map(|&i| targets[i].clone()).collect();
            self.train_step(&xs, &ys)?;
            for (x, y) in xs.iter().zip(&ys) {
                total += self.evaluate(x, y)?;
            }
        }
        Ok(total)
    }

    fn check_samples(&self, inputs: &[Matrix], targets: &[Matrix]) -> Result<()> {
        if inputs.is_empty() {
            return Err(Error::InvalidData(
                "training set must not be empty".to_owned(),
            ));
        }
        if inputs.len() != targets.len() {
            return Err(Error::InvalidData(format!(
                "{} inputs but {} targets",
                inputs.len(),
                targets.len()
            )));
        }

        let input_shape = (self.network().input_width(), 1);
        let target_shape = (self.network().output_width(), 1);
        for (i, (x, y)) in inputs.iter().zip(targets).enumerate() {
            if x.shape() != input_shape {
                return Err(Error::InvalidData(format!(
                    "input {i} is {}x{}, model expects {}x1",
                    x.rows(),
                    x.cols(),
                    input_shape.0
                )));
            }
            if y.shape() != target_shape {
                return Err(Error::InvalidData(format!(
                    "target {i} is {}x{}, model expects {}x1",
                    y.rows(),
                    y.cols(),
                    target_shape.0
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::GradientDescent;
    use crate::{Activation, LossFunction};

    fn v(values: &[f64]) -> Matrix {
        Matrix::column_vector(values.to_vec()).unwrap()
    }

    fn data() -> (Vec<Matrix>, Vec<Matrix>) {
        let xs = vec![v(&[0.0, 1.0]), v(&[1.0, 0.0]), v(&[1.0, 1.0])];
        let ys = vec![v(&[0.2]), v(&[0.4]), v(&[0.8])];
        (xs, ys)
    }

    fn model(seed: u64) -> Model {
        let mut m =
            Model::new_with_seed(2, Activation::Identity, LossFunction::default(), seed).unwrap();
        m.add_layer(Activation::Sigmoid, 2).unwrap();
        m.add_layer(Activation::Sigmoid, 1).unwrap();
        m.select_optimizer(&GradientDescent::new(0.1).unwrap());
        m
    }

    #[test]
    fn fit_reports_every_epoch() {
        let (xs, ys) = data();
        let mut m = model(0);
        let report = m
            .fit(
                &xs,
                &ys,
                FitConfig {
                    epochs: 5,
                    batch_size: 1,
                    shuffle: Shuffle::None,
                },
            )
            .unwrap();
        assert_eq!(report.epochs.len(), 5);
        assert_eq!(report.epochs[4].epoch, 5);
        assert!(report.epochs.iter().all(|e| e.mean_loss.is_finite()));
    }

    #[test]
    fn seeded_mini_batches_are_reproducible() {
        let (xs, ys) = data();
        let cfg = FitConfig {
            epochs: 4,
            batch_size: 2,
            shuffle: Shuffle::Seeded(3),
        };
        let a = model(1).fit(&xs, &ys, cfg).unwrap();
        let b = model(1).fit(&xs, &ys, cfg).unwrap();
        assert_eq!(a.final_loss(), b.final_loss());
    }

    #[test]
    fn full_batch_loss_is_measured_after_the_update() {
        let (xs, ys) = data();
        let mut m = model(2);
        let report = m
            .fit(
                &xs,
                &ys,
                FitConfig {
                    epochs: 1,
                    batch_size: 3,
                    shuffle: Shuffle::None,
                },
            )
            .unwrap();

        let after: f64 = xs
            .iter()
            .zip(&ys)
            .map(|(x, y)| m.evaluate(x, y).unwrap())
            .sum::<f64>()
            / 3.0;
        assert!((report.final_loss().unwrap() - after).abs() < 1e-12);
    }

    #[test]
    fn invalid_configs_and_data_are_rejected() {
        let (xs, ys) = data();
        let mut m = model(0);
        let zero_epochs = FitConfig {
            epochs: 0,
            ..FitConfig::default()
        };
        assert!(matches!(
            m.fit(&xs, &ys, zero_epochs),
            Err(Error::InvalidConfig(_))
        ));
        assert!(m.train(&xs, &ys, 1, 0).is_err());
        assert!(matches!(
            m.train(&xs, &ys[..2], 1, 1),
            Err(Error::InvalidData(_))
        ));
        assert!(matches!(
            m.train(&[v(&[1.0])], &[v(&[1.0])], 1, 1),
            Err(Error::InvalidData(_))
        ));
        assert!(m.train(&[], &[], 1, 1).is_err());
    }

    #[test]
    fn training_without_optimizer_fails() {
        let (xs, ys) = data();
        let mut m =
            Model::new_with_seed(2, Activation::Identity, LossFunction::default(), 0).unwrap();
        m.add_layer(Activation::Sigmoid, 1).unwrap();
        assert!(matches!(
            m.train(&xs, &ys, 1, 1),
            Err(Error::InvalidConfig(_))
        ));
    }
}
