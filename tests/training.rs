use feedforward::optim::{Adadelta, Adagrad, Adam, GradientDescent, Optimizer, RmsProp};
use feedforward::{
    Activation, FitConfig, FitReport, LossFunction, Matrix, Model, ModelBuilder, OptimizerKind,
    Shuffle,
};

fn v(values: &[f64]) -> Matrix {
    Matrix::column_vector(values.to_vec()).unwrap()
}

fn and_gate() -> (Vec<Matrix>, Vec<Matrix>) {
    let xs = vec![
        v(&[0.0, 0.0]),
        v(&[0.0, 1.0]),
        v(&[1.0, 0.0]),
        v(&[1.0, 1.0]),
    ];
    let ys = vec![v(&[0.0]), v(&[0.0]), v(&[0.0]), v(&[1.0])];
    (xs, ys)
}

fn and_model(optimizer: &dyn Optimizer, loss: LossFunction) -> Model {
    let mut model = Model::new_with_seed(2, Activation::Identity, loss, 42).unwrap();
    model
        .add_layer(Activation::TanH { alpha: 0.01 }, 4)
        .unwrap();
    model.add_layer(Activation::Sigmoid, 1).unwrap();
    model.select_optimizer(optimizer);
    model
}

fn fit_and_gate(optimizer: &dyn Optimizer) -> FitReport {
    let (xs, ys) = and_gate();
    let mut model = and_model(optimizer, LossFunction::mse(0.0).unwrap());
    model
        .fit(
            &xs,
            &ys,
            FitConfig {
                epochs: 200,
                batch_size: 1,
                shuffle: Shuffle::None,
            },
        )
        .unwrap()
}

fn assert_loss_decreases(report: &FitReport) {
    assert_eq!(report.epochs.len(), 200);
    let first = report.first_loss().unwrap();
    let last = report.final_loss().unwrap();
    assert!(last.is_finite());
    assert!(last < first, "loss did not decrease: {first} -> {last}");
}

#[test]
fn gradient_descent_learns_and_gate() {
    assert_loss_decreases(&fit_and_gate(&GradientDescent::new(0.1).unwrap()));
}

#[test]
fn rmsprop_learns_and_gate() {
    assert_loss_decreases(&fit_and_gate(&RmsProp::new(0.01).unwrap()));
}

#[test]
fn adam_learns_and_gate() {
    assert_loss_decreases(&fit_and_gate(&Adam::new(0.01).unwrap()));
}

#[test]
fn adagrad_learns_and_gate() {
    assert_loss_decreases(&fit_and_gate(&Adagrad::new(0.1).unwrap()));
}

#[test]
fn adadelta_learns_and_gate() {
    assert_loss_decreases(&fit_and_gate(&Adadelta::new()));
}

#[test]
fn trained_and_gate_separates_the_classes() {
    let (xs, ys) = and_gate();
    let mut model = and_model(
        &GradientDescent::new(0.2).unwrap(),
        LossFunction::mse(0.0).unwrap(),
    );
    model
        .fit(
            &xs,
            &ys,
            FitConfig {
                epochs: 2000,
                batch_size: 1,
                shuffle: Shuffle::None,
            },
        )
        .unwrap();

    let on = model.predict(&xs[3]).unwrap().get(0, 0);
    for x in &xs[..3] {
        let off = model.predict(x).unwrap().get(0, 0);
        assert!(off < on, "{off} should be below {on}");
    }
}

#[test]
fn mini_batch_training_reduces_loss() {
    let (xs, ys) = and_gate();
    let mut model = ModelBuilder::new(2)
        .unwrap()
        .add_layer(4, Activation::TanH { alpha: 0.01 })
        .unwrap()
        .add_layer(1, Activation::Sigmoid)
        .unwrap()
        .optimizer(OptimizerKind::Adam { lr: 0.01 })
        .unwrap()
        .build_with_seed(3)
        .unwrap();

    let report = model
        .fit(
            &xs,
            &ys,
            FitConfig {
                epochs: 300,
                batch_size: 2,
                shuffle: Shuffle::Seeded(11),
            },
        )
        .unwrap();
    assert!(report.final_loss().unwrap() < report.first_loss().unwrap());
}

#[test]
fn mae_training_reduces_loss() {
    let (xs, ys) = and_gate();
    let mut model = and_model(
        &GradientDescent::new(0.05).unwrap(),
        LossFunction::mae(0.0).unwrap(),
    );
    let report = model.train(&xs, &ys, 200, 1).unwrap();
    assert!(report.final_loss().unwrap() < report.first_loss().unwrap());
}

#[test]
fn seeded_training_is_reproducible() {
    let a = fit_and_gate(&Adam::new(0.01).unwrap());
    let b = fit_and_gate(&Adam::new(0.01).unwrap());
    assert_eq!(a.final_loss(), b.final_loss());
}

#[cfg(feature = "matrixmultiply")]
#[test]
fn accelerated_backend_matches_sequential_training() {
    use feedforward::BackendKind;

    let (xs, ys) = and_gate();
    let cfg = FitConfig {
        epochs: 20,
        batch_size: 1,
        shuffle: Shuffle::None,
    };

    let mut sequential = and_model(
        &GradientDescent::new(0.1).unwrap(),
        LossFunction::default(),
    );
    let mut accelerated = sequential.clone();
    accelerated.attach_backend(BackendKind::Accelerated).unwrap();

    let a = sequential.fit(&xs, &ys, cfg).unwrap();
    let b = accelerated.fit(&xs, &ys, cfg).unwrap();
    for (x, y) in a.epochs.iter().zip(&b.epochs) {
        assert!((x.mean_loss - y.mean_loss).abs() < 1e-9);
    }
}
