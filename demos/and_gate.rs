use feedforward::{Activation, FitConfig, Matrix, ModelBuilder, OptimizerKind, Shuffle};

fn main() -> feedforward::Result<()> {
    let xs = [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]]
        .iter()
        .map(|x| Matrix::column_vector(x.to_vec()))
        .collect::<feedforward::Result<Vec<_>>>()?;
    let ys = [0.0, 0.0, 0.0, 1.0]
        .iter()
        .map(|&y| Matrix::column_vector(vec![y]))
        .collect::<feedforward::Result<Vec<_>>>()?;

    let mut model = ModelBuilder::new(2)?
        .add_layer(4, Activation::TanH { alpha: 0.01 })?
        .add_layer(1, Activation::Sigmoid)?
        .optimizer(OptimizerKind::Adam { lr: 0.05 })?
        .build_with_seed(0)?;

    let report = model.fit(
        &xs,
        &ys,
        FitConfig {
            epochs: 500,
            batch_size: 1,
            shuffle: Shuffle::None,
        },
    )?;
    println!(
        "loss: {:.6} -> {:.6}",
        report.first_loss().unwrap_or(f64::NAN),
        report.final_loss().unwrap_or(f64::NAN)
    );

    for x in &xs {
        let y = model.predict(x)?;
        println!("{:?} -> {:.4}", x.as_slice(), y.get(0, 0));
    }
    Ok(())
}
