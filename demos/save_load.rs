use feedforward::{Activation, Matrix, Model, ModelBuilder, OptimizerKind};

fn main() -> feedforward::Result<()> {
    let xs = vec![
        Matrix::column_vector(vec![0.1, 0.9])?,
        Matrix::column_vector(vec![0.8, 0.3])?,
    ];
    let ys = vec![
        Matrix::column_vector(vec![1.0])?,
        Matrix::column_vector(vec![0.0])?,
    ];

    let mut model = ModelBuilder::new(2)?
        .add_layer(3, Activation::Elu { alpha: 1.0 })?
        .add_layer(1, Activation::Sigmoid)?
        .optimizer(OptimizerKind::RmsProp { lr: 0.01 })?
        .build_with_seed(0)?;
    model.train(&xs, &ys, 100, 1)?;

    let base = std::env::temp_dir().join("feedforward_demo.model");
    model.save(&base)?;
    let loaded = Model::load(&base)?;
    println!("saved and loaded model: {}", base.display());

    for x in &xs {
        println!(
            "{:?}: original {:.6}, loaded {:.6}",
            x.as_slice(),
            model.predict(x)?.get(0, 0),
            loaded.predict(x)?.get(0, 0)
        );
    }

    #[cfg(feature = "serde")]
    {
        let json = std::env::temp_dir().join("feedforward_demo.json");
        model.save_json(&json)?;
        let from_json = Model::load_json(&json)?;
        println!("json snapshot: {} layers", from_json.network().len());
    }
    Ok(())
}
