//! Calibration behaviour across the model kinds

use approx::assert_relative_eq;
use flatfield::interpolation::interpolate_matrix_3d;
use flatfield::{
    interpolate_matrix, light_curve, Chain, FlatFieldModel, Linear, NonlinearPileup,
    NonlinearSaturation,
};
use ndarray::{array, s, Array1, Array2, Array3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[test]
fn saturated_reading_maps_to_zero() {
    let model = FlatFieldModel::new(
        NonlinearSaturation::new(array![[10.0]], array![[5.0]], array![[0.0]]).unwrap(),
    );
    let out = model.evaluate(&array![[[10.0]], [[5.0]], [[11.0]]]).unwrap();
    assert_eq!(out[[0, 0, 0]], 0.0);
    assert_eq!(out[[2, 0, 0]], 0.0);
    // 10 / 5 * ln 2
    assert_relative_eq!(out[[1, 0, 0]], 2.0 * 2f64.ln(), epsilon = 1e-12);
}

#[test]
fn pileup_far_beyond_clip_is_finite() {
    let model =
        FlatFieldModel::new(NonlinearPileup::new(array![[1.0]], array![[1.0]], 1.0).unwrap());
    let out = model.evaluate(&array![[100.0]]).unwrap();
    assert!(out[[0, 0]].is_finite());
    assert_relative_eq!(out[[0, 0]], 1.0, epsilon = 1e-6);
}

#[test]
fn chain_feeds_each_output_forward() {
    let chain = FlatFieldModel::new(
        Chain::new(vec![
            FlatFieldModel::new(Linear::new(array![[2.0]], array![[0.0]]).unwrap()),
            FlatFieldModel::new(Linear::new(array![[1.0]], array![[1.0]]).unwrap()),
        ])
        .unwrap(),
    );
    assert_relative_eq!(chain.evaluate(&array![[10.0]]).unwrap()[[0, 0]], 4.0);
}

#[test]
fn single_pixel_matches_batch_for_every_kind() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let grid = |rng: &mut ChaCha8Rng, lo: f64, hi: f64| {
        Array2::from_shape_fn((4, 4), |_| rng.gen_range(lo..hi))
    };

    let linear = FlatFieldModel::new(
        Linear::new(grid(&mut rng, 0.5, 2.0), grid(&mut rng, -1.0, 1.0)).unwrap(),
    );
    let saturation = FlatFieldModel::new(
        NonlinearSaturation::new(
            grid(&mut rng, 20.0, 40.0),
            grid(&mut rng, 1.0, 3.0),
            grid(&mut rng, 0.0, 1.0),
        )
        .unwrap(),
    )
    .with_master_coeff(0.9);
    let pileup = FlatFieldModel::new(
        NonlinearPileup::new(grid(&mut rng, 0.5, 2.0), grid(&mut rng, 50.0, 80.0), 0.5).unwrap(),
    );
    let chain = FlatFieldModel::new(
        Chain::new(vec![linear.clone(), saturation.clone(), pileup.clone()]).unwrap(),
    );

    let frames = Array3::from_shape_fn((12, 4, 4), |_| rng.gen_range(-5.0..45.0));
    for model in [&linear, &saturation, &pileup, &chain] {
        let batch = model.apply(&frames).unwrap();
        for i in 0..4 {
            for j in 0..4 {
                let single = model.apply_single(&frames.slice(s![.., i, j]), i, j).unwrap();
                assert_eq!(single, batch.slice(s![.., i, j]), "{model} at ({i}, {j})");
            }
        }
    }
}

#[test]
fn light_curve_sums_calibrated_frames() {
    let coefficients = array![[1.0, 0.0], [2.0, 4.0]];
    let model = FlatFieldModel::new(Linear::new(coefficients, Array2::zeros((2, 2))).unwrap())
        .with_master_coeff(2.0);
    let frames = Array3::from_shape_fn((4, 2, 2), |(t, _, _)| t as f64 * 4.0);
    let curve = light_curve(&model, &frames).unwrap();
    // Pixel (0, 1) is broken; the rest contribute 2 * (x + x/2 + x/4)
    let expected: Array1<f64> = (0..4).map(|t| 2.0 * 1.75 * t as f64 * 4.0).collect();
    assert_eq!(curve, expected);
}

#[test]
fn interpolation_clamps_at_curve_ends() {
    let y = array![0.0, 10.0, 20.0];
    let xf = Array3::from_shape_fn((3, 2, 2), |(k, i, j)| (k * 100 + i * 10 + j) as f64);
    let frame = array![[-1.0, 1000.0], [110.0, 55.0]];
    let out = interpolate_matrix(frame.into_dyn().view(), xf.view(), y.view()).unwrap();
    assert_eq!(out[[0, 0]], 0.0);
    assert_eq!(out[[0, 1]], 20.0);
    assert_relative_eq!(out[[1, 0]], 10.0);
    assert_relative_eq!(out[[1, 1]], 4.4);
}

#[test]
fn interpolation_matches_per_frame_lookup() {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let y = Array1::linspace(0.0, 1.0, 9);
    let xf = Array3::from_shape_fn((9, 3, 3), |(k, i, j)| k as f64 * (1.0 + i as f64) + j as f64);
    let frames = Array3::from_shape_fn((6, 3, 3), |_| rng.gen_range(-2.0..30.0));

    let series = interpolate_matrix_3d(frames.view(), xf.view(), y.view()).unwrap();
    for t in 0..6 {
        let frame = frames.index_axis(ndarray::Axis(0), t).to_owned().into_dyn();
        let single = interpolate_matrix(frame.view(), xf.view(), y.view()).unwrap();
        assert_eq!(single, series.index_axis(ndarray::Axis(0), t).into_dyn());
    }
}
