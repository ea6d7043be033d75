use compseg::config::NetConfig;
use compseg::models::CompSegNetGrader;
use compseg::Tensor;

fn grader(softmax: bool, n_classes: usize) -> CompSegNetGrader {
    grader_with_dropout(softmax, n_classes, 0.0)
}

fn grader_with_dropout(softmax: bool, n_classes: usize, dropout: f32) -> CompSegNetGrader {
    let cfg = NetConfig {
        softmax,
        dropout,
        base_width: 4,
        seed: Some(21),
        ..NetConfig::new(3, n_classes)
    };
    CompSegNetGrader::from_config(&cfg).unwrap()
}

fn image() -> Tensor {
    Tensor::from_fn(vec![2, 3, 24, 24], |i| ((i % 29) as f32 - 14.0) / 7.0)
}

#[test]
fn softmax_grades_sum_to_one_per_pixel() {
    let net = grader(true, 4);
    assert!(net.softmax());
    let cancer = Tensor::zeros(vec![2, 1, 24, 24]);
    let y = net.forward(&image(), &cancer).unwrap();
    assert_eq!(y.shape, vec![2, 4, 24, 24]);
    for b in 0..2 {
        for p in 0..24 * 24 {
            let s: f32 = (0..4).map(|c| y.plane(b, c)[p]).sum();
            assert!((s - 1.0).abs() < 1e-5);
        }
    }
}

#[test]
fn sigmoid_grades_are_independent_probabilities() {
    let net = grader(false, 3);
    let y = net.forward(&image(), &Tensor::zeros(vec![2, 1, 24, 24])).unwrap();
    assert!(y.data.iter().all(|&v| (0.0..=1.0).contains(&v)));
}

#[test]
fn cancer_mask_does_not_change_the_output() {
    let net = grader(true, 2);
    let x = image();
    let a = net.forward(&x, &Tensor::zeros(vec![2, 1, 24, 24])).unwrap();
    let b = net.forward(&x, &Tensor::full(vec![2, 1, 24, 24], 1.0)).unwrap();
    // a mismatched mask is only warned about
    let c = net.forward(&x, &Tensor::zeros(vec![1, 1, 4, 4])).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, c);
}

#[test]
fn grader_dropout_acts_in_training_only() {
    let mut dropped = grader_with_dropout(true, 2, 0.5);
    let mut plain = grader_with_dropout(true, 2, 0.0);
    assert_eq!(dropped.dropout(), 0.5);
    let x = image();
    let cancer = Tensor::zeros(vec![2, 1, 24, 24]);
    assert_eq!(
        dropped.forward(&x, &cancer).unwrap(),
        plain.forward(&x, &cancer).unwrap()
    );
    let a = dropped.forward_train(&x, &cancer).unwrap();
    let b = plain.forward_train(&x, &cancer).unwrap();
    assert_eq!(a.shape, b.shape);
    assert_ne!(a, b);
}

#[test]
fn positional_constructor_carries_dropout() {
    let net = CompSegNetGrader::new(1, 2, true, 0.3, false).unwrap();
    assert_eq!(net.dropout(), 0.3);
    assert!(!net.softmax());
    assert!(CompSegNetGrader::new(1, 2, true, 1.5, true).is_err());
}
