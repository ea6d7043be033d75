use compseg::layers::pooling::max_pool2d;
use compseg::layers::upsample::resize_bilinear;
use compseg::{NetError, Tensor};

#[test]
fn concat_stacks_channels_per_sample() {
    let a = Tensor::full(vec![2, 1, 1, 2], 1.0);
    let b = Tensor::full(vec![2, 2, 1, 2], 2.0);
    let c = Tensor::concat_channels(&[&a, &b]).unwrap();
    assert_eq!(c.shape, vec![2, 3, 1, 2]);
    assert_eq!(
        c.data,
        vec![1.0, 1.0, 2.0, 2.0, 2.0, 2.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0]
    );
}

#[test]
fn concat_rejects_spatial_mismatch() {
    let a = Tensor::zeros(vec![1, 1, 2, 2]);
    let b = Tensor::zeros(vec![1, 1, 3, 2]);
    assert!(matches!(
        Tensor::concat_channels(&[&a, &b]),
        Err(NetError::Shape { .. })
    ));
}

#[test]
fn pad_adds_zero_border() {
    let t = Tensor::full(vec![1, 1, 1, 1], 5.0);
    let p = t.pad2d([1, 0, 0, 1]).unwrap();
    assert_eq!(p.shape, vec![1, 1, 2, 2]);
    assert_eq!(p.data, vec![0.0, 5.0, 0.0, 0.0]);
}

#[test]
fn nonzero_count_and_spatial_sum() {
    let t = Tensor::new(vec![0.0, 1.5, -2.0, 0.0, 0.0, 0.0, 0.0, 3.0], vec![1, 2, 2, 2]);
    assert_eq!(t.count_nonzero_spatial().unwrap().data, vec![2.0, 1.0]);
    assert_eq!(t.sum_spatial().unwrap().data, vec![-0.5, 3.0]);
}

#[test]
fn max_pool_uses_floor() {
    let t = Tensor::from_fn(vec![1, 1, 3, 3], |i| i as f32);
    let p = max_pool2d(&t, 2, 2).unwrap();
    assert_eq!(p.shape, vec![1, 1, 1, 1]);
    assert_eq!(p.data, vec![4.0]);
}

#[test]
fn max_pool_rejects_input_smaller_than_window() {
    let t = Tensor::zeros(vec![1, 1, 1, 4]);
    assert!(max_pool2d(&t, 2, 2).is_err());
}

#[test]
fn bilinear_resize_keeps_corners_aligned() {
    let t = Tensor::new(vec![0.0, 2.0, 4.0, 6.0], vec![1, 1, 2, 2]);
    let r = resize_bilinear(&t, 3, 3).unwrap();
    assert_eq!(r.shape, vec![1, 1, 3, 3]);
    let expected = [0.0, 1.0, 2.0, 2.0, 3.0, 4.0, 4.0, 5.0, 6.0];
    for (a, b) in r.data.iter().zip(expected.iter()) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn try_new_checks_length() {
    assert!(Tensor::try_new(vec![0.0; 3], vec![2, 2]).is_err());
    assert!(Tensor::try_new(vec![0.0; 4], vec![2, 2]).is_ok());
}
