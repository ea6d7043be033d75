use compseg::config::NetConfig;
use compseg::layers::Parameterized;
use compseg::models::UNet;
use compseg::{NetError, Tensor};

fn small(n_channels: usize, n_classes: usize, bilinear: bool) -> UNet {
    let cfg = NetConfig {
        bilinear,
        base_width: 4,
        seed: Some(11),
        ..NetConfig::new(n_channels, n_classes)
    };
    UNet::from_config(&cfg).unwrap()
}

fn image(shape: Vec<usize>) -> Tensor {
    Tensor::from_fn(shape, |i| ((i * 7919) % 23) as f32 / 23.0 - 0.4)
}

#[test]
fn output_matches_input_resolution() {
    for bilinear in [false, true] {
        let net = small(3, 2, bilinear);
        let y = net.forward(&image(vec![2, 3, 32, 32])).unwrap();
        assert_eq!(y.shape, vec![2, 2, 32, 32]);
    }
}

#[test]
fn odd_sizes_are_aligned_at_every_skip() {
    for bilinear in [false, true] {
        let net = small(1, 3, bilinear);
        let y = net.forward(&image(vec![1, 1, 33, 33])).unwrap();
        assert_eq!(y.shape, vec![1, 3, 33, 33]);
        let y = net.forward(&image(vec![1, 1, 37, 21])).unwrap();
        assert_eq!(y.shape, vec![1, 3, 37, 21]);
    }
}

#[test]
fn inference_is_deterministic_and_finite() {
    let net = small(3, 2, false);
    let x = image(vec![1, 3, 16, 16]);
    let a = net.forward(&x).unwrap();
    let b = net.forward(&x).unwrap();
    assert_eq!(a, b);
    assert!(a.data.iter().all(|v| v.is_finite()));
}

#[test]
fn same_seed_builds_same_weights() {
    let x = image(vec![1, 3, 16, 16]);
    assert_eq!(
        small(3, 2, true).forward(&x).unwrap(),
        small(3, 2, true).forward(&x).unwrap()
    );
}

#[test]
fn wrong_channel_count_is_rejected() {
    let net = small(3, 2, false);
    assert!(matches!(
        net.forward(&image(vec![1, 1, 32, 32])),
        Err(NetError::ChannelMismatch { expected: 3, got: 1, .. })
    ));
}

#[test]
fn too_small_input_is_rejected() {
    let net = small(1, 1, false);
    assert!(matches!(
        net.forward(&image(vec![1, 1, 8, 8])),
        Err(NetError::Shape { .. })
    ));
}

#[test]
fn reference_parameter_counts() {
    let unet = UNet::new(3, 2, false).unwrap();
    assert_eq!(unet.parameter_count(), 31_037_698);
    assert_eq!(unet.plan().encoder, [64, 128, 256, 512, 1024]);
    let unet = UNet::new(3, 2, true).unwrap();
    assert_eq!(unet.parameter_count(), 17_263_042);
}

#[test]
fn small_parameter_counts() {
    assert_eq!(small(3, 2, false).parameter_count(), 122_098);
    assert_eq!(small(3, 2, true).parameter_count(), 68_062);
}

#[test]
fn training_pass_updates_running_stats_only() {
    let mut net = small(1, 2, false);
    let x = image(vec![2, 1, 32, 32]);
    let before = net.forward(&x).unwrap();
    let train = net.forward_train(&x).unwrap();
    assert_eq!(train.shape, before.shape);
    let after = net.forward(&x).unwrap();
    assert!(before.max_abs_diff(&after).unwrap() > 0.0);
}
