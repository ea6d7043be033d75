use compseg::config::NetConfig;
use compseg::models::{Stage, UNet};
use compseg::Tensor;

fn pair(bilinear: bool) -> (UNet, UNet) {
    let cfg = NetConfig {
        bilinear,
        base_width: 4,
        seed: Some(3),
        ..NetConfig::new(2, 2)
    };
    let plain = UNet::from_config(&cfg).unwrap();
    let ckpt = UNet::from_config(&NetConfig {
        checkpointing: true,
        ..cfg
    })
    .unwrap();
    (plain, ckpt)
}

fn image() -> Tensor {
    Tensor::from_fn(vec![2, 2, 33, 33], |i| ((i * 31) % 13) as f32 / 13.0)
}

#[test]
fn checkpointing_leaves_outputs_unchanged() {
    for bilinear in [false, true] {
        let (mut plain, mut ckpt) = pair(bilinear);
        assert!(ckpt.backbone().is_checkpointing());
        let x = image();
        assert_eq!(plain.forward_train(&x).unwrap(), ckpt.forward_train(&x).unwrap());
        assert_eq!(plain.forward(&x).unwrap(), ckpt.forward(&x).unwrap());
    }
}

#[test]
fn checkpointing_keeps_fewer_activations() {
    let (mut plain, mut ckpt) = pair(false);
    let x = image();
    plain.forward_train(&x).unwrap();
    ckpt.forward_train(&x).unwrap();
    let kept = ckpt.backbone().saved_bytes();
    assert!(kept > 0);
    assert!(kept < plain.backbone().saved_bytes());
    assert_eq!(ckpt.backbone().saved_tensors(Stage::Up(1)).unwrap().len(), 2);
    assert!(plain.backbone().saved_tensors(Stage::Up(1)).unwrap().len() > 2);
}

#[test]
fn replay_rebuilds_every_stage() {
    let (mut plain, mut ckpt) = pair(false);
    let x = image();
    plain.forward_train(&x).unwrap();
    ckpt.forward_train(&x).unwrap();
    for stage in Stage::ALL {
        let stored = plain.backbone().replay(stage).unwrap();
        let rebuilt = ckpt.backbone().replay(stage).unwrap();
        let diff = stored.max_abs_diff(&rebuilt).unwrap();
        assert!(diff < 1e-5, "{} differs by {}", stage.name(), diff);
    }
}

#[test]
fn replay_before_training_is_an_error() {
    let (_, ckpt) = pair(true);
    assert!(ckpt.backbone().replay(Stage::Inc).is_err());
    assert!(ckpt.backbone().replay(Stage::Down(7)).is_err());
}

#[test]
fn inference_retains_nothing() {
    let (plain, _) = pair(false);
    plain.forward(&image()).unwrap();
    assert_eq!(plain.backbone().saved_bytes(), 0);
}
