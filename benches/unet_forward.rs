use compseg::config::NetConfig;
use compseg::layers::Conv2d;
use compseg::models::{CompSegNet, UNet};
use compseg::rng::rng_from_seed;
use compseg::Tensor;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::Rng;

fn random_image(shape: Vec<usize>) -> Tensor {
    let mut rng = rng_from_seed(0);
    Tensor::from_fn(shape, |_| rng.gen_range(-1.0..1.0))
}

fn bench_conv(c: &mut Criterion) {
    let conv = Conv2d::new(32, 32, 3, 1, 1, false, &mut rng_from_seed(1));
    let x = random_image(vec![1, 32, 64, 64]);
    c.bench_function("conv3x3_32ch_64px", |bencher| {
        bencher.iter(|| {
            let res = conv.forward(black_box(&x)).unwrap();
            black_box(res);
        });
    });
}

fn bench_unet(c: &mut Criterion) {
    let x = random_image(vec![1, 3, 64, 64]);
    for bilinear in [false, true] {
        let cfg = NetConfig {
            bilinear,
            base_width: 8,
            seed: Some(2),
            ..NetConfig::new(3, 2)
        };
        let net = UNet::from_config(&cfg).unwrap();
        let name = if bilinear { "unet_w8_bilinear" } else { "unet_w8_transpose" };
        c.bench_function(name, |bencher| {
            bencher.iter(|| {
                let res = net.forward(black_box(&x)).unwrap();
                black_box(res);
            });
        });
    }

    let cfg = NetConfig {
        base_width: 8,
        seed: Some(3),
        ..NetConfig::new(3, 2)
    };
    let net = CompSegNet::from_config(&cfg).unwrap();
    c.bench_function("compseg_w8_pooled_score", |bencher| {
        bencher.iter(|| {
            let res = net.forward(black_box(&x), None).unwrap();
            black_box(res);
        });
    });
}

criterion_group!(benches, bench_conv, bench_unet);
criterion_main!(benches);
