use compseg::config::{NetConfig, Variant};
use compseg::layers::Parameterized;
use compseg::math;
use compseg::models::{CompSegNet, CompSegNet3, CompSegNetGrader, UNet};
use compseg::util::logging::log_total_ops;
use compseg::{weights, NetError, Tensor};
use log::{error, info};
use std::env;

struct Args {
    config: Option<String>,
    size: usize,
    batch: usize,
    save: Option<String>,
}

fn parse_args() -> Args {
    let args: Vec<String> = env::args().collect();
    let mut out = Args {
        config: None,
        size: 64,
        batch: 2,
        save: None,
    };
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--size" => {
                if i + 1 < args.len() {
                    out.size = args[i + 1].parse().unwrap_or(out.size);
                    i += 1;
                }
            }
            "--batch" => {
                if i + 1 < args.len() {
                    out.batch = args[i + 1].parse().unwrap_or(out.batch);
                    i += 1;
                }
            }
            "--save" => {
                if i + 1 < args.len() {
                    out.save = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            other => {
                if !other.starts_with("--") && out.config.is_none() {
                    out.config = Some(other.to_string());
                }
            }
        }
        i += 1;
    }
    out
}

fn synthetic_image(batch: usize, channels: usize, size: usize) -> Tensor {
    Tensor::from_fn(vec![batch, channels, size, size], |i| {
        let v = (i as f32 * 0.013).sin();
        if v > -0.2 {
            v
        } else {
            0.0
        }
    })
}

/// Tissue mask: nonzero pixels of the first image channel.
fn tissue_mask(image: &Tensor) -> Tensor {
    let (b, c, h, w) = (image.shape[0], image.shape[1], image.shape[2], image.shape[3]);
    Tensor::from_fn(vec![b, 1, h, w], |i| {
        let (n, p) = (i / (h * w), i % (h * w));
        if image.data[n * c * h * w + p] != 0.0 {
            1.0
        } else {
            0.0
        }
    })
}

fn run(args: &Args) -> Result<(), NetError> {
    let cfg = match &args.config {
        Some(path) => NetConfig::from_path(path)
            .ok_or_else(|| NetError::InvalidConfig(format!("could not read config {}", path)))?,
        None => NetConfig::default(),
    };
    info!("{:?}", cfg);
    let image = synthetic_image(args.batch, cfg.n_channels, args.size);
    let mask = tissue_mask(&image);
    math::reset_matrix_ops();

    match cfg.variant {
        Variant::Unet => {
            let net = UNet::from_config(&cfg)?;
            let logits = net.forward(&image)?;
            info!("logits {:?}", logits.shape);
            save(args, &net);
        }
        Variant::CompSeg => {
            let net = CompSegNet::from_config(&cfg)?;
            let out = net.forward(&image, Some(&mask))?;
            info!("score {:?} {:?}", out.score.shape, out.score.data);
            info!("sig {:?}", out.sig.shape);
            save(args, &net);
        }
        Variant::CompSeg3 => {
            let net = CompSegNet3::from_config(&cfg)?;
            let out = net.forward(&image, &mask)?;
            info!("score {:?} {:?}", out.score.shape, out.score.data);
            info!("pool_frac {:?}", out.pool_frac.data);
            info!("sig {:?}", out.sig.shape);
            save(args, &net);
        }
        Variant::Grader => {
            let net = CompSegNetGrader::from_config(&cfg)?;
            let grades = net.forward(&image, &mask)?;
            info!("grades {:?}", grades.shape);
            save(args, &net);
        }
    }
    log_total_ops(math::matrix_ops_count());
    Ok(())
}

fn save(args: &Args, net: &dyn Parameterized) {
    if let Some(path) = &args.save {
        if let Err(e) = weights::save_json(path, net) {
            error!("saving weights to {} failed: {}", path, e);
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = parse_args();
    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}
