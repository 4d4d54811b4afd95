use candle_core::{Tensor, D};
use clap::Parser;
use srm_resnet::hub::{cifar_resnet32, cifar_se_resnet32, cifar_srm_resnet32, Variant};
use srm_resnet::metrics::{top_k, Accuracy};
use srm_resnet::preprocess::{image_preprocess, CIFAR10_CLASSES};
use srm_resnet::{parse_device, Network, Options, ResidualBlock};

/// Classify images with a trained CIFAR ResNet-32
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Images to classify
    #[arg(short, long, required = true, num_args = 1..)]
    input: Vec<String>,

    /// Class index of each input; reports top-1 / top-5 accuracy when given
    #[arg(short, long, num_args = 1..)]
    labels: Vec<u32>,

    /// Model to use for predictions
    #[arg(short, long)]
    model: String,

    /// Gate the checkpoint was trained with
    #[arg(short, long, value_enum, default_value_t = Variant::Srm)]
    gate: Variant,

    /// Number of output classes
    #[arg(long, default_value_t = 10)]
    classes: usize,

    /// How many classes to print
    #[arg(short, long, default_value_t = 5)]
    top: usize,

    /// Device (cpu, cuda, 0, 1, ...)
    #[arg(short, long)]
    device: Option<String>,
}

fn predict<B: ResidualBlock>(network: Network<B>, args: &Args) -> anyhow::Result<()> {
    if !args.labels.is_empty() && args.labels.len() != args.input.len() {
        anyhow::bail!("{} labels for {} images", args.labels.len(), args.input.len());
    }

    let images = args
        .input
        .iter()
        .map(|path| image_preprocess(path, network.device()))
        .collect::<srm_resnet::Result<Vec<_>>>()?;
    let xs = Tensor::cat(&images, 0)?;
    let logits = network.forward(&xs)?;
    let probs = candle_nn::ops::softmax(&logits, D::Minus1)?;

    for (path, ranked) in args.input.iter().zip(top_k(&probs, args.top)?) {
        println!("{}", path);
        for (class, p) in ranked {
            match CIFAR10_CLASSES.get(class).filter(|_| args.classes == CIFAR10_CLASSES.len()) {
                Some(name) => println!("{:>10} {:.4}", name, p),
                None => println!("{:>10} {:.4}", class, p),
            }
        }
    }

    if !args.labels.is_empty() {
        let mut accuracy = Accuracy::new();
        accuracy.update(&logits, &args.labels)?;
        println!(
            "top-1 {:.4} top-5 {:.4} over {} images",
            accuracy.top1(),
            accuracy.top5(),
            accuracy.seen()
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();
    let device = parse_device(args.device.clone())?;

    let options = Options {
        num_classes: args.classes,
        checkpoint: args.model.clone().into(),
        ..Default::default()
    };
    log::info!("Loading {}", args.model);

    match args.gate {
        Variant::Srm => predict(cifar_srm_resnet32(true, true, &options, &device)?, &args),
        Variant::Se => predict(cifar_se_resnet32(true, true, &options, &device)?, &args),
        Variant::Plain => predict(cifar_resnet32(true, true, &options, &device)?, &args),
    }
}
