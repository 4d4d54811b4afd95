use candle_core::Tensor;
use clap::Parser;
use srm_resnet::hub::{cifar_resnet32, cifar_se_resnet32, cifar_srm_resnet32, Variant};
use srm_resnet::preprocess::IMAGE_SIZE;
use srm_resnet::{parse_device, Network, Options, ResidualBlock};

/// Build a CIFAR ResNet-32 and run a constant batch through it
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Gate inserted in every block
    #[arg(short, long, value_enum, default_value_t = Variant::Srm)]
    gate: Variant,

    /// Number of output classes
    #[arg(long, default_value_t = 10)]
    classes: usize,

    /// Batch size of the synthetic input
    #[arg(short, long, default_value_t = 2)]
    batch_size: usize,

    /// Value every input pixel is set to
    #[arg(long, default_value_t = 0.5)]
    fill: f32,

    /// Checkpoint to restore (model.safetensors)
    #[arg(short, long)]
    model: Option<String>,

    /// Device (cpu, cuda, 0, 1, ...)
    #[arg(short, long)]
    device: Option<String>,
}

fn summarize<B: ResidualBlock>(network: Network<B>, args: &Args) -> anyhow::Result<()> {
    log::info!(
        "{} residual blocks, {} parameters",
        network.model().depth(),
        network.num_parameters()
    );

    let xs = Tensor::full(
        args.fill,
        (args.batch_size, 3, IMAGE_SIZE, IMAGE_SIZE),
        network.device(),
    )?;
    let logits = network.forward(&xs)?;

    println!("{}", logits);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();
    let device = parse_device(args.device.clone())?;

    let mut options = Options {
        num_classes: args.classes,
        ..Default::default()
    };
    let pretrained = match &args.model {
        Some(model) => {
            options.checkpoint = model.into();
            true
        }
        None => false,
    };

    match args.gate {
        Variant::Srm => summarize(cifar_srm_resnet32(pretrained, true, &options, &device)?, &args),
        Variant::Se => summarize(cifar_se_resnet32(pretrained, true, &options, &device)?, &args),
        Variant::Plain => summarize(cifar_resnet32(pretrained, true, &options, &device)?, &args),
    }
}
