use clap::Parser;
use srm_resnet::hub::{cifar_resnet32, cifar_se_resnet32, cifar_srm_resnet32, Variant};
use srm_resnet::{parse_device, set_seed, Options};

/// Write a freshly initialized CIFAR ResNet-32 checkpoint
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Output file (model.safetensors)
    #[arg(short, long)]
    output: String,

    /// Gate inserted in every block
    #[arg(short, long, value_enum, default_value_t = Variant::Srm)]
    gate: Variant,

    /// Number of output classes
    #[arg(long, default_value_t = 10)]
    classes: usize,

    /// Reduction of the squeeze-and-excitation bottleneck
    #[arg(short, long, default_value_t = 16)]
    reduction: usize,

    /// Seed (not usable on CPU)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Device (cpu, cuda, 0, 1, ...)
    #[arg(short, long)]
    device: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();
    let device = parse_device(args.device)?;
    set_seed(args.seed, &device)?;

    let options = Options {
        num_classes: args.classes,
        reduction: args.reduction,
        ..Default::default()
    };

    match args.gate {
        Variant::Srm => cifar_srm_resnet32(false, false, &options, &device)?.save(&args.output)?,
        Variant::Se => cifar_se_resnet32(false, false, &options, &device)?.save(&args.output)?,
        Variant::Plain => cifar_resnet32(false, false, &options, &device)?.save(&args.output)?,
    }

    Ok(())
}
