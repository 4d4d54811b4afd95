use crate::Result;

/// Side length of CIFAR images.
pub const IMAGE_SIZE: usize = 32;

/// Per-channel statistics of the CIFAR-10 training set.
pub const CIFAR10_MEAN: [f32; 3] = [0.4914, 0.4822, 0.4465];
pub const CIFAR10_STD: [f32; 3] = [0.2470, 0.2435, 0.2616];

pub const CIFAR10_CLASSES: [&str; 10] = [
    "airplane",
    "automobile",
    "bird",
    "cat",
    "deer",
    "dog",
    "frog",
    "horse",
    "ship",
    "truck",
];

/// Turns an RGB buffer of shape (IMAGE_SIZE, IMAGE_SIZE, 3) into a
/// normalized (1, 3, IMAGE_SIZE, IMAGE_SIZE) F32 tensor.
pub fn normalize(
    pixels: Vec<u8>,
    device: &candle_core::Device,
) -> candle_core::Result<candle_core::Tensor> {
    let mean = candle_core::Tensor::new(&CIFAR10_MEAN, device)?.reshape((3, 1, 1))?;
    let std = candle_core::Tensor::new(&CIFAR10_STD, device)?.reshape((3, 1, 1))?;

    candle_core::Tensor::from_vec(pixels, (IMAGE_SIZE, IMAGE_SIZE, 3), device)?
        .permute((2, 0, 1))?
        .to_dtype(candle_core::DType::F32)?
        .affine(1. / 255., 0.)?
        .broadcast_sub(&mean)?
        .broadcast_div(&std)?
        .unsqueeze(0)
}

pub fn image_preprocess<T: AsRef<std::path::Path>>(
    path: T,
    device: &candle_core::Device,
) -> Result<candle_core::Tensor> {
    let img = image::io::Reader::open(path)?.decode()?;
    let img = img.resize_exact(
        IMAGE_SIZE as u32,
        IMAGE_SIZE as u32,
        image::imageops::FilterType::CatmullRom,
    );
    let img = img.to_rgb8().into_raw();

    Ok(normalize(img, device)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SrmResNetError;
    use candle_core::{Device, D};

    #[test]
    fn mean_colored_image_normalizes_to_zero() -> candle_core::Result<()> {
        let rgb = CIFAR10_MEAN.map(|m| (m * 255.).round() as u8);
        let pixels = rgb.repeat(IMAGE_SIZE * IMAGE_SIZE);

        let xs = normalize(pixels, &Device::Cpu)?;
        assert_eq!(xs.dims(), &[1, 3, IMAGE_SIZE, IMAGE_SIZE]);

        let max = xs.abs()?.flatten_all()?.max(D::Minus1)?.to_scalar::<f32>()?;
        assert!(max < 0.01, "{max}");
        Ok(())
    }

    #[test]
    fn channels_move_to_the_front() -> candle_core::Result<()> {
        let pixels = [255u8, 0, 0].repeat(IMAGE_SIZE * IMAGE_SIZE);
        let xs = normalize(pixels, &Device::Cpu)?.squeeze(0)?;

        let red = xs.get(0)?.mean_all()?.to_scalar::<f32>()?;
        let green = xs.get(1)?.mean_all()?.to_scalar::<f32>()?;
        assert!((red - (1. - CIFAR10_MEAN[0]) / CIFAR10_STD[0]).abs() < 1e-4);
        assert!((green + CIFAR10_MEAN[1] / CIFAR10_STD[1]).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn decodes_and_resizes_any_image_size() -> Result<()> {
        let path = std::env::temp_dir().join(format!("srm-resnet-{}-resize.png", std::process::id()));
        image::RgbImage::from_pixel(48, 20, image::Rgb([255, 0, 0])).save(&path)?;

        let xs = image_preprocess(&path, &Device::Cpu);
        std::fs::remove_file(&path)?;
        let xs = xs?;

        assert_eq!(xs.dims(), &[1, 3, IMAGE_SIZE, IMAGE_SIZE]);
        assert_eq!(xs.dtype(), candle_core::DType::F32);
        let red = xs.squeeze(0)?.get(0)?.mean_all()?.to_scalar::<f32>()?;
        assert!((red - (1. - CIFAR10_MEAN[0]) / CIFAR10_STD[0]).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let path = std::env::temp_dir().join("srm-resnet-no-such-image.png");
        let err = image_preprocess(path, &Device::Cpu).unwrap_err();
        assert!(matches!(err, SrmResNetError::Io(_)), "{err}");
    }
}
