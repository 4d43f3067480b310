pub mod fetcher;

pub use fetcher::{ThumbError, ThumbImage, ThumbKey, ThumbnailFetcher};

/// 2x2 PNG，各处测试共用的最小可解码图。
#[cfg(test)]
pub(crate) fn tiny_png() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}
