use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ocrelay::media::{CropSpec, ImageTransform, PhotometricSpec};
use std::io::Cursor;

/// Screenshot-sized noise image, encoded in `format`.
fn fixture(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x ^ y) as u8, (x * 3) as u8, (y * 5) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, format)
        .expect("Failed to encode benchmark fixture");
    out.into_inner()
}

fn criterion_benchmark(c: &mut Criterion) {
    let transform = ImageTransform::new(CropSpec::default(), PhotometricSpec::default());

    let mut group = c.benchmark_group("image_transform");
    group.sample_size(20);

    for (label, width, height, format) in [
        ("phone_png", 1080, 2400, ImageFormat::Png),
        ("phone_jpeg", 1080, 2400, ImageFormat::Jpeg),
        ("tablet_jpeg", 1600, 2560, ImageFormat::Jpeg),
    ] {
        let bytes = fixture(width, height, format);
        group.bench_with_input(BenchmarkId::new("apply", label), &bytes, |b, bytes| {
            b.iter(|| {
                transform
                    .apply(black_box(bytes))
                    .expect("Transform should succeed on benchmark fixture")
            })
        });
    }

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
