use std::rc::Rc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use stratum::utils::{Logical, Rectangle, RectangleKind, Region, RegionAttributes};
use stratum::wayland::buffer::BufferRegistry;
use stratum::wayland::compositor::Surface;

fn criterion_benchmark(c: &mut Criterion) {
    let buffers = Rc::new(BufferRegistry::new());

    c.bench_function("Surface::commit", |b| {
        let mut surface = Surface::new(buffers.clone());
        let buffer = buffers.create((1920, 1080), false);
        b.iter(|| {
            surface.attach(Some(buffer.token()));
            surface.damage_buffer(Rectangle::from(((0, 0), (64, 64))));
            surface.commit().unwrap();
        })
    });

    c.bench_function("Surface::unlock cascade", |b| {
        let buffer = buffers.create((256, 256), false);
        b.iter_batched(
            || {
                let mut surface = Surface::new(buffers.clone());
                let token = surface.lock();
                for _ in 0..32 {
                    surface.attach(Some(buffer.token()));
                    surface.commit().unwrap();
                }
                (surface, token)
            },
            |(mut surface, token)| surface.unlock(token),
            BatchSize::SmallInput,
        )
    });

    // a window covered by many overlapping opaque rectangles
    let attributes = RegionAttributes {
        rects: (0..256)
            .map(|i| {
                let rect = Rectangle::from((((i * 37) % 600, (i * 53) % 500), (200, 100)));
                let kind = if i % 7 == 0 {
                    RectangleKind::Subtract
                } else {
                    RectangleKind::Add
                };
                (kind, rect)
            })
            .collect(),
    };
    c.bench_function("RegionAttributes::to_region", |b| {
        b.iter(|| attributes.to_region())
    });

    let region = attributes.to_region();
    let window: Rectangle<i32, Logical> = Rectangle::from(((100, 100), (400, 300)));
    c.bench_function("Region::subtract_rect", |b| {
        b.iter(|| {
            let mut visible = Region::from(window);
            for rect in region.rects() {
                visible.subtract_rect(*rect);
            }
            visible.area()
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
