//! Criterion benchmarks for the layout and frame-slicing hot paths.
//!
//! Every device render loop slices the mode's canvas once per tick, so
//! `Frame::from_canvas` runs `fps * devices` times a second.
//!
//! Run with:
//! ```bash
//! cargo bench --package mission-core --bench layout_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mission_core::{
    DisplayId, DisplayKind, Frame, Layout, LogicalDisplay, PixelBuffer, Placement, Position,
    Resolution,
};

// ── Fixtures ──────────────────────────────────────────────────────────────────

/// `n` 64x64 matrices in a row, offset from the origin so normalisation has
/// work to do.
fn build_row_layout(n: u32) -> Layout {
    let res = Resolution::new(64, 64).expect("64x64 is a valid resolution");
    let placements = (0..n)
        .map(|i| {
            Placement::new(
                LogicalDisplay::new(DisplayId::new(format!("d{i}")), DisplayKind::Matrix, res),
                Position::new(10 + 64 * i, 10),
            )
        })
        .collect();
    Layout::from_placements(placements).expect("ids are unique")
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout_normalize");
    for n in [1u32, 8, 32] {
        let layout = build_row_layout(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &layout, |b, l| {
            b.iter(|| black_box(l.normalized()))
        });
    }
    group.finish();
}

fn bench_bounds(c: &mut Criterion) {
    let layout = build_row_layout(32);
    c.bench_function("layout_bounds_32", |b| b.iter(|| black_box(layout.bounds())));
}

fn bench_from_canvas(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_from_canvas");
    for n in [1u32, 8] {
        let layout = build_row_layout(n).normalized();
        let bounds = layout.bounds();
        let canvas = PixelBuffer::filled(
            Resolution::new(bounds.width, bounds.height).expect("non-empty layout"),
            [255, 0, 0, 255],
        );
        group.bench_with_input(BenchmarkId::from_parameter(n), &layout, |b, l| {
            b.iter(|| black_box(Frame::from_canvas(&canvas, l)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_normalize, bench_bounds, bench_from_canvas);
criterion_main!(benches);
