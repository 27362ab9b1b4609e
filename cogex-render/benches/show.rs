use cogex_core::{ArrowDirection, StimulusType};
use cogex_render::StimulusCanvas;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn stimuli() -> Vec<StimulusType> {
    let white = StimulusType::WHITE;
    vec![
        StimulusType::fixation(),
        StimulusType::Circle { radius: 50.0, color: white },
        StimulusType::Flanker {
            target: ArrowDirection::Left,
            flankers: ArrowDirection::Right,
            size: 30.0,
            color: white,
        },
        StimulusType::Flanker {
            target: ArrowDirection::Right,
            flankers: ArrowDirection::Right,
            size: 30.0,
            color: white,
        },
    ]
}

fn bench_show(c: &mut Criterion) {
    let stimuli = stimuli();
    let mut canvas = StimulusCanvas::new(WIDTH, HEIGHT).unwrap();
    canvas.prewarm(&stimuli).unwrap();
    let mut frame = vec![0u8; (WIDTH * HEIGHT * 4) as usize];
    canvas.present_into(&mut frame).unwrap();

    let mut g = c.benchmark_group("canvas");
    g.sample_size(50);

    // What happens between the onset wake-up and the flip.
    g.bench_function("show_cached_and_present", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % stimuli.len();
            canvas.show(black_box(&stimuli[i])).unwrap();
            black_box(canvas.present_into(&mut frame).unwrap())
        })
    });

    g.bench_function("rasterize_uncached", |b| {
        b.iter(|| {
            let mut fresh = StimulusCanvas::new(WIDTH, HEIGHT).unwrap();
            fresh.show(black_box(&stimuli[2])).unwrap();
            black_box(fresh.cached())
        })
    });
    g.finish();
}

criterion_group!(benches, bench_show);
criterion_main!(benches);
