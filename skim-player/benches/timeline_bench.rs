//! Timeline mapping benchmark: chunked virtual-to-source queries over a
//! heavily fragmented timeline, the decode worker's hot path.

use criterion::{criterion_group, criterion_main, Criterion};
use skim_player::playback::timeline::{FragmentedTimeline, TMSection};
use std::hint::black_box;

fn fragmented_timeline(sections: usize) -> FragmentedTimeline {
    let mut timeline = FragmentedTimeline::new();
    for i in 0..sections {
        let begin = i as f64;
        let section = if i % 2 == 0 {
            TMSection::new(begin, begin + 1.0).unwrap()
        } else {
            TMSection::excluded(begin, begin + 1.0).unwrap()
        };
        timeline.add_or_update_section(section);
    }
    timeline
}

fn bench_map_time_range(c: &mut Criterion) {
    let timeline = fragmented_timeline(1_000);
    let total = timeline.virtual_duration();

    c.bench_function("map_time_range/1s_chunks_over_1000_sections", |b| {
        let mut cursor = 0.0;
        b.iter(|| {
            let mapping = timeline.map_time_range(cursor, cursor + 1.0).unwrap();
            cursor += mapping.mapped_duration();
            if cursor >= total {
                cursor = 0.0;
            }
            black_box(mapping)
        })
    });

    c.bench_function("map_time_range/full_span_over_1000_sections", |b| {
        b.iter(|| black_box(timeline.map_time_range(0.0, total).unwrap()))
    });
}

criterion_group!(benches, bench_map_time_range);
criterion_main!(benches);
