use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use harbortop::grouping::group_workloads;
use harbortop::logs::classify::classify;
use harbortop::logs::demux::{StreamKind, demux, encode_frame};
use harbortop::runtime::workload::{WorkloadSnapshot, WorkloadStatus};
use harbortop::ui::theme::{BorderStyle, ColorSupport, Theme};
use harbortop::ui::workload_list;
use harbortop::view_model::ViewModel;
use ratatui::Terminal;
use ratatui::backend::TestBackend;
use ratatui::layout::Rect;
use std::hint::black_box;

const LEVELS: [&str; 4] = ["INFO", "WARN", "ERROR", "DEBUG"];

fn make_log(n: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    for i in 0..n {
        let line = format!(
            "2024-01-15T10:30:{:02}.{:09}Z {} request {i} handled in {}ms\n",
            i % 60,
            i,
            LEVELS[i % LEVELS.len()],
            i % 250
        );
        let stream = if i % 7 == 0 {
            StreamKind::Stderr
        } else {
            StreamKind::Stdout
        };
        encode_frame(stream, line.as_bytes(), &mut buf);
    }
    buf
}

fn make_names(n: usize) -> Vec<(String, String)> {
    (0..n)
        .map(|i| {
            let name = match i % 4 {
                0 => format!("svc-{}-{}", i % 13, i),
                1 => format!("stack_{}-worker-{}", i % 5, i),
                2 => format!("job-{i}"),
                _ => format!("standalone{i}"),
            };
            (format!("{i:064x}"), name)
        })
        .collect()
}

fn bench_demux_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("demux_classify_100_1000_10000");

    for size in [100usize, 1000, 10_000] {
        let buf = make_log(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &buf, |b, buf| {
            b.iter(|| {
                let lines: Vec<_> = demux(black_box(buf)).map(|l| classify(&l)).collect();
                black_box(lines);
            })
        });
    }

    group.finish();
}

fn bench_grouping(c: &mut Criterion) {
    let mut group = c.benchmark_group("grouping_50_200_500");

    for size in [50usize, 200, 500] {
        let names = make_names(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &names, |b, names| {
            let pairs: Vec<(&str, &str)> = names
                .iter()
                .map(|(id, name)| (id.as_str(), name.as_str()))
                .collect();
            b.iter(|| {
                let groups = group_workloads(black_box(&pairs), &[]);
                black_box(groups);
            })
        });
    }

    group.finish();
}

fn bench_workload_list_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("workload_list_render_50_200_500");
    let theme = Theme::from_config("dark", ColorSupport::Truecolor);

    for size in [50usize, 200, 500] {
        let mut view = ViewModel::new(60, 100);
        let workloads = make_names(size)
            .into_iter()
            .map(|(id, name)| WorkloadSnapshot::new(id, name, WorkloadStatus::Running))
            .collect();
        view.apply(harbortop::refresh::RefreshReport {
            cycle: 1,
            workloads,
            logs: Default::default(),
            degraded: 0,
            fetched_at: chrono::Utc::now(),
            elapsed: std::time::Duration::ZERO,
        });

        group.bench_with_input(BenchmarkId::from_parameter(size), &view, |b, view| {
            b.iter(|| {
                let backend = TestBackend::new(160, 50);
                let mut terminal = Terminal::new(backend).expect("bench terminal init failed");
                terminal
                    .draw(|frame| {
                        workload_list::render(
                            frame,
                            Rect::new(0, 0, 160, 50),
                            black_box(view),
                            &theme,
                            BorderStyle::Rounded,
                        );
                    })
                    .expect("bench draw failed");
                black_box(terminal.backend());
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_demux_classify,
    bench_grouping,
    bench_workload_list_render
);
criterion_main!(benches);
