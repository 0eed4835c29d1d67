//! Throughput of the instructions that move the most data.
//!
//! Run benchmarks: `cargo bench -p weft-xslt --bench instructions`
//!
//! Compare executors for `xsl:fork`:
//! ```
//! cargo bench -p weft-xslt --bench instructions -- "fork"
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use weft_types::QName;
use weft_xslt::{
    ForkExecutor, Instruction, OutputProperties, Stylesheet, StylesheetBuilder, TransformConfig,
    Transformer,
};

fn config() -> TransformConfig {
    TransformConfig::default()
        .with_default_output(OutputProperties::default().with_omit_xml_declaration(true))
}

/// Two overlapping ranges of `count` integers, merged on the item itself.
fn merge_stylesheet(count: usize) -> Stylesheet {
    let mut b = StylesheetBuilder::new();
    let root = b.root();
    let main = b.add(
        root,
        Instruction::Template {
            name: Some(QName::local("main")),
        },
    );
    let merge = b.add(main, Instruction::Merge);
    for (name, select) in [
        ("low", format!("1 to {count}")),
        ("high", format!("{} to {}", count / 2, count + count / 2)),
    ] {
        let select = b.xpath(&select).expect("Failed to compile merge source");
        let source = b.add(
            merge,
            Instruction::MergeSource {
                name: Some(name.to_string()),
                select,
                sort_before_merge: true,
            },
        );
        let key = b.xpath(".").expect("Failed to compile merge key");
        b.add(
            source,
            Instruction::MergeKey {
                select: key,
                order: Default::default(),
            },
        );
    }
    let action = b.add(merge, Instruction::MergeAction);
    b.value_of(action, "count(current-merge-group())")
        .expect("Failed to compile merge action");
    b.compose().expect("Failed to compose stylesheet")
}

/// `branches` fork branches, each counting a generated sequence.
fn fork_stylesheet(branches: usize) -> Stylesheet {
    let mut b = StylesheetBuilder::new();
    let root = b.root();
    let main = b.add(
        root,
        Instruction::Template {
            name: Some(QName::local("main")),
        },
    );
    let fork = b.add(main, Instruction::Fork);
    for _ in 0..branches {
        b.sequence(fork, Some("sum(1 to 20000)"))
            .expect("Failed to compile fork branch");
    }
    b.compose().expect("Failed to compose stylesheet")
}

fn benchmark_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    let main = QName::local("main");

    for count in [10, 100, 1000] {
        group.throughput(Throughput::Elements(2 * count as u64));
        let transformer = Transformer::new(merge_stylesheet(count)).with_config(config());

        group.bench_with_input(BenchmarkId::new("items", count), &count, |b, _| {
            b.iter(|| {
                transformer
                    .call_template_to_string(black_box(&main), None)
                    .expect("Failed to run merge")
            });
        });
    }

    group.finish();
}

fn benchmark_fork(c: &mut Criterion) {
    let mut group = c.benchmark_group("fork");
    let main = QName::local("main");

    for (label, executor) in [("sync", ForkExecutor::Sync), ("rayon", ForkExecutor::Rayon)] {
        for branches in [2, 8] {
            let transformer = Transformer::new(fork_stylesheet(branches))
                .with_config(config().with_fork_executor(executor));

            group.bench_with_input(BenchmarkId::new(label, branches), &branches, |b, _| {
                b.iter(|| {
                    transformer
                        .call_template_to_string(black_box(&main), None)
                        .expect("Failed to run fork")
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, benchmark_merge, benchmark_fork);
criterion_main!(benches);
