//! Render/parse throughput for the Xrl text syntax, which sits on every
//! RPC path.

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use switchyard::xrl::{AtomValue, Xrl, XrlArgs};

fn sample_xrl() -> Xrl {
    Xrl::parse_parts(
        "bgp-1",
        "rib/add_route",
        XrlArgs::new()
            .with("net", AtomValue::Ipv4Net("10.128.0.0/9".parse().unwrap()))
            .with("nexthop", AtomValue::Ipv4("192.0.2.1".parse().unwrap()))
            .with("metric", AtomValue::U32(100))
            .with("note", AtomValue::Text("learned from peering lab-7".to_string()))
            .with(
                "communities",
                AtomValue::List(vec![
                    AtomValue::U32(65_001),
                    AtomValue::U32(65_002),
                    AtomValue::U32(65_003),
                ]),
            ),
    )
    .expect("valid sample")
}

fn bench_render(c: &mut Criterion) {
    let xrl = sample_xrl();
    c.bench_function("xrl_render", |b| b.iter(|| black_box(&xrl).to_string()));
}

fn bench_parse(c: &mut Criterion) {
    let text = sample_xrl().to_string();
    c.bench_function("xrl_parse", |b| {
        b.iter(|| black_box(&text).parse::<Xrl>().expect("parses"))
    });
}

criterion_group!(benches, bench_render, bench_parse);
criterion_main!(benches);
