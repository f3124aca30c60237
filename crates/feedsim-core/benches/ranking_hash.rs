use divan::Bencher;
use feedsim_core::{derive_id, mix_seed_with_bytes};

fn main() {
    // Run registered benchmarks.
    divan::main();
}

#[divan::bench]
fn derive_post_id(bencher: Bencher) {
    bencher.bench_local(|| derive_id(divan::black_box(&[b"post", b"op-00000000-0000"])));
}

#[divan::bench]
fn tie_break_mix(bencher: Bencher) {
    let id_bytes = derive_id(&[b"post", b"op-00000000-0000"]);

    bencher.bench_local(|| mix_seed_with_bytes(divan::black_box(42), divan::black_box(&id_bytes)));
}
