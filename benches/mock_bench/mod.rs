use criterion::Criterion;

pub mod barrier;
pub mod mark;

/// Run the benchmark named by `SATBGC_BENCH`, or all of them.
pub fn bench(c: &mut Criterion) {
    match std::env::var("SATBGC_BENCH").as_deref() {
        Ok("mark") => mark::bench(c),
        Ok("barrier") => barrier::bench(c),
        Ok(other) => panic!("Unknown benchmark {:?}", other),
        Err(_) => {
            mark::bench(c);
            barrier::bench(c);
        }
    }
}
