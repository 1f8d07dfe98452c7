//! Integration tests, built as a single binary.

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("concord=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod awareness;
mod convergence;
mod helpers;
mod richtext;
mod scenarios;
mod subscription;
mod sync;
mod tree;
mod undo;
