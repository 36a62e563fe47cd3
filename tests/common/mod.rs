#![allow(dead_code)]

pub use trellis_test_utils::{
    ActionBuilder, CountingHandler, FailingHandler, ProjectBuilder, SlowHandler, engine,
    engine_with_fs, init_tracing, registry, with_timeout,
};
