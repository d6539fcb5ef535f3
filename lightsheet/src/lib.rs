mod adapter;
mod assembler;
mod compute;
mod config;
mod error;
mod frame;
mod pipeline;
mod sample;
mod session;
mod sink;
mod tiff_io;

pub mod prelude;

pub use prelude::*;
