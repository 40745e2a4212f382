// Technical indicators module
// Streaming and batch EWMA kernels for the crossover strategy

pub mod ewma;

pub use ewma::{ewma_adjusted, ewma_infinite_hist, Ewma};
