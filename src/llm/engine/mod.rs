mod engine;

pub use engine::LlamaGenerator;
