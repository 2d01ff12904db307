// Services - comment thread operations exposed to the transport layer

pub mod thread_builder;

pub use thread_builder::ThreadBuilder;
