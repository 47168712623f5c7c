pub mod document;
pub mod envelope;
