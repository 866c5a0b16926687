pub mod core;
pub mod rag;
pub mod tools;
