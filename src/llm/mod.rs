//! Clients for the external embedding and text-generation services.

pub mod chat_stream;
pub mod embeddings;
