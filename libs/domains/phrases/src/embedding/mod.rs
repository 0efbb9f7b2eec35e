pub mod parse;
mod provider;
mod starspace;

pub use provider::Embedder;
#[cfg(test)]
pub use provider::MockEmbedder;
pub use starspace::StarSpaceEmbedder;
