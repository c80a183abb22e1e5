#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("chunk overlap {overlap} must be smaller than chunk size {size}")]
    OverlapTooLarge { overlap: usize, size: usize },
}
