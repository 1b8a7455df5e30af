use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A value does not fit in the 16-bit on-disk representation.
    #[error("value {value} at position {index} does not fit in 16 bits")]
    Encoding { value: u32, index: usize },

    /// An exact-count read ran past the end of the file.
    #[error("requested {requested} ints at offset {offset} but only {available} remain")]
    InsufficientData {
        requested: usize,
        offset: u64,
        available: u64,
    },
}
