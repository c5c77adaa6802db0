use thiserror::Error;

#[derive(Debug, Error)]
pub enum CardError {
    #[error("key loader error: {0}")]
    Loader(#[from] crate::loader::LoaderError),
    #[error("key unwrap failed: {0}")]
    KeyWrap(#[from] keywrap::KeyWrapError),
}
