#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("config error: {0}")]
    Config(String),
}
