use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Reducer failed: {0:#}")]
    Reduce(anyhow::Error),

    #[error("Store is stopped")]
    Stopped,
}
