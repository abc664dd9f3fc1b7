use thiserror::Error;

#[derive(Error, Debug)]
pub enum DistanceError {
    #[error(transparent)]
    Store(#[from] store::StoreError),

    #[error("Distance computation was cancelled")]
    Cancelled,
}
