use crate::{dataset::DatasetError, psf::PsfError, sparse::SparseError};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error in the `psf` module")]
    Psf(#[from] PsfError),
    #[error("Error in the `dataset` module")]
    Dataset(#[from] DatasetError),
    #[error("Error in the `sparse` module")]
    Sparse(#[from] SparseError),
}
