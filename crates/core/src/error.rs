use thiserror::Error;

use crate::model::{CourseError, CredentialsError, ProgressRecordError, ThumbnailError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Thumbnail(#[from] ThumbnailError),
    #[error(transparent)]
    ProgressRecord(#[from] ProgressRecordError),
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
}
