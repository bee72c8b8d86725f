mod course;
mod ids;
mod principal;
mod progress;
mod thumbnail;

pub use course::{Course, CourseError};
pub use ids::{CourseId, ParseIdError, PrincipalId, ProgressId};
pub use principal::{Credentials, CredentialsError, Email, Password, Principal};
pub use progress::{
    Completion, CompletionState, NewProgressRecord, ProgressRecord, ProgressRecordError,
};
pub use thumbnail::{Thumbnail, ThumbnailError};
