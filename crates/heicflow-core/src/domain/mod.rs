//! Domain model (IDs, objects, job records, errors, ...).

pub mod errors;
pub mod format;
pub mod ids;
pub mod job;
pub mod object;
pub mod upload;

pub use self::errors::{
    ConversionError, CredentialError, ErrorKind, PipelineError, StorageError, ValidationError,
};
pub use self::format::{is_png, sniff_heic};
pub use self::ids::{IdParseError, JobId};
pub use self::job::{JobRecord, ProcessedView, UploadReceipt};
pub use self::object::{BucketId, Cid, StoredObject};
pub use self::upload::{UploadRequest, has_heic_extension};
