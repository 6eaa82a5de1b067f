//! Static content enumeration.
//!
//! Walks the content root and produces one [`ContentFile`] per regular file,
//! carrying the object key, the MIME type and a digest of the file contents.

mod mime;
mod path;
mod scan;

pub use mime::{DEFAULT_CONTENT_TYPE, guess_content_type};
pub use path::{normalize, relative_path};
pub use scan::{ContentFile, ContentScanner};
