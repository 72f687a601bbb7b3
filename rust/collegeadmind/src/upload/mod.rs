//! Two-phase bulk student upload: a read-only preview that validates every
//! row of a spreadsheet, and a commit that inserts the rows the admin
//! approved.

mod commit;
mod draft;
mod fields;
mod preview;
mod seal;
mod sheet;
pub(crate) mod validate;

pub(crate) use commit::AdmissionNumbers;
pub use commit::{commit_rows, CommitRow};
pub use draft::{StudentDraft, StudentStatus};
pub use fields::StudentField;
pub use preview::{build_preview, PreviewInput};
pub use sheet::SheetFormat;
