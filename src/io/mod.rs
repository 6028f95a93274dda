//! Table I/O boundary: reading source sheets out of the uploaded archive and
//! rendering output workbooks.

pub mod archive;
pub mod excel_read;
pub mod excel_write;
