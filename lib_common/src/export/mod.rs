//! Output serialization.

pub mod csv_writer;
