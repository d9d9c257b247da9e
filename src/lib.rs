//! # Varlzw Library
//!
//! Compress and expand byte streams with variable width LZW codes.
//! * `table` is the adaptive string table shared by both directions
//! * `lzw` holds the compressor, the expander, and the stream prologue
//!
//! Codes start at 9 bits and widen as the dictionary grows, up to a
//! configurable ceiling.  When the ceiling is reached the dictionary either
//! freezes or, with a usage threshold set, is pruned of rarely used entries
//! so it can keep adapting.  The dictionary can also be dumped to a sidecar
//! file and preloaded into a later run.
//!
//! The compression/expansion functions are generics that operate on trait
//! objects with bounds `Read` or `Write`, so they stream between pipes as
//! well as files.  There are convenience functions for working directly
//! with buffers.
//!
//! ## Buffer Example
//!
//! ```rs
//! use varlzw::lzw;
//! let test_data = "This is the chaunt of the priests.  The chaunt of the priests of Mung.".as_bytes();
//! let compressed = lzw::compress_slice(test_data,&lzw::STD_OPTIONS).expect("compression failed");
//! let expanded = lzw::expand_slice(&compressed).expect("expansion failed");
//! ```
//!
//! ## Stream Example
//!
//! ```rs
//! use varlzw::lzw;
//! let mut in_file = std::fs::File::open("some_input_path").expect("open failed");
//! let mut out_file = std::fs::File::create("some_output_path").expect("create failed");
//! let table = lzw::compress(&mut in_file,&mut out_file,&lzw::STD_OPTIONS)
//!     .expect("compression failed");
//! eprintln!("finished with {} dictionary entries",table.num_entries());
//! ```

mod tools;
pub mod table;
pub mod lzw;

type DYNERR = Box<dyn std::error::Error>;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

/// Stream and sidecar errors
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("invalid header")]
    InvalidHeader,
    #[error("invalid code: {0}")]
    InvalidCode(usize),
    #[error("corrupt dictionary dump")]
    BadDump,
    #[error("unable to open file {0}")]
    FileUnavailable(String)
}
