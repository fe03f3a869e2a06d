use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

pub mod json;
pub mod terminal;

/// Writer for command output: the given file, or stdout.
pub fn writer(output: Option<&Path>) -> io::Result<Box<dyn Write>> {
    match output {
        Some(path) => Ok(Box::new(File::create(path)?)),
        None => Ok(Box::new(io::stdout())),
    }
}
