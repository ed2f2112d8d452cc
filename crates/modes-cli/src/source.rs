//! Raw IQ byte sources: a path, or `-` for stdin.

use std::fs::File;
use std::io::{self, BufReader, Read, Stdin};
use std::path::Path;

pub enum Source {
    File(BufReader<File>),
    Stdin(Stdin),
}

impl Source {
    pub fn open(path: &str) -> io::Result<Self> {
        if path == "-" {
            Ok(Source::Stdin(io::stdin()))
        } else {
            Ok(Source::File(BufReader::new(File::open(Path::new(path))?)))
        }
    }
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::File(f) => f.read(buf),
            Source::Stdin(s) => s.lock().read(buf),
        }
    }
}
