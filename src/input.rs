use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek};
use std::path::Path;

use anyhow::Result;

/// The decoder wants random access; anything readable and seekable will do.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Opens an input path for decoding.
///
/// Use "-" for stdin; pipes are not seekable, so stdin is buffered into
/// memory up front.
pub fn open<P: AsRef<Path>>(input_path: P) -> Result<Box<dyn ReadSeek>> {
    let path = input_path.as_ref();

    if path.to_string_lossy() == "-" {
        let mut data = Vec::new();
        io::stdin().lock().read_to_end(&mut data)?;
        log::debug!("buffered {} bytes from stdin", data.len());

        return Ok(Box::new(Cursor::new(data)));
    }

    let file = File::open(path)?;
    Ok(Box::new(BufReader::new(file)))
}
