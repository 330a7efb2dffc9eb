use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::{
    packet::frame::StreamFrame,
    result::{FerryError, FerryResult},
};

/// Lazily splits a file into length-prefixed STREAM frames, in file order,
/// each tagged with the byte offset it started at. FIN is set on whichever
/// frame consumes the last byte; an empty file yields nothing.
pub struct ChunkReader {
    reader: BufReader<File>,
    chunk_size: usize,
    stream_id: u64,
    position: u64,
    total_size: u64,
    finished: bool,
}

impl Iterator for ChunkReader {
    type Item = FerryResult<StreamFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let offset = self.position;
        let mut buf = Vec::with_capacity(self.chunk_size);
        let mut limited = (&mut self.reader).take(self.chunk_size as u64);
        if let Err(e) = limited.read_to_end(&mut buf) {
            self.finished = true;
            return Some(Err(FerryError::Io(e)));
        }

        if buf.is_empty() {
            self.finished = true;
            return None;
        }

        self.position += buf.len() as u64;
        let finish = self.position >= self.total_size;
        if finish {
            self.finished = true;
        }

        Some(Ok(StreamFrame::new(
            self.stream_id,
            true,
            Some(offset),
            finish,
            buf,
        )))
    }
}

pub fn chunkify_file(
    path: impl AsRef<Path>,
    chunk_size: usize,
    stream_id: u64,
) -> FerryResult<ChunkReader> {
    let file = File::open(path).map_err(FerryError::Io)?;
    let total_size = file.metadata().map_err(FerryError::Io)?.len();

    Ok(ChunkReader {
        reader: BufReader::new(file),
        chunk_size,
        stream_id,
        position: 0,
        total_size,
        finished: false,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_chunkify_5000_byte_file_at_1000() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; 5000]).unwrap();
        file.flush().unwrap();

        let frames: Vec<StreamFrame> = chunkify_file(file.path(), 1000, 7)
            .unwrap()
            .map(|f| f.unwrap())
            .collect();

        assert_eq!(frames.len(), 5);
        let offsets: Vec<u64> = frames.iter().map(|f| f.offset.unwrap()).collect();
        assert_eq!(offsets, vec![0, 1000, 2000, 3000, 4000]);
        assert!(frames[..4].iter().all(|f| !f.finish));
        assert!(frames[4].finish);
        assert!(frames.iter().all(|f| f.stream_id == 7));
        assert!(frames.iter().all(|f| f.data.len() == 1000));
    }

    #[test]
    fn test_chunkify_empty_file_yields_nothing() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let frames: Vec<_> = chunkify_file(file.path(), 1000, 0).unwrap().collect();
        assert!(frames.is_empty());
    }

    #[test]
    fn test_chunkify_uneven_final_chunk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![1u8; 2500]).unwrap();
        file.flush().unwrap();

        let frames: Vec<StreamFrame> = chunkify_file(file.path(), 1000, 3)
            .unwrap()
            .map(|f| f.unwrap())
            .collect();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].data.len(), 500);
        assert!(frames[2].finish);
    }
}
