use std::{
    fs::File,
    io::{self, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

/// A document file that is well formed after every record.
///
/// The file is truncated and the opening token written when it is created.
/// The first record is followed by the closing token. Each later record
/// seeks back over the closing token and overwrites it with the separator,
/// the record and the closing token again; the file is only cut to the new
/// end once that write has landed. Memory use doesn't grow with the number
/// of records, and a failed write never strips the closing token.
pub struct StreamingDocument {
    path: PathBuf,
    file: File,
    separator: &'static str,
    closing: &'static str,
    records: u64,
}

impl StreamingDocument {
    pub fn create(
        path: &Path,
        opening: &'static str,
        separator: &'static str,
        closing: &'static str,
    ) -> io::Result<Self> {
        let mut file = File::create(path)?;
        file.write_all(opening.as_bytes())?;
        file.flush()?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            separator,
            closing,
            records: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append_record(&mut self, record: &str) -> io::Result<()> {
        let mut chunk = String::with_capacity(self.separator.len() + record.len() + self.closing.len());
        if self.records > 0 {
            let closing_len = i64::try_from(self.closing.len())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            self.file.seek(SeekFrom::End(-closing_len))?;
            chunk.push_str(self.separator);
        } else {
            self.file.seek(SeekFrom::End(0))?;
        }
        chunk.push_str(record);
        chunk.push_str(self.closing);

        self.file.write_all(chunk.as_bytes())?;
        self.file.flush()?;
        let end = self.file.stream_position()?;
        self.file.set_len(end)?;
        self.records += 1;
        Ok(())
    }

    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }
}
