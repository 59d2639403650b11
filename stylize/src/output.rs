/*!
    Partial output files.
*/

use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::debug;

use media_types::{Error, Result};

/**
    A temporary file next to the final destination.

    The sink writes here while a recording or pipeline run is in progress.
    [`PartialOutput::persist`] moves it into place once the sink is
    finalized; dropping it instead deletes the file, which is how failed
    and cancelled runs discard what they wrote.
*/
#[derive(Debug)]
pub struct PartialOutput {
    temp: TempPath,
    destination: PathBuf,
}

impl PartialOutput {
    pub fn create(destination: &Path) -> Result<Self> {
        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp = tempfile::Builder::new()
            .prefix(".stylize-")
            .suffix(".partial")
            .tempfile_in(dir)?
            .into_temp_path();
        debug!(path = %temp.display(), "created partial output");
        Ok(Self {
            temp,
            destination: destination.to_path_buf(),
        })
    }

    /**
        Path the sink should write to.
    */
    pub fn path(&self) -> &Path {
        &self.temp
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /**
        Move the finished file to its destination, replacing anything there.
    */
    pub fn persist(self) -> Result<PathBuf> {
        self.temp
            .persist(&self.destination)
            .map_err(|e| Error::Io(e.error))?;
        Ok(self.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn persist_moves_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out.mov");
        let partial = PartialOutput::create(&destination).unwrap();
        assert_eq!(partial.path().parent(), Some(dir.path()));
        fs::write(partial.path(), b"movie").unwrap();

        let path = partial.persist().unwrap();
        assert_eq!(path, destination);
        assert_eq!(fs::read(&destination).unwrap(), b"movie");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn dropping_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let partial = PartialOutput::create(&dir.path().join("out.mov")).unwrap();
        let temp = partial.path().to_path_buf();
        assert!(temp.exists());
        drop(partial);
        assert!(!temp.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
