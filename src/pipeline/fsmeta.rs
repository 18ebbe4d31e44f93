//! Copy OS-level file stats (permission bits, access and modification times)
//! from one file onto another, the way `cp -p` does.

use std::fs::{self, File, FileTimes};
use std::io;
use std::path::Path;

/// Copy permissions, access time and modification time of `src` onto `dst`.
pub fn copy_file_stats(src: &Path, dst: &Path) -> io::Result<()> {
    let meta = fs::metadata(src)?;

    let mut times = FileTimes::new().set_modified(meta.modified()?);
    if let Ok(accessed) = meta.accessed() {
        times = times.set_accessed(accessed);
    }

    // Times first: a read-only mode copied from `src` would block the write handle.
    File::options().write(true).open(dst)?.set_times(times)?;
    fs::set_permissions(dst, meta.permissions())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[test]
    fn modification_time_is_copied() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("dst.bin");
        fs::write(&src, b"a").unwrap();
        fs::write(&dst, b"b").unwrap();

        let past = SystemTime::UNIX_EPOCH + Duration::from_secs(1_500_000_000);
        File::options()
            .write(true)
            .open(&src)
            .unwrap()
            .set_times(FileTimes::new().set_modified(past))
            .unwrap();

        copy_file_stats(&src, &dst).unwrap();
        assert_eq!(fs::metadata(&dst).unwrap().modified().unwrap(), past);
        assert_eq!(fs::read(&dst).unwrap(), b"b");
    }

    #[test]
    fn missing_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("dst.bin");
        fs::write(&dst, b"b").unwrap();
        assert!(copy_file_stats(&dir.path().join("nope"), &dst).is_err());
    }
}
