//! Sysroot lookup in the CMake cache of a configured build directory
//!
//! CMake writes one `<key>:<TYPE>=<value>` entry per line. Only the first
//! line carrying the sysroot key is consulted.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ResolveError, ResolveResult};

/// Cache file written by CMake into every configured build directory
pub const DEFAULT_CACHE_FILE: &str = "CMakeCache.txt";

/// Cache key holding the sysroot of the toolchain build
pub const DEFAULT_SYSROOT_KEY: &str = "lf_os_sysroot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysrootLocator {
    cache_file: String,
    key: String,
}

impl Default for SysrootLocator {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_FILE, DEFAULT_SYSROOT_KEY)
    }
}

impl SysrootLocator {
    pub fn new(cache_file: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            cache_file: cache_file.into(),
            key: key.into(),
        }
    }

    /// Location of the cache artifact inside `build_dir`
    pub fn cache_path(&self, build_dir: &Path) -> PathBuf {
        build_dir.join(&self.cache_file)
    }

    /// Read the sysroot configured for `build_dir`.
    ///
    /// `Ok(None)` means the build has no sysroot entry yet. A cache file that
    /// cannot be opened is an error: the build directory was never configured.
    pub fn locate(&self, build_dir: &Path) -> ResolveResult<Option<String>> {
        let path = self.cache_path(build_dir);
        let file = File::open(&path).map_err(|e| ResolveError::cache_open(path.clone(), e))?;

        let value = find_entry(BufReader::new(file), &self.key)
            .map_err(|e| ResolveError::cache_read(path.clone(), e))?;

        match &value {
            Some(sysroot) => debug!("sysroot from {}: {sysroot}", path.display()),
            None => debug!("no '{}' entry in {}", self.key, path.display()),
        }
        Ok(value)
    }
}

/// Scan `reader` for the first `<key>:` line and return what follows its first `=`.
///
/// Lines are compared as bytes, so entries elsewhere in the cache need not be
/// UTF-8. Only the matching line is decoded. A matching line without `=` is
/// reported and treated as unset.
pub fn find_entry<R: BufRead>(mut reader: R, key: &str) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }

        let matches = buf
            .strip_prefix(key.as_bytes())
            .is_some_and(|rest| rest.first() == Some(&b':'));
        if !matches {
            continue;
        }

        let line = String::from_utf8(std::mem::take(&mut buf))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let line = line.trim_end_matches('\n').trim_end_matches('\r');

        return Ok(match line.split_once('=') {
            Some((_, value)) => Some(value.to_string()),
            None => {
                warn!("cache entry '{key}' has no value: {line}");
                None
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    const CACHE: &str = "\
# This is the CMakeCache file.
CMAKE_BUILD_TYPE:STRING=Debug
lf_os_sysroot_extra:STRING=/wrong
lf_os_sysroot:STRING=/opt/sysroot
lf_os_sysroot:STRING=/second
";

    #[test]
    fn extracts_value_after_first_equals() {
        let value = find_entry(Cursor::new("lf_os_sysroot:STRING=/opt/sysroot\n"), "lf_os_sysroot")
            .unwrap();
        assert_eq!(value.as_deref(), Some("/opt/sysroot"));
    }

    #[test]
    fn first_matching_line_wins() {
        let value = find_entry(Cursor::new(CACHE), DEFAULT_SYSROOT_KEY).unwrap();
        assert_eq!(value.as_deref(), Some("/opt/sysroot"));
    }

    #[test]
    fn key_must_be_followed_by_colon() {
        let value = find_entry(Cursor::new("lf_os_sysroot_extra:STRING=/wrong\n"), "lf_os_sysroot")
            .unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn value_keeps_later_equals_signs() {
        let value = find_entry(Cursor::new("lf_os_sysroot:PATH=/opt/a=b\r\n"), "lf_os_sysroot")
            .unwrap();
        assert_eq!(value.as_deref(), Some("/opt/a=b"));
    }

    #[test]
    fn non_utf8_lines_before_the_key_are_skipped() {
        let mut cache = b"CMAKE_C_FLAGS:STRING=-O2 \xff\xfe\n".to_vec();
        cache.extend_from_slice(b"lf_os_sysroot:STRING=/opt/sysroot\n");

        let value = find_entry(Cursor::new(cache), "lf_os_sysroot").unwrap();
        assert_eq!(value.as_deref(), Some("/opt/sysroot"));
    }

    #[test]
    fn non_utf8_matching_line_is_a_read_error() {
        let cache = b"lf_os_sysroot:STRING=/opt/\xff\n".to_vec();
        let err = find_entry(Cursor::new(cache), "lf_os_sysroot").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn missing_key_is_none() {
        let value = find_entry(Cursor::new("CMAKE_BUILD_TYPE:STRING=Debug\n"), "lf_os_sysroot")
            .unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn entry_without_equals_is_none() {
        let value = find_entry(Cursor::new("lf_os_sysroot:STRING\n"), "lf_os_sysroot").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn last_line_without_newline_is_read_whole() {
        let value = find_entry(Cursor::new("lf_os_sysroot:STRING=/opt/sysroot"), "lf_os_sysroot")
            .unwrap();
        assert_eq!(value.as_deref(), Some("/opt/sysroot"));
    }

    #[test]
    fn locate_reads_cache_in_build_dir() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(DEFAULT_CACHE_FILE), CACHE).unwrap();

        let locator = SysrootLocator::default();
        let first = locator.locate(temp_dir.path()).unwrap();
        let second = locator.locate(temp_dir.path()).unwrap();

        assert_eq!(first.as_deref(), Some("/opt/sysroot"));
        assert_eq!(first, second);
    }

    #[test]
    fn locate_without_cache_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = SysrootLocator::default()
            .locate(temp_dir.path())
            .unwrap_err();

        match err {
            ResolveError::CacheOpen { path, source } => {
                assert_eq!(path, temp_dir.path().join(DEFAULT_CACHE_FILE));
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn custom_file_and_key() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("cache.txt"),
            "toolchain_root:PATH=/opt/cross\n",
        )
        .unwrap();

        let locator = SysrootLocator::new("cache.txt", "toolchain_root");
        assert_eq!(
            locator.locate(temp_dir.path()).unwrap().as_deref(),
            Some("/opt/cross")
        );
    }
}
