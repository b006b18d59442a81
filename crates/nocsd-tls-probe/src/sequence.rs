//! The load loop, independent of how a library is actually opened.

use std::ffi::{CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

/// Suffixes of the dummy libraries, in load order.
pub const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SequenceError {
    #[error("couldn't load ANY library at all: {0}")]
    NothingLoaded(String),

    #[error("symbol {symbol} not found: {reason}")]
    SymbolMissing { symbol: String, reason: String },

    #[error("function {0} did not give expected result")]
    UnexpectedValue(String),
}

/// What happened when one dummy library was tried.
#[derive(Debug, PartialEq, Eq)]
pub enum Attempt {
    /// Loaded and its accessor returned a pointer to zero.
    Loaded,
    /// The library could not be opened.
    Unavailable(String),
}

pub trait Loader {
    fn attempt(&mut self, suffix: u8) -> Result<Attempt, SequenceError>;
}

/// Loads libraries for `suffixes` in order. Returns how many loaded before
/// the first one that could not be opened.
pub fn load_sequence<L: Loader>(suffixes: &[u8], loader: &mut L) -> Result<usize, SequenceError> {
    let mut loaded = 0;
    for &suffix in suffixes {
        match loader.attempt(suffix)? {
            Attempt::Loaded => loaded += 1,
            Attempt::Unavailable(reason) if loaded == 0 => {
                return Err(SequenceError::NothingLoaded(reason));
            }
            Attempt::Unavailable(reason) => {
                debug!(suffix = %char::from(suffix), %reason, "library limit reached");
                break;
            }
        }
    }
    Ok(loaded)
}

/// Opens `<dir>/libdummy-<c>.so.0` and calls `testlib_dummy_get_<c>`.
///
/// Handles are kept open for the life of the process.
pub struct DlopenLoader {
    dir: PathBuf,
}

impl DlopenLoader {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn library_path(&self, suffix: u8) -> PathBuf {
        self.dir
            .join(format!("libdummy-{}.so.0", char::from(suffix)))
    }
}

fn symbol_name(suffix: u8) -> String {
    format!("testlib_dummy_get_{}", char::from(suffix))
}

fn last_dl_error() -> String {
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        return "unknown error".to_string();
    }
    unsafe { CStr::from_ptr(message) }
        .to_string_lossy()
        .into_owned()
}

impl Loader for DlopenLoader {
    fn attempt(&mut self, suffix: u8) -> Result<Attempt, SequenceError> {
        let path = self.library_path(suffix);
        let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
            return Ok(Attempt::Unavailable(format!("bad path {}", path.display())));
        };
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_GLOBAL) };
        if handle.is_null() {
            return Ok(Attempt::Unavailable(last_dl_error()));
        }

        let symbol = symbol_name(suffix);
        let reason_missing = |reason| SequenceError::SymbolMissing {
            symbol: symbol.clone(),
            reason,
        };
        let c_symbol = CString::new(symbol.as_str()).map_err(|e| reason_missing(e.to_string()))?;
        let f = unsafe { libc::dlsym(handle, c_symbol.as_ptr()) };
        if f.is_null() {
            return Err(reason_missing(last_dl_error()));
        }

        let get: unsafe extern "C" fn() -> *const libc::c_int = unsafe { std::mem::transmute(f) };
        let value = unsafe { get() };
        if value.is_null() || unsafe { *value } != 0 {
            return Err(SequenceError::UnexpectedValue(symbol));
        }
        Ok(Attempt::Loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Loads everything before `limit`, then reports unavailable.
    struct Scripted {
        limit: usize,
        tried: Vec<u8>,
        fail_at: Option<(usize, SequenceError)>,
    }

    impl Scripted {
        fn new(limit: usize) -> Self {
            Self {
                limit,
                tried: Vec::new(),
                fail_at: None,
            }
        }
    }

    impl Loader for Scripted {
        fn attempt(&mut self, suffix: u8) -> Result<Attempt, SequenceError> {
            let index = self.tried.len();
            self.tried.push(suffix);
            if let Some((at, _)) = &self.fail_at {
                if *at == index {
                    return Err(self.fail_at.take().map(|(_, e)| e).unwrap());
                }
            }
            if index < self.limit {
                Ok(Attempt::Loaded)
            } else {
                Ok(Attempt::Unavailable("cannot allocate memory in static TLS block".into()))
            }
        }
    }

    #[test]
    fn test_all_libraries_load() {
        let mut loader = Scripted::new(usize::MAX);
        assert_eq!(load_sequence(ALPHABET, &mut loader), Ok(62));
        assert_eq!(loader.tried, ALPHABET.to_vec());
    }

    #[test]
    fn test_stops_at_first_unavailable() {
        let mut loader = Scripted::new(14);
        assert_eq!(load_sequence(ALPHABET, &mut loader), Ok(14));
        assert_eq!(loader.tried.len(), 15);
        assert_eq!(loader.tried.last(), Some(&b'O'));
    }

    #[test]
    fn test_nothing_loaded_is_an_error() {
        let mut loader = Scripted::new(0);
        let err = load_sequence(ALPHABET, &mut loader).unwrap_err();
        assert!(matches!(err, SequenceError::NothingLoaded(_)));
        assert!(err.to_string().starts_with("couldn't load ANY library at all: "));
    }

    #[test]
    fn test_symbol_failure_aborts() {
        let mut loader = Scripted::new(usize::MAX);
        loader.fail_at = Some((3, SequenceError::UnexpectedValue(symbol_name(b'D'))));
        let err = load_sequence(ALPHABET, &mut loader).unwrap_err();
        assert_eq!(
            err.to_string(),
            "function testlib_dummy_get_D did not give expected result"
        );
        assert_eq!(loader.tried.len(), 4);
    }

    #[test]
    fn test_limit_shortens_sequence() {
        let mut loader = Scripted::new(usize::MAX);
        assert_eq!(load_sequence(&ALPHABET[..5], &mut loader), Ok(5));
    }

    #[test]
    fn test_missing_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = DlopenLoader::new(dir.path().to_path_buf());
        assert_eq!(loader.library_path(b'z'), dir.path().join("libdummy-z.so.0"));
        assert!(matches!(loader.attempt(b'z'), Ok(Attempt::Unavailable(_))));
        let err = load_sequence(b"A", &mut loader).unwrap_err();
        assert!(matches!(err, SequenceError::NothingLoaded(_)));
    }
}
