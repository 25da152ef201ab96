use super::codec;
use super::value::SessionValue;
use super::CodecError;
use crate::error::{Error, Result};
use crate::ids::SessionId;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the cookie carrying the session identifier.
pub const SESSION_COOKIE: &str = "fastweb_sessid";

/// File name prefix of stored sessions.
pub const SESSION_FILE_PREFIX: &str = "sess_";

/// Durable storage for encoded sessions.
pub trait SessionBackend: Send + Sync {
    /// The stored bytes, or `None` if nothing is stored under `id`.
    fn load(&self, id: &SessionId) -> io::Result<Option<Vec<u8>>>;

    fn save(&self, id: &SessionId, encoded: &[u8]) -> io::Result<()>;

    fn exists(&self, id: &SessionId) -> io::Result<bool> {
        Ok(self.load(id)?.is_some())
    }
}

/// Stores each session as `<dir>/sess_<id>`, readable only by the owner.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{SESSION_FILE_PREFIX}{id}"))
    }
}

impl SessionBackend for FileBackend {
    fn load(&self, id: &SessionId) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, id: &SessionId, encoded: &[u8]) -> io::Result<()> {
        let path = self.path_for(id);
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(encoded)?;
        file.flush()
    }

    fn exists(&self, id: &SessionId) -> io::Result<bool> {
        self.path_for(id).try_exists()
    }
}

/// Keeps encoded sessions in memory; for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<SessionId, Vec<u8>>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes directly, bypassing the codec.
    pub fn insert_raw(&self, id: SessionId, bytes: Vec<u8>) {
        self.entries.lock().insert(id, bytes);
    }
}

impl SessionBackend for MemoryBackend {
    fn load(&self, id: &SessionId) -> io::Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(id).cloned())
    }

    fn save(&self, id: &SessionId, encoded: &[u8]) -> io::Result<()> {
        self.entries.lock().insert(id.clone(), encoded.to_vec());
        Ok(())
    }
}

impl<B: SessionBackend + ?Sized> SessionBackend for Arc<B> {
    fn load(&self, id: &SessionId) -> io::Result<Option<Vec<u8>>> {
        (**self).load(id)
    }

    fn save(&self, id: &SessionId, encoded: &[u8]) -> io::Result<()> {
        (**self).save(id, encoded)
    }

    fn exists(&self, id: &SessionId) -> io::Result<bool> {
        (**self).exists(id)
    }
}

/// One visitor's state: a key-ordered map of [`SessionValue`]s.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    data: Mutex<BTreeMap<String, SessionValue>>,
}

impl Session {
    fn with_data(id: SessionId, data: BTreeMap<String, SessionValue>) -> Self {
        Self {
            id,
            data: Mutex::new(data),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<SessionValue>) {
        self.data.lock().insert(key.into(), value.into());
    }

    /// Store a value that may fall outside the session universe.
    pub fn try_set<V>(
        &self,
        key: impl Into<String>,
        value: V,
    ) -> std::result::Result<(), CodecError>
    where
        V: TryInto<SessionValue, Error = CodecError>,
    {
        let value = value.try_into()?;
        self.data.lock().insert(key.into(), value);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<SessionValue> {
        self.data.lock().get(key).cloned()
    }

    /// The value under `key` if it exists and has the shape of `T`.
    #[must_use]
    pub fn get_as<T: TryFrom<SessionValue>>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| T::try_from(v).ok())
    }

    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.data.lock().get(key).and_then(SessionValue::as_int)
    }

    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.data
            .lock()
            .get(key)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    pub fn remove(&self, key: &str) -> Option<SessionValue> {
        self.data.lock().remove(key)
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.lock().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    /// Copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, SessionValue> {
        self.data.lock().clone()
    }
}

/// Result of [`SessionStore::open`].
#[derive(Debug)]
pub struct OpenedSession {
    pub session: Arc<Session>,
    /// True when a fresh identifier was minted; the caller must set the cookie.
    pub created: bool,
}

/// Process-wide table of live sessions over a [`SessionBackend`].
///
/// Loaded and minted sessions stay cached for the lifetime of the store, so
/// every request naming the same identifier shares one [`Session`].
pub struct SessionStore {
    backend: Box<dyn SessionBackend>,
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.lock().len())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(backend: impl SessionBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Store backed by `sess_<id>` files in `dir`.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(FileBackend::new(dir))
    }

    /// Resolve the session named by a cookie value, minting one if needed.
    ///
    /// A cookie without the identifier shape, an identifier with nothing
    /// stored, and a stored session that cannot be decoded all yield a fresh
    /// session. Lookup, load and insert happen under one lock.
    pub fn open(&self, cookie: Option<&str>) -> Result<OpenedSession> {
        let mut sessions = self.sessions.lock();

        match cookie.map(|raw| (raw, SessionId::parse(raw))) {
            Some((_, Some(id))) => {
                if let Some(session) = sessions.get(&id) {
                    return Ok(OpenedSession {
                        session: Arc::clone(session),
                        created: false,
                    });
                }
                match self.load(&id) {
                    Ok(Some(data)) => {
                        debug!(session_id = %id, keys = data.len(), "Session loaded");
                        let session = Arc::new(Session::with_data(id.clone(), data));
                        sessions.insert(id, Arc::clone(&session));
                        return Ok(OpenedSession {
                            session,
                            created: false,
                        });
                    }
                    Ok(None) => debug!(session_id = %id, "No stored session"),
                    Err(err) => {
                        warn!(
                            session_id = %id,
                            error = %err,
                            "Stored session unreadable, starting a new one"
                        );
                    }
                }
            }
            Some((raw, None)) => {
                debug!(cookie_len = raw.len(), "Ignoring malformed session cookie");
            }
            None => {}
        }

        let id = loop {
            let candidate = SessionId::generate();
            if !sessions.contains_key(&candidate) && !self.backend.exists(&candidate)? {
                break candidate;
            }
        };
        let session = Arc::new(Session::with_data(id.clone(), BTreeMap::new()));
        sessions.insert(id, Arc::clone(&session));
        info!(session_id = %session.id(), "Session created");
        Ok(OpenedSession {
            session,
            created: true,
        })
    }

    /// Read and decode a stored session without caching it.
    pub fn load(&self, id: &SessionId) -> Result<Option<BTreeMap<String, SessionValue>>> {
        let Some(bytes) = self.backend.load(id)? else {
            return Ok(None);
        };
        let data = match codec::from_slice(&bytes)? {
            SessionValue::StrAnyMap(map) => map,
            SessionValue::StrIntMap(map) => map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            SessionValue::StrStrMap(map) => map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            other => {
                return Err(Error::Codec(CodecError::Format {
                    offset: 0,
                    message: format!(
                        "session must be a string-keyed mapping, found {}",
                        other.shape()
                    ),
                }))
            }
        };
        Ok(Some(data))
    }

    /// Encode the session and write it to the backend.
    pub fn save(&self, session: &Session) -> Result<()> {
        let encoded = codec::to_vec(&SessionValue::StrAnyMap(session.snapshot()))?;
        self.backend.save(session.id(), &encoded)?;
        debug!(session_id = %session.id(), bytes = encoded.len(), "Session saved");
        Ok(())
    }

    /// Number of cached sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
