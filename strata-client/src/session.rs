//! Session persistence: auth key, clock offset and salts for one server.

use std::io;
use std::path::Path;

use strata_mtproto::ServerSalt;

/// Format version written as the first byte.
const VERSION: u8 = 1;

/// Everything needed to resume without a new handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct PersistedSession {
    pub dc_id:       i32,
    pub addr:        String,
    pub auth_key:    [u8; 256],
    pub time_offset: i32,
    pub salts:       Vec<ServerSalt>,
}

impl std::fmt::Debug for PersistedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedSession")
            .field("dc_id", &self.dc_id)
            .field("addr", &self.addr)
            .field("time_offset", &self.time_offset)
            .field("salts", &self.salts.len())
            .finish_non_exhaustive()
    }
}

fn truncated() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "truncated session")
}

impl PersistedSession {
    pub fn to_bytes(&self) -> Vec<u8> {
        let addr = self.addr.as_bytes();
        let mut b = Vec::with_capacity(1 + 4 + 256 + 4 + 2 + addr.len() + 2 + self.salts.len() * 16);
        b.push(VERSION);
        b.extend_from_slice(&self.dc_id.to_le_bytes());
        b.extend_from_slice(&self.auth_key);
        b.extend_from_slice(&self.time_offset.to_le_bytes());
        // Lengths past u16::MAX are cut; no real address or salt list gets there.
        let addr = &addr[..addr.len().min(u16::MAX as usize)];
        b.extend_from_slice(&(addr.len() as u16).to_le_bytes());
        b.extend_from_slice(addr);
        let salts = &self.salts[..self.salts.len().min(u16::MAX as usize)];
        b.extend_from_slice(&(salts.len() as u16).to_le_bytes());
        for s in salts {
            b.extend_from_slice(&s.salt.to_le_bytes());
            b.extend_from_slice(&s.valid_since.to_le_bytes());
            b.extend_from_slice(&s.valid_until.to_le_bytes());
        }
        b
    }

    pub fn from_bytes(buf: &[u8]) -> io::Result<Self> {
        let mut p = 0usize;
        macro_rules! r {
            ($n:expr) => {{
                let end = p + $n;
                let s = buf.get(p..end).ok_or_else(truncated)?;
                p = end;
                s
            }};
        }
        macro_rules! le {
            ($t:ty) => {
                <$t>::from_le_bytes(r!(std::mem::size_of::<$t>()).try_into().map_err(|_| truncated())?)
            };
        }

        let version = r!(1)[0];
        if version != VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported session version {version}"),
            ));
        }
        let dc_id = le!(i32);
        let mut auth_key = [0u8; 256];
        auth_key.copy_from_slice(r!(256));
        let time_offset = le!(i32);
        let addr_len = le!(u16) as usize;
        let addr = String::from_utf8(r!(addr_len).to_vec())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let salt_count = le!(u16) as usize;
        let mut salts = Vec::with_capacity(salt_count);
        for _ in 0..salt_count {
            let salt = le!(i64);
            let valid_since = le!(i32);
            let valid_until = le!(i32);
            salts.push(ServerSalt { salt, valid_since, valid_until });
        }
        if p != buf.len() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "trailing bytes in session"));
        }
        Ok(Self { dc_id, addr, auth_key, time_offset, salts })
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.to_bytes())
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        Self::from_bytes(&std::fs::read(path)?)
    }
}
