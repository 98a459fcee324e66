//! Out-of-process terrain over a stream socket
//!
//! Request: seven little-endian `i32`s `[version, width, height, depth, x, z, seed]`.
//! Response: `width * height * depth` little-endian `i32` block codes, ordered
//! x-major then y then z. The server keeps the connection open between
//! requests, so idle connections are pooled and reused.

use std::io::{Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;
#[cfg(unix)]
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use parking_lot::Mutex;

use super::{GenerationError, GenerationResult, TerrainGenerator};
use crate::constants::core::{BLOCKS_PER_CHUNK, CHUNK_DEPTH, CHUNK_HEIGHT, CHUNK_WIDTH};
use crate::constants::loader::GENERATOR_PROTOCOL_VERSION;
use crate::world::core::{BlockType, ChunkId};
use crate::world::storage::Terrain;

const IO_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_WORDS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorAddress {
    Tcp(String),
    #[cfg(unix)]
    Unix(PathBuf),
}

impl FromStr for GeneratorAddress {
    type Err = GenerationError;

    /// `unix:/path`, `tcp:host:port` or bare `host:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix("unix:") {
            #[cfg(unix)]
            return Ok(GeneratorAddress::Unix(PathBuf::from(path)));
            #[cfg(not(unix))]
            return Err(GenerationError::Unsupported(format!(
                "unix sockets are not available here: {}",
                path
            )));
        }

        let host_port = s.strip_prefix("tcp:").unwrap_or(s);
        let valid = host_port
            .rsplit_once(':')
            .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
            .unwrap_or(false);
        if valid {
            Ok(GeneratorAddress::Tcp(host_port.to_string()))
        } else {
            Err(GenerationError::Unsupported(format!(
                "unrecognised generator address '{}'",
                s
            )))
        }
    }
}

impl std::fmt::Display for GeneratorAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneratorAddress::Tcp(addr) => write!(f, "tcp:{}", addr),
            #[cfg(unix)]
            GeneratorAddress::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Connection {
    fn open(address: &GeneratorAddress) -> std::io::Result<Self> {
        match address {
            GeneratorAddress::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str())?;
                stream.set_nodelay(true)?;
                stream.set_read_timeout(Some(IO_TIMEOUT))?;
                stream.set_write_timeout(Some(IO_TIMEOUT))?;
                Ok(Connection::Tcp(stream))
            }
            #[cfg(unix)]
            GeneratorAddress::Unix(path) => {
                let stream = UnixStream::connect(path)?;
                stream.set_read_timeout(Some(IO_TIMEOUT))?;
                stream.set_write_timeout(Some(IO_TIMEOUT))?;
                Ok(Connection::Unix(stream))
            }
        }
    }

    fn request(&mut self, request: &[u8], response: &mut [u8]) -> std::io::Result<()> {
        match self {
            Connection::Tcp(stream) => exchange(stream, request, response),
            #[cfg(unix)]
            Connection::Unix(stream) => exchange(stream, request, response),
        }
    }
}

fn exchange<S: Read + Write>(stream: &mut S, request: &[u8], response: &mut [u8]) -> std::io::Result<()> {
    stream.write_all(request)?;
    stream.flush()?;
    stream.read_exact(response)
}

/// Client for a terrain server such as the bundled Python generator
pub struct SocketGenerator {
    address: GeneratorAddress,
    idle: Mutex<Vec<Connection>>,
}

impl SocketGenerator {
    pub fn new(address: GeneratorAddress) -> Self {
        Self {
            address,
            idle: Mutex::new(Vec::new()),
        }
    }

    pub fn address(&self) -> &GeneratorAddress {
        &self.address
    }

    pub fn idle_connections(&self) -> usize {
        self.idle.lock().len()
    }

    fn encode_request(chunk: ChunkId, seed: i32) -> [u8; REQUEST_WORDS * 4] {
        let words: [i32; REQUEST_WORDS] = [
            GENERATOR_PROTOCOL_VERSION,
            CHUNK_WIDTH as i32,
            CHUNK_HEIGHT as i32,
            CHUNK_DEPTH as i32,
            chunk.x(),
            chunk.z(),
            seed,
        ];
        let mut bytes = [0u8; REQUEST_WORDS * 4];
        for (dst, word) in bytes.chunks_exact_mut(4).zip(words) {
            dst.copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    fn decode_response(response: &[u8], terrain: &mut Terrain) -> GenerationResult<()> {
        for (index, word) in response.chunks_exact(4).enumerate() {
            let code = i32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            let block_type = BlockType::from_code(code)
                .ok_or(GenerationError::UnknownBlockCode { code, index })?;
            if block_type == BlockType::Air {
                continue;
            }

            let z = index % CHUNK_DEPTH;
            let y = (index / CHUNK_DEPTH) % CHUNK_HEIGHT;
            let x = index / (CHUNK_DEPTH * CHUNK_HEIGHT);
            terrain.set_block_type([x, y, z], block_type);
        }
        Ok(())
    }
}

impl TerrainGenerator for SocketGenerator {
    fn generate(&self, chunk: ChunkId, seed: i32, terrain: &mut Terrain) -> GenerationResult<()> {
        let pooled = self.idle.lock().pop();
        let mut connection = match pooled {
            Some(connection) => connection,
            None => {
                log::debug!("[SocketGenerator::generate] Connecting to {}", self.address);
                Connection::open(&self.address)?
            }
        };

        let request = Self::encode_request(chunk, seed);
        let mut response = vec![0u8; BLOCKS_PER_CHUNK * 4];
        // A failed connection is dropped rather than returned to the pool
        connection.request(&request, &mut response)?;
        self.idle.lock().push(connection);

        Self::decode_response(&response, terrain)
    }

    fn name(&self) -> &str {
        "socket"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// Serves `requests` chunks on one connection, answering with `code` on layer y == 1
    fn serve(code: i32, requests: usize) -> (String, thread::JoinHandle<Vec<[i32; 7]>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut seen = Vec::new();
            for _ in 0..requests {
                let mut request = [0u8; 28];
                stream.read_exact(&mut request).unwrap();
                let mut words = [0i32; 7];
                for (w, b) in words.iter_mut().zip(request.chunks_exact(4)) {
                    *w = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                }
                seen.push(words);

                let mut response = Vec::with_capacity(BLOCKS_PER_CHUNK * 4);
                for i in 0..BLOCKS_PER_CHUNK {
                    let y = (i / CHUNK_DEPTH) % CHUNK_HEIGHT;
                    let value = if y == 1 { code } else { 0 };
                    response.extend_from_slice(&value.to_le_bytes());
                }
                stream.write_all(&response).unwrap();
            }
            seen
        });
        (addr, handle)
    }

    #[test]
    fn test_address_parsing() {
        assert_eq!(
            "tcp:localhost:17771".parse::<GeneratorAddress>().unwrap(),
            GeneratorAddress::Tcp("localhost:17771".into())
        );
        assert_eq!(
            "127.0.0.1:9".parse::<GeneratorAddress>().unwrap(),
            GeneratorAddress::Tcp("127.0.0.1:9".into())
        );
        #[cfg(unix)]
        assert_eq!(
            "unix:/tmp/gen.sock".parse::<GeneratorAddress>().unwrap(),
            GeneratorAddress::Unix(PathBuf::from("/tmp/gen.sock"))
        );
        assert!("localhost".parse::<GeneratorAddress>().is_err());
        assert!("tcp::80".parse::<GeneratorAddress>().is_err());
    }

    #[test]
    fn test_generates_over_reused_connection() {
        let (addr, server) = serve(BlockType::Stone.code(), 2);
        let generator = SocketGenerator::new(GeneratorAddress::Tcp(addr));

        let mut terrain = Terrain::new();
        generator.generate(ChunkId::new(3, -2), 42, &mut terrain).unwrap();
        assert_eq!(terrain.block([4, 1, 7]).block_type, BlockType::Stone);
        assert_eq!(terrain.block([4, 2, 7]).block_type, BlockType::Air);
        assert_eq!(generator.idle_connections(), 1);

        terrain.reset();
        generator.generate(ChunkId::new(4, -2), 42, &mut terrain).unwrap();
        assert_eq!(generator.idle_connections(), 1);

        let seen = server.join().unwrap();
        assert_eq!(
            seen[0],
            [
                GENERATOR_PROTOCOL_VERSION,
                CHUNK_WIDTH as i32,
                CHUNK_HEIGHT as i32,
                CHUNK_DEPTH as i32,
                3,
                -2,
                42
            ]
        );
        assert_eq!(seen[1][4], 4);
    }

    #[test]
    fn test_unknown_code_is_an_error() {
        let (addr, server) = serve(99, 1);
        let generator = SocketGenerator::new(GeneratorAddress::Tcp(addr));

        let mut terrain = Terrain::new();
        let err = generator
            .generate(ChunkId::new(0, 0), 1, &mut terrain)
            .unwrap_err();
        assert!(matches!(err, GenerationError::UnknownBlockCode { code: 99, .. }));
        server.join().unwrap();
    }

    #[test]
    fn test_refused_connection_is_io_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let generator = SocketGenerator::new(GeneratorAddress::Tcp(addr));

        let mut terrain = Terrain::new();
        let err = generator
            .generate(ChunkId::new(0, 0), 1, &mut terrain)
            .unwrap_err();
        assert!(matches!(err, GenerationError::Io(_)));
        assert_eq!(generator.idle_connections(), 0);
    }
}
