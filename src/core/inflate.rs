//! Gzip decompression service on a dedicated thread.
//!
//! Stateless byte transform: a request moves its buffer into the service,
//! the response moves the inflated buffer back out. Requests and responses
//! pair up by correlation id; a response with a foreign correlation id is
//! discarded silently.

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use flate2::read::GzDecoder;
use log::trace;
use std::io::Read;
use std::thread::{self, JoinHandle};
use uuid::Uuid;

use crate::error::{VectaError, VectaResult};

/// Gzip member magic prefix: `1f 8b` plus the deflate method byte.
pub const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Sniff for the gzip magic prefix.
pub fn looks_gzipped(data: &[u8]) -> bool {
    data.starts_with(&GZIP_MAGIC)
}

struct InflateRequest {
    correlation: Uuid,
    buffer: Vec<u8>,
    reply: Sender<InflateResponse>,
}

struct InflateResponse {
    correlation: Uuid,
    buffer: VectaResult<Vec<u8>>,
}

/// Owns the decompression thread. Hand out [`InflateClient`]s to callers;
/// the thread exits once the service and every client are gone.
pub struct InflateService {
    sender: Sender<InflateRequest>,
    _worker: JoinHandle<()>,
}

impl InflateService {
    pub fn spawn() -> Self {
        let (sender, receiver): (Sender<InflateRequest>, Receiver<InflateRequest>) = unbounded();
        let worker = thread::Builder::new()
            .name("vecta-inflate".into())
            .spawn(move || {
                trace!("inflate service started");
                while let Ok(request) = receiver.recv() {
                    let buffer = gunzip(&request.buffer);
                    let _ = request.reply.send(InflateResponse {
                        correlation: request.correlation,
                        buffer,
                    });
                }
                trace!("inflate service stopped");
            })
            .expect("failed to spawn inflate thread");
        Self {
            sender,
            _worker: worker,
        }
    }

    pub fn client(&self) -> InflateClient {
        InflateClient {
            sender: self.sender.clone(),
        }
    }
}

/// Cheap handle for submitting decompression requests.
#[derive(Clone)]
pub struct InflateClient {
    sender: Sender<InflateRequest>,
}

impl InflateClient {
    /// Inflate a gzip buffer, blocking until the correlation-matching
    /// response arrives. Buffer ownership moves both ways.
    pub fn inflate(&self, buffer: Vec<u8>) -> VectaResult<Vec<u8>> {
        let correlation = Uuid::new_v4();
        let (reply, response) = bounded(1);
        self.sender
            .send(InflateRequest {
                correlation,
                buffer,
                reply,
            })
            .map_err(|_| VectaError::decompress("decompression service is gone"))?;

        for received in response.iter() {
            if received.correlation != correlation {
                continue;
            }
            return received.buffer;
        }
        Err(VectaError::decompress(
            "decompression service dropped the request",
        ))
    }
}

fn gunzip(data: &[u8]) -> VectaResult<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| VectaError::decompress(format!("gzip decode failed: {e}")))?;
    Ok(out)
}
