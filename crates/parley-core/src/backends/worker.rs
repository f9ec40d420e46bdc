//! Bridge to the out-of-process generation worker.
//!
//! The worker hosts the pretrained model weights and exposes their `generate`
//! procedure over a Unix socket. Every message in either direction is a
//! 4-byte big-endian length followed by a JSON body.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{GenerationParams, SequenceGenerator};
use crate::config::WorkerConfig;
use crate::error::{Error, Result};

/// Largest frame accepted from the worker.
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_ids: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pad_token_id: Option<u32>,
}

impl WorkerRequest {
    fn command(command: &str) -> Self {
        Self {
            command: command.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WorkerResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_ids: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Client for the generation worker, optionally owning its process.
pub struct WorkerBridge {
    socket_path: PathBuf,
    command: Option<Vec<String>>,
    startup_timeout: Duration,
    read_timeout: Duration,
    worker_process: Mutex<Option<Child>>,
}

impl WorkerBridge {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            socket_path: config.socket_path.clone(),
            command: config.command.clone(),
            startup_timeout: Duration::from_secs(config.startup_timeout_secs),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
            worker_process: Mutex::new(None),
        }
    }

    fn is_running(&self) -> bool {
        self.socket_path.exists() && self.check().is_ok()
    }

    /// Make sure a worker answers on the socket, launching the configured
    /// command when nothing is listening yet.
    pub fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            debug!("Generation worker already running");
            return Ok(());
        }

        let Some(command) = self.command.as_ref().filter(|c| !c.is_empty()) else {
            return Err(Error::Generation(format!(
                "No generation worker listening on {:?} and no worker command configured",
                self.socket_path
            )));
        };

        if self.socket_path.exists() {
            debug!("Removing stale worker socket {:?}", self.socket_path);
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!("Could not remove stale worker socket: {}", e);
            }
        }

        info!("Starting generation worker: {}", command.join(" "));

        let child = Command::new(&command[0])
            .args(&command[1..])
            .arg("--socket")
            .arg(&self.socket_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::Generation(format!("Failed to start worker: {e}")))?;

        *self.lock_process()? = Some(child);

        let started = Instant::now();
        while started.elapsed() < self.startup_timeout {
            std::thread::sleep(Duration::from_millis(100));
            if self.socket_path.exists() {
                if let Ok(device) = self.check() {
                    info!("Generation worker ready on device: {}", device);
                    return Ok(());
                }
            }
        }

        Err(Error::Generation(format!(
            "Generation worker failed to start within {}s",
            self.startup_timeout.as_secs()
        )))
    }

    /// Whether this bridge spawned a worker process that is still owned.
    pub fn launched(&self) -> Result<bool> {
        Ok(self.lock_process()?.is_some())
    }

    /// Ask the worker to exit, reap it if this bridge launched it and remove
    /// the socket file.
    pub fn stop(&self) -> Result<()> {
        if self.socket_path.exists() {
            if let Err(e) = self.call(&WorkerRequest::command("shutdown")) {
                debug!("Worker shutdown request failed: {}", e);
            }
        }

        if let Some(mut child) = self.lock_process()?.take() {
            let _ = child.kill();
            let _ = child.wait();
        }

        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        Ok(())
    }

    /// Liveness check; returns the device the worker runs on.
    pub fn check(&self) -> Result<String> {
        let response = self.call(&WorkerRequest::command("check"))?;
        match response.status.as_deref() {
            Some("ok") => Ok(response.device.unwrap_or_else(|| "unknown".to_string())),
            _ => Err(Error::Generation(
                response
                    .error
                    .unwrap_or_else(|| "Worker did not report ready".to_string()),
            )),
        }
    }

    /// Load a model into the worker so the first request does not pay for it.
    pub fn preload(&self, model: &str) -> Result<()> {
        let request = WorkerRequest {
            model: Some(model.to_string()),
            ..WorkerRequest::command("preload")
        };
        let response = self.call(&request)?;
        if let Some(err) = response.error {
            return Err(Error::Generation(format!(
                "Failed to preload {model}: {err}"
            )));
        }
        info!("Worker preloaded {}", model);
        Ok(())
    }

    pub fn generate(
        &self,
        model: &str,
        input_ids: &[u32],
        params: &GenerationParams,
    ) -> Result<Vec<u32>> {
        let request = WorkerRequest {
            model: Some(model.to_string()),
            input_ids: Some(input_ids.to_vec()),
            max_length: Some(params.max_length),
            pad_token_id: Some(params.pad_token_id),
            ..WorkerRequest::command("generate")
        };

        let response = self.call(&request)?;
        if let Some(err) = response.error {
            return Err(Error::Generation(format!("Worker error: {err}")));
        }

        response
            .output_ids
            .ok_or_else(|| Error::Generation("Worker response carried no output ids".to_string()))
    }

    fn connect(&self) -> Result<UnixStream> {
        let stream = UnixStream::connect(&self.socket_path).map_err(|e| {
            Error::Generation(format!("Failed to connect to worker: {e}"))
        })?;

        if let Err(e) = stream.set_read_timeout(Some(self.read_timeout)) {
            warn!("Could not set worker read timeout: {}", e);
        }
        stream.set_write_timeout(Some(Duration::from_secs(30))).ok();

        Ok(stream)
    }

    fn call(&self, request: &WorkerRequest) -> Result<WorkerResponse> {
        let mut stream = self.connect()?;
        write_frame(&mut stream, request)?;
        read_frame(&mut stream)
    }

    fn lock_process(&self) -> Result<std::sync::MutexGuard<'_, Option<Child>>> {
        self.worker_process
            .lock()
            .map_err(|_| Error::Generation("Worker process lock poisoned".to_string()))
    }
}

/// One model hosted by the worker.
pub struct WorkerModel {
    bridge: Arc<WorkerBridge>,
    model: String,
}

impl WorkerModel {
    pub fn new(bridge: Arc<WorkerBridge>, model: impl Into<String>) -> Self {
        Self {
            bridge,
            model: model.into(),
        }
    }
}

impl SequenceGenerator for WorkerModel {
    fn generate(&self, input_ids: &[u32], params: &GenerationParams) -> Result<Vec<u32>> {
        debug!(
            "Generating with {} from {} prompt tokens",
            self.model,
            input_ids.len()
        );
        self.bridge.generate(&self.model, input_ids, params)
    }
}

fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let body = serde_json::to_vec(message)?;
    let length = u32::try_from(body.len())
        .map_err(|_| Error::Generation("Worker request too large".to_string()))?;

    let to_error = |e: std::io::Error| Error::Generation(format!("Failed to write to worker: {e}"));
    writer.write_all(&length.to_be_bytes()).map_err(to_error)?;
    writer.write_all(&body).map_err(to_error)?;
    writer.flush().map_err(to_error)
}

fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let mut length_buf = [0u8; 4];
    reader
        .read_exact(&mut length_buf)
        .map_err(|e| Error::Generation(format!("Failed to read worker frame length: {e}")))?;

    let length = u32::from_be_bytes(length_buf) as usize;
    if length > MAX_FRAME_BYTES {
        return Err(Error::Generation(format!(
            "Worker frame of {length} bytes exceeds limit"
        )));
    }

    let mut body = vec![0u8; length];
    reader
        .read_exact(&mut body)
        .map_err(|e| Error::Generation(format!("Failed to read worker frame body: {e}")))?;

    serde_json::from_slice(&body).map_err(|e| {
        Error::Generation(format!(
            "Failed to parse worker response: {} - {}",
            e,
            String::from_utf8_lossy(&body)
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use std::thread::JoinHandle;

    /// Answers `connections` requests the way a worker would: causal
    /// generation appends two tokens to the prompt.
    fn fake_worker(listener: UnixListener, connections: usize) -> JoinHandle<Vec<WorkerRequest>> {
        std::thread::spawn(move || {
            let mut seen = Vec::new();
            for stream in listener.incoming().take(connections) {
                let mut stream = stream.unwrap();
                let request: WorkerRequest = read_frame(&mut stream).unwrap();
                let response = match request.command.as_str() {
                    "check" => WorkerResponse {
                        status: Some("ok".to_string()),
                        device: Some("cpu".to_string()),
                        ..Default::default()
                    },
                    "generate" if request.model.as_deref() == Some("broken") => WorkerResponse {
                        error: Some("CUDA out of memory".to_string()),
                        ..Default::default()
                    },
                    "generate" => {
                        let mut ids = request.input_ids.clone().unwrap_or_default();
                        ids.extend([7, 8]);
                        WorkerResponse {
                            output_ids: Some(ids),
                            ..Default::default()
                        }
                    }
                    _ => WorkerResponse::default(),
                };
                write_frame(&mut stream, &response).unwrap();
                seen.push(request);
            }
            seen
        })
    }

    fn bridge_for(socket_path: PathBuf) -> WorkerBridge {
        WorkerBridge::new(&WorkerConfig {
            socket_path,
            command: None,
            startup_timeout_secs: 1,
            read_timeout_secs: 5,
        })
    }

    #[test]
    fn generate_round_trips_through_the_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("worker.sock");
        let handle = fake_worker(UnixListener::bind(&socket).unwrap(), 2);

        let bridge = Arc::new(bridge_for(socket));
        assert_eq!(bridge.check().unwrap(), "cpu");

        let model = WorkerModel::new(bridge, "af1tang/personaGPT");
        let params = GenerationParams {
            max_length: 1000,
            pad_token_id: 50256,
        };
        let output = model.generate(&[1, 2, 3], &params).unwrap();
        assert_eq!(output, [1, 2, 3, 7, 8]);

        let seen = handle.join().unwrap();
        assert_eq!(seen[1].command, "generate");
        assert_eq!(seen[1].max_length, Some(1000));
        assert_eq!(seen[1].pad_token_id, Some(50256));
    }

    #[test]
    fn worker_errors_become_generation_errors() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("worker.sock");
        let handle = fake_worker(UnixListener::bind(&socket).unwrap(), 1);

        let bridge = bridge_for(socket);
        let params = GenerationParams {
            max_length: 10,
            pad_token_id: 2,
        };
        let err = bridge.generate("broken", &[1], &params).unwrap_err();
        assert!(matches!(err, Error::Generation(ref msg) if msg.contains("out of memory")));
        handle.join().unwrap();
    }

    #[test]
    fn missing_worker_without_command_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge_for(dir.path().join("nobody.sock"));
        assert!(matches!(bridge.ensure_running(), Err(Error::Generation(_))));
    }

    #[test]
    fn oversized_frames_are_rejected() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(u32::MAX).to_be_bytes());
        let result: Result<WorkerResponse> = read_frame(&mut raw.as_slice());
        assert!(matches!(result, Err(Error::Generation(_))));
    }

    #[test]
    fn stop_removes_the_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("worker.sock");
        let handle = fake_worker(UnixListener::bind(&socket).unwrap(), 1);

        let bridge = bridge_for(socket.clone());
        bridge.stop().unwrap();

        let seen = handle.join().unwrap();
        assert_eq!(seen[0].command, "shutdown");
        assert!(!socket.exists());
        assert!(!bridge.launched().unwrap());
    }
}
