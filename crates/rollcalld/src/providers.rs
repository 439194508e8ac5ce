//! External provider processes.
//!
//! The neural models never run inside this daemon. A provider is a
//! long-lived helper process speaking line-delimited JSON on
//! stdin/stdout: one request line in, one response line out, for the
//! four pipeline operations. Anything going wrong on the pipe is a
//! `ProviderError` and surfaces as `ProviderUnavailable` upstream.

use rollcall_core::{
    Completeness, Embedding, FaceEmbeddingProvider, FaceRegion, ProbeImage, ProviderError,
    ProviderFactory, SpoofSignal,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    Detect {
        width: u32,
        height: u32,
        pixels: &'a [u8],
    },
    Completeness {
        width: u32,
        height: u32,
        pixels: &'a [u8],
        region: &'a FaceRegion,
    },
    Spoof {
        width: u32,
        height: u32,
        pixels: &'a [u8],
    },
    Embed {
        width: u32,
        height: u32,
        pixels: &'a [u8],
        region: &'a FaceRegion,
    },
}

#[derive(Deserialize)]
struct DetectResponse {
    face: Option<FaceRegion>,
}

#[derive(Deserialize)]
struct CompletenessResponse {
    complete: bool,
    reason: Option<String>,
}

#[derive(Deserialize)]
struct SpoofResponse {
    #[serde(default)]
    no_face: bool,
    #[serde(default)]
    live: bool,
    #[serde(default)]
    score: f32,
}

#[derive(Deserialize)]
struct EmbedResponse {
    values: Vec<f32>,
    model_version: Option<String>,
}

pub struct CommandProvider {
    model: String,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl CommandProvider {
    pub fn spawn(model: &str, program: &str, args: &[String]) -> Result<Self, ProviderError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| ProviderError::Unavailable(format!("spawn {program}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProviderError::Unavailable("no stdin pipe".into()))?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| ProviderError::Unavailable("no stdout pipe".into()))?;

        tracing::info!(model, program, "provider process spawned");
        Ok(Self {
            model: model.to_string(),
            child,
            stdin,
            stdout,
        })
    }

    fn call<R: DeserializeOwned>(&mut self, request: &Request<'_>) -> Result<R, ProviderError> {
        let mut line = serde_json::to_string(request)
            .map_err(|e| ProviderError::Protocol(format!("encode request: {e}")))?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes())?;
        self.stdin.flush()?;

        let mut response = String::new();
        let read = self.stdout.read_line(&mut response)?;
        if read == 0 {
            return Err(ProviderError::Unavailable(format!(
                "provider process for {} closed its pipe",
                self.model
            )));
        }
        serde_json::from_str(response.trim_end())
            .map_err(|e| ProviderError::Protocol(format!("decode response: {e}")))
    }
}

impl Drop for CommandProvider {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl FaceEmbeddingProvider for CommandProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn detect_and_align(
        &mut self,
        probe: &ProbeImage,
    ) -> Result<Option<FaceRegion>, ProviderError> {
        let resp: DetectResponse = self.call(&Request::Detect {
            width: probe.width,
            height: probe.height,
            pixels: &probe.pixels,
        })?;
        Ok(resp.face)
    }

    fn check_completeness(
        &mut self,
        probe: &ProbeImage,
        region: &FaceRegion,
    ) -> Result<Completeness, ProviderError> {
        let resp: CompletenessResponse = self.call(&Request::Completeness {
            width: probe.width,
            height: probe.height,
            pixels: &probe.pixels,
            region,
        })?;
        Ok(Completeness {
            complete: resp.complete,
            reason: resp.reason,
        })
    }

    fn check_spoof(&mut self, probe: &ProbeImage) -> Result<SpoofSignal, ProviderError> {
        let resp: SpoofResponse = self.call(&Request::Spoof {
            width: probe.width,
            height: probe.height,
            pixels: &probe.pixels,
        })?;
        if resp.no_face {
            Ok(SpoofSignal::NoFace)
        } else if resp.live {
            Ok(SpoofSignal::Live { score: resp.score })
        } else {
            Ok(SpoofSignal::Spoof { score: resp.score })
        }
    }

    fn embed(
        &mut self,
        probe: &ProbeImage,
        region: &FaceRegion,
    ) -> Result<Embedding, ProviderError> {
        let resp: EmbedResponse = self.call(&Request::Embed {
            width: probe.width,
            height: probe.height,
            pixels: &probe.pixels,
            region,
        })?;
        Ok(Embedding {
            values: resp.values,
            model_version: resp.model_version,
        })
    }
}

/// Factory for [`CommandProvider`] instances. The engine creates its
/// long-lived providers from this at startup; batch workers create one
/// each, so parallel extraction gets parallel helper processes.
pub struct CommandProviderFactory {
    model: String,
    program: String,
    args: Vec<String>,
}

impl CommandProviderFactory {
    pub fn new(model: &str, command: &str) -> Self {
        // Split a configured command line into program + args.
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self {
            model: model.to_string(),
            program,
            args: parts.collect(),
        }
    }
}

impl ProviderFactory for CommandProviderFactory {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn create(&self) -> Result<Box<dyn FaceEmbeddingProvider>, ProviderError> {
        Ok(Box::new(CommandProvider::spawn(
            &self.model,
            &self.program,
            &self.args,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_splits_command_line() {
        let f = CommandProviderFactory::new("insightface", "/usr/bin/env python3 helper.py");
        assert_eq!(f.model_name(), "insightface");
        assert_eq!(f.program, "/usr/bin/env");
        assert_eq!(f.args, vec!["python3", "helper.py"]);
    }

    #[test]
    fn test_spawn_missing_program_is_unavailable() {
        let result = CommandProvider::spawn("x", "/nonexistent/rollcall-helper", &[]);
        assert!(matches!(result, Err(ProviderError::Unavailable(_))));
    }

    #[test]
    fn test_request_encoding_is_tagged() {
        let req = Request::Spoof {
            width: 2,
            height: 2,
            pixels: &[1, 2, 3, 4],
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"op\":\"spoof\""));
    }
}
