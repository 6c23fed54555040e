//! Speech backends that delegate to installed programs
//!
//! TTS runs e.g. `say` or `espeak-ng` with the text as the last argument.
//! STT runs a recorder/recognizer that prints one transcript to stdout.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{SpeechEngine, SpeechError, Transcriber};

/// Poll period while waiting for the recognizer to exit
const CHILD_POLL: Duration = Duration::from_millis(50);

/// Extra time the recognizer gets beyond the capture timeout to transcribe
const TRANSCRIBE_GRACE: Duration = Duration::from_secs(10);

fn locate(program: &str) -> Result<PathBuf, SpeechError> {
    which::which(program).map_err(|_| SpeechError::ProgramNotFound(program.to_string()))
}

/// Text-to-speech through an external program
pub struct ExternalTts {
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalTts {
    pub fn new(program: &str, args: Vec<String>) -> Result<Self, SpeechError> {
        Ok(Self {
            program: locate(program)?,
            args,
        })
    }
}

impl SpeechEngine for ExternalTts {
    fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .map_err(|e| SpeechError::Backend(e.to_string()))?;

        if !status.success() {
            return Err(SpeechError::Backend(format!("tts exited with {}", status)));
        }
        Ok(())
    }
}

/// Speech-to-text through an external program
///
/// The program receives the capture timeout in `KORE_LISTEN_TIMEOUT_SECS`
/// and is killed if it runs much past it.
pub struct ExternalStt {
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalStt {
    pub fn new(program: &str, args: Vec<String>) -> Result<Self, SpeechError> {
        Ok(Self {
            program: locate(program)?,
            args,
        })
    }
}

impl Transcriber for ExternalStt {
    fn listen_once(&mut self, timeout: Duration) -> Result<Option<String>, SpeechError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .env("KORE_LISTEN_TIMEOUT_SECS", timeout.as_secs().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SpeechError::Backend(e.to_string()))?;

        wait_for_transcript(child, timeout + TRANSCRIBE_GRACE)
    }
}

/// Wait up to `deadline` for the child while draining its stdout
///
/// Output is read on its own thread so a chatty recognizer never stalls on a
/// full pipe.
fn wait_for_transcript(
    mut child: Child,
    deadline: Duration,
) -> Result<Option<String>, SpeechError> {
    let started = Instant::now();
    let reader = child
        .stdout
        .take()
        .map(|stdout| {
            thread::Builder::new()
                .name("stt-output".to_string())
                .spawn(move || read_all(stdout))
        })
        .transpose()
        .map_err(|e| SpeechError::Backend(e.to_string()))?;

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if started.elapsed() >= deadline => {
                warn!(deadline_secs = deadline.as_secs(), "recognizer timed out, killing");
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }
            Ok(None) => thread::sleep(CHILD_POLL),
            Err(e) => return Err(SpeechError::Backend(e.to_string())),
        }
    };

    let transcript = match reader {
        Some(handle) => handle
            .join()
            .map_err(|_| SpeechError::Backend("stt output reader panicked".into()))??,
        None => String::new(),
    };

    if !status.success() {
        debug!(%status, "recognizer reported no speech");
        return Ok(None);
    }

    let transcript = transcript.trim();
    Ok((!transcript.is_empty()).then(|| transcript.to_string()))
}

fn read_all(mut stdout: ChildStdout) -> Result<String, SpeechError> {
    let mut transcript = String::new();
    stdout
        .read_to_string(&mut transcript)
        .map_err(|e| SpeechError::Backend(e.to_string()))?;
    Ok(transcript)
}
