use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::config::FFmpegConfig;
use crate::error::{Error, Result};
use crate::models::Action;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone)]
pub struct FFmpeg {
    path: PathBuf,
    timeout: Duration,
}

fn candidate_paths() -> Vec<PathBuf> {
    let candidates: &[&str] = if cfg!(windows) {
        &[
            "ffmpeg.exe",
            r"C:\ffmpeg\bin\ffmpeg.exe",
            r"C:\Program Files\ffmpeg\bin\ffmpeg.exe",
        ]
    } else {
        &[
            "ffmpeg",
            "/usr/bin/ffmpeg",
            "/usr/local/bin/ffmpeg",
            "/opt/homebrew/bin/ffmpeg",
        ]
    };
    candidates.iter().map(PathBuf::from).collect()
}

impl FFmpeg {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: Action::ExtractAudio.timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn locate(config: &FFmpegConfig) -> Result<Self> {
        let ffmpeg = Self::find(config).await?;
        Ok(match config.timeout_secs {
            Some(secs) => ffmpeg.with_timeout(Duration::from_secs(secs)),
            None => ffmpeg,
        })
    }

    async fn find(config: &FFmpegConfig) -> Result<Self> {
        if let Some(path) = &config.path {
            if is_runnable(path).await {
                return Ok(Self::new(path));
            }
            return Err(Error::FFmpeg(format!(
                "configured FFmpeg at {} is not runnable",
                path.display()
            )));
        }

        for candidate in candidate_paths() {
            if is_runnable(&candidate).await {
                tracing::debug!("Using FFmpeg at {}", candidate.display());
                return Ok(Self::new(candidate));
            }
        }

        Err(Error::FFmpeg(
            "FFmpeg not found; install it or set ffmpeg.path".to_string(),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn audio_extract_args(input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-i".into(), absolute(input).into_os_string()];
        for arg in [
            "-vn", // drop video
            "-acodec", "aac",
            "-ar", "16000", // 16 kHz for recognition
            "-ac", "1",
            "-b:a", "64k",
            "-y",
        ] {
            args.push(arg.into());
        }
        args.push(absolute(output).into_os_string());
        args
    }

    pub async fn extract_audio(&self, input: &Path, output: &Path) -> Result<CommandOutput> {
        let args = Self::audio_extract_args(input, output);
        tracing::info!("Extracting audio from {}", input.display());
        tracing::debug!("{} {:?}", self.path.display(), args);

        let mut command = Command::new(&self.path);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = input.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        let child = command
            .spawn()
            .map_err(|e| Error::FFmpeg(format!("failed to start {}: {}", self.path.display(), e)))?;

        let finished = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => return Err(Error::Timeout(self.timeout.as_secs())),
        };

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&finished.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&finished.stderr).into_owned(),
            exit_code: finished.status.code().unwrap_or(-1),
        };

        if !finished.status.success() {
            return Err(Error::FFmpeg(format!(
                "exited with status {}: {}",
                result.exit_code,
                last_lines(&result.stderr, 10)
            )));
        }

        if !absolute(output).is_file() {
            return Err(Error::FFmpeg("no audio file was produced".to_string()));
        }

        Ok(result)
    }
}

async fn is_runnable(path: &Path) -> bool {
    Command::new(path)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_extract_args() {
        let args = FFmpeg::audio_extract_args(Path::new("/in/video.mp4"), Path::new("/tmp/out.aac"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-i", "/in/video.mp4", "-vn", "-acodec", "aac", "-ar", "16000", "-ac", "1",
                "-b:a", "64k", "-y", "/tmp/out.aac",
            ]
        );
    }

    #[test]
    fn test_relative_paths_become_absolute() {
        let args = FFmpeg::audio_extract_args(Path::new("clip.mp4"), Path::new("clip.aac"));
        assert!(Path::new(&args[1]).is_absolute());
        assert!(Path::new(args.last().unwrap()).is_absolute());
    }

    #[test]
    fn test_last_lines() {
        assert_eq!(last_lines("a\nb\nc", 2), "b\nc");
        assert_eq!(last_lines("a", 5), "a");
    }

    #[tokio::test]
    async fn test_missing_configured_binary() {
        let config = FFmpegConfig {
            path: Some(PathBuf::from("/nonexistent/ffmpeg-binary")),
            timeout_secs: None,
        };
        let err = FFmpeg::locate(&config).await.unwrap_err();
        assert!(matches!(err, Error::FFmpeg(_)));
    }

    #[cfg(unix)]
    fn slow_ffmpeg(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("ffmpeg");
        std::fs::write(&path, "#!/bin/sh\n[ \"$1\" = \"-version\" ] && exit 0\nsleep 5\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_locate_applies_configured_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let config = FFmpegConfig {
            path: Some(slow_ffmpeg(dir.path())),
            timeout_secs: Some(7),
        };
        let ffmpeg = FFmpeg::locate(&config).await.unwrap();
        assert_eq!(ffmpeg.timeout, Duration::from_secs(7));

        let config = FFmpegConfig { timeout_secs: None, ..config };
        let ffmpeg = FFmpeg::locate(&config).await.unwrap();
        assert_eq!(ffmpeg.timeout, Action::ExtractAudio.timeout());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extract_audio_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = FFmpeg::new(slow_ffmpeg(dir.path())).with_timeout(Duration::from_millis(200));
        let input = dir.path().join("clip.mp4");
        std::fs::write(&input, b"not a video").unwrap();

        let started = std::time::Instant::now();
        let err = ffmpeg
            .extract_audio(&input, &dir.path().join("clip.aac"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(0)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
