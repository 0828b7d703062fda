use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use y7converter::llm::CompletionRequest;
use y7converter::media::{
    audio_file_name, builtin_languages, language_name, subtitle_file_name, translated_file_name,
    FileKind,
};
use y7converter::models::{format_elapsed, Action, JobStatus};
use y7converter::{
    CloudRecognizer, Config, DashScopeProvider, Error, FFmpeg, LLMProvider, OssClient,
    PipelineConfig, Storage, SubtitlePipeline,
};

#[derive(Parser, Debug)]
#[command(name = "y7converter")]
#[command(version = "0.1.0")]
#[command(about = "Generate subtitles from video and translate SRT files with DashScope")]
struct Args {
    /// Path to config.yaml (defaults to $Y7_CONFIG or ./config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database path for job history and cached transcripts
    #[arg(long, global = true)]
    database: Option<String>,

    /// Do not record jobs or use cached transcripts
    #[arg(long, global = true)]
    no_history: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an SRT subtitle from a video or audio file
    Subtitle {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Translate an SRT subtitle file
    Translate {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Source language name or code
        #[arg(long)]
        from: Option<String>,
        /// Target language name or code
        #[arg(long)]
        to: Option<String>,
    },

    /// Extract the audio track as 16 kHz mono AAC
    ExtractAudio {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Pick the job from the file type: subtitles are translated, media is transcribed
    Process {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },

    /// Object storage operations
    Oss {
        #[command(subcommand)]
        command: OssCommand,
    },

    /// Send a single prompt to the DashScope model
    Ask {
        prompt: String,
        #[arg(long, default_value = "qwen-plus")]
        model: String,
        /// Wait for the full answer instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },

    /// Show recent jobs
    History {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// List known translation languages
    Languages,
}

#[derive(Subcommand, Debug)]
enum OssCommand {
    Upload {
        file: PathBuf,
    },
    Download {
        key: String,
        dest: PathBuf,
    },
    List {
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long, default_value = "100")]
        limit: usize,
    },
    Delete {
        key: String,
    },
    Url {
        key: String,
        /// Presign the URL for this many seconds
        #[arg(long)]
        expires: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref());
    let debug = args.verbose || config.as_ref().map(Config::is_debug).unwrap_or(false);
    if let Err(e) = init_logging(debug) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let result = match config {
        Ok(config) => run(args, config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        if let Some(hint) = e.downcast_ref::<Error>().and_then(Error::hint) {
            eprintln!("Hint: {}", hint);
        }
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) -> anyhow::Result<()> {
    let level = if debug { "y7converter=debug" } else { "y7converter=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(level.parse()?)
                .add_directive("reqwest=warn".parse()?),
        )
        .init();
    Ok(())
}

async fn run(args: Args, config: Config) -> anyhow::Result<()> {
    match &args.command {
        Command::Subtitle { input, output } => {
            run_job(&args, &config, Action::GenerateSubtitle, input, output.as_deref(), None, None)
                .await
        }
        Command::Translate {
            input,
            output,
            from,
            to,
        } => {
            run_job(
                &args,
                &config,
                Action::TranslateSubtitle,
                input,
                output.as_deref(),
                from.as_deref(),
                to.as_deref(),
            )
            .await
        }
        Command::ExtractAudio { input, output } => {
            run_job(&args, &config, Action::ExtractAudio, input, output.as_deref(), None, None).await
        }
        Command::Process {
            input,
            output,
            from,
            to,
        } => {
            let kind = FileKind::of(input);
            let action = match kind.actions() {
                [action] => *action,
                _ => {
                    return Err(Error::UnsupportedFile(format!(
                        "cannot tell what to do with {}; use `subtitle` or `translate`",
                        input.display()
                    ))
                    .into())
                }
            };
            run_job(
                &args,
                &config,
                action,
                input,
                output.as_deref(),
                from.as_deref(),
                to.as_deref(),
            )
            .await
        }
        Command::Oss { command } => run_oss(&config, command).await,
        Command::Ask {
            prompt,
            model,
            no_stream,
        } => ask(&config, prompt, model, *no_stream).await,
        Command::History { limit } => show_history(&args, &config, *limit),
        Command::Languages => {
            show_languages(&config);
            Ok(())
        }
    }
}

fn open_storage(args: &Args, config: &Config) -> anyhow::Result<Option<Storage>> {
    if args.no_history || !config.storage.history {
        return Ok(None);
    }
    let path = args
        .database
        .clone()
        .unwrap_or_else(|| config.storage.database_path.clone());
    Ok(Some(Storage::new(&path)?))
}

/// Accepts either a language name or a code such as `ja`.
fn resolve_language(input: &str) -> String {
    language_name(input)
        .map(str::to_string)
        .unwrap_or_else(|| input.trim().to_string())
}

fn default_output(action: Action, input: &Path, target_lang: &str, config: &Config) -> PathBuf {
    let name = match action {
        Action::ExtractAudio => audio_file_name(input),
        Action::GenerateSubtitle => subtitle_file_name(input),
        Action::TranslateSubtitle => {
            translated_file_name(input, target_lang, &config.translation.supported_languages)
        }
    };
    input.with_file_name(name)
}

async fn run_job(
    args: &Args,
    config: &Config,
    action: Action,
    input: &Path,
    output: Option<&Path>,
    from: Option<&str>,
    to: Option<&str>,
) -> anyhow::Result<()> {
    let mut pipeline_config = PipelineConfig::from(config);
    if let Some(from) = from {
        pipeline_config.source_lang = resolve_language(from);
    }
    if let Some(to) = to {
        pipeline_config.target_lang = resolve_language(to);
    }
    if args.no_history {
        pipeline_config.use_transcript_cache = false;
    }

    let dest = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(action, input, &pipeline_config.target_lang, config));

    let mut pipeline = SubtitlePipeline::new(pipeline_config);
    if let Some(storage) = open_storage(args, config)? {
        pipeline = pipeline.with_storage(storage);
    }

    match action {
        Action::ExtractAudio => {
            pipeline = pipeline.with_ffmpeg(FFmpeg::locate(&config.ffmpeg).await?);
        }
        Action::GenerateSubtitle => {
            // Neither is needed when the transcript is cached.
            match FFmpeg::locate(&config.ffmpeg).await {
                Ok(ffmpeg) => pipeline = pipeline.with_ffmpeg(ffmpeg),
                Err(e) => tracing::warn!("{}", e),
            }
            match CloudRecognizer::from_config(config) {
                Ok(recognizer) => pipeline = pipeline.with_recognizer(recognizer),
                Err(e) => tracing::warn!("Speech recognition unavailable: {}", e),
            }
        }
        Action::TranslateSubtitle => {
            if let Some(key) = config.translation_api_key() {
                let provider = DashScopeProvider::from_config(&config.dashscope, key)?;
                pipeline = pipeline.with_translator(Arc::new(provider), true);
            }
        }
    }

    let result = pipeline.execute(action, input, &dest).await?;
    println!(
        "{} finished in {}: {}",
        action.description(),
        result.formatted_time(),
        result.result_file.display()
    );
    Ok(())
}

async fn run_oss(config: &Config, command: &OssCommand) -> anyhow::Result<()> {
    let client = OssClient::new(&config.file_upload)?;

    match command {
        OssCommand::Upload { file } => {
            let uploaded = client.upload_file(file).await?;
            println!("Uploaded {} ({} bytes)", uploaded.key, uploaded.size);
            println!("{}", uploaded.url);
        }
        OssCommand::Download { key, dest } => {
            let bytes = client.download_to(key, dest).await?;
            println!("Downloaded {} bytes to {}", bytes, dest.display());
        }
        OssCommand::List { prefix, limit } => {
            let objects = client.list_all(prefix.as_deref(), *limit).await?;
            for object in &objects {
                println!(
                    "{:>12}  {:<24}  {}",
                    object.size,
                    object.last_modified.as_deref().unwrap_or("-"),
                    object.key
                );
            }
            println!("{} objects", objects.len());
        }
        OssCommand::Delete { key } => {
            client.delete_object(key).await?;
            println!("Deleted {}", key);
        }
        OssCommand::Url { key, expires } => {
            let url = match expires {
                Some(secs) => client.presigned_url(key, *secs)?,
                None => client.access_url(key)?,
            };
            println!("{}", url);
        }
    }

    Ok(())
}

async fn ask(config: &Config, prompt: &str, model: &str, no_stream: bool) -> anyhow::Result<()> {
    let key = config.translation_api_key().ok_or_else(|| {
        Error::Config(
            "DashScope API key is not configured; set translation.dashscope.api_key \
             or the DASHSCOPE_API_KEY environment variable"
                .to_string(),
        )
    })?;
    let provider = DashScopeProvider::from_config(&config.dashscope, key)?;
    let request = CompletionRequest::prompt(model, prompt);

    if no_stream {
        println!("{}", provider.complete(request).await?);
        return Ok(());
    }

    let mut stream = provider.complete_stream(request).await?;
    let mut stdout = std::io::stdout();
    while let Some(chunk) = stream.next().await {
        write!(stdout, "{}", chunk?)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}

fn show_history(args: &Args, config: &Config, limit: usize) -> anyhow::Result<()> {
    let Some(storage) = open_storage(args, config)? else {
        println!("Job history is disabled");
        return Ok(());
    };

    let jobs = storage.recent_jobs(limit)?;
    if jobs.is_empty() {
        println!("No jobs recorded yet");
        return Ok(());
    }

    for job in jobs {
        println!(
            "{}  {:<20} {:<9} {:>10}  {} -> {}",
            job.created_at.format("%Y-%m-%d %H:%M:%S"),
            job.action.to_string(),
            job.status.to_string(),
            format_elapsed(std::time::Duration::from_millis(job.processing_ms)),
            job.source_path,
            job.dest_path
        );
        if job.status == JobStatus::Failed {
            if let Some(message) = &job.message {
                println!("    {}", message);
            }
        }
    }

    Ok(())
}

fn show_languages(config: &Config) {
    for language in &config.translation.supported_languages {
        println!("{:<6} {}", language.code, language.name);
    }
    for language in builtin_languages() {
        if config
            .translation
            .supported_languages
            .iter()
            .any(|l| l.code == language.code)
        {
            continue;
        }
        println!("{:<6} {}", language.code, language.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use y7converter::media::content_hash;
    use y7converter::models::Cue;
    use y7converter::subtitle::read_srt_file;

    #[tokio::test]
    async fn test_cached_subtitle_needs_no_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mp4");
        let database = dir.path().join("history.db");
        tokio::fs::write(&input, b"not really a video").await.unwrap();

        let config = Config::default();
        let cues = vec![Cue::new(1, 0, 1500, "from the cache")];
        {
            let storage = Storage::new(&database).unwrap();
            let hash = content_hash(&input).await.unwrap();
            storage
                .save_transcript(&hash, &config.speech_recognition.dashscope.model, &cues)
                .unwrap();
        }

        let args = Args::parse_from([
            "y7converter",
            "--database",
            database.to_str().unwrap(),
            "subtitle",
            input.to_str().unwrap(),
        ]);
        run(args, config).await.unwrap();

        let written = read_srt_file(&dir.path().join("clip.srt")).await.unwrap();
        assert_eq!(written, cues);
    }

    #[test]
    fn test_resolve_language_accepts_codes() {
        assert_eq!(resolve_language("ja"), "Japanese");
        assert_eq!(resolve_language(" Klingon "), "Klingon");
    }
}
